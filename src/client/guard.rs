use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::oneshot;

/// Why a refresh flight failed. Cloneable so one failure can be broadcast
/// to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RefreshFailure {
    pub message: String,
    pub status: Option<u16>,
}

pub type FlightResult = Result<String, RefreshFailure>;

enum FlightState {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<FlightResult>>,
    },
}

/// What `join` hands back: either you are the leader and must perform the
/// refresh (and then call [`LeaderTicket::complete`]), or you wait for the
/// leader's broadcast.
pub enum FlightTicket<'a> {
    Leader(LeaderTicket<'a>),
    Waiter(oneshot::Receiver<FlightResult>),
}

/// Proof of leadership for the current flight. Publishing the outcome
/// consumes the ticket; a ticket dropped without publishing (the leader's
/// future was cancelled, e.g. by a caller-imposed timeout) broadcasts an
/// abort to the waiters and returns the guard to idle, so the next failure
/// elects a fresh leader instead of queueing forever.
pub struct LeaderTicket<'a> {
    guard: &'a RefreshGuard,
    published: bool,
}

impl LeaderTicket<'_> {
    /// Publish the outcome to every waiter and return the guard to idle.
    pub fn complete(mut self, result: FlightResult) {
        self.published = true;
        self.guard.publish(result);
    }
}

impl Drop for LeaderTicket<'_> {
    fn drop(&mut self) {
        if !self.published {
            self.guard.publish(Err(RefreshFailure {
                message: "Refresh aborted before completion".to_string(),
                status: None,
            }));
        }
    }
}

/// Single-flight coordinator for token refresh.
///
/// When a batch of requests all fail with the same stale access token,
/// exactly one of them performs the refresh call; the rest register as
/// waiters and are broadcast-notified with the shared outcome. This is the
/// multi-threaded-runtime form of the boolean flag plus callback queue an
/// event-loop client would use.
///
/// The critical sections never hold the lock across an await, so a plain
/// mutex suffices; leadership itself is an RAII ticket so a cancelled
/// leader cannot wedge the flight.
#[derive(Default)]
pub struct RefreshGuard {
    state: Mutex<FlightState>,
}

impl Default for FlightState {
    fn default() -> Self {
        FlightState::Idle
    }
}

impl RefreshGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the current flight, starting one if none is in progress.
    pub fn join(&self) -> FlightTicket<'_> {
        let mut state = self.state.lock().unwrap();
        match &mut *state {
            FlightState::Idle => {
                *state = FlightState::Refreshing { waiters: Vec::new() };
                FlightTicket::Leader(LeaderTicket {
                    guard: self,
                    published: false,
                })
            }
            FlightState::Refreshing { waiters } => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                FlightTicket::Waiter(rx)
            }
        }
    }

    /// Resolve every waiter and return to idle. No waiter is ever dropped
    /// unresolved.
    fn publish(&self, result: FlightResult) {
        let mut state = self.state.lock().unwrap();
        if let FlightState::Refreshing { waiters } =
            std::mem::replace(&mut *state, FlightState::Idle)
        {
            for waiter in waiters {
                // A waiter may have been cancelled; that is its business.
                let _ = waiter.send(result.clone());
            }
        }
    }
}
