//! Dual-token session protocol.
//!
//! One [`SessionService`] per identity domain: token issuance, access
//! validation, refresh with session pinning, best-effort revocation, and
//! the check-session probe.

pub mod extractor;
pub mod handlers;
mod service;
mod tokens;

pub use extractor::AuthenticatedUser;
pub use service::{IssuedSession, SessionProbe, SessionService};
pub use tokens::Claims;
