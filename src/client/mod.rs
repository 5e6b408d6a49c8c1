//! HTTP client for the auth surface, with transparent token rotation.
//!
//! Mirrors what the web client does: attach the cached access token to
//! every request, and on a 401 refresh once through a single-flight guard,
//! replaying the original request with the new token. A failed refresh
//! clears local credentials and redirects to the login entry point.

pub mod guard;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::db::models::{PublicAccount, Role};
use self::guard::{FlightTicket, RefreshFailure, RefreshGuard};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The session is gone; the only recovery is a fresh login.
    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("refresh aborted")]
    RefreshAborted,
}

impl From<RefreshFailure> for ClientError {
    fn from(failure: RefreshFailure) -> Self {
        ClientError::SessionExpired(failure.message)
    }
}

/// Locally cached credentials: what the web client kept in localStorage.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub role: Option<Role>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionBody {
    access_token: String,
    refresh_token: String,
    account: PublicAccount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    access_token: String,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<RwLock<Credentials>>,
    guard: Arc<RefreshGuard>,
    // Current "page"; stands in for window.location in the web client.
    location: Arc<RwLock<String>>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        // A transport-level timeout bounds queue growth if a refresh hangs;
        // the protocol itself defines none.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: Arc::new(RwLock::new(Credentials::default())),
            guard: Arc::new(RefreshGuard::new()),
            location: Arc::new(RwLock::new("/".to_string())),
        })
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials.read().unwrap().clone()
    }

    pub fn store_session(
        &self,
        access_token: &str,
        refresh_token: &str,
        role: Role,
        user_id: &str,
    ) {
        let mut creds = self.credentials.write().unwrap();
        creds.access_token = Some(access_token.to_string());
        creds.refresh_token = Some(refresh_token.to_string());
        creds.role = Some(role);
        creds.user_id = Some(user_id.to_string());
    }

    pub fn store_access_token(&self, access_token: &str) {
        self.credentials.write().unwrap().access_token = Some(access_token.to_string());
    }

    pub fn clear_credentials(&self) {
        *self.credentials.write().unwrap() = Credentials::default();
    }

    pub fn navigate(&self, path: &str) {
        *self.location.write().unwrap() = path.to_string();
    }

    pub fn location(&self) -> String {
        self.location.read().unwrap().clone()
    }

    pub async fn signup(
        &self,
        role: Role,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<PublicAccount, ClientError> {
        let url = format!("{}/{}/auth/signup", self.base_url, role);
        let resp = self
            .http
            .post(url)
            .json(&json!({ "name": name, "email": email, "password": password, "role": role }))
            .send()
            .await?;
        self.accept_session(resp).await
    }

    pub async fn login(
        &self,
        role: Role,
        email: &str,
        password: &str,
    ) -> Result<PublicAccount, ClientError> {
        let url = format!("{}/{}/auth/login", self.base_url, role);
        let resp = self
            .http
            .post(url)
            .json(&json!({ "email": email, "password": password, "role": role }))
            .send()
            .await?;
        self.accept_session(resp).await
    }

    async fn accept_session(&self, resp: reqwest::Response) -> Result<PublicAccount, ClientError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(api_error(status, resp).await);
        }
        let body: SessionBody = resp.json().await?;
        self.store_session(
            &body.access_token,
            &body.refresh_token,
            body.account.role,
            &body.account.id.to_string(),
        );
        Ok(body.account)
    }

    /// Local credentials are cleared no matter what the server says.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let (role, refresh_token) = {
            let creds = self.credentials.read().unwrap();
            (creds.role.unwrap_or(Role::Traveler), creds.refresh_token.clone())
        };
        let url = format!("{}/{}/auth/logout", self.base_url, role);
        let result = self
            .http
            .post(url)
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await;
        self.clear_credentials();
        if let Err(e) = result {
            warn!("Logout request failed (credentials cleared anyway): {}", e);
        }
        Ok(())
    }

    pub async fn get(&self, path: &str) -> Result<Value, ClientError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Send with the cached access token; on 401, refresh once through the
    /// single-flight guard and replay once. The replay's own 401 is final
    /// (the per-request retry cap), so a broken replay cannot loop.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ClientError> {
        let token = self.credentials.read().unwrap().access_token.clone();
        let resp = self.send(method.clone(), path, body.as_ref(), token).await?;

        if resp.status() != StatusCode::UNAUTHORIZED {
            return into_json(resp).await;
        }

        info!("Request to {} was unauthorized; attempting token refresh", path);
        let fresh = self.refresh_access_token().await?;
        let resp = self.send(method, path, body.as_ref(), Some(fresh)).await?;
        into_json(resp).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: Option<String>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.http.request(method, url);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder.send().await
    }

    /// Collapse concurrent refresh attempts into one network call. The
    /// leader performs the refresh and broadcasts; everyone else waits.
    /// If the leader is cancelled its ticket aborts the flight on drop, so
    /// waiters resolve and a later failure elects a new leader.
    async fn refresh_access_token(&self) -> Result<String, ClientError> {
        match self.guard.join() {
            FlightTicket::Waiter(rx) => {
                let outcome = rx.await.map_err(|_| ClientError::RefreshAborted)?;
                outcome.map_err(ClientError::from)
            }
            FlightTicket::Leader(ticket) => {
                let result = self.perform_refresh().await;
                match &result {
                    Ok(token) => {
                        self.credentials.write().unwrap().access_token = Some(token.clone());
                    }
                    Err(failure) => {
                        warn!("Token refresh failed: {}", failure.message);
                        self.clear_credentials();
                        self.redirect_to_login();
                    }
                }
                ticket.complete(result.clone());
                result.map_err(ClientError::from)
            }
        }
    }

    async fn perform_refresh(&self) -> Result<String, RefreshFailure> {
        let (role, refresh_token) = {
            let creds = self.credentials.read().unwrap();
            (creds.role.unwrap_or(Role::Traveler), creds.refresh_token.clone())
        };
        let Some(refresh_token) = refresh_token else {
            return Err(RefreshFailure {
                message: "No refresh token stored".to_string(),
                status: None,
            });
        };

        let url = format!("{}/{}/auth/refresh", self.base_url, role);
        let resp = self
            .http
            .post(url)
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .map_err(|e| RefreshFailure {
                message: e.to_string(),
                status: None,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let message = error_message(resp).await;
            return Err(RefreshFailure {
                message,
                status: Some(status.as_u16()),
            });
        }
        let body: RefreshBody = resp.json().await.map_err(|e| RefreshFailure {
            message: format!("No access token in refresh response: {}", e),
            status: None,
        })?;
        Ok(body.access_token)
    }

    fn redirect_to_login(&self) {
        let mut location = self.location.write().unwrap();
        if !location.contains("/login") && !location.contains("/signup") {
            *location = "/login".to_string();
        }
    }
}

async fn into_json(resp: reqwest::Response) -> Result<Value, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(api_error(status, resp).await);
    }
    Ok(resp.json().await?)
}

async fn api_error(status: StatusCode, resp: reqwest::Response) -> ClientError {
    ClientError::Api {
        status: status.as_u16(),
        message: error_message(resp).await,
    }
}

/// Pull the server-supplied message out of the `{error:{status,message}}`
/// envelope, falling back to the raw body.
async fn error_message(resp: reqwest::Response) -> String {
    match resp.json::<Value>().await {
        Ok(value) => value
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        Err(_) => "unreadable error response".to_string(),
    }
}
