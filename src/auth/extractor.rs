use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use uuid::Uuid;

use crate::auth::service::SessionService;
use crate::db::models::Role;
use crate::error::{AppError, AuthError};

/// Identity attached to a request by a valid bearer access token.
///
/// Extraction is stateless: signature plus expiry, no store lookup. An
/// expired token fails with `TokenExpired` so clients know a refresh (not a
/// re-login) is the right recovery.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl AuthenticatedUser {
    /// Route-level role check. Terminal: a 403 is never retried.
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden.into())
        }
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthenticatedUser, AppError> {
    let service = req
        .app_data::<web::Data<SessionService>>()
        .ok_or_else(|| AppError::Internal("SessionService not configured".to_string()))?;
    let token = bearer_token(req).ok_or(AuthError::MissingToken)?;
    let claims = service.verify_access(token)?;
    Ok(AuthenticatedUser {
        id: claims.sub,
        email: claims.email,
        role: claims.role,
    })
}

/// Pull the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}
