use actix_web::{web, HttpRequest, HttpResponse, Scope};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::auth::extractor::{bearer_token, AuthenticatedUser};
use crate::auth::service::{SessionProbe, SessionService};
use crate::db::models::{PublicAccount, Role};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub account: PublicAccount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSessionRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSessionResponse {
    pub is_logged_in: bool,
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<PublicAccount>,
}

impl From<SessionProbe> for CheckSessionResponse {
    fn from(probe: SessionProbe) -> Self {
        Self {
            is_logged_in: probe.is_logged_in,
            role: probe.role,
            access_token: probe.access_token,
            user: probe.user,
        }
    }
}

/// Mount the auth surface for one identity domain, e.g.
/// `auth_scope("/traveler/auth", traveler_service)`.
pub fn auth_scope(prefix: &str, service: SessionService) -> Scope {
    web::scope(prefix)
        .app_data(web::Data::new(service))
        .route("/signup", web::post().to(signup))
        .route("/login", web::post().to(login))
        .route("/logout", web::post().to(logout))
        .route("/refresh", web::post().to(refresh))
        .route("/check-session", web::get().to(check_session))
        .route("/check-session", web::post().to(check_session))
        .route("/me", web::get().to(me))
}

pub async fn signup(
    req: web::Json<SignupRequest>,
    service: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    info!("Received signup request for email: {}", req.email);
    match service
        .signup(&req.name, &req.email, &req.password, req.role)
        .await
    {
        Ok(session) => {
            info!("Signup successful for email: {}", req.email);
            Ok(HttpResponse::Created().json(AuthResponse {
                access_token: session.access_token,
                refresh_token: session.refresh_token,
                account: session.account,
            }))
        }
        Err(e) => {
            error!("Signup failed for email: {}: {}", req.email, e);
            Err(e)
        }
    }
}

pub async fn login(
    req: web::Json<LoginRequest>,
    service: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request for email: {}", req.email);
    match service.login(&req.email, &req.password, req.role).await {
        Ok(session) => {
            info!("Login successful for email: {}", req.email);
            Ok(HttpResponse::Ok().json(AuthResponse {
                access_token: session.access_token,
                refresh_token: session.refresh_token,
                account: session.account,
            }))
        }
        Err(e) => {
            error!("Login failed for email: {}: {}", req.email, e);
            Err(e)
        }
    }
}

/// Always 200. Revocation is best-effort so client-side credential
/// clearing stays deterministic.
pub async fn logout(
    body: Option<web::Json<LogoutRequest>>,
    service: web::Data<SessionService>,
) -> HttpResponse {
    let refresh_token = body.and_then(|b| b.into_inner().refresh_token);
    service.logout(refresh_token.as_deref()).await;
    HttpResponse::Ok().json(serde_json::json!({
        "message": "Successfully logged out"
    }))
}

pub async fn refresh(
    req: web::Json<RefreshRequest>,
    service: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let access_token = service.refresh(&req.refresh_token).await?;
    Ok(HttpResponse::Ok().json(RefreshResponse { access_token }))
}

/// Composite probe used by clients to silently recover identity. Serves
/// both GET (bearer header only) and POST (body may carry a refresh token).
pub async fn check_session(
    req: HttpRequest,
    body: Option<web::Json<CheckSessionRequest>>,
    service: web::Data<SessionService>,
) -> HttpResponse {
    let bearer = bearer_token(&req);
    let refresh_token = body.and_then(|b| b.into_inner().refresh_token);
    let probe = service.check_session(bearer, refresh_token.as_deref()).await;
    HttpResponse::Ok().json(CheckSessionResponse::from(probe))
}

/// Minimal protected route: the contract downstream CRUD services consume.
pub async fn me(
    user: AuthenticatedUser,
    service: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[service.domain_role()])?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "id": user.id,
        "email": user.email,
        "role": user.role,
    })))
}
