use std::sync::Arc;

use actix_web::{test, App};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use uuid::Uuid;

use staybook_auth::auth::handlers::auth_scope;
use staybook_auth::auth::{Claims, SessionService};
use staybook_auth::config::DomainConfig;
use staybook_auth::db::{MemoryAccountRepository, Role};

const TRAVELER_ACCESS_SECRET: &str = "api_test_traveler_access";

fn domain_config(access_secret: &str, refresh_secret: &str, table: &str) -> DomainConfig {
    DomainConfig {
        access_secret: access_secret.to_string(),
        refresh_secret: refresh_secret.to_string(),
        access_ttl_minutes: 15,
        refresh_ttl_days: 7,
        table: table.to_string(),
    }
}

fn traveler_service() -> SessionService {
    SessionService::new(
        Role::Traveler,
        &domain_config(TRAVELER_ACCESS_SECRET, "api_test_traveler_refresh", "travelers"),
        Arc::new(MemoryAccountRepository::new()),
    )
}

fn owner_service() -> SessionService {
    SessionService::new(
        Role::Owner,
        &domain_config("api_test_owner_access", "api_test_owner_refresh", "owners"),
        Arc::new(MemoryAccountRepository::new()),
    )
}

macro_rules! test_app {
    () => {
        test::init_service(
            App::new()
                .service(auth_scope("/traveler/auth", traveler_service()))
                .service(auth_scope("/owner/auth", owner_service())),
        )
        .await
    };
}

fn signup_body(email: &str, role: &str) -> serde_json::Value {
    json!({
        "name": "Test User",
        "email": email,
        "password": "password123",
        "role": role
    })
}

#[actix_web::test]
async fn test_signup_and_login() {
    let app = test_app!();

    let resp = test::TestRequest::post()
        .uri("/traveler/auth/signup")
        .set_json(signup_body("test@example.com", "traveler"))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body.get("accessToken").is_some());
    assert!(body.get("refreshToken").is_some());
    assert_eq!(body["account"]["email"], "test@example.com");
    assert_eq!(body["account"]["role"], "traveler");
    // Credentials never leak into the wire shape
    assert!(body["account"].get("password_hash").is_none());
    assert!(body["account"].get("session_pointer").is_none());

    let resp = test::TestRequest::post()
        .uri("/traveler/auth/login")
        .set_json(json!({
            "email": "test@example.com",
            "password": "password123",
            "role": "traveler"
        }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body.get("accessToken").is_some());
    assert!(body.get("refreshToken").is_some());
}

#[actix_web::test]
async fn test_signup_failures() {
    let app = test_app!();

    let resp = test::TestRequest::post()
        .uri("/traveler/auth/signup")
        .set_json(signup_body("dup@example.com", "traveler"))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 201);

    // Duplicate email
    let resp = test::TestRequest::post()
        .uri("/traveler/auth/signup")
        .set_json(signup_body("dup@example.com", "traveler"))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 400);

    // Owner role on the traveler endpoint
    let resp = test::TestRequest::post()
        .uri("/traveler/auth/signup")
        .set_json(signup_body("owner@example.com", "owner"))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_login_status_codes() {
    let app = test_app!();

    test::TestRequest::post()
        .uri("/owner/auth/signup")
        .set_json(signup_body("owner@example.com", "owner"))
        .send_request(&app)
        .await;

    // Unknown account
    let resp = test::TestRequest::post()
        .uri("/owner/auth/login")
        .set_json(json!({"email": "ghost@example.com", "password": "x", "role": "owner"}))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 404);

    // Bad password
    let resp = test::TestRequest::post()
        .uri("/owner/auth/login")
        .set_json(json!({"email": "owner@example.com", "password": "wrong", "role": "owner"}))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 401);

    // Role mismatch
    let resp = test::TestRequest::post()
        .uri("/owner/auth/login")
        .set_json(json!({"email": "owner@example.com", "password": "password123", "role": "traveler"}))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 403);
}

#[actix_web::test]
async fn test_refresh_and_supersession() {
    let app = test_app!();

    let resp = test::TestRequest::post()
        .uri("/traveler/auth/signup")
        .set_json(signup_body("alice@example.com", "traveler"))
        .send_request(&app)
        .await;
    let first: serde_json::Value = test::read_body_json(resp).await;
    let rt1 = first["refreshToken"].as_str().unwrap().to_string();

    // RT1 refreshes fine while it is the pinned session
    let resp = test::TestRequest::post()
        .uri("/traveler/auth/refresh")
        .set_json(json!({ "refreshToken": rt1 }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body.get("accessToken").is_some());

    // Second device logs in; pointer moves to RT2
    let resp = test::TestRequest::post()
        .uri("/traveler/auth/login")
        .set_json(json!({
            "email": "alice@example.com",
            "password": "password123",
            "role": "traveler"
        }))
        .send_request(&app)
        .await;
    let second: serde_json::Value = test::read_body_json(resp).await;
    assert_ne!(second["refreshToken"], first["refreshToken"]);

    // Device 1's unexpired RT1 is now rejected with the login-again message
    let resp = test::TestRequest::post()
        .uri("/traveler/auth/refresh")
        .set_json(json!({ "refreshToken": rt1 }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(
        body["error"]["message"],
        "Authentication error: Invalid session, please login again"
    );
}

#[actix_web::test]
async fn test_refresh_with_garbage_token() {
    let app = test_app!();
    let resp = test::TestRequest::post()
        .uri("/traveler/auth/refresh")
        .set_json(json!({ "refreshToken": "not-a-jwt" }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_logout_always_succeeds() {
    let app = test_app!();

    // No body at all
    let resp = test::TestRequest::post()
        .uri("/traveler/auth/logout")
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 200);

    // Malformed token
    let resp = test::TestRequest::post()
        .uri("/traveler/auth/logout")
        .set_json(json!({ "refreshToken": "garbage" }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Successfully logged out");

    // Real session: logout twice, both succeed
    let resp = test::TestRequest::post()
        .uri("/traveler/auth/signup")
        .set_json(signup_body("bye@example.com", "traveler"))
        .send_request(&app)
        .await;
    let session: serde_json::Value = test::read_body_json(resp).await;
    let rt = session["refreshToken"].as_str().unwrap();

    for _ in 0..2 {
        let resp = test::TestRequest::post()
            .uri("/traveler/auth/logout")
            .set_json(json!({ "refreshToken": rt }))
            .send_request(&app)
            .await;
        assert_eq!(resp.status(), 200);
    }

    // And the revoked token can no longer refresh
    let resp = test::TestRequest::post()
        .uri("/traveler/auth/refresh")
        .set_json(json!({ "refreshToken": rt }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_check_session_paths() {
    let app = test_app!();

    // Nothing at all: logged out, no error
    let resp = test::TestRequest::get()
        .uri("/traveler/auth/check-session")
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["isLoggedIn"], false);
    assert_eq!(body["role"], serde_json::Value::Null);

    let resp = test::TestRequest::post()
        .uri("/traveler/auth/signup")
        .set_json(signup_body("probe@example.com", "traveler"))
        .send_request(&app)
        .await;
    let session: serde_json::Value = test::read_body_json(resp).await;
    let at = session["accessToken"].as_str().unwrap().to_string();
    let rt = session["refreshToken"].as_str().unwrap().to_string();
    let user_id: Uuid = session["account"]["id"].as_str().unwrap().parse().unwrap();

    // Valid bearer: logged in, nothing minted
    let resp = test::TestRequest::get()
        .uri("/traveler/auth/check-session")
        .insert_header(("Authorization", format!("Bearer {}", at)))
        .send_request(&app)
        .await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["isLoggedIn"], true);
    assert_eq!(body["role"], "traveler");
    assert!(body.get("accessToken").is_none());

    // Body refresh token: logged in with a fresh access token
    let resp = test::TestRequest::post()
        .uri("/traveler/auth/check-session")
        .set_json(json!({ "refreshToken": rt }))
        .send_request(&app)
        .await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["isLoggedIn"], true);
    assert!(body.get("accessToken").is_some());

    // Expired bearer, live stored session: the compatibility fallback
    let stale = expired_traveler_access_token(user_id, "probe@example.com");
    let resp = test::TestRequest::get()
        .uri("/traveler/auth/check-session")
        .insert_header(("Authorization", format!("Bearer {}", stale)))
        .send_request(&app)
        .await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["isLoggedIn"], true);
    assert!(body.get("accessToken").is_some());

    // After logout the same stale bearer plus the revoked refresh token
    // reports logged out
    test::TestRequest::post()
        .uri("/traveler/auth/logout")
        .set_json(json!({ "refreshToken": rt }))
        .send_request(&app)
        .await;
    let resp = test::TestRequest::post()
        .uri("/traveler/auth/check-session")
        .insert_header(("Authorization", format!("Bearer {}", stale)))
        .set_json(json!({ "refreshToken": rt }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["isLoggedIn"], false);
}

#[actix_web::test]
async fn test_protected_route_contract() {
    let app = test_app!();

    let resp = test::TestRequest::post()
        .uri("/traveler/auth/signup")
        .set_json(signup_body("me@example.com", "traveler"))
        .send_request(&app)
        .await;
    let session: serde_json::Value = test::read_body_json(resp).await;
    let at = session["accessToken"].as_str().unwrap();

    // Valid token: identity exposed to the handler
    let resp = test::TestRequest::get()
        .uri("/traveler/auth/me")
        .insert_header(("Authorization", format!("Bearer {}", at)))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["email"], "me@example.com");
    assert_eq!(body["role"], "traveler");

    // No token
    let resp = test::TestRequest::get()
        .uri("/traveler/auth/me")
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 401);

    // Token from the other domain fails the signature check
    let resp = test::TestRequest::post()
        .uri("/owner/auth/signup")
        .set_json(signup_body("host@example.com", "owner"))
        .send_request(&app)
        .await;
    let owner_session: serde_json::Value = test::read_body_json(resp).await;
    let owner_at = owner_session["accessToken"].as_str().unwrap();
    let resp = test::TestRequest::get()
        .uri("/traveler/auth/me")
        .insert_header(("Authorization", format!("Bearer {}", owner_at)))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 401);

    // Correctly signed token with a disallowed role is 403, not 401
    let forged_role = traveler_signed_token(Uuid::new_v4(), "odd@example.com", Role::Owner);
    let resp = test::TestRequest::get()
        .uri("/traveler/auth/me")
        .insert_header(("Authorization", format!("Bearer {}", forged_role)))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 403);
}

fn expired_traveler_access_token(sub: Uuid, email: &str) -> String {
    let now = Utc::now();
    let claims = Claims {
        sub,
        email: email.to_string(),
        role: Role::Traveler,
        iat: (now - Duration::hours(2)).timestamp(),
        exp: (now - Duration::hours(1)).timestamp(),
        jti: Uuid::new_v4(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TRAVELER_ACCESS_SECRET.as_bytes()),
    )
    .unwrap()
}

fn traveler_signed_token(sub: Uuid, email: &str, role: Role) -> String {
    let now = Utc::now();
    let claims = Claims {
        sub,
        email: email.to_string(),
        role,
        iat: now.timestamp(),
        exp: (now + Duration::minutes(15)).timestamp(),
        jti: Uuid::new_v4(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TRAVELER_ACCESS_SECRET.as_bytes()),
    )
    .unwrap()
}
