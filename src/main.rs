use std::net::TcpListener;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use staybook_auth::auth::handlers::auth_scope;
use staybook_auth::db::{PgAccountRepository, Role};
use staybook_auth::{health_check, AppError, AppState, SessionService, Settings};

#[actix_web::main]
async fn main() -> staybook_auth::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    // Load configuration
    let config = Settings::new()?;
    info!("Configuration loaded successfully");

    info!("Starting server at {}:{}", config.server.host, config.server.port);

    // Initialize application state
    let state = AppState::new(config.clone()).await?;

    // One account collection and one session service per identity domain.
    // Both domains run the same protocol; only role, signing secrets and
    // the backing table differ.
    let traveler_accounts = Arc::new(PgAccountRepository::new(
        state.db_pool.clone(),
        &config.traveler.table,
    ));
    traveler_accounts.ensure_schema().await?;
    let owner_accounts = Arc::new(PgAccountRepository::new(
        state.db_pool.clone(),
        &config.owner.table,
    ));
    owner_accounts.ensure_schema().await?;

    let traveler_service =
        SessionService::new(Role::Traveler, &config.traveler, traveler_accounts);
    let owner_service = SessionService::new(Role::Owner, &config.owner, owner_accounts);

    let state = web::Data::new(state);
    let app_state = state.clone();

    // Create and bind TCP listener
    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;
    let workers = config.server.workers as usize;

    // Start HTTP server
    HttpServer::new(move || {
        let cors = if config.cors.enabled {
            let cors_config = Cors::default();

            let cors_config = if config.cors.allow_any_origin {
                cors_config
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .expose_any_header()
            } else {
                // More restrictive CORS for production use
                cors_config
                    .allowed_origin("http://localhost:8080")
                    .allowed_origin("http://127.0.0.1:8080")
                    .allowed_methods(vec!["GET", "POST"])
                    .allowed_headers(vec!["Authorization", "Content-Type"])
                    .supports_credentials()
            };

            cors_config.max_age(config.cors.max_age as usize)
        } else {
            Cors::default()
        };

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .route("/health", web::get().to(health_check))
            .service(auth_scope("/traveler/auth", traveler_service.clone()))
            .service(auth_scope("/owner/auth", owner_service.clone()))
    })
    .listen(listener)?
    .workers(workers)
    .run()
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?;

    app_state.shutdown().await?;
    info!("Database pool closed");

    Ok(())
}
