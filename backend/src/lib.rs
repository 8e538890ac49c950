//! POS Inventory Platform - Backend
//!
//! Stock ledger, supplier order lifecycle, signed supplier confirmation links
//! and POS checkout, served over HTTP on top of PostgreSQL.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use error::{AppError, AppResult};

use services::ConfirmationTokenService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    pub tokens: ConfirmationTokenService,
}

impl AppState {
    pub fn new(db: sqlx::PgPool, config: Config, clock: Arc<dyn Clock>) -> Self {
        let tokens = ConfirmationTokenService::new(&config.confirmation.secret, clock.clone());
        Self {
            db,
            config: Arc::new(config),
            clock,
            tokens,
        }
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "POS Inventory Platform API v1.0"
}
