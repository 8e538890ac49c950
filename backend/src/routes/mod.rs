//! Route definitions for the POS inventory platform

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Supplier confirmation links (token instead of session)
        .nest("/supplier", supplier_routes())
        // Protected routes - stock ledger
        .nest("/variants", variant_routes(state.clone()))
        // Protected routes - purchase orders and reorders
        .nest("/orders", order_routes(state.clone()))
        // Protected routes - POS
        .nest("/sales", sale_routes(state))
}

/// Supplier routes (public)
fn supplier_routes() -> Router<AppState> {
    Router::new()
        .route("/:type_path/:order_id", get(handlers::view_order))
        .route("/:type_path/:order_id/accept", post(handlers::accept_order))
        .route("/:type_path/:order_id/reject", post(handlers::reject_order))
}

/// Variant stock routes (protected)
fn variant_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/low-stock", get(handlers::list_low_stock))
        .route("/:variant_id", get(handlers::get_variant))
        .route("/:variant_id/history", get(handlers::get_history))
        .route("/:variant_id/adjustments", post(handlers::apply_adjustment))
        .route(
            "/:variant_id/audits",
            get(handlers::list_audits).post(handlers::record_audit),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Order routes (protected)
fn order_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_orders).post(handlers::create_order))
        .route("/:order_id", get(handlers::get_order))
        .route("/:order_id/dispatch", post(handlers::dispatch_order))
        .route("/:order_id/cancel", post(handlers::cancel_order))
        .route("/:order_id/receive", post(handlers::receive_order))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Sale routes (protected)
fn sale_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::checkout))
        .route("/:sale_id", get(handlers::get_sale))
        .route("/:sale_id/refund", post(handlers::refund_sale))
        .route("/:sale_id/refunds", get(handlers::list_refunds))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
