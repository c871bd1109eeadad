use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::middleware::timing;
use crate::sampling::stream;
use crate::AppState;

/// Builds the full Axum `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Consumer side ───────────────────────────────────────
        .route("/api/traffic", get(stream::get_traffic))
        .route("/api/traffic/stream", get(stream::traffic_stream))
        .route("/api/traffic/range", post(handlers::traffic::set_range))
        .route("/api/traffic/clear", post(handlers::traffic::clear))
        .route("/api/traffic/init", post(handlers::traffic::init))
        // ── Producer side ───────────────────────────────────────
        .route("/api/traffic/append", post(handlers::traffic::append))
        // ── Diagnostics ─────────────────────────────────────────
        .route("/api/subscribers", get(handlers::traffic::subscribers))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CorsLayer::permissive())
}
