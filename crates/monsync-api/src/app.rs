use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use monsync_writer::Writer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Builds the ambient HTTP surface for one writer instance: liveness,
/// readiness against its connection, and a queue/status summary. There is
/// no CRUD surface and therefore no auth layer guarding one.
pub fn build_app(writer: Arc<Writer>) -> Router {
    let state = AppState { writer };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/status", get(handlers::status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
