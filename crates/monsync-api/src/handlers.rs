use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn ready(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if !state.writer.is_connected() {
        return Err(ApiError::unavailable("writer has no active connection"));
    }
    Ok(Json(json!({ "status": "ready" })))
}

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let writer = &state.writer;
    Json(json!({
        "environment": writer.environment(),
        "environment_id": writer.env_id(),
        "connected": writer.is_connected(),
        "in_flight": writer.queue.in_flight().await,
        "exceptions": writer.queue.exceptions().await,
    }))
}
