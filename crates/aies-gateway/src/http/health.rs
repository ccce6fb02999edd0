use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use aies_engine::CoordinatorStatus;

use crate::app::AppState;

/// GET /health: liveness probe, returns server metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let status = state.coordinator.status();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "valid": status.valid,
        "devices": status.device_count,
        "subscribers": state.coordinator.bus().subscriber_count(),
    }))
}

/// GET /status: validity, last error, and persistence health.
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<CoordinatorStatus> {
    Json(state.coordinator.status())
}
