//! Whole-document routes: GET/POST /schedule.

use axum::{body::Bytes, extract::State, Json};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use aies_core::wire;

use crate::app::AppState;
use crate::http::error::{self, ApiError};

/// GET /schedule: the document queries are currently served from.
pub async fn get_schedule(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let snapshot = state.coordinator.snapshot();
    wire::to_value(&snapshot).map(Json).map_err(error::internal)
}

/// POST /schedule
///
/// Validates and installs a full document. Returns the installed document,
/// 422 with field issues when it is rejected, or 503 when it is live but
/// could not be persisted.
pub async fn submit_schedule(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "invalid JSON in schedule body");
        error::bad_request(format!("invalid JSON body: {e}"))
    })?;

    let committed = state
        .coordinator
        .submit_json(payload)
        .await
        .map_err(|e| error::from_coordinator(&e))?;

    info!(devices = committed.device_count(), "schedule accepted");
    wire::to_value(&committed).map(Json).map_err(error::internal)
}
