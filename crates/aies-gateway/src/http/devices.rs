//! Per-device writes.

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use aies_core::DeviceId;

use crate::app::AppState;
use crate::http::error::{self, ApiError};

/// PUT /devices/{device_id}/intervals
///
/// Manual edit of one known device. New devices only arrive via POST /schedule.
/// The `intervals` value goes to the coordinator unparsed: an unknown device
/// is 404 whatever the body holds, and a malformed list is a rejected edit.
pub async fn replace_intervals(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let value: Value = serde_json::from_slice(&body)
        .map_err(|e| error::bad_request(format!("invalid JSON body: {e}")))?;
    let intervals = value.get("intervals").cloned().unwrap_or(Value::Null);

    let device_id = DeviceId::from(device_id);
    let committed = state
        .coordinator
        .submit_partial_json(&device_id, intervals)
        .await
        .map_err(|e| error::from_coordinator(&e))?;
    let count = committed
        .device(&device_id)
        .map_or(0, |device| device.intervals.len());

    Ok(Json(json!({"ok": true, "device_id": device_id, "intervals": count})))
}

/// DELETE /devices/{device_id}: idempotent.
pub async fn remove_device(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let device_id = DeviceId::from(device_id);
    state
        .coordinator
        .remove_device(&device_id)
        .await
        .map_err(|e| error::from_coordinator(&e))?;
    Ok(Json(json!({"ok": true, "device_id": device_id})))
}
