//! Error bodies shared by every route: `{ "code", "error", "issues" }`.

use aies_engine::CoordinatorError;
use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

pub type ApiError = (StatusCode, Json<Value>);

fn body(code: &str, error: impl std::fmt::Display, issues: Value) -> Json<Value> {
    Json(json!({
        "code": code,
        "error": error.to_string(),
        "issues": issues,
    }))
}

/// 422 for validation, 404 for an unknown device, 503 when the document
/// could not be persisted (it is still live in memory).
pub fn from_coordinator(e: &CoordinatorError) -> ApiError {
    let status = match e {
        CoordinatorError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CoordinatorError::UnknownDevice { .. } => StatusCode::NOT_FOUND,
        CoordinatorError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    let issues = e
        .report()
        .map(|r| json!(r.issues))
        .unwrap_or_else(|| json!([]));
    (status, body(e.code(), e, issues))
}

pub fn unknown_device(device_id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        body("UNKNOWN_DEVICE", format!("Unknown device: {device_id}"), json!([])),
    )
}

pub fn bad_request(error: impl std::fmt::Display) -> ApiError {
    (StatusCode::BAD_REQUEST, body("BAD_REQUEST", error, json!([])))
}

pub fn internal(error: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        body("INTERNAL_ERROR", error, json!([])),
    )
}
