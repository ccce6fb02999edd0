//! Read-only routes over a snapshot of the current document.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use aies_core::DeviceId;
use aies_engine::{query, DeviceStatus, FleetSummary};

use crate::app::AppState;
use crate::http::error::{self, ApiError};

#[derive(Debug, Deserialize)]
pub struct AtParams {
    pub at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    pub start: Option<String>,
    pub end: Option<String>,
}

fn parse_instant(name: &str, raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| error::bad_request(format!("`{name}` is not an RFC 3339 timestamp: {e}")))
}

/// `at` when given, otherwise the current time.
fn instant_or_now(params: &AtParams) -> Result<DateTime<Utc>, ApiError> {
    match params.at.as_deref() {
        Some(raw) => parse_instant("at", raw),
        None => Ok(Utc::now()),
    }
}

/// GET /devices/{device_id}/status?at=
pub async fn device_status(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Query(params): Query<AtParams>,
) -> Result<Json<DeviceStatus>, ApiError> {
    let now = instant_or_now(&params)?;
    let snapshot = state.coordinator.snapshot();
    query::device_status(&snapshot, &DeviceId::from(device_id.as_str()), now)
        .map(Json)
        .ok_or_else(|| error::unknown_device(&device_id))
}

/// GET /devices/{device_id}/events?start=&end=
pub async fn device_events(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Value>, ApiError> {
    let (Some(start), Some(end)) = (params.start.as_deref(), params.end.as_deref()) else {
        return Err(error::bad_request("both `start` and `end` are required"));
    };
    let start = parse_instant("start", start)?;
    let end = parse_instant("end", end)?;

    let snapshot = state.coordinator.snapshot();
    let id = DeviceId::from(device_id.as_str());
    if !snapshot.contains_device(&id) {
        return Err(error::unknown_device(&device_id));
    }
    let intervals: Vec<_> = query::events_in_range(&snapshot, &id, start, end).collect();
    Ok(Json(json!({
        "device_id": id,
        "start": start,
        "end": end,
        "intervals": intervals,
    })))
}

/// GET /summary?at=
pub async fn summary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AtParams>,
) -> Result<Json<FleetSummary>, ApiError> {
    let now = instant_or_now(&params)?;
    let snapshot = state.coordinator.snapshot();
    Ok(Json(query::fleet_summary(
        &snapshot,
        now,
        state.config.query.day_offset_secs,
    )))
}
