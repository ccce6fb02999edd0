use std::sync::Arc;

use aies_core::config::AiesConfig;
use aies_engine::Coordinator;
use axum::{
    routing::{get, put},
    Router,
};

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: AiesConfig,
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    pub fn new(config: AiesConfig, coordinator: Arc<Coordinator>) -> Self {
        Self {
            config,
            coordinator,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/status", get(crate::http::health::status_handler))
        .route(
            "/schedule",
            get(crate::http::schedule::get_schedule).post(crate::http::schedule::submit_schedule),
        )
        .route(
            "/devices/{device_id}/intervals",
            put(crate::http::devices::replace_intervals),
        )
        .route(
            "/devices/{device_id}",
            axum::routing::delete(crate::http::devices::remove_device),
        )
        .route(
            "/devices/{device_id}/status",
            get(crate::http::query::device_status),
        )
        .route(
            "/devices/{device_id}/events",
            get(crate::http::query::device_events),
        )
        .route("/summary", get(crate::http::query::summary))
        .with_state(state)
        .layer(tower_http::compression::CompressionLayer::new())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aies_engine::{CoordinatorOptions, ScheduleEvent, Topic};
    use aies_store::MemoryStore;
    use aies_validate::Validator;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn test_app() -> (Router, Arc<Coordinator>) {
        let coordinator = Arc::new(
            Coordinator::load(
                Arc::new(MemoryStore::new()),
                Validator::builtin().unwrap(),
                CoordinatorOptions::default(),
            )
            .await,
        );
        let state = Arc::new(AppState::new(AiesConfig::default(), Arc::clone(&coordinator)));
        (build_router(state), coordinator)
    }

    fn heater_payload() -> Value {
        json!({
            "devices": {
                "heater": {"intervals": [{
                    "start": "2025-06-02T00:00:00+02:00",
                    "end": "2025-06-02T01:00:00+02:00",
                    "command": "heat",
                    "power_kw": 2.5,
                    "energy_kwh": 1.1,
                    "source": "ai"
                }]}
            }
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (app, _) = test_app().await;
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["valid"], true);
    }

    #[tokio::test]
    async fn submit_then_read_back() {
        let (app, _) = test_app().await;
        let (status, body) = send(&app, "POST", "/schedule", Some(heater_payload())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["devices"]["heater"].is_object());

        let (status, body) = send(&app, "GET", "/schedule", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["devices"]["heater"]["intervals"][0]["command"], "heat");

        let (_, body) = send(
            &app,
            "GET",
            "/devices/heater/status?at=2025-06-02T00:30:00%2B02:00",
            None,
        )
        .await;
        assert_eq!(body["command"], "heat");
        assert_eq!(body["power_kw"], 2.5);

        let (_, body) = send(&app, "GET", "/summary?at=2025-06-02T00:30:00Z", None).await;
        assert_eq!(body["num_devices"], 1);
    }

    #[tokio::test]
    async fn invalid_submission_is_422_with_issues() {
        let (app, coordinator) = test_app().await;
        let bad = json!({"devices": {"heater": {"intervals": [{
            "start": "2025-06-02T02:00:00Z",
            "end": "2025-06-02T01:00:00Z",
            "command": "heat"
        }]}}});
        let (status, body) = send(&app, "POST", "/schedule", Some(bad)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(!body["issues"].as_array().unwrap().is_empty());
        assert!(!coordinator.is_valid());

        let (_, body) = send(&app, "GET", "/status", None).await;
        assert_eq!(body["valid"], false);
    }

    #[tokio::test]
    async fn partial_edit_routes() {
        let (app, _) = test_app().await;
        send(&app, "POST", "/schedule", Some(heater_payload())).await;

        let edit = json!({"intervals": [{
            "start": "2025-06-02T03:00:00Z",
            "end": "2025-06-02T04:00:00Z",
            "command": "eco",
            "source": "manual"
        }]});
        let (status, _) = send(&app, "PUT", "/devices/heater/intervals", Some(edit.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "PUT", "/devices/ghost/intervals", Some(edit)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "UNKNOWN_DEVICE");

        let (_, body) = send(
            &app,
            "GET",
            "/devices/heater/events?start=2025-06-02T00:00:00Z&end=2025-06-03T00:00:00Z",
            None,
        )
        .await;
        assert_eq!(body["intervals"][0]["command"], "eco");
    }

    #[tokio::test]
    async fn malformed_partial_edit_is_a_rejected_candidate() {
        let (app, coordinator) = test_app().await;
        send(&app, "POST", "/schedule", Some(heater_payload())).await;
        let mut errors = coordinator.subscribe(Topic::Error);

        let edit = json!({"intervals": [{"start": 5}]});
        let (status, body) = send(&app, "PUT", "/devices/heater/intervals", Some(edit)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        let paths: Vec<&str> = body["issues"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|i| i["path"].as_str())
            .collect();
        assert!(paths.contains(&"$.devices.heater.intervals[0].start"));

        assert!(!coordinator.is_valid());
        assert!(coordinator.status().last_error.is_some());
        assert!(matches!(errors.try_recv(), Some(ScheduleEvent::Error { .. })));
        // previous document still served
        assert_eq!(
            coordinator.snapshot().device(&"heater".into()).unwrap().intervals[0].command,
            "heat"
        );
    }

    #[tokio::test]
    async fn unknown_device_wins_over_malformed_body() {
        let (app, coordinator) = test_app().await;
        send(&app, "POST", "/schedule", Some(heater_payload())).await;
        let mut errors = coordinator.subscribe(Topic::Error);

        for edit in [json!({"intervals": [{"start": 5}]}), json!({"intervals": "nope"}), json!({})] {
            let (status, body) = send(&app, "PUT", "/devices/ghost/intervals", Some(edit)).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body["code"], "UNKNOWN_DEVICE");
        }
        assert!(coordinator.is_valid());
        assert!(errors.try_recv().is_none());
    }

    #[tokio::test]
    async fn submit_returns_the_committed_document() {
        let (app, coordinator) = test_app().await;
        let (status, body) = send(&app, "POST", "/schedule", Some(heater_payload())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, aies_core::wire::to_value(&coordinator.snapshot()).unwrap());
        assert_eq!(body["devices"]["heater"]["intervals"][0]["energy_kwh"], 1.1);
    }

    #[tokio::test]
    async fn delete_device_and_unknown_status() {
        let (app, coordinator) = test_app().await;
        send(&app, "POST", "/schedule", Some(heater_payload())).await;

        let (status, _) = send(&app, "DELETE", "/devices/heater", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(coordinator.snapshot().is_empty());

        let (status, body) = send(&app, "GET", "/devices/heater/status", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "UNKNOWN_DEVICE");
    }

    #[tokio::test]
    async fn bad_query_timestamp_is_400() {
        let (app, _) = test_app().await;
        let (status, body) = send(&app, "GET", "/summary?at=yesterday", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
    }
}
