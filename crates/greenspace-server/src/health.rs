//! Liveness and readiness endpoints.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

/// What readiness depends on.
#[derive(Debug, Clone)]
pub struct HealthState {
    /// Whether MQTT ingestion is configured.
    pub mqtt_enabled: bool,
    /// Whether the broker connection is up.
    pub mqtt_connected: Arc<AtomicBool>,
}

impl HealthState {
    fn ready(&self) -> bool {
        !self.mqtt_enabled || self.mqtt_connected.load(Ordering::SeqCst)
    }
}

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `healthy` while the process serves requests.
    pub status: &'static str,
    /// Crate version of the running binary.
    pub version: &'static str,
}

/// `GET /health`.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /ready`. 503 while MQTT is enabled but disconnected.
pub async fn ready(State(state): State<HealthState>) -> impl IntoResponse {
    if state.ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "mqtt disconnected")
    }
}

/// Router serving both endpoints.
pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(enabled: bool, connected: bool) -> HealthState {
        HealthState {
            mqtt_enabled: enabled,
            mqtt_connected: Arc::new(AtomicBool::new(connected)),
        }
    }

    #[tokio::test]
    async fn liveness_is_unconditional() {
        assert_eq!(health().await.into_response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_follows_mqtt_connection() {
        let up = ready(State(state(true, true))).await.into_response();
        assert_eq!(up.status(), StatusCode::OK);

        let down = ready(State(state(true, false))).await.into_response();
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);

        let disabled = ready(State(state(false, false))).await.into_response();
        assert_eq!(disabled.status(), StatusCode::OK);
    }
}
