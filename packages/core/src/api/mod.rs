//! HTTP surface: health, metrics, on-demand runs and the dashboard reads.

pub mod maintenance;

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};

use crate::maintenance::provider::ControlSource;
use crate::maintenance::NotificationEngine;
use crate::metrics::AppMetrics;
use crate::repository::MaintenanceRepository;

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<NotificationEngine>,
    pub controls: Arc<dyn ControlSource + Send + Sync>,
    pub history: Arc<MaintenanceRepository>,
    pub metrics: Arc<AppMetrics>,
}

/// `GET /health`: liveness probe, never cached.
pub async fn health() -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("ok"))
        .expect("health response should be valid")
}

/// `GET /metrics`: Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Body::from(body))
            .expect("metrics response should be valid"),
        Err(err) => {
            tracing::error!("Failed to render metrics: {}", err);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from("metrics error"))
                .expect("metrics error response should be valid")
        }
    }
}

/// Assemble the full application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route(
            "/maintenance/notifications/run",
            post(maintenance::run_notifications),
        )
        .route(
            "/maintenance/notifications/history",
            get(maintenance::notification_history),
        )
        .route("/maintenance/dashboard", get(maintenance::dashboard))
        .route("/maintenance/controls", get(maintenance::list_controls))
        .with_state(state)
}
