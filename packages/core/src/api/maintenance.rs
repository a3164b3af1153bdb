//! Maintenance notification endpoints.
//!
//! Routes:
//! - `POST /maintenance/notifications/run` runs a pass on demand
//! - `GET  /maintenance/notifications/history` lists persisted outcomes
//! - `GET  /maintenance/dashboard` returns upcoming / overdue counts
//! - `GET  /maintenance/controls` lists classified pending controls

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use crate::maintenance::{classify, ClassifiedControls, MaintenanceControl, RunReport, RunTrigger};
use crate::repository::NotificationEvent;
use crate::scheduler::execute_run;

type ApiError = (StatusCode, Json<serde_json::Value>);

/// Clock skew tolerated on a caller-supplied `now`. Replays of the past are
/// fine; stamps from the future would keep controls out of the renotify
/// window check.
const MAX_FUTURE_SKEW_MINUTES: i64 = 5;

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

// ---- Request / response shapes ----

#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    /// Evaluate the run as of this instant instead of the current time.
    pub now: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub timestamp: DateTime<Utc>,
    pub horizon_days: i64,
    pub upcoming: usize,
    pub overdue: usize,
    pub unreadable: usize,
}

#[derive(Debug, Deserialize)]
pub struct ControlsQuery {
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub success: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub total: i64,
    pub items: Vec<NotificationEvent>,
}

// ---- Helpers ----

struct Snapshot {
    now: DateTime<Utc>,
    classified: ClassifiedControls,
    unreadable: usize,
}

async fn classify_now(state: &AppState) -> Result<Snapshot, ApiError> {
    let pending = state.controls.list_pending_controls().await.map_err(|e| {
        tracing::error!("Failed to read maintenance controls: {}", e);
        api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
    })?;
    let now = Utc::now();
    Ok(Snapshot {
        now,
        classified: classify(&pending.controls, now, state.engine.config().horizon),
        unreadable: pending.unreadable.len(),
    })
}

// ---- Handlers ----

/// `POST /maintenance/notifications/run`: run one pass and return its report.
///
/// The body is optional; `{"now": "<RFC 3339>"}` evaluates the run at a
/// fixed instant, which may not lie in the future. A control source outage
/// answers 503.
pub async fn run_notifications(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<RunReport>, ApiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        RunRequest::default()
    } else {
        serde_json::from_slice::<RunRequest>(&body)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e)))?
    };

    if let Some(now) = request.now {
        if now > Utc::now() + Duration::minutes(MAX_FUTURE_SKEW_MINUTES) {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                format!("'now' must not be in the future (got {})", now.to_rfc3339()),
            ));
        }
    }

    let report = execute_run(
        &state.engine,
        &state.history,
        &state.metrics,
        RunTrigger::Manual,
        request.now,
    )
    .await
    .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;

    Ok(Json(report))
}

/// `GET /maintenance/dashboard`: counts for the dashboard tiles.
pub async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardResponse>, ApiError> {
    let snapshot = classify_now(&state).await?;

    Ok(Json(DashboardResponse {
        timestamp: snapshot.now,
        horizon_days: state.engine.config().horizon.num_days(),
        upcoming: snapshot.classified.upcoming.len(),
        overdue: snapshot.classified.overdue.len(),
        unreadable: snapshot.unreadable,
    }))
}

/// `GET /maintenance/controls?state=upcoming|overdue`
///
/// Without `state` both sets are returned as `{ "upcoming": [...], "overdue": [...] }`.
pub async fn list_controls(
    State(state): State<AppState>,
    Query(params): Query<ControlsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let classified = classify_now(&state).await?.classified;

    let body = match params.state.as_deref() {
        None => serde_json::to_value(&classified),
        Some("upcoming") => serde_json::to_value::<&Vec<MaintenanceControl>>(&classified.upcoming),
        Some("overdue") => serde_json::to_value::<&Vec<MaintenanceControl>>(&classified.overdue),
        Some(other) => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                format!("Invalid state '{}'. Must be one of: upcoming, overdue", other),
            ))
        }
    }
    .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(body))
}

/// `GET /maintenance/notifications/history`: outcome log, newest first.
///
/// Query params:
/// - `limit`: max items to return (default 20, clamped to 1..=100)
/// - `success`: optional bool filter
pub async fn notification_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);

    let (items, total) = tokio::try_join!(
        state.history.query_notification_history(limit, params.success),
        state.history.count_notification_events(params.success),
    )
    .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(HistoryResponse { total, items }))
}
