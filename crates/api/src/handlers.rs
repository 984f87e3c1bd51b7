use crate::error::ApiError;
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use sniper_execution::coordinator::CoordinatorMetrics;
use sniper_execution::queue::QueueHealth;
use sniper_execution::safety::SafetySnapshot;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    #[serde(flatten)]
    pub queue: QueueHealth,
    pub halted: bool,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub enqueued: usize,
    pub job_ids: Vec<Uuid>,
}

/// Always 200; store failures are reported inside the body.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        queue: state.dispatcher.health().await,
        halted: state.coordinator.halt_switch().is_engaged(),
        uptime_seconds: state.uptime_seconds(),
    })
}

pub async fn trigger_jobs(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<TriggerResponse>), ApiError> {
    let job_ids = state.dispatcher.enqueue_periodic_set().await?;
    info!(count = job_ids.len(), "Periodic job set triggered");
    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            enqueued: job_ids.len(),
            job_ids,
        }),
    ))
}

pub async fn safety_status(State(state): State<AppState>) -> Json<SafetySnapshot> {
    Json(state.safety.snapshot().await)
}

pub async fn execution_metrics(State(state): State<AppState>) -> Json<CoordinatorMetrics> {
    Json(state.coordinator.metrics().await)
}
