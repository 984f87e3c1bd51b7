use crate::auth::AuthState;
use axum::extract::FromRef;
use chrono::{DateTime, Utc};
use sniper_execution::coordinator::ExecutionCoordinator;
use sniper_execution::queue::JobDispatcher;
use sniper_execution::safety::SafetyCoordinator;
use std::sync::Arc;

/// Shared application state for API handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<JobDispatcher>,
    pub coordinator: Arc<ExecutionCoordinator>,
    pub safety: Arc<SafetyCoordinator>,
    pub auth: AuthState,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        dispatcher: Arc<JobDispatcher>,
        coordinator: Arc<ExecutionCoordinator>,
        safety: Arc<SafetyCoordinator>,
        auth: AuthState,
    ) -> Self {
        Self {
            dispatcher,
            coordinator,
            safety,
            auth,
            started_at: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}
