use crate::auth::require_token;
use crate::handlers;
use crate::state::AppState;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Auth runs before the handler, so a rejected call never touches the queue.
    let operator = Router::new()
        .route("/api/v1/jobs/trigger", post(handlers::trigger_jobs))
        .route_layer(middleware::from_fn_with_state(state.auth.clone(), require_token));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/safety", get(handlers::safety_status))
        .route("/api/v1/execution/metrics", get(handlers::execution_metrics))
        .merge(operator)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthConfig, AuthState};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use sniper_data::{JobStore, MemoryHistoryStore, MemoryJobStore, MemoryPositionStore};
    use sniper_execution::config::KernelConfig;
    use sniper_execution::coordinator::ExecutionCoordinator;
    use sniper_execution::emergency::{EmergencyExitConfig, EmergencyExitManager, RecoveryExecutor};
    use sniper_execution::exchange::PaperExchange;
    use sniper_execution::queue::JobDispatcher;
    use sniper_execution::safety::{HaltSwitch, KernelRecoveryActions, SafetyCoordinator};
    use std::sync::Arc;
    use tower::ServiceExt;

    const TOKEN: &str = "s3cret";

    fn app_state() -> (AppState, Arc<MemoryJobStore>) {
        let config = KernelConfig::default();
        let coordinator = Arc::new(ExecutionCoordinator::new(
            &config,
            Arc::new(PaperExchange::default()),
            HaltSwitch::new(),
            Arc::new(MemoryPositionStore::new()),
            Arc::new(MemoryHistoryStore::new()),
        ));
        let database = Arc::new(MemoryJobStore::new("database"));
        let broker = Arc::new(MemoryJobStore::new("broker"));
        let dispatcher = Arc::new(JobDispatcher::new(
            Some(database.clone()),
            Some(broker),
            &config.queue,
            coordinator.halt_switch().clone(),
        ));
        let exits = Arc::new(EmergencyExitManager::new(
            coordinator.clone(),
            EmergencyExitConfig::default(),
        ));
        let recovery = Arc::new(RecoveryExecutor::new(Arc::new(KernelRecoveryActions::new(
            coordinator.clone(),
            exits,
        ))));
        let safety = Arc::new(SafetyCoordinator::new(
            "api-test",
            config.safety.clone(),
            coordinator.clone(),
            recovery,
        ));
        let auth = AuthState::new(AuthConfig::with_token(TOKEN));
        (AppState::new(dispatcher, coordinator, safety, auth), database)
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn trigger(auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/api/v1/jobs/trigger");
        if let Some(value) = auth {
            builder = builder.header("Authorization", value);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_snapshot_shape() {
        let (state, _) = app_state();
        let router = create_router(state);

        let (status, body) = send(&router, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["dbQueue"]["pending"], 0);
        assert_eq!(body["brokerQueues"]["total"], 0);
        assert_eq!(body["executionMode"]["fallbackEnabled"], true);
        assert_eq!(body["halted"], false);
        assert!(body["recommendations"].is_array());
    }

    #[tokio::test]
    async fn test_trigger_rejected_before_enqueue() {
        let (state, database) = app_state();
        let router = create_router(state);

        let (status, _) = send(&router, trigger(None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, body) = send(&router, trigger(Some("Bearer wrong"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], 401);

        assert_eq!(database.counts().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn test_trigger_enqueues_periodic_set_once() {
        let (state, database) = app_state();
        let router = create_router(state);
        let bearer = format!("Bearer {TOKEN}");

        let (status, first) = send(&router, trigger(Some(&bearer))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(first["enqueued"], 3);

        // Still pending, so the same jobs come back.
        let (_, second) = send(&router, trigger(Some(&bearer))).await;
        assert_eq!(first["jobIds"], second["jobIds"]);
        assert_eq!(database.counts().await.unwrap().pending, 3);
    }

    #[tokio::test]
    async fn test_status_views() {
        let (state, _) = app_state();
        let router = create_router(state);

        let (status, safety) = send(&router, get("/api/v1/safety")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(safety["status"], "safe");
        assert_eq!(safety["halted"], false);

        let (status, metrics) = send(&router, get("/api/v1/execution/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(metrics["exchange"], "paper");
        assert_eq!(metrics["enabled"], true);
    }
}
