//! End-to-end scenarios against in-memory stores and the paper exchange.

use async_trait::async_trait;
use rust_decimal_macros::dec;
use sniper_data::{
    JobStore, MemoryHistoryStore, MemoryJobStore, MemoryPositionStore, PositionStore,
};
use sniper_domain::entities::{JobPayload, Position, SnipeTarget, SyncPayload};
use sniper_domain::enums::{EntryStrategy, PositionStatus, SafetyStatus};
use sniper_domain::precision::{PrecisionErrorCode, SymbolRules};
use sniper_execution::config::{KernelConfig, QueueConfig};
use sniper_execution::coordinator::ExecutionCoordinator;
use sniper_execution::emergency::{
    CircuitState, EMERGENCY_HALT_PLAN, RecoveryAction, RecoveryActionExecutor, RecoveryEventKind,
    RecoveryExecutor, RecoveryStatus,
};
use sniper_execution::error::ExecutionError;
use sniper_execution::exchange::{ExchangeError, PaperExchange};
use sniper_execution::monitor::PositionMonitor;
use sniper_execution::queue::{AckOutcome, JobDispatcher};
use sniper_execution::safety::{HaltSwitch, RiskMetrics, SafetyCoordinator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

fn rules(symbol: &str) -> SymbolRules {
    SymbolRules {
        symbol: symbol.to_string(),
        base_asset_precision: 2,
        quote_precision: 4,
        min_base_size: dec!(0.01),
        min_notional_market: dec!(1),
        min_notional_limit: dec!(5),
    }
}

struct Kernel {
    paper: Arc<PaperExchange>,
    positions: Arc<MemoryPositionStore>,
    coordinator: Arc<ExecutionCoordinator>,
}

async fn kernel(config: &KernelConfig) -> Kernel {
    let paper = Arc::new(PaperExchange::default());
    paper.set_rules(rules("NEWUSDT")).await;
    paper.set_price("NEWUSDT", dec!(2)).await;
    paper.set_balance("USDT", dec!(10000)).await;
    let positions = Arc::new(MemoryPositionStore::new());
    let coordinator = Arc::new(ExecutionCoordinator::new(
        config,
        paper.clone(),
        HaltSwitch::new(),
        positions.clone(),
        Arc::new(MemoryHistoryStore::new()),
    ));
    Kernel {
        paper,
        positions,
        coordinator,
    }
}

#[tokio::test]
async fn test_monitor_closes_position_at_take_profit() {
    let k = kernel(&KernelConfig::default()).await;
    let position = Position::open("alice", "NEWUSDT", dec!(100), dec!(1), dec!(110), dec!(90));
    let id = position.id;
    k.positions.insert(position).await.unwrap();
    k.paper.set_price("NEWUSDT", dec!(111)).await;

    let monitor = PositionMonitor::new(k.coordinator.clone(), Duration::from_secs(1));
    let report = monitor.check_once().await.unwrap();

    assert_eq!(report.exits.len(), 1);
    assert_eq!(report.exits[0].status, PositionStatus::TakeProfit);
    let stored = k.positions.get(id).await.unwrap().unwrap();
    assert_eq!(stored.status, PositionStatus::TakeProfit);
    assert_eq!(stored.exit_price, Some(dec!(111)));
    assert!(k.positions.list_open().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_monitor_keeps_going_when_one_symbol_fails() {
    let k = kernel(&KernelConfig::default()).await;
    k.paper.set_rules(rules("OTHERUSDT")).await;
    k.positions
        .insert(Position::open("alice", "NEWUSDT", dec!(100), dec!(1), dec!(110), dec!(90)))
        .await
        .unwrap();
    k.positions
        .insert(Position::open("alice", "OTHERUSDT", dec!(10), dec!(1), dec!(11), dec!(9)))
        .await
        .unwrap();
    k.paper.set_price("NEWUSDT", dec!(89)).await;
    k.paper
        .fail_ticker("OTHERUSDT", ExchangeError::InvalidRequest("delisted".into()))
        .await;

    let monitor = PositionMonitor::new(k.coordinator.clone(), Duration::from_secs(1));
    let report = monitor.check_once().await.unwrap();

    assert_eq!(report.price_failures, vec!["OTHERUSDT".to_string()]);
    assert_eq!(report.exits.len(), 1);
    assert_eq!(report.exits[0].status, PositionStatus::StopLoss);
}

fn dispatcher(store: &Arc<MemoryJobStore>, lease_ms: u64) -> JobDispatcher {
    JobDispatcher::new(
        Some(store.clone()),
        None,
        &QueueConfig {
            fallback_enabled: false,
            lease_ms,
            ..QueueConfig::default()
        },
        HaltSwitch::new(),
    )
}

#[tokio::test]
async fn test_pop_twice_never_returns_the_leased_job() {
    let store = Arc::new(MemoryJobStore::new("database"));
    let dispatcher = dispatcher(&store, 30_000);
    let id = dispatcher.enqueue(JobPayload::Sync(SyncPayload::default())).await.unwrap();

    let first = dispatcher.pop("w1").await.unwrap().unwrap();
    assert_eq!(first.job.id, id);
    assert!(dispatcher.pop("w2").await.unwrap().is_none());

    assert_eq!(dispatcher.complete(&first, "w1").await.unwrap(), AckOutcome::Completed);
    assert_eq!(store.counts().await.unwrap().completed, 1);
}

#[tokio::test]
async fn test_expired_lease_is_recovered_by_next_pop() {
    let store = Arc::new(MemoryJobStore::new("database"));
    let dispatcher = dispatcher(&store, 1);
    let id = dispatcher.enqueue(JobPayload::Sync(SyncPayload::default())).await.unwrap();

    let crashed = dispatcher.pop("w1").await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let recovered = dispatcher.pop("w2").await.unwrap().unwrap();
    assert_eq!(recovered.job.id, id);
    // The crashed worker's late ack no longer counts.
    assert_eq!(dispatcher.complete(&crashed, "w1").await.unwrap(), AckOutcome::LeaseLost);
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_makes_no_network_calls_until_single_trial() {
    let mut config = KernelConfig::default();
    config.breaker.failure_threshold = 3;
    config.breaker.cooldown_ms = 1_000;
    let k = kernel(&config).await;
    let target = SnipeTarget::new("alice", "NEWUSDT", dec!(100));

    k.paper.fail_orders(ExchangeError::Network("reset".into()), 3).await;
    for _ in 0..3 {
        let err = k.coordinator.execute_entry(&target).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Exchange(ExchangeError::Network(_))));
    }
    assert_eq!(k.coordinator.breaker().state().await, CircuitState::Open);

    let calls = k.paper.call_count();
    for _ in 0..5 {
        let err = k.coordinator.execute_entry(&target).await.unwrap_err();
        assert!(matches!(err, ExecutionError::CircuitOpen));
    }
    assert_eq!(k.paper.call_count(), calls);

    tokio::time::advance(Duration::from_millis(1_001)).await;
    k.paper.set_latency(Duration::from_millis(50));

    let (a, b) = tokio::join!(
        k.coordinator.execute_entry(&target),
        k.coordinator.execute_entry(&target)
    );
    let (trial, rejected) = if a.is_ok() { (a, b) } else { (b, a) };
    assert!(trial.is_ok());
    assert!(matches!(rejected, Err(ExecutionError::CircuitOpen)));
    assert_eq!(k.coordinator.breaker().state().await, CircuitState::Closed);
    assert_eq!(k.paper.orders().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_trial_reopens_breaker() {
    let mut config = KernelConfig::default();
    config.breaker.failure_threshold = 1;
    config.breaker.cooldown_ms = 1_000;
    let k = kernel(&config).await;
    let target = SnipeTarget::new("alice", "NEWUSDT", dec!(100));

    k.paper.fail_orders(ExchangeError::Timeout(10_000), 2).await;
    assert!(k.coordinator.execute_entry(&target).await.is_err());
    assert_eq!(k.coordinator.breaker().state().await, CircuitState::Open);

    tokio::time::advance(Duration::from_millis(1_001)).await;
    assert!(matches!(
        k.coordinator.execute_entry(&target).await,
        Err(ExecutionError::Exchange(_))
    ));
    assert_eq!(k.coordinator.breaker().state().await, CircuitState::Open);
    // Cool-down restarted.
    assert!(matches!(
        k.coordinator.execute_entry(&target).await,
        Err(ExecutionError::CircuitOpen)
    ));
}

#[tokio::test]
async fn test_limit_entry_rejected_when_truncation_drops_notional() {
    let k = kernel(&KernelConfig::default()).await;
    k.paper
        .set_rules(SymbolRules {
            symbol: "NEWUSDT".to_string(),
            base_asset_precision: 0,
            quote_precision: 4,
            min_base_size: dec!(1),
            min_notional_market: dec!(1),
            min_notional_limit: dec!(5),
        })
        .await;
    k.paper.set_price("NEWUSDT", dec!(2.6)).await;

    // 5.1 / 2.6 = 1.96 floors to 1 unit, worth 2.6 < 5.
    let mut target = SnipeTarget::new("alice", "NEWUSDT", dec!(5.1));
    target.entry_strategy = EntryStrategy::Limit;

    let err = k.coordinator.execute_entry(&target).await.unwrap_err();
    let ExecutionError::Precision(precision) = err else {
        panic!("expected a precision error, got {err:?}");
    };
    assert_eq!(precision.code, PrecisionErrorCode::InvalidNotional);
    assert_eq!(precision.provided, dec!(2.6));
    assert!(k.paper.orders().await.is_empty());
}

/// Actions that never finish, so the recovery stays executing.
struct StalledActions {
    gate: Semaphore,
}

#[async_trait]
impl RecoveryActionExecutor for StalledActions {
    async fn execute(&self, _action: &RecoveryAction) -> Result<Option<RecoveryAction>, String> {
        let _permit = self.gate.acquire().await.map_err(|e| e.to_string())?;
        Ok(None)
    }
}

#[tokio::test]
async fn test_two_critical_readings_escalate_to_emergency() {
    let config = KernelConfig::default();
    let k = kernel(&config).await;
    let recovery = Arc::new(RecoveryExecutor::new(Arc::new(StalledActions {
        gate: Semaphore::new(0),
    })));
    let safety = SafetyCoordinator::new(
        "session-1",
        config.safety.clone(),
        k.coordinator.clone(),
        recovery.clone(),
    );

    let critical = RiskMetrics {
        drawdown_pct: dec!(25),
        ..RiskMetrics::default()
    };

    let first = safety.evaluate(critical.clone()).await;
    assert_eq!(first.status, SafetyStatus::Critical);
    assert!(!k.coordinator.halt_switch().is_engaged());

    let mut recovery_events = recovery.subscribe();
    let second = safety.evaluate(critical).await;
    assert_eq!(second.status, SafetyStatus::Emergency);
    assert!(k.coordinator.halt_switch().is_engaged());
    assert_eq!(safety.status().await, SafetyStatus::Emergency);

    let recovery_id = second.recovery_id.unwrap();
    loop {
        let event = recovery_events.recv().await.unwrap();
        if event.execution_id == recovery_id
            && matches!(event.kind, RecoveryEventKind::PhaseStarted { .. })
        {
            break;
        }
    }
    let execution = recovery.get(recovery_id).await.unwrap();
    assert_eq!(execution.plan_id, EMERGENCY_HALT_PLAN);
    assert_eq!(execution.status, RecoveryStatus::Executing);
    assert_eq!(recovery.active_for("session-1").await, Some(recovery_id));

    // Halted: entries refused before any network call.
    let calls = k.paper.call_count();
    let err = k
        .coordinator
        .execute_entry(&SnipeTarget::new("alice", "NEWUSDT", dec!(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::Halted(_)));
    assert_eq!(k.paper.call_count(), calls);
}
