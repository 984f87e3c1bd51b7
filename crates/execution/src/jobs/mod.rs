//! Handlers for the kernel's job types.

mod housekeeping;
mod risk_check;
mod snipe;
mod sync;

pub use housekeeping::HousekeepingHandler;
pub use risk_check::RiskCheckHandler;
pub use snipe::SnipeExecutionHandler;
pub use sync::{StaticTargetSource, SyncHandler, TargetSource};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KernelConfig, StoreKind};
    use crate::coordinator::ExecutionCoordinator;
    use crate::error::JobError;
    use crate::exchange::PaperExchange;
    use crate::lifecycle::TargetLifecycleManager;
    use crate::queue::{JobContext, JobHandler};
    use crate::emergency::{EmergencyExitConfig, EmergencyExitManager, RecoveryExecutor};
    use crate::safety::{HaltSwitch, KernelRecoveryActions, SafetyCoordinator};
    use async_trait::async_trait;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use sniper_data::{MemoryHistoryStore, MemoryPositionStore, MemoryTargetStore, TargetStore};
    use sniper_domain::entities::{
        JobPayload, SnipeExecutionPayload, SnipeTarget, SyncPayload,
    };
    use sniper_domain::enums::TargetStatus;
    use sniper_domain::precision::SymbolRules;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn lifecycle() -> (Arc<PaperExchange>, Arc<MemoryTargetStore>, Arc<TargetLifecycleManager>) {
        let config = KernelConfig::default();
        let paper = Arc::new(PaperExchange::default());
        paper
            .set_rules(SymbolRules {
                symbol: "NEWUSDT".to_string(),
                base_asset_precision: 2,
                quote_precision: 4,
                min_base_size: dec!(0.01),
                min_notional_market: dec!(1),
                min_notional_limit: dec!(5),
            })
            .await;
        paper.set_price("NEWUSDT", dec!(4)).await;
        paper.set_balance("USDT", dec!(1000)).await;
        let coordinator = Arc::new(ExecutionCoordinator::new(
            &config,
            paper.clone(),
            HaltSwitch::new(),
            Arc::new(MemoryPositionStore::new()),
            Arc::new(MemoryHistoryStore::new()),
        ));
        let targets = Arc::new(MemoryTargetStore::new());
        let manager = Arc::new(TargetLifecycleManager::new("w1", targets.clone(), coordinator, &config));
        (paper, targets, manager)
    }

    fn safety() -> Arc<SafetyCoordinator> {
        let config = KernelConfig::default();
        let coordinator = Arc::new(ExecutionCoordinator::new(
            &config,
            Arc::new(PaperExchange::default()),
            HaltSwitch::new(),
            Arc::new(MemoryPositionStore::new()),
            Arc::new(MemoryHistoryStore::new()),
        ));
        let exits = Arc::new(EmergencyExitManager::new(coordinator.clone(), EmergencyExitConfig::default()));
        let recovery = Arc::new(RecoveryExecutor::new(Arc::new(KernelRecoveryActions::new(
            coordinator.clone(),
            exits,
        ))));
        Arc::new(SafetyCoordinator::new("jobs", config.safety.clone(), coordinator, recovery))
    }

    /// Discovery that is down.
    struct UnreachableSource;

    #[async_trait]
    impl TargetSource for UnreachableSource {
        async fn upcoming(&self, _window: Duration, _force: bool) -> Result<Vec<SnipeTarget>, String> {
            Err("calendar unreachable".to_string())
        }
    }

    fn ctx(shadow: bool) -> JobContext {
        JobContext {
            job_id: Uuid::new_v4(),
            worker: "w1".to_string(),
            attempt: 1,
            shadow,
            store: StoreKind::Database,
        }
    }

    fn confident(symbol: &str) -> SnipeTarget {
        let mut target = SnipeTarget::new("alice", symbol, dec!(100));
        target.confidence_score = dec!(0.95);
        target
    }

    #[tokio::test]
    async fn test_sync_submits_and_promotes_once() {
        let (_, targets, manager) = lifecycle().await;
        let target = confident("NEWUSDT");
        let source = Arc::new(StaticTargetSource::new(vec![target.clone()]));
        let handler = SyncHandler::new(source, manager.clone());
        let payload = JobPayload::Sync(SyncPayload::default());

        handler.handle(&ctx(true), &payload).await.unwrap();
        assert!(targets.get(target.id).await.unwrap().is_none());

        handler.handle(&ctx(false), &payload).await.unwrap();
        handler.handle(&ctx(false), &payload).await.unwrap();
        let stored = targets.get(target.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TargetStatus::Ready);
        assert_eq!(manager.tracker().get_events(&target.id).await.len(), 3);
    }

    #[tokio::test]
    async fn test_sync_feeds_detection_failure_rate() {
        let (_, _, manager) = lifecycle().await;
        let safety = safety();
        let payload = JobPayload::Sync(SyncPayload::default());

        let down = SyncHandler::new(Arc::new(UnreachableSource), manager.clone()).with_safety(safety.clone());
        assert!(matches!(
            down.handle(&ctx(false), &payload).await,
            Err(JobError::Retryable(_))
        ));
        // Shadow runs are not counted.
        assert!(down.handle(&ctx(true), &payload).await.is_err());
        assert_eq!(safety.compute_metrics().await.unwrap().detection_failure_rate, dec!(1));

        let up = SyncHandler::new(Arc::new(StaticTargetSource::default()), manager).with_safety(safety.clone());
        up.handle(&ctx(false), &payload).await.unwrap();
        assert_eq!(safety.compute_metrics().await.unwrap().detection_failure_rate, dec!(0.5));
    }

    #[tokio::test]
    async fn test_snipe_shadow_places_no_order() {
        let (paper, targets, manager) = lifecycle().await;
        let mut target = confident("NEWUSDT");
        target.status = TargetStatus::Ready;
        targets.insert(target.clone()).await.unwrap();
        let handler = SnipeExecutionHandler::new(manager);
        let payload = JobPayload::SnipeExecution(SnipeExecutionPayload { target_id: target.id });

        handler.handle(&ctx(true), &payload).await.unwrap();
        assert!(paper.orders().await.is_empty());

        handler.handle(&ctx(false), &payload).await.unwrap();
        assert_eq!(paper.orders().await.len(), 1);
        assert_eq!(
            targets.get(target.id).await.unwrap().unwrap().status,
            TargetStatus::Completed
        );

        // Already completed: nothing left to run.
        assert!(matches!(
            handler.handle(&ctx(false), &payload).await,
            Err(JobError::Fatal(_))
        ));
    }
}
