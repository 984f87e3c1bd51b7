//! Target state machine: promotion, claiming, execution and retries.

use super::{CancelReason, CompletedData, LifecycleTracker};
use crate::config::{KernelConfig, RetryConfig};
use crate::coordinator::ExecutionCoordinator;
use crate::error::{ExecutionError, FailureClass, LifecycleError};
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use sniper_data::{StoreError, TargetStore};
use sniper_domain::entities::{PositionId, SnipeTarget};
use sniper_domain::enums::TargetStatus;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

fn millis(ms: u64) -> Duration {
    Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

/// Lifecycle knobs taken from [`KernelConfig`].
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub min_confidence: Decimal,
    pub pre_buffer: Duration,
    pub post_buffer: Duration,
    pub advance_window: Duration,
    /// Executing targets untouched for longer than this were abandoned.
    pub stale_after: Duration,
    pub retry: RetryConfig,
}

impl From<&KernelConfig> for LifecycleSettings {
    fn from(config: &KernelConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            pre_buffer: millis(config.execution_window.pre_buffer_ms),
            post_buffer: millis(config.execution_window.post_buffer_ms),
            advance_window: config.advance_window(),
            stale_after: config.stale_executing(),
            retry: config.retry_config.clone(),
        }
    }
}

/// What happened to a claimed target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TargetOutcome {
    Completed { position_id: PositionId },
    /// Nothing reached the exchange; back to ready with the retry budget intact.
    Requeued { reason: String },
    RetryScheduled { retries: u32, not_before: DateTime<Utc> },
    Failed { error: String },
    /// The target was moved by someone else while executing.
    Lost,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionReport {
    pub activated: usize,
    pub ready: usize,
    pub missed: usize,
    pub abandoned: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    /// Set when the pass did not run.
    pub skipped: Option<String>,
    pub eligible: usize,
    pub claimed: usize,
    pub outcomes: Vec<(Uuid, TargetOutcome)>,
}

impl PassReport {
    pub fn count(&self, pred: impl Fn(&TargetOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Drives snipe targets from submission to a terminal status.
///
/// Every transition is a status-guarded store update. Losing a guard means
/// another worker got there first and the target is left alone.
pub struct TargetLifecycleManager {
    worker_id: String,
    targets: Arc<dyn TargetStore>,
    coordinator: Arc<ExecutionCoordinator>,
    tracker: Arc<LifecycleTracker>,
    settings: RwLock<LifecycleSettings>,
    /// Earliest next attempt for targets waiting out a retry backoff.
    backoff: RwLock<HashMap<Uuid, DateTime<Utc>>>,
}

impl TargetLifecycleManager {
    pub fn new(
        worker_id: impl Into<String>,
        targets: Arc<dyn TargetStore>,
        coordinator: Arc<ExecutionCoordinator>,
        config: &KernelConfig,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            targets,
            coordinator,
            tracker: Arc::new(LifecycleTracker::new()),
            settings: RwLock::new(LifecycleSettings::from(config)),
            backoff: RwLock::new(HashMap::new()),
        }
    }

    pub async fn apply_config(&self, config: &KernelConfig) {
        *self.settings.write().await = LifecycleSettings::from(config);
    }

    pub fn tracker(&self) -> &Arc<LifecycleTracker> {
        &self.tracker
    }

    pub fn targets(&self) -> &Arc<dyn TargetStore> {
        &self.targets
    }

    /// Stores a new target handed over by discovery.
    ///
    /// # Errors
    /// Rejects targets that are not pending or carry nonsensical sizes.
    pub async fn submit(&self, mut target: SnipeTarget) -> Result<Uuid, LifecycleError> {
        if target.status != TargetStatus::Pending {
            return Err(LifecycleError::InvalidTarget(format!(
                "new targets must be pending, got {}",
                target.status
            )));
        }
        if target.position_size <= Decimal::ZERO {
            return Err(LifecycleError::InvalidTarget("position size must be positive".into()));
        }
        if target.current_retries > target.max_retries {
            return Err(LifecycleError::InvalidTarget("retries exceed max retries".into()));
        }
        if target.take_profit.percent().is_none() {
            return Err(LifecycleError::InvalidTarget("unknown take-profit level".into()));
        }
        target.updated_at = Utc::now();
        let id = target.id;
        self.tracker.record_created(&target).await;
        self.targets.insert(target).await?;
        Ok(id)
    }

    /// Moves confident pending targets to active and active targets inside
    /// their window to ready. Active targets whose window already closed are
    /// cancelled as missed.
    ///
    /// Targets left in `executing` past the stale threshold belonged to a
    /// worker that died mid-entry. Whether the order reached the exchange is
    /// unknown, so they fail instead of going back to ready.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read or written.
    #[instrument(skip(self), fields(worker = %self.worker_id))]
    pub async fn promote(&self, now: DateTime<Utc>) -> Result<PromotionReport, StoreError> {
        let settings = self.settings.read().await.clone();
        let mut report = PromotionReport::default();

        for mut target in self.targets.list_by_status(TargetStatus::Pending).await? {
            if target.confidence_score < settings.min_confidence {
                continue;
            }
            target.status = TargetStatus::Active;
            target.updated_at = now;
            if self.targets.update_guarded(&target, TargetStatus::Pending).await? {
                self.tracker.record_activated(&target).await;
                report.activated += 1;
            }
        }

        for mut target in self.targets.list_by_status(TargetStatus::Active).await? {
            let missed = target
                .target_execution_time
                .is_some_and(|at| at + settings.post_buffer < now);
            if missed {
                target.status = TargetStatus::Cancelled;
                target.error_message = Some("missed execution window".to_string());
                target.updated_at = now;
                if self.targets.update_guarded(&target, TargetStatus::Active).await? {
                    self.tracker
                        .record_cancelled(&target, TargetStatus::Active, CancelReason::MissedWindow)
                        .await;
                    report.missed += 1;
                }
                continue;
            }

            let in_window = target
                .target_execution_time
                .is_none_or(|at| at <= now + settings.pre_buffer);
            if !in_window {
                continue;
            }
            target.status = TargetStatus::Ready;
            target.updated_at = now;
            if self.targets.update_guarded(&target, TargetStatus::Active).await? {
                self.tracker.record_ready(&target).await;
                report.ready += 1;
            }
        }

        for mut target in self.targets.list_by_status(TargetStatus::Executing).await? {
            if target.updated_at + settings.stale_after >= now {
                continue;
            }
            let error = format!(
                "execution abandoned since {}, reconcile with the exchange",
                target.updated_at.to_rfc3339()
            );
            target.status = TargetStatus::Failed;
            target.error_message = Some(error.clone());
            target.updated_at = now;
            if self.targets.update_guarded(&target, TargetStatus::Executing).await? {
                warn!(target_id = %target.id, symbol = %target.symbol, "Abandoned execution failed");
                self.backoff.write().await.remove(&target.id);
                self.tracker.record_failed(&target, &error).await;
                report.abandoned += 1;
            }
        }

        if report.activated + report.ready + report.missed + report.abandoned > 0 {
            info!(
                activated = report.activated,
                ready = report.ready,
                missed = report.missed,
                abandoned = report.abandoned,
                "Promotion pass"
            );
        }
        Ok(report)
    }

    /// Claims a ready target for this worker. `None` when it was no longer
    /// ready.
    ///
    /// # Errors
    /// Returns an error if the store update fails.
    pub async fn claim(&self, target: &SnipeTarget, now: DateTime<Utc>) -> Result<Option<SnipeTarget>, StoreError> {
        let mut claimed = target.clone();
        claimed.status = TargetStatus::Executing;
        claimed.updated_at = now;
        if !self.targets.update_guarded(&claimed, TargetStatus::Ready).await? {
            debug!(target_id = %target.id, "Claim lost");
            return Ok(None);
        }
        self.tracker.record_claimed(&claimed, &self.worker_id).await;
        Ok(Some(claimed))
    }

    /// Claims and executes up to `limit` eligible targets.
    ///
    /// Nothing is claimed while new entries are not accepted, so a halt or an
    /// open breaker leaves ready targets untouched.
    ///
    /// # Errors
    /// Returns an error if eligible targets cannot be listed.
    #[instrument(skip(self), fields(worker = %self.worker_id))]
    pub async fn run_pass(&self, now: DateTime<Utc>, limit: usize) -> Result<PassReport, StoreError> {
        let mut report = PassReport::default();
        if let Err(violation) = self.coordinator.halt_switch().check() {
            report.skipped = Some(violation.to_string());
            return Ok(report);
        }
        if !self.coordinator.accepting_entries().await {
            report.skipped = Some("entries not accepted".to_string());
            return Ok(report);
        }

        let advance_window = self.settings.read().await.advance_window;
        let waiting = {
            let mut backoff = self.backoff.write().await;
            backoff.retain(|_, not_before| *not_before > now);
            backoff.clone()
        };

        let eligible: Vec<SnipeTarget> = self
            .targets
            .find_eligible(now, advance_window, limit + waiting.len())
            .await?
            .into_iter()
            .filter(|t| !waiting.contains_key(&t.id))
            .take(limit)
            .collect();
        report.eligible = eligible.len();

        let mut claimed = Vec::with_capacity(eligible.len());
        for target in &eligible {
            match self.claim(target, now).await {
                Ok(Some(target)) => claimed.push(target),
                Ok(None) => {}
                Err(e) => warn!(target_id = %target.id, error = %e, "Claim failed"),
            }
        }
        report.claimed = claimed.len();

        let results = join_all(claimed.into_iter().map(|target| async move {
            let id = target.id;
            (id, self.execute_claimed(target, now).await)
        }))
        .await;

        for (id, result) in results {
            match result {
                Ok(outcome) => report.outcomes.push((id, outcome)),
                Err(e) => warn!(target_id = %id, error = %e, "Could not record execution outcome"),
            }
        }
        Ok(report)
    }

    /// Executes one specific target now, regardless of its scheduled time.
    ///
    /// # Errors
    /// Fails if the target is unknown, not ready, or claimed by someone else.
    pub async fn execute_target(&self, id: Uuid, now: DateTime<Utc>) -> Result<TargetOutcome, LifecycleError> {
        let target = self.targets.get(id).await?.ok_or(LifecycleError::NotFound(id))?;
        if target.status != TargetStatus::Ready {
            return Err(LifecycleError::IllegalTransition {
                id,
                from: target.status,
                to: TargetStatus::Executing,
            });
        }
        let claimed = self.claim(&target, now).await?.ok_or(LifecycleError::Conflict(id))?;
        Ok(self.execute_claimed(claimed, now).await?)
    }

    /// Runs the entry for a claimed target and records the resulting
    /// transition out of `executing`.
    async fn execute_claimed(&self, mut target: SnipeTarget, now: DateTime<Utc>) -> Result<TargetOutcome, StoreError> {
        let result = self.coordinator.execute_entry(&target).await;
        target.updated_at = Utc::now();

        let outcome = match result {
            Ok(fill) => {
                target.status = TargetStatus::Completed;
                target.executed_at = Some(fill.position.entry_time);
                target.execution_price = Some(fill.position.entry_price);
                target.error_message = None;
                if !self.targets.update_guarded(&target, TargetStatus::Executing).await? {
                    warn!(target_id = %target.id, position_id = %fill.position.id, "Target moved while its entry filled");
                    return Ok(TargetOutcome::Lost);
                }
                self.tracker
                    .record_completed(
                        &target,
                        CompletedData {
                            position_id: fill.position.id,
                            execution_price: fill.position.entry_price,
                            quantity: fill.position.quantity,
                            order_id: fill.ack.order_id.clone(),
                        },
                    )
                    .await;
                return Ok(TargetOutcome::Completed {
                    position_id: fill.position.id,
                });
            }
            Err(e) => {
                let message = e.to_string();
                target.error_message = Some(message.clone());
                if let ExecutionError::FilledUnrecorded { entry_price, .. } = &e {
                    target.executed_at = Some(target.updated_at);
                    target.execution_price = Some(*entry_price);
                }
                match e.class() {
                    FailureClass::NotAttempted => {
                        target.status = TargetStatus::Ready;
                        TargetOutcome::Requeued { reason: message }
                    }
                    FailureClass::Transient => {
                        target.current_retries += 1;
                        if target.has_retries_left() {
                            target.status = TargetStatus::Ready;
                            let delay = self
                                .settings
                                .read()
                                .await
                                .retry
                                .delay_for(target.current_retries - 1);
                            let not_before = now
                                + Duration::from_std(delay).unwrap_or_else(|_| Duration::seconds(1));
                            TargetOutcome::RetryScheduled {
                                retries: target.current_retries,
                                not_before,
                            }
                        } else {
                            target.status = TargetStatus::Failed;
                            TargetOutcome::Failed { error: message }
                        }
                    }
                    FailureClass::Terminal => {
                        target.status = TargetStatus::Failed;
                        TargetOutcome::Failed { error: message }
                    }
                }
            }
        };

        if !self.targets.update_guarded(&target, TargetStatus::Executing).await? {
            warn!(target_id = %target.id, "Target moved while executing");
            return Ok(TargetOutcome::Lost);
        }

        match &outcome {
            TargetOutcome::Requeued { reason } => {
                debug!(target_id = %target.id, reason = %reason, "Target requeued");
                self.tracker.record_ready(&target).await;
            }
            TargetOutcome::RetryScheduled { not_before, .. } => {
                self.backoff.write().await.insert(target.id, *not_before);
                let error = target.error_message.as_deref().unwrap_or_default();
                self.tracker.record_retry(&target, *not_before, error).await;
            }
            TargetOutcome::Failed { error } => {
                self.tracker.record_failed(&target, error).await;
            }
            TargetOutcome::Completed { .. } | TargetOutcome::Lost => {}
        }
        Ok(outcome)
    }

    /// Cancels a non-terminal target.
    ///
    /// # Errors
    /// Fails for unknown or terminal targets, or when the target moved
    /// between read and write.
    pub async fn cancel(&self, id: Uuid, reason: &str) -> Result<SnipeTarget, LifecycleError> {
        let mut target = self.targets.get(id).await?.ok_or(LifecycleError::NotFound(id))?;
        let previous = target.status;
        if !previous.can_transition_to(TargetStatus::Cancelled) {
            return Err(LifecycleError::IllegalTransition {
                id,
                from: previous,
                to: TargetStatus::Cancelled,
            });
        }
        target.status = TargetStatus::Cancelled;
        target.error_message = Some(reason.to_string());
        target.updated_at = Utc::now();
        if !self.targets.update_guarded(&target, previous).await? {
            return Err(LifecycleError::Conflict(id));
        }
        self.backoff.write().await.remove(&id);
        self.tracker
            .record_cancelled(&target, previous, CancelReason::Manual(reason.to_string()))
            .await;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{ExchangeError, PaperExchange};
    use crate::safety::HaltSwitch;
    use rust_decimal_macros::dec;
    use async_trait::async_trait;
    use sniper_data::{
        HistoryStore, MemoryHistoryStore, MemoryPositionStore, MemoryTargetStore, PositionStore,
    };
    use sniper_domain::entities::{ExecutionOutcome, Position};
    use sniper_domain::enums::PositionStatus;
    use sniper_domain::precision::SymbolRules;

    struct Harness {
        paper: Arc<PaperExchange>,
        targets: Arc<MemoryTargetStore>,
        history: Arc<MemoryHistoryStore>,
        manager: TargetLifecycleManager,
    }

    /// Position store that is down for writes.
    struct UnwritablePositions;

    #[async_trait]
    impl PositionStore for UnwritablePositions {
        async fn insert(&self, _position: Position) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("positions".to_string()))
        }

        async fn get(&self, _id: PositionId) -> Result<Option<Position>, StoreError> {
            Ok(None)
        }

        async fn list_open(&self) -> Result<Vec<Position>, StoreError> {
            Ok(Vec::new())
        }

        async fn update_guarded(&self, _position: &Position, _expected: PositionStatus) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("positions".to_string()))
        }
    }

    async fn harness() -> Harness {
        harness_with(Arc::new(MemoryPositionStore::new())).await
    }

    async fn harness_with(positions: Arc<dyn PositionStore>) -> Harness {
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
        paper.set_price("NEWUSDT", dec!(2)).await;
        paper.set_balance("USDT", dec!(1000)).await;
        let history = Arc::new(MemoryHistoryStore::new());
        let coordinator = Arc::new(ExecutionCoordinator::new(
            &config,
            paper.clone(),
            HaltSwitch::new(),
            positions,
            history.clone(),
        ));
        let targets = Arc::new(MemoryTargetStore::new());
        let manager = TargetLifecycleManager::new("w1", targets.clone(), coordinator, &config);
        Harness {
            paper,
            targets,
            history,
            manager,
        }
    }

    fn ready(symbol: &str) -> SnipeTarget {
        let mut target = SnipeTarget::new("alice", symbol, dec!(100));
        target.status = TargetStatus::Ready;
        target
    }

    #[tokio::test]
    async fn test_promotion_and_missed_window() {
        let h = harness().await;
        let now = Utc::now();

        let mut confident = SnipeTarget::new("alice", "NEWUSDT", dec!(100));
        confident.confidence_score = dec!(0.9);
        let mut doubtful = SnipeTarget::new("alice", "NEWUSDT", dec!(100));
        doubtful.confidence_score = dec!(0.5);
        let mut later = SnipeTarget::new("alice", "NEWUSDT", dec!(100));
        later.confidence_score = dec!(0.9);
        later.target_execution_time = Some(now + Duration::minutes(10));
        let mut missed = SnipeTarget::new("alice", "NEWUSDT", dec!(100));
        missed.confidence_score = dec!(0.9);
        missed.target_execution_time = Some(now - Duration::minutes(5));

        for target in [&confident, &doubtful, &later, &missed] {
            h.manager.submit(target.clone()).await.unwrap();
        }

        let report = h.manager.promote(now).await.unwrap();
        assert_eq!(report.activated, 3);
        assert_eq!(report.ready, 1);
        assert_eq!(report.missed, 1);

        for (id, expected) in [
            (confident.id, TargetStatus::Ready),
            (doubtful.id, TargetStatus::Pending),
            (later.id, TargetStatus::Active),
            (missed.id, TargetStatus::Cancelled),
        ] {
            assert_eq!(h.targets.get(id).await.unwrap().unwrap().status, expected);
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_non_pending() {
        let h = harness().await;
        let err = h.manager.submit(ready("NEWUSDT")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTarget(_)));
    }

    #[tokio::test]
    async fn test_run_pass_completes_target() {
        let h = harness().await;
        let target = ready("NEWUSDT");
        h.targets.insert(target.clone()).await.unwrap();

        let report = h.manager.run_pass(Utc::now(), 10).await.unwrap();
        assert_eq!(report.claimed, 1);
        assert!(matches!(report.outcomes[0].1, TargetOutcome::Completed { .. }));

        let stored = h.targets.get(target.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TargetStatus::Completed);
        assert_eq!(stored.execution_price, Some(dec!(2)));
        assert!(stored.executed_at.is_some());
    }

    #[tokio::test]
    async fn test_transient_failure_backs_off_then_dies() {
        let h = harness().await;
        let mut target = ready("NEWUSDT");
        target.max_retries = 2;
        h.targets.insert(target.clone()).await.unwrap();
        h.paper.fail_orders(ExchangeError::Network("reset".into()), 10).await;

        let now = Utc::now();
        let first = h.manager.run_pass(now, 10).await.unwrap();
        assert!(matches!(first.outcomes[0].1, TargetOutcome::RetryScheduled { retries: 1, .. }));

        // Still inside the backoff.
        let waiting = h.manager.run_pass(now, 10).await.unwrap();
        assert_eq!(waiting.claimed, 0);

        let later = now + Duration::minutes(5);
        let second = h.manager.run_pass(later, 10).await.unwrap();
        assert!(matches!(second.outcomes[0].1, TargetOutcome::Failed { .. }));

        let stored = h.targets.get(target.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TargetStatus::Failed);
        assert_eq!(stored.current_retries, 2);
    }

    #[tokio::test]
    async fn test_terminal_failure_is_not_retried() {
        let h = harness().await;
        let target = ready("NEWUSDT");
        h.targets.insert(target.clone()).await.unwrap();
        h.paper
            .fail_orders(
                ExchangeError::Rejected {
                    code: Some(30004),
                    message: "insufficient position".into(),
                },
                1,
            )
            .await;

        let report = h.manager.run_pass(Utc::now(), 10).await.unwrap();
        assert!(matches!(report.outcomes[0].1, TargetOutcome::Failed { .. }));
        let stored = h.targets.get(target.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TargetStatus::Failed);
        assert_eq!(stored.current_retries, 0);
    }

    #[tokio::test]
    async fn test_filled_entry_is_never_bought_twice_when_position_write_fails() {
        let h = harness_with(Arc::new(UnwritablePositions)).await;
        let mut target = ready("NEWUSDT");
        target.max_retries = 3;
        h.targets.insert(target.clone()).await.unwrap();

        let outcome = h.manager.execute_target(target.id, Utc::now()).await.unwrap();
        assert!(matches!(outcome, TargetOutcome::Failed { .. }));

        // The target is out of the ready pool, so retries cannot buy again.
        let again = h.manager.execute_target(target.id, Utc::now()).await;
        assert!(matches!(again, Err(LifecycleError::IllegalTransition { .. })));
        let pass = h.manager.run_pass(Utc::now(), 10).await.unwrap();
        assert_eq!(pass.claimed, 0);
        assert_eq!(h.paper.orders().await.len(), 1);

        let stored = h.targets.get(target.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TargetStatus::Failed);
        assert_eq!(stored.current_retries, 0);
        assert_eq!(stored.execution_price, Some(dec!(2)));

        let records = h.history.recent(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, ExecutionOutcome::Filled);
    }

    #[tokio::test]
    async fn test_crashed_execution_is_failed_not_requeued() {
        let h = harness().await;
        let now = Utc::now();
        let crashed = ready("NEWUSDT");
        let running = ready("NEWUSDT");
        h.targets.insert(crashed.clone()).await.unwrap();
        h.targets.insert(running.clone()).await.unwrap();

        // A worker claimed this one an hour ago and never reported back.
        h.manager.claim(&crashed, now - Duration::hours(1)).await.unwrap().unwrap();
        h.manager.claim(&running, now).await.unwrap().unwrap();

        let report = h.manager.promote(now).await.unwrap();
        assert_eq!(report.abandoned, 1);

        let stored = h.targets.get(crashed.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TargetStatus::Failed);
        assert!(stored.error_message.unwrap().contains("abandoned"));
        assert_eq!(
            h.targets.get(running.id).await.unwrap().unwrap().status,
            TargetStatus::Executing
        );

        let pass = h.manager.run_pass(now, 10).await.unwrap();
        assert_eq!(pass.claimed, 0);
        assert!(h.paper.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_halt_skips_pass_without_claiming() {
        let h = harness().await;
        let target = ready("NEWUSDT");
        h.targets.insert(target.clone()).await.unwrap();
        h.manager.coordinator.halt_switch().engage("test");

        let report = h.manager.run_pass(Utc::now(), 10).await.unwrap();
        assert!(report.skipped.is_some());
        assert_eq!(
            h.targets.get(target.id).await.unwrap().unwrap().status,
            TargetStatus::Ready
        );
        assert!(h.paper.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_and_claim_race() {
        let h = harness().await;
        let target = ready("NEWUSDT");
        h.targets.insert(target.clone()).await.unwrap();

        let claimed = h.manager.claim(&target, Utc::now()).await.unwrap();
        assert!(claimed.is_some());
        assert!(h.manager.claim(&target, Utc::now()).await.unwrap().is_none());

        let cancelled = h.manager.cancel(target.id, "operator").await.unwrap();
        assert_eq!(cancelled.status, TargetStatus::Cancelled);
        let err = h.manager.cancel(target.id, "again").await.unwrap_err();
        assert!(matches!(err, LifecycleError::IllegalTransition { .. }));

        let events = h.manager.tracker().get_events(&target.id).await;
        assert_eq!(events.len(), 2);
    }
}
