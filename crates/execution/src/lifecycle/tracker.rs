//! Lifecycle tracker for target history.

use super::{
    CancelReason, CancelledData, ClaimedData, CompletedData, EventData, FailedData, LifecycleEvent,
    LifecycleEventType, RetryData,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sniper_domain::entities::SnipeTarget;
use sniper_domain::enums::TargetStatus;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Summary of a target's lifecycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSummary {
    pub target_id: Uuid,
    pub symbol: String,
    pub status: TargetStatus,
    pub created_at: DateTime<Utc>,
    /// When the target reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub retries_scheduled: u32,
    pub execution_price: Option<Decimal>,
    pub last_error: Option<String>,
}

/// Tracks lifecycle events for all targets.
pub struct LifecycleTracker {
    /// Events by target.
    events: Arc<RwLock<HashMap<Uuid, Vec<LifecycleEvent>>>>,
    /// Target summaries.
    summaries: Arc<RwLock<HashMap<Uuid, TargetSummary>>>,
}

impl LifecycleTracker {
    /// Creates a new lifecycle tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(HashMap::new())),
            summaries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn record_created(&self, target: &SnipeTarget) {
        let event = LifecycleEvent::new(
            LifecycleEventType::Created,
            target.id,
            &target.symbol,
            target.status,
            EventData::None,
        );
        self.add_event(target.id, event).await;

        let summary = TargetSummary {
            target_id: target.id,
            symbol: target.symbol.clone(),
            status: target.status,
            created_at: target.created_at,
            finished_at: None,
            attempts: 0,
            retries_scheduled: 0,
            execution_price: None,
            last_error: None,
        };
        self.summaries.write().await.insert(target.id, summary);

        info!(target_id = %target.id, symbol = %target.symbol, priority = target.priority, "Target created");
    }

    pub async fn record_activated(&self, target: &SnipeTarget) {
        self.record_transition(target, LifecycleEventType::Activated, EventData::None)
            .await;
        debug!(target_id = %target.id, confidence = %target.confidence_score, "Target activated");
    }

    pub async fn record_ready(&self, target: &SnipeTarget) {
        self.record_transition(target, LifecycleEventType::Ready, EventData::None)
            .await;
        debug!(target_id = %target.id, "Target ready");
    }

    pub async fn record_claimed(&self, target: &SnipeTarget, worker: &str) {
        let attempt = target.current_retries + 1;
        self.record_transition(
            target,
            LifecycleEventType::Claimed,
            EventData::Claimed(ClaimedData {
                worker: worker.to_string(),
                attempt,
            }),
        )
        .await;
        if let Some(summary) = self.summaries.write().await.get_mut(&target.id) {
            summary.attempts += 1;
        }
        info!(target_id = %target.id, worker = worker, attempt, "Target claimed");
    }

    pub async fn record_completed(&self, target: &SnipeTarget, data: CompletedData) {
        let price = data.execution_price;
        self.record_transition(target, LifecycleEventType::Completed, EventData::Completed(data))
            .await;
        if let Some(summary) = self.summaries.write().await.get_mut(&target.id) {
            summary.execution_price = Some(price);
        }
        info!(target_id = %target.id, execution_price = %price, "Target completed");
    }

    pub async fn record_retry(&self, target: &SnipeTarget, not_before: DateTime<Utc>, error: &str) {
        self.record_transition(
            target,
            LifecycleEventType::RetryScheduled,
            EventData::Retry(RetryData {
                retries: target.current_retries,
                max_retries: target.max_retries,
                not_before,
                error: error.to_string(),
            }),
        )
        .await;
        if let Some(summary) = self.summaries.write().await.get_mut(&target.id) {
            summary.retries_scheduled += 1;
            summary.last_error = Some(error.to_string());
        }
        warn!(
            target_id = %target.id,
            retries = target.current_retries,
            max_retries = target.max_retries,
            error = error,
            "Target retry scheduled"
        );
    }

    pub async fn record_failed(&self, target: &SnipeTarget, error: &str) {
        self.record_transition(
            target,
            LifecycleEventType::Failed,
            EventData::Failed(FailedData {
                retries: target.current_retries,
                error: error.to_string(),
            }),
        )
        .await;
        if let Some(summary) = self.summaries.write().await.get_mut(&target.id) {
            summary.last_error = Some(error.to_string());
        }
        warn!(target_id = %target.id, error = error, "Target failed");
    }

    pub async fn record_cancelled(&self, target: &SnipeTarget, previous: TargetStatus, reason: CancelReason) {
        info!(target_id = %target.id, previous = %previous, reason = ?reason, "Target cancelled");
        self.record_transition(
            target,
            LifecycleEventType::Cancelled,
            EventData::Cancelled(CancelledData { previous, reason }),
        )
        .await;
    }

    async fn record_transition(&self, target: &SnipeTarget, event_type: LifecycleEventType, data: EventData) {
        let event = LifecycleEvent::new(event_type, target.id, &target.symbol, target.status, data);
        let timestamp = event.timestamp;
        self.add_event(target.id, event).await;

        let mut summaries = self.summaries.write().await;
        let summary = summaries.entry(target.id).or_insert_with(|| TargetSummary {
            target_id: target.id,
            symbol: target.symbol.clone(),
            status: target.status,
            created_at: target.created_at,
            finished_at: None,
            attempts: 0,
            retries_scheduled: 0,
            execution_price: None,
            last_error: None,
        });
        summary.status = target.status;
        if target.status.is_terminal() {
            summary.finished_at = Some(timestamp);
        }
    }

    /// Adds an event to the tracker.
    async fn add_event(&self, target_id: Uuid, event: LifecycleEvent) {
        let mut events = self.events.write().await;
        events.entry(target_id).or_default().push(event);
    }

    /// Gets all events for a target.
    pub async fn get_events(&self, target_id: &Uuid) -> Vec<LifecycleEvent> {
        self.events
            .read()
            .await
            .get(target_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Gets the summary for a target.
    pub async fn get_summary(&self, target_id: &Uuid) -> Option<TargetSummary> {
        self.summaries.read().await.get(target_id).cloned()
    }

    /// Gets all target summaries.
    pub async fn get_all_summaries(&self) -> Vec<TargetSummary> {
        self.summaries.read().await.values().cloned().collect()
    }

    /// Drops history of targets that finished before `before`.
    pub async fn prune_finished(&self, before: DateTime<Utc>) -> usize {
        let mut summaries = self.summaries.write().await;
        let stale: Vec<Uuid> = summaries
            .values()
            .filter(|s| s.finished_at.is_some_and(|at| at < before))
            .map(|s| s.target_id)
            .collect();
        let mut events = self.events.write().await;
        for id in &stale {
            summaries.remove(id);
            events.remove(id);
        }
        stale.len()
    }

    /// Gets aggregate statistics.
    pub async fn get_aggregate_stats(&self) -> AggregateStats {
        let summaries = self.summaries.read().await;

        let mut stats = AggregateStats::default();

        for summary in summaries.values() {
            stats.total_targets += 1;
            match summary.status {
                TargetStatus::Completed => stats.completed += 1,
                TargetStatus::Failed => stats.failed += 1,
                TargetStatus::Cancelled => stats.cancelled += 1,
                _ => stats.in_flight += 1,
            }
            stats.total_attempts += summary.attempts;
            stats.total_retries += summary.retries_scheduled;
        }

        let finished = stats.completed + stats.failed;
        if finished > 0 {
            stats.success_rate = Decimal::from(stats.completed) / Decimal::from(finished);
        }

        stats
    }
}

impl Default for LifecycleTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate statistics across all targets.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub total_targets: u32,
    /// Targets not yet in a terminal status.
    pub in_flight: u32,
    pub completed: u32,
    pub failed: u32,
    pub cancelled: u32,
    pub total_attempts: u32,
    pub total_retries: u32,
    /// Completed over completed plus failed.
    pub success_rate: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_lifecycle_tracker() {
        let tracker = LifecycleTracker::new();
        let mut target = SnipeTarget::new("alice", "NEWUSDT", dec!(100));

        tracker.record_created(&target).await;
        target.status = TargetStatus::Executing;
        tracker.record_claimed(&target, "w1").await;
        target.status = TargetStatus::Failed;
        tracker.record_failed(&target, "rejected").await;

        let events = tracker.get_events(&target.id).await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].event_type, LifecycleEventType::Failed);

        let summary = tracker.get_summary(&target.id).await.unwrap();
        assert_eq!(summary.attempts, 1);
        assert_eq!(summary.status, TargetStatus::Failed);
        assert!(summary.finished_at.is_some());

        let stats = tracker.get_aggregate_stats().await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.success_rate, Decimal::ZERO);

        assert_eq!(tracker.prune_finished(Utc::now() + chrono::Duration::seconds(1)).await, 1);
        assert!(tracker.get_events(&target.id).await.is_empty());
    }
}
