//! Lease-based job delivery over two interchangeable stores.

use super::dual_run::{DualRunReport, DualRunTracker, RunOutcome};
use crate::config::{QueueConfig, StoreKind};
use crate::error::QueueError;
use crate::safety::HaltSwitch;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sniper_data::{JobRelease, JobStore, QueueCounts, StoreError};
use sniper_domain::entities::{Job, JobPayload};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// A job leased to one worker, already decoded.
#[derive(Debug, Clone)]
pub struct LeasedJob {
    pub job: Job,
    pub payload: JobPayload,
    /// Store the job was leased from.
    pub store: StoreKind,
}

impl LeasedJob {
    pub fn is_shadow(&self) -> bool {
        self.job.shadow
    }
}

/// Result of acknowledging a leased job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    Completed,
    Retrying { run_at: DateTime<Utc> },
    Dead,
    /// The lease expired and the job now belongs to someone else.
    LeaseLost,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMode {
    pub primary: StoreKind,
    pub fallback_enabled: bool,
    pub dual_run: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbQueueHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub counts: QueueCounts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerQueueHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Pending jobs per named queue.
    #[serde(flatten)]
    pub queues: BTreeMap<String, u64>,
    pub total: u64,
}

/// Health snapshot of the queue layer. Building it never fails.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueHealth {
    pub status: &'static str,
    pub db_queue: DbQueueHealth,
    pub broker_queues: BrokerQueueHealth,
    pub execution_mode: ExecutionMode,
    pub recommendations: Vec<String>,
}

/// Pending jobs above which more workers are suggested.
const BACKLOG_WARNING: u64 = 100;

/// Routes jobs to the configured primary store, falls back to the other
/// store when the primary is down, and in dual-run mode writes a shadow copy
/// to the secondary for comparison.
pub struct JobDispatcher {
    database: Option<Arc<dyn JobStore>>,
    broker: Option<Arc<dyn JobStore>>,
    config: RwLock<QueueConfig>,
    halt: HaltSwitch,
    dual_run: DualRunTracker,
}

impl JobDispatcher {
    pub fn new(
        database: Option<Arc<dyn JobStore>>,
        broker: Option<Arc<dyn JobStore>>,
        config: &QueueConfig,
        halt: HaltSwitch,
    ) -> Self {
        Self {
            database,
            broker,
            config: RwLock::new(config.clone()),
            halt,
            dual_run: DualRunTracker::new(),
        }
    }

    pub async fn apply_config(&self, config: &QueueConfig) {
        let mut current = self.config.write().await;
        if current.primary != config.primary || current.dual_run != config.dual_run {
            info!(
                primary = config.primary.as_str(),
                fallback = config.fallback_enabled,
                dual_run = config.dual_run,
                "Queue execution mode changed"
            );
        }
        *current = config.clone();
    }

    pub async fn execution_mode(&self) -> ExecutionMode {
        let config = self.config.read().await;
        ExecutionMode {
            primary: config.primary,
            fallback_enabled: config.fallback_enabled,
            dual_run: config.dual_run,
        }
    }

    fn store(&self, kind: StoreKind) -> Option<&Arc<dyn JobStore>> {
        match kind {
            StoreKind::Database => self.database.as_ref(),
            StoreKind::Broker => self.broker.as_ref(),
        }
    }

    fn require(&self, kind: StoreKind) -> Result<&Arc<dyn JobStore>, QueueError> {
        self.store(kind).ok_or(QueueError::StoreMissing(kind.as_str()))
    }

    /// Decodes a raw `(type, payload)` pair and enqueues it.
    ///
    /// # Errors
    /// Unknown types and malformed payloads are rejected before any store is
    /// touched.
    pub async fn enqueue_raw(
        &self,
        job_type: &str,
        payload: &serde_json::Value,
        dedup_key: Option<String>,
    ) -> Result<Uuid, QueueError> {
        let payload = JobPayload::from_parts(job_type, payload)?;
        let mut job = Job::new(&payload);
        job.dedup_key = dedup_key;
        self.enqueue_job(job, &payload).await
    }

    /// Enqueues a typed payload.
    ///
    /// # Errors
    /// See [`enqueue_job`](Self::enqueue_job).
    pub async fn enqueue(&self, payload: JobPayload) -> Result<Uuid, QueueError> {
        let job = Job::new(&payload);
        self.enqueue_job(job, &payload).await
    }

    /// Inserts into the primary store, or the secondary when the primary
    /// fails and fallback is enabled. Dual-run adds a shadow copy to the
    /// secondary; losing the shadow is logged, not returned.
    ///
    /// # Errors
    /// Fails on invalid payloads, on snipe executions while halted, and
    /// when no store accepted the job.
    #[instrument(skip(self, job, payload), fields(job_type = %payload.job_type()))]
    pub async fn enqueue_job(&self, mut job: Job, payload: &JobPayload) -> Result<Uuid, QueueError> {
        payload.validate()?;
        if matches!(payload, JobPayload::SnipeExecution(_)) {
            self.halt.check()?;
        }
        let config = self.config.read().await.clone();
        job.max_attempts = config.max_attempts.max(1);

        let primary = self.require(config.primary)?;
        let secondary = self.store(config.primary.other());

        let (id, landed_on_primary) = match primary.insert(job.clone()).await {
            Ok(id) => (id, true),
            Err(e) => {
                let Some(secondary) = secondary.filter(|_| config.fallback_enabled) else {
                    error!(store = primary.name(), error = %e, "Enqueue failed, no fallback");
                    return Err(e.into());
                };
                warn!(store = primary.name(), fallback = secondary.name(), error = %e, "Primary store failed, enqueueing on fallback");
                (secondary.insert(job.clone()).await?, false)
            }
        };

        if config.dual_run
            && landed_on_primary
            && id == job.id
            && let Some(secondary) = secondary
        {
            if let Err(e) = secondary.insert(job.shadow_copy()).await {
                warn!(job_id = %id, store = secondary.name(), error = %e, "Shadow copy not enqueued");
            }
        }

        debug!(job_id = %id, "Job enqueued");
        Ok(id)
    }

    /// Enqueues the standard periodic set. Each job carries a dedup key, so
    /// triggering again while the previous set is pending is a no-op.
    ///
    /// # Errors
    /// Returns the first enqueue failure.
    pub async fn enqueue_periodic_set(&self) -> Result<Vec<Uuid>, QueueError> {
        let mut ids = Vec::new();
        for payload in JobPayload::periodic_set() {
            let job = Job::new(&payload).with_dedup_key(format!("periodic:{}", payload.job_type()));
            ids.push(self.enqueue_job(job, &payload).await?);
        }
        info!(jobs = ids.len(), "Periodic job set enqueued");
        Ok(ids)
    }

    /// Stores `pop` looks at, in order.
    async fn pop_order(&self) -> Vec<(StoreKind, Arc<dyn JobStore>)> {
        let config = self.config.read().await;
        let mut order = Vec::with_capacity(2);
        if let Some(store) = self.store(config.primary) {
            order.push((config.primary, Arc::clone(store)));
        }
        let other = config.primary.other();
        if (config.fallback_enabled || config.dual_run)
            && let Some(store) = self.store(other)
        {
            order.push((other, Arc::clone(store)));
        }
        order
    }

    /// Leases the oldest eligible job, primary store first.
    ///
    /// A leased job whose payload no longer decodes is dead-lettered on the
    /// spot and the next job is tried.
    ///
    /// # Errors
    /// Fails only when every store errored.
    pub async fn pop(&self, worker: &str) -> Result<Option<LeasedJob>, QueueError> {
        let lease = Duration::milliseconds(i64::try_from(self.config.read().await.lease_ms).unwrap_or(i64::MAX));
        let stores = self.pop_order().await;
        if stores.is_empty() {
            return Err(QueueError::StoreMissing("any"));
        }

        let mut last_error: Option<StoreError> = None;
        let mut reachable = 0;
        for (kind, store) in stores {
            loop {
                let job = match store.lease_next(worker, lease, Utc::now()).await {
                    Ok(Some(job)) => job,
                    Ok(None) => {
                        reachable += 1;
                        break;
                    }
                    Err(e) => {
                        warn!(store = store.name(), error = %e, "Lease failed");
                        last_error = Some(e);
                        break;
                    }
                };
                match job.decode() {
                    Ok(payload) => {
                        debug!(job_id = %job.id, store = store.name(), attempts = job.attempts, "Job leased");
                        return Ok(Some(LeasedJob {
                            job,
                            payload,
                            store: kind,
                        }));
                    }
                    Err(e) => {
                        error!(job_id = %job.id, job_type = %job.job_type, error = %e, "Undecodable job, dead-lettering");
                        store
                            .release(job.id, worker, JobRelease::Dead { error: e.to_string() })
                            .await?;
                    }
                }
            }
        }

        match last_error {
            Some(e) if reachable == 0 => Err(e.into()),
            _ => Ok(None),
        }
    }

    /// Polls until a job is leased or `max_wait` elapses. Sleeps the poll
    /// interval between attempts.
    ///
    /// # Errors
    /// Propagates [`pop`](Self::pop) failures.
    pub async fn pop_wait(&self, worker: &str, max_wait: std::time::Duration) -> Result<Option<LeasedJob>, QueueError> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            if let Some(job) = self.pop(worker).await? {
                return Ok(Some(job));
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let poll = std::time::Duration::from_millis(self.config.read().await.poll_interval_ms);
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }

    /// Marks a leased job completed.
    ///
    /// # Errors
    /// Fails when the store cannot be reached.
    pub async fn complete(&self, leased: &LeasedJob, worker: &str) -> Result<AckOutcome, QueueError> {
        let store = self.require(leased.store)?;
        if !store.release(leased.job.id, worker, JobRelease::Completed).await? {
            warn!(job_id = %leased.job.id, "Lease lost before completion");
            return Ok(AckOutcome::LeaseLost);
        }
        self.track(leased, RunOutcome::Succeeded).await;
        Ok(AckOutcome::Completed)
    }

    /// Records a failed attempt: back to pending with backoff, or dead once
    /// attempts reach the maximum.
    ///
    /// # Errors
    /// Fails when the store cannot be reached.
    pub async fn fail(&self, leased: &LeasedJob, worker: &str, error: &str) -> Result<AckOutcome, QueueError> {
        let attempts = leased.job.attempts;
        if attempts >= leased.job.max_attempts {
            return self.dead_letter(leased, worker, error).await;
        }
        let run_at = Utc::now() + self.backoff(attempts.saturating_sub(1)).await;
        let store = self.require(leased.store)?;
        let release = JobRelease::Retry {
            run_at,
            error: error.to_string(),
        };
        if !store.release(leased.job.id, worker, release).await? {
            warn!(job_id = %leased.job.id, "Lease lost before failure was recorded");
            return Ok(AckOutcome::LeaseLost);
        }
        warn!(job_id = %leased.job.id, attempts, max_attempts = leased.job.max_attempts, %run_at, error = error, "Job failed, retrying");
        self.track(leased, RunOutcome::Failed(error.to_string())).await;
        Ok(AckOutcome::Retrying { run_at })
    }

    /// Moves a leased job to dead, keeping `error`.
    ///
    /// # Errors
    /// Fails when the store cannot be reached.
    pub async fn dead_letter(&self, leased: &LeasedJob, worker: &str, error: &str) -> Result<AckOutcome, QueueError> {
        let store = self.require(leased.store)?;
        let release = JobRelease::Dead {
            error: error.to_string(),
        };
        if !store.release(leased.job.id, worker, release).await? {
            warn!(job_id = %leased.job.id, "Lease lost before dead-lettering");
            return Ok(AckOutcome::LeaseLost);
        }
        error!(job_id = %leased.job.id, job_type = %leased.job.job_type, error = error, "Job dead-lettered");
        self.track(leased, RunOutcome::Failed(error.to_string())).await;
        Ok(AckOutcome::Dead)
    }

    async fn backoff(&self, attempt: u32) -> Duration {
        let config = self.config.read().await;
        let ms = config
            .backoff_base_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(config.backoff_max_ms);
        Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
    }

    async fn track(&self, leased: &LeasedJob, outcome: RunOutcome) {
        if self.config.read().await.dual_run {
            self.dual_run
                .record(leased.job.id, &leased.job.job_type, leased.is_shadow(), outcome)
                .await;
        }
    }

    pub async fn dual_run_report(&self) -> DualRunReport {
        self.dual_run.report().await
    }

    /// Deletes completed jobs older than `before` from every store.
    /// Unreachable stores are skipped.
    pub async fn purge_completed(&self, before: DateTime<Utc>) -> u64 {
        let mut purged = 0;
        for store in [&self.database, &self.broker].into_iter().flatten() {
            match store.purge_completed(before).await {
                Ok(n) => purged += n,
                Err(e) => warn!(store = store.name(), error = %e, "Purge failed"),
            }
        }
        purged
    }

    /// Builds the health snapshot. An unreachable store is reported as
    /// unhealthy inside the snapshot.
    pub async fn health(&self) -> QueueHealth {
        let mode = self.execution_mode().await;

        let db_queue = match &self.database {
            Some(store) => match store.counts().await {
                Ok(counts) => DbQueueHealth {
                    healthy: true,
                    error: None,
                    counts,
                },
                Err(e) => DbQueueHealth {
                    healthy: false,
                    error: Some(e.to_string()),
                    counts: QueueCounts::default(),
                },
            },
            None => DbQueueHealth {
                healthy: false,
                error: Some("not configured".to_string()),
                counts: QueueCounts::default(),
            },
        };

        let broker_queues = match &self.broker {
            Some(store) => match store.depth_by_queue().await {
                Ok(queues) => BrokerQueueHealth {
                    healthy: true,
                    error: None,
                    total: queues.values().sum(),
                    queues,
                },
                Err(e) => BrokerQueueHealth {
                    healthy: false,
                    error: Some(e.to_string()),
                    queues: BTreeMap::new(),
                    total: 0,
                },
            },
            None => BrokerQueueHealth {
                healthy: false,
                error: Some("not configured".to_string()),
                queues: BTreeMap::new(),
                total: 0,
            },
        };

        let (primary_ok, secondary_ok) = match mode.primary {
            StoreKind::Database => (db_queue.healthy, broker_queues.healthy),
            StoreKind::Broker => (broker_queues.healthy, db_queue.healthy),
        };
        let status = match (primary_ok, secondary_ok) {
            (true, true) => "healthy",
            (true, false) if !mode.fallback_enabled && !mode.dual_run => "healthy",
            (false, true) if mode.fallback_enabled => "degraded",
            (true, false) => "degraded",
            _ => "unhealthy",
        };

        let mut recommendations = Vec::new();
        if !primary_ok {
            if mode.fallback_enabled {
                recommendations.push(format!(
                    "{} store is unreachable; jobs are served from the fallback",
                    mode.primary.as_str()
                ));
            } else {
                recommendations.push(format!(
                    "{} store is unreachable and fallback is disabled; enable fallback or restore the store",
                    mode.primary.as_str()
                ));
            }
        }
        if mode.dual_run && !secondary_ok {
            recommendations.push("dual-run is enabled but the secondary store is unreachable".to_string());
        }
        if db_queue.counts.dead > 0 {
            recommendations.push(format!(
                "{} dead-lettered jobs need inspection",
                db_queue.counts.dead
            ));
        }
        if db_queue.counts.pending + broker_queues.total > BACKLOG_WARNING {
            recommendations.push("job backlog is growing; consider adding workers".to_string());
        }

        QueueHealth {
            status,
            db_queue,
            broker_queues,
            execution_mode: mode,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sniper_data::MemoryJobStore;
    use sniper_domain::entities::{SnipeExecutionPayload, SyncPayload};
    use sniper_domain::enums::JobStatus;

    struct Setup {
        database: Arc<MemoryJobStore>,
        broker: Arc<MemoryJobStore>,
        halt: HaltSwitch,
        dispatcher: JobDispatcher,
    }

    fn setup(config: QueueConfig) -> Setup {
        let database = Arc::new(MemoryJobStore::new("database"));
        let broker = Arc::new(MemoryJobStore::new("broker"));
        let halt = HaltSwitch::new();
        let dispatcher = JobDispatcher::new(
            Some(database.clone()),
            Some(broker.clone()),
            &config,
            halt.clone(),
        );
        Setup {
            database,
            broker,
            halt,
            dispatcher,
        }
    }

    fn sync() -> JobPayload {
        JobPayload::Sync(SyncPayload::default())
    }

    #[tokio::test]
    async fn test_unknown_type_rejected_at_enqueue() {
        let s = setup(QueueConfig::default());
        let err = s.dispatcher.enqueue_raw("pattern_scan", &json!({}), None).await.unwrap_err();
        assert!(matches!(err, QueueError::Payload(_)));
        assert_eq!(s.database.counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_fallback_when_primary_down() {
        let s = setup(QueueConfig::default());
        s.database.set_available(false);

        let id = s.dispatcher.enqueue(sync()).await.unwrap();
        assert!(s.broker.get(id).await.unwrap().is_some());

        let leased = s.dispatcher.pop("w1").await.unwrap().unwrap();
        assert_eq!(leased.job.id, id);
        assert_eq!(leased.store, StoreKind::Broker);
    }

    #[tokio::test]
    async fn test_no_fallback_surfaces_error() {
        let s = setup(QueueConfig {
            fallback_enabled: false,
            ..QueueConfig::default()
        });
        s.database.set_available(false);
        assert!(matches!(
            s.dispatcher.enqueue(sync()).await.unwrap_err(),
            QueueError::Store(_)
        ));
    }

    #[tokio::test]
    async fn test_fail_backs_off() {
        let s = setup(QueueConfig::default());
        let id = s.dispatcher.enqueue(sync()).await.unwrap();

        let leased = s.dispatcher.pop("w1").await.unwrap().unwrap();
        let outcome = s.dispatcher.fail(&leased, "w1", "boom").await.unwrap();
        assert!(matches!(outcome, AckOutcome::Retrying { .. }));
        assert!(s.dispatcher.pop("w1").await.unwrap().is_none());

        let job = s.database.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);
        assert!(job.run_at > Utc::now());
    }

    #[tokio::test]
    async fn test_dead_after_max_attempts_exactly_once() {
        let s = setup(QueueConfig {
            max_attempts: 2,
            backoff_base_ms: 0,
            ..QueueConfig::default()
        });
        let id = s.dispatcher.enqueue(sync()).await.unwrap();

        let leased = s.dispatcher.pop("w1").await.unwrap().unwrap();
        assert!(matches!(
            s.dispatcher.fail(&leased, "w1", "boom").await.unwrap(),
            AckOutcome::Retrying { .. }
        ));
        let leased = s.dispatcher.pop("w1").await.unwrap().unwrap();
        assert_eq!(s.dispatcher.fail(&leased, "w1", "boom again").await.unwrap(), AckOutcome::Dead);

        let dead = s.database.get(id).await.unwrap().unwrap();
        assert_eq!(dead.status, JobStatus::Dead);
        assert_eq!(dead.attempts, 2);
        assert_eq!(dead.last_error.as_deref(), Some("boom again"));
        assert!(s.dispatcher.pop("w1").await.unwrap().is_none());
        // A stale ack of the dead job changes nothing.
        assert_eq!(s.dispatcher.fail(&leased, "w1", "late").await.unwrap(), AckOutcome::LeaseLost);
    }

    #[tokio::test]
    async fn test_crashing_worker_does_not_get_the_job_forever() {
        let s = setup(QueueConfig {
            max_attempts: 2,
            lease_ms: 1,
            fallback_enabled: false,
            ..QueueConfig::default()
        });
        let id = s.dispatcher.enqueue(sync()).await.unwrap();

        // Each worker leases and never acks.
        for worker in ["w1", "w2"] {
            assert!(s.dispatcher.pop(worker).await.unwrap().is_some());
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        assert!(s.dispatcher.pop("w3").await.unwrap().is_none());
        let dead = s.database.get(id).await.unwrap().unwrap();
        assert_eq!(dead.status, JobStatus::Dead);
        assert_eq!(dead.attempts, 2);
    }

    #[tokio::test]
    async fn test_malformed_job_dead_lettered_at_pop() {
        let s = setup(QueueConfig::default());
        let mut job = Job::new(&sync());
        job.payload = json!({"timeWindowHours": "soon"});
        let bad = s.database.insert(job).await.unwrap();
        let good = s.dispatcher.enqueue(sync()).await.unwrap();

        let leased = s.dispatcher.pop("w1").await.unwrap().unwrap();
        assert_eq!(leased.job.id, good);
        assert_eq!(s.database.get(bad).await.unwrap().unwrap().status, JobStatus::Dead);
    }

    #[tokio::test]
    async fn test_snipe_enqueue_refused_while_halted() {
        let s = setup(QueueConfig::default());
        s.halt.engage("emergency");
        let payload = JobPayload::SnipeExecution(SnipeExecutionPayload {
            target_id: Uuid::new_v4(),
        });
        assert!(matches!(
            s.dispatcher.enqueue(payload).await.unwrap_err(),
            QueueError::Halted(_)
        ));
        // Maintenance jobs still go through.
        s.dispatcher.enqueue(sync()).await.unwrap();
    }

    #[tokio::test]
    async fn test_dual_run_writes_shadow_and_pairs_outcomes() {
        let s = setup(QueueConfig {
            dual_run: true,
            ..QueueConfig::default()
        });
        let id = s.dispatcher.enqueue(sync()).await.unwrap();
        let shadow = s.broker.get(id).await.unwrap().unwrap();
        assert!(shadow.shadow);

        let first = s.dispatcher.pop("w1").await.unwrap().unwrap();
        assert!(!first.is_shadow());
        s.dispatcher.complete(&first, "w1").await.unwrap();
        let second = s.dispatcher.pop("w1").await.unwrap().unwrap();
        assert!(second.is_shadow());
        s.dispatcher.complete(&second, "w1").await.unwrap();

        let report = s.dispatcher.dual_run_report().await;
        assert_eq!(report.matched, 1);
        assert_eq!(report.mismatched, 0);
    }

    #[tokio::test]
    async fn test_periodic_set_dedups() {
        let s = setup(QueueConfig::default());
        let first = s.dispatcher.enqueue_periodic_set().await.unwrap();
        let second = s.dispatcher.enqueue_periodic_set().await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert_eq!(s.database.counts().await.unwrap().pending, 3);
    }

    #[tokio::test]
    async fn test_health_degrades_instead_of_failing() {
        let s = setup(QueueConfig::default());
        s.dispatcher.enqueue(sync()).await.unwrap();
        s.database.set_available(false);

        let health = s.dispatcher.health().await;
        assert_eq!(health.status, "degraded");
        assert!(!health.db_queue.healthy);
        assert!(health.broker_queues.healthy);
        assert!(!health.recommendations.is_empty());

        let wire = serde_json::to_value(&health).unwrap();
        assert_eq!(wire["executionMode"]["primary"], "database");
        assert_eq!(wire["dbQueue"]["pending"], 0);
        assert_eq!(wire["brokerQueues"]["total"], 0);
    }
}
