//! In-memory stores.
//!
//! [`MemoryJobStore`] doubles as the lightweight broker-style queue: one
//! named queue per job type, leases held in process memory.

use crate::error::StoreError;
use crate::stores::{
    HistoryStore, JobRelease, JobStore, LEASE_EXHAUSTED, PositionStore, QueueCounts, TargetStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sniper_domain::entities::{
    ExecutionRecord, Job, Position, PositionId, SnipeTarget, dispatch_order,
};
use sniper_domain::enums::{JobStatus, PositionStatus, TargetStatus};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Broker-style job queue held in memory.
#[derive(Clone)]
pub struct MemoryJobStore {
    name: String,
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
    available: Arc<AtomicBool>,
}

impl MemoryJobStore {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulates the broker going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(self.name.clone()))
        }
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new("broker")
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, job: Job) -> Result<Uuid, StoreError> {
        self.ensure_available()?;
        let mut jobs = self.jobs.write().await;
        if let Some(key) = job.dedup_key.as_deref()
            && let Some(existing) = jobs.values().find(|j| {
                j.dedup_key.as_deref() == Some(key)
                    && matches!(j.status, JobStatus::Pending | JobStatus::Running)
            })
        {
            debug!(store = %self.name, dedup_key = key, job_id = %existing.id, "Dedup hit");
            return Ok(existing.id);
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        self.ensure_available()?;
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn lease_next(
        &self,
        worker: &str,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        self.ensure_available()?;
        let mut jobs = self.jobs.write().await;
        for job in jobs.values_mut().filter(|j| j.lease_exhausted(now)) {
            debug!(store = %self.name, job_id = %job.id, attempts = job.attempts, "Lease expired on last attempt, dead-lettering");
            job.status = JobStatus::Dead;
            job.last_error = Some(LEASE_EXHAUSTED.to_string());
            job.lease_owner = None;
            job.lease_expires_at = None;
            job.updated_at = now;
        }
        let next = jobs
            .values_mut()
            .filter(|j| j.is_leasable(now))
            .min_by_key(|j| (j.run_at, j.created_at));
        let Some(job) = next else {
            return Ok(None);
        };
        job.status = JobStatus::Running;
        job.attempts += 1;
        job.lease_owner = Some(worker.to_string());
        job.lease_expires_at = Some(now + lease);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn release(&self, id: Uuid, worker: &str, release: JobRelease) -> Result<bool, StoreError> {
        self.ensure_available()?;
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(false);
        };
        if !job.is_leased_by(worker) {
            return Ok(false);
        }
        match release {
            JobRelease::Completed => job.status = JobStatus::Completed,
            JobRelease::Retry { run_at, error } => {
                job.status = JobStatus::Pending;
                job.run_at = run_at;
                job.last_error = Some(error);
            }
            JobRelease::Dead { error } => {
                job.status = JobStatus::Dead;
                job.last_error = Some(error);
            }
        }
        job.lease_owner = None;
        job.lease_expires_at = None;
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn counts(&self) -> Result<QueueCounts, StoreError> {
        self.ensure_available()?;
        let jobs = self.jobs.read().await;
        let mut counts = QueueCounts::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Dead => counts.dead += 1,
            }
        }
        Ok(counts)
    }

    async fn depth_by_queue(&self) -> Result<BTreeMap<String, u64>, StoreError> {
        self.ensure_available()?;
        let jobs = self.jobs.read().await;
        let mut depth = BTreeMap::new();
        for job in jobs.values().filter(|j| j.status == JobStatus::Pending) {
            *depth.entry(job.job_type.clone()).or_insert(0) += 1;
        }
        Ok(depth)
    }

    async fn purge_completed(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        self.ensure_available()?;
        let mut jobs = self.jobs.write().await;
        let start = jobs.len();
        jobs.retain(|_, j| !(j.status == JobStatus::Completed && j.updated_at < before));
        Ok((start - jobs.len()) as u64)
    }
}

#[derive(Clone, Default)]
pub struct MemoryTargetStore {
    targets: Arc<RwLock<HashMap<Uuid, SnipeTarget>>>,
}

impl MemoryTargetStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TargetStore for MemoryTargetStore {
    async fn insert(&self, target: SnipeTarget) -> Result<(), StoreError> {
        self.targets.write().await.insert(target.id, target);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SnipeTarget>, StoreError> {
        Ok(self.targets.read().await.get(&id).cloned())
    }

    async fn list_by_status(&self, status: TargetStatus) -> Result<Vec<SnipeTarget>, StoreError> {
        let targets = self.targets.read().await;
        let mut found: Vec<_> = targets.values().filter(|t| t.status == status).cloned().collect();
        found.sort_by(dispatch_order);
        Ok(found)
    }

    async fn find_eligible(
        &self,
        now: DateTime<Utc>,
        advance_window: Duration,
        limit: usize,
    ) -> Result<Vec<SnipeTarget>, StoreError> {
        let targets = self.targets.read().await;
        let mut eligible: Vec<_> = targets
            .values()
            .filter(|t| t.is_eligible(now, advance_window))
            .cloned()
            .collect();
        eligible.sort_by(dispatch_order);
        eligible.truncate(limit);
        Ok(eligible)
    }

    async fn update_guarded(
        &self,
        target: &SnipeTarget,
        expected: TargetStatus,
    ) -> Result<bool, StoreError> {
        let mut targets = self.targets.write().await;
        match targets.get_mut(&target.id) {
            Some(stored) if stored.status == expected => {
                *stored = target.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(target.id.to_string())),
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryPositionStore {
    positions: Arc<RwLock<HashMap<PositionId, Position>>>,
}

impl MemoryPositionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PositionStore for MemoryPositionStore {
    async fn insert(&self, position: Position) -> Result<(), StoreError> {
        self.positions.write().await.insert(position.id, position);
        Ok(())
    }

    async fn get(&self, id: PositionId) -> Result<Option<Position>, StoreError> {
        Ok(self.positions.read().await.get(&id).cloned())
    }

    async fn list_open(&self) -> Result<Vec<Position>, StoreError> {
        let positions = self.positions.read().await;
        let mut open: Vec<_> = positions.values().filter(|p| p.status.is_open()).cloned().collect();
        open.sort_by_key(|p| p.entry_time);
        Ok(open)
    }

    async fn update_guarded(
        &self,
        position: &Position,
        expected: PositionStatus,
    ) -> Result<bool, StoreError> {
        let mut positions = self.positions.write().await;
        match positions.get_mut(&position.id) {
            Some(stored) if stored.status == expected => {
                *stored = position.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(position.id.to_string())),
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryHistoryStore {
    records: Arc<RwLock<Vec<ExecutionRecord>>>,
}

impl MemoryHistoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, record: ExecutionRecord) -> Result<(), StoreError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ExecutionRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sniper_domain::entities::JobPayload;
    use sniper_domain::entities::job::SyncPayload;

    fn sync_job() -> Job {
        Job::new(&JobPayload::Sync(SyncPayload::default()))
    }

    #[tokio::test]
    async fn test_lease_is_exclusive_until_expiry() {
        let store = MemoryJobStore::default();
        let now = Utc::now();
        let id = store.insert(sync_job()).await.unwrap();

        let first = store.lease_next("w1", Duration::seconds(30), now).await.unwrap();
        assert_eq!(first.map(|j| j.id), Some(id));
        let second = store.lease_next("w2", Duration::seconds(30), now).await.unwrap();
        assert!(second.is_none());

        // Lease expired: the job is recovered by the next lease call.
        let later = now + Duration::seconds(31);
        let recovered = store.lease_next("w2", Duration::seconds(30), later).await.unwrap().unwrap();
        assert_eq!(recovered.id, id);
        assert_eq!(recovered.lease_owner.as_deref(), Some("w2"));

        // The original holder lost its lease.
        assert!(!store.release(id, "w1", JobRelease::Completed).await.unwrap());
        assert!(store.release(id, "w2", JobRelease::Completed).await.unwrap());
        assert_eq!(store.counts().await.unwrap().completed, 1);
    }

    #[tokio::test]
    async fn test_expired_leases_count_as_attempts() {
        let store = MemoryJobStore::default();
        let now = Utc::now();
        let id = store.insert(sync_job().with_max_attempts(2)).await.unwrap();
        let lease = Duration::seconds(30);

        let first = store.lease_next("w1", lease, now).await.unwrap().unwrap();
        assert_eq!(first.attempts, 1);
        let second = store
            .lease_next("w2", lease, now + Duration::seconds(31))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.attempts, 2);

        // Both workers died holding the lease; the job is not handed out again.
        let third = store.lease_next("w3", lease, now + Duration::seconds(62)).await.unwrap();
        assert!(third.is_none());
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Dead);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.last_error.as_deref(), Some(LEASE_EXHAUSTED));
    }

    #[tokio::test]
    async fn test_dead_is_terminal() {
        let store = MemoryJobStore::default();
        let now = Utc::now();
        let id = store.insert(sync_job()).await.unwrap();
        store.lease_next("w1", Duration::seconds(30), now).await.unwrap();
        let released = store
            .release(id, "w1", JobRelease::Dead { error: "boom".to_string() })
            .await
            .unwrap();
        assert!(released);

        let far = now + Duration::days(1);
        assert!(store.lease_next("w1", Duration::seconds(30), far).await.unwrap().is_none());
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Dead);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_dedup_key_returns_existing_job() {
        let store = MemoryJobStore::default();
        let a = store.insert(sync_job().with_dedup_key("sync-1")).await.unwrap();
        let b = store.insert(sync_job().with_dedup_key("sync-1")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.counts().await.unwrap().pending, 1);
        assert_eq!(store.depth_by_queue().await.unwrap().get("sync"), Some(&1));
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = MemoryJobStore::default();
        store.set_available(false);
        let err = store.counts().await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_target_update_is_status_guarded() {
        let store = MemoryTargetStore::new();
        let mut target = SnipeTarget::new("user-1", "NEWUSDT", dec!(50));
        target.status = TargetStatus::Ready;
        store.insert(target.clone()).await.unwrap();

        let mut claim = target.clone();
        claim.status = TargetStatus::Executing;
        assert!(store.update_guarded(&claim, TargetStatus::Ready).await.unwrap());
        assert!(!store.update_guarded(&claim, TargetStatus::Ready).await.unwrap());
    }
}
