//! Persistence seams used by the kernel.
//!
//! Every mutation of a target, job or position is an optimistic update
//! guarded by the status the caller last observed. A `false` return means
//! somebody else moved the record first; callers treat it as "lost the race",
//! not as an error.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sniper_domain::entities::{ExecutionRecord, Job, Position, PositionId, SnipeTarget};
use sniper_domain::enums::{PositionStatus, TargetStatus};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Per-status job counts of one store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub dead: u64,
}

impl QueueCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.running + self.completed + self.dead
    }
}

/// How a leased job leaves the `running` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRelease {
    Completed,
    /// Back to `pending`, not leasable before `run_at`.
    Retry { run_at: DateTime<Utc>, error: String },
    /// Terminal. The error is kept for inspection.
    Dead { error: String },
}

/// Error kept on a job whose lease expired on its last allowed attempt.
pub const LEASE_EXHAUSTED: &str = "lease expired on final attempt";

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Short name used in logs and health output.
    fn name(&self) -> &str;

    /// Inserts a pending job. When the job carries a dedup key that already
    /// belongs to a pending or running job, returns that job's id instead.
    async fn insert(&self, job: Job) -> Result<Uuid, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Atomically leases the oldest leasable job to `worker` until
    /// `now + lease` and counts the attempt. Jobs whose lease expired are
    /// leasable again unless that lease was their last attempt; those are
    /// moved to `dead` with [`LEASE_EXHAUSTED`].
    async fn lease_next(
        &self,
        worker: &str,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError>;

    /// Releases a job held by `worker`. Returns `false` when the lease was
    /// lost (expired and re-leased, or already released).
    async fn release(&self, id: Uuid, worker: &str, release: JobRelease) -> Result<bool, StoreError>;

    async fn counts(&self) -> Result<QueueCounts, StoreError>;

    /// Pending jobs per queue (job type).
    async fn depth_by_queue(&self) -> Result<BTreeMap<String, u64>, StoreError>;

    /// Deletes completed jobs last updated before `before`.
    async fn purge_completed(&self, before: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn insert(&self, target: SnipeTarget) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<SnipeTarget>, StoreError>;

    async fn list_by_status(&self, status: TargetStatus) -> Result<Vec<SnipeTarget>, StoreError>;

    /// Eligible targets in dispatch order, at most `limit`.
    async fn find_eligible(
        &self,
        now: DateTime<Utc>,
        advance_window: Duration,
        limit: usize,
    ) -> Result<Vec<SnipeTarget>, StoreError>;

    /// Writes `target` only if the stored status is still `expected`.
    async fn update_guarded(
        &self,
        target: &SnipeTarget,
        expected: TargetStatus,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn insert(&self, position: Position) -> Result<(), StoreError>;

    async fn get(&self, id: PositionId) -> Result<Option<Position>, StoreError>;

    async fn list_open(&self) -> Result<Vec<Position>, StoreError>;

    /// Writes `position` only if the stored status is still `expected`.
    async fn update_guarded(
        &self,
        position: &Position,
        expected: PositionStatus,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: ExecutionRecord) -> Result<(), StoreError>;

    /// Most recent records first.
    async fn recent(&self, limit: usize) -> Result<Vec<ExecutionRecord>, StoreError>;
}
