//! PostgreSQL job table.

use super::{text_column, u32_column};
use crate::error::StoreError;
use crate::stores::{JobRelease, JobStore, LEASE_EXHAUSTED, QueueCounts};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sniper_domain::entities::Job;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

fn job_from_row(row: &PgRow) -> Result<Job, sqlx::Error> {
    Ok(Job {
        id: row.try_get("id")?,
        job_type: row.try_get("job_type")?,
        payload: row.try_get("payload")?,
        status: text_column(row, "status")?,
        attempts: u32_column(row, "attempts")?,
        max_attempts: u32_column(row, "max_attempts")?,
        run_at: row.try_get("run_at")?,
        lease_owner: row.try_get("lease_owner")?,
        lease_expires_at: row.try_get("lease_expires_at")?,
        last_error: row.try_get("last_error")?,
        dedup_key: row.try_get("dedup_key")?,
        shadow: row.try_get("shadow")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Durable relational job queue.
#[derive(Clone)]
pub struct JobRepository {
    pool: Arc<PgPool>,
}

impl JobRepository {
    /// Creates a new JobRepository.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn find_active_by_dedup_key(&self, key: &str) -> Result<Option<Uuid>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id FROM jobs WHERE dedup_key = $1 AND status IN ('pending', 'running') LIMIT 1",
        )
        .bind(key)
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.map(|r| r.try_get("id")).transpose()
    }
}

#[async_trait]
impl JobStore for JobRepository {
    fn name(&self) -> &str {
        "database"
    }

    async fn insert(&self, job: Job) -> Result<Uuid, StoreError> {
        if let Some(key) = job.dedup_key.as_deref()
            && let Some(existing) = self.find_active_by_dedup_key(key).await?
        {
            debug!(dedup_key = key, job_id = %existing, "Dedup hit");
            return Ok(existing);
        }

        let row = sqlx::query(
            r#"
            INSERT INTO jobs (id, job_type, payload, status, attempts, max_attempts, run_at,
                              dedup_key, shadow, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (dedup_key) WHERE dedup_key IS NOT NULL AND status IN ('pending', 'running')
            DO NOTHING
            RETURNING id
            "#,
        )
        .bind(job.id)
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(job.status.as_str())
        .bind(job.attempts as i32)
        .bind(job.max_attempts as i32)
        .bind(job.run_at)
        .bind(job.dedup_key.as_deref())
        .bind(job.shadow)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_optional(self.pool.as_ref())
        .await?;

        match row {
            Some(row) => Ok(row.try_get("id")?),
            // Lost a dedup race with a concurrent insert.
            None => match job.dedup_key.as_deref() {
                Some(key) => self
                    .find_active_by_dedup_key(key)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(key.to_string())),
                None => Err(StoreError::NotFound(job.id.to_string())),
            },
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;
        Ok(row.as_ref().map(job_from_row).transpose()?)
    }

    async fn lease_next(
        &self,
        worker: &str,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        let exhausted = sqlx::query(
            r#"
            UPDATE jobs SET status = 'dead', last_error = $2, lease_owner = NULL,
                lease_expires_at = NULL, updated_at = $1
            WHERE status = 'running' AND lease_expires_at < $1 AND attempts >= max_attempts
            "#,
        )
        .bind(now)
        .bind(LEASE_EXHAUSTED)
        .execute(self.pool.as_ref())
        .await?;
        if exhausted.rows_affected() > 0 {
            debug!(count = exhausted.rows_affected(), "Dead-lettered jobs whose final lease expired");
        }

        let row = sqlx::query(
            r#"
            UPDATE jobs SET
                status = 'running',
                attempts = attempts + 1,
                lease_owner = $1,
                lease_expires_at = $2,
                updated_at = $3
            WHERE id = (
                SELECT id FROM jobs
                WHERE (status = 'pending' AND run_at <= $3)
                   OR (status = 'running' AND lease_expires_at < $3 AND attempts < max_attempts)
                ORDER BY run_at, created_at
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker)
        .bind(now + lease)
        .bind(now)
        .fetch_optional(self.pool.as_ref())
        .await?;
        Ok(row.as_ref().map(job_from_row).transpose()?)
    }

    async fn release(&self, id: Uuid, worker: &str, release: JobRelease) -> Result<bool, StoreError> {
        let result = match release {
            JobRelease::Completed => {
                sqlx::query(
                    r#"
                    UPDATE jobs SET status = 'completed', lease_owner = NULL,
                        lease_expires_at = NULL, updated_at = NOW()
                    WHERE id = $1 AND status = 'running' AND lease_owner = $2
                    "#,
                )
                .bind(id)
                .bind(worker)
                .execute(self.pool.as_ref())
                .await?
            }
            JobRelease::Retry { run_at, error } => {
                sqlx::query(
                    r#"
                    UPDATE jobs SET status = 'pending', run_at = $3,
                        last_error = $4, lease_owner = NULL, lease_expires_at = NULL,
                        updated_at = NOW()
                    WHERE id = $1 AND status = 'running' AND lease_owner = $2
                    "#,
                )
                .bind(id)
                .bind(worker)
                .bind(run_at)
                .bind(error)
                .execute(self.pool.as_ref())
                .await?
            }
            JobRelease::Dead { error } => {
                sqlx::query(
                    r#"
                    UPDATE jobs SET status = 'dead', last_error = $3,
                        lease_owner = NULL, lease_expires_at = NULL, updated_at = NOW()
                    WHERE id = $1 AND status = 'running' AND lease_owner = $2
                    "#,
                )
                .bind(id)
                .bind(worker)
                .bind(error)
                .execute(self.pool.as_ref())
                .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    async fn counts(&self) -> Result<QueueCounts, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM jobs GROUP BY status")
            .fetch_all(self.pool.as_ref())
            .await?;
        let mut counts = QueueCounts::default();
        for row in &rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            let n = n.max(0) as u64;
            match status.as_str() {
                "pending" => counts.pending = n,
                "running" => counts.running = n,
                "completed" => counts.completed = n,
                "dead" => counts.dead = n,
                other => return Err(StoreError::Decode(format!("unknown job status {other}"))),
            }
        }
        Ok(counts)
    }

    async fn depth_by_queue(&self) -> Result<BTreeMap<String, u64>, StoreError> {
        let rows = sqlx::query(
            "SELECT job_type, COUNT(*) AS n FROM jobs WHERE status = 'pending' GROUP BY job_type",
        )
        .fetch_all(self.pool.as_ref())
        .await?;
        let mut depth = BTreeMap::new();
        for row in &rows {
            let job_type: String = row.try_get("job_type")?;
            let n: i64 = row.try_get("n")?;
            depth.insert(job_type, n.max(0) as u64);
        }
        Ok(depth)
    }

    async fn purge_completed(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM jobs WHERE status = 'completed' AND updated_at < $1")
            .bind(before)
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}
