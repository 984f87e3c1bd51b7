//! Background job records and their typed payloads.
//!
//! Payloads travel as `{ "type": ..., "payload": ... }`. Both the enqueue
//! and the pop side go through [`JobPayload::from_parts`], so a record whose
//! type or body does not decode never reaches a handler.

use crate::enums::JobStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Default number of attempts before a job is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobPayloadError {
    #[error("unknown job type: {0}")]
    UnknownType(String),

    #[error("malformed {job_type} payload: {reason}")]
    Malformed { job_type: JobType, reason: String },

    #[error("invalid {job_type} payload: {reason}")]
    Invalid { job_type: JobType, reason: String },
}

/// Discriminant of [`JobPayload`]; also names the broker queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Sync,
    RiskCheck,
    Housekeeping,
    SnipeExecution,
}

impl JobType {
    pub const ALL: [JobType; 4] = [
        JobType::Sync,
        JobType::RiskCheck,
        JobType::Housekeeping,
        JobType::SnipeExecution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::RiskCheck => "risk_check",
            Self::Housekeeping => "housekeeping",
            Self::SnipeExecution => "snipe_execution",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = JobPayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(Self::Sync),
            "risk_check" => Ok(Self::RiskCheck),
            "housekeeping" => Ok(Self::Housekeeping),
            "snipe_execution" => Ok(Self::SnipeExecution),
            other => Err(JobPayloadError::UnknownType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SyncPayload {
    /// How far ahead of now the calendar is pulled.
    #[serde(default = "default_time_window_hours")]
    pub time_window_hours: u32,
    #[serde(default)]
    pub force_sync: bool,
}

fn default_time_window_hours() -> u32 {
    72
}

impl Default for SyncPayload {
    fn default() -> Self {
        Self {
            time_window_hours: default_time_window_hours(),
            force_sync: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RiskCheckPayload {
    /// Restricts the check to one owner; all owners when absent.
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HousekeepingPayload {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_retention_days() -> u32 {
    7
}

impl Default for HousekeepingPayload {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SnipeExecutionPayload {
    pub target_id: Uuid,
}

/// Tagged job payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum JobPayload {
    Sync(SyncPayload),
    RiskCheck(RiskCheckPayload),
    Housekeeping(HousekeepingPayload),
    SnipeExecution(SnipeExecutionPayload),
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            Self::Sync(_) => JobType::Sync,
            Self::RiskCheck(_) => JobType::RiskCheck,
            Self::Housekeeping(_) => JobType::Housekeeping,
            Self::SnipeExecution(_) => JobType::SnipeExecution,
        }
    }

    /// Decodes and validates a stored `(type, payload)` pair.
    pub fn from_parts(job_type: &str, payload: &serde_json::Value) -> Result<Self, JobPayloadError> {
        let job_type: JobType = job_type.parse()?;
        let malformed = |e: serde_json::Error| JobPayloadError::Malformed {
            job_type,
            reason: e.to_string(),
        };
        // A null body stands for "all defaults".
        let body = if payload.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            payload.clone()
        };
        let decoded = match job_type {
            JobType::Sync => Self::Sync(serde_json::from_value(body).map_err(malformed)?),
            JobType::RiskCheck => Self::RiskCheck(serde_json::from_value(body).map_err(malformed)?),
            JobType::Housekeeping => {
                Self::Housekeeping(serde_json::from_value(body).map_err(malformed)?)
            }
            JobType::SnipeExecution => {
                Self::SnipeExecution(serde_json::from_value(body).map_err(malformed)?)
            }
        };
        decoded.validate()?;
        Ok(decoded)
    }

    /// Range checks that serde cannot express.
    pub fn validate(&self) -> Result<(), JobPayloadError> {
        let invalid = |reason: &str| JobPayloadError::Invalid {
            job_type: self.job_type(),
            reason: reason.to_string(),
        };
        match self {
            Self::Sync(p) if p.time_window_hours == 0 || p.time_window_hours > 24 * 30 => {
                Err(invalid("timeWindowHours must be within 1..=720"))
            }
            Self::RiskCheck(p) if p.owner.as_deref().is_some_and(str::is_empty) => {
                Err(invalid("owner must not be empty"))
            }
            Self::Housekeeping(p) if p.retention_days == 0 => {
                Err(invalid("retentionDays must be at least 1"))
            }
            Self::SnipeExecution(p) if p.target_id.is_nil() => {
                Err(invalid("targetId must not be nil"))
            }
            _ => Ok(()),
        }
    }

    /// Body stored alongside the type column.
    pub fn body(&self) -> serde_json::Value {
        let value = match self {
            Self::Sync(p) => serde_json::to_value(p),
            Self::RiskCheck(p) => serde_json::to_value(p),
            Self::Housekeeping(p) => serde_json::to_value(p),
            Self::SnipeExecution(p) => serde_json::to_value(p),
        };
        value.unwrap_or(serde_json::Value::Null)
    }

    /// The set enqueued on every periodic trigger.
    pub fn periodic_set() -> Vec<JobPayload> {
        vec![
            Self::Sync(SyncPayload::default()),
            Self::RiskCheck(RiskCheckPayload::default()),
            Self::Housekeeping(HousekeepingPayload::default()),
        ]
    }
}

/// A job as held by a backing store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// Attempts started so far, counted when a lease is taken.
    pub attempts: u32,
    pub max_attempts: u32,
    /// Not leasable before this instant.
    pub run_at: DateTime<Utc>,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub dedup_key: Option<String>,
    /// Comparison copy written by dual-run mode.
    pub shadow: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(payload: &JobPayload) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type: payload.job_type().as_str().to_string(),
            payload: payload.body(),
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            run_at: now,
            lease_owner: None,
            lease_expires_at: None,
            last_error: None,
            dedup_key: None,
            shadow: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Copy of this job for the secondary store in dual-run mode. Keeps the id.
    pub fn shadow_copy(&self) -> Self {
        Self {
            shadow: true,
            ..self.clone()
        }
    }

    pub fn decode(&self) -> Result<JobPayload, JobPayloadError> {
        JobPayload::from_parts(&self.job_type, &self.payload)
    }

    /// Leasable at `now`: pending and due, or running with an expired lease.
    pub fn is_leasable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Pending => self.run_at <= now,
            JobStatus::Running => {
                self.lease_expires_at.is_some_and(|at| at < now) && self.attempts < self.max_attempts
            }
            JobStatus::Completed | JobStatus::Dead => false,
        }
    }

    /// Running with an expired lease and no attempts left.
    pub fn lease_exhausted(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Running
            && self.lease_expires_at.is_some_and(|at| at < now)
            && self.attempts >= self.max_attempts
    }

    /// Holds a live lease owned by `worker`.
    pub fn is_leased_by(&self, worker: &str) -> bool {
        self.status == JobStatus::Running && self.lease_owner.as_deref() == Some(worker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_unknown_type_rejected() {
        let err = JobPayload::from_parts("pattern_scan", &json!({})).unwrap_err();
        assert_eq!(err, JobPayloadError::UnknownType("pattern_scan".to_string()));
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let payload = JobPayload::from_parts("sync", &serde_json::Value::Null).unwrap();
        assert_eq!(payload, JobPayload::Sync(SyncPayload::default()));

        let payload = JobPayload::from_parts("housekeeping", &json!({"retentionDays": 3})).unwrap();
        assert_eq!(
            payload,
            JobPayload::Housekeeping(HousekeepingPayload { retention_days: 3 })
        );
    }

    #[test]
    fn test_malformed_and_invalid_payloads() {
        let err = JobPayload::from_parts("snipe_execution", &json!({"target": "x"})).unwrap_err();
        assert!(matches!(err, JobPayloadError::Malformed { job_type: JobType::SnipeExecution, .. }));

        let err = JobPayload::from_parts("sync", &json!({"timeWindowHours": 0})).unwrap_err();
        assert!(matches!(err, JobPayloadError::Invalid { job_type: JobType::Sync, .. }));

        let err = JobPayload::from_parts("housekeeping", &json!({"retentionDays": "soon"})).unwrap_err();
        assert!(matches!(err, JobPayloadError::Malformed { .. }));
    }

    #[test]
    fn test_tagged_wire_format() {
        let payload = JobPayload::RiskCheck(RiskCheckPayload {
            owner: Some("user-1".to_string()),
        });
        let wire = serde_json::to_value(&payload).unwrap();
        assert_eq!(wire, json!({"type": "risk_check", "payload": {"owner": "user-1"}}));

        let job = Job::new(&payload);
        assert_eq!(job.job_type, "risk_check");
        assert_eq!(job.decode().unwrap(), payload);
    }

    #[test]
    fn test_leasable() {
        let now = Utc::now();
        let mut job = Job::new(&JobPayload::Sync(SyncPayload::default()));
        job.run_at = now - Duration::seconds(1);
        assert!(job.is_leasable(now));

        job.run_at = now + Duration::seconds(10);
        assert!(!job.is_leasable(now));

        job.status = JobStatus::Running;
        job.lease_owner = Some("w1".to_string());
        job.lease_expires_at = Some(now + Duration::seconds(30));
        assert!(!job.is_leasable(now));
        assert!(job.is_leased_by("w1"));
        assert!(!job.is_leased_by("w2"));

        job.lease_expires_at = Some(now - Duration::seconds(1));
        assert!(job.is_leasable(now));
        assert!(!job.lease_exhausted(now));

        job.attempts = job.max_attempts;
        assert!(!job.is_leasable(now));
        assert!(job.lease_exhausted(now));

        job.status = JobStatus::Dead;
        assert!(!job.is_leasable(now));
    }
}
