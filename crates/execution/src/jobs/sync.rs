//! Calendar sync: pulls upcoming listings from discovery into the target store.

use crate::error::{JobError, LifecycleError};
use crate::lifecycle::TargetLifecycleManager;
use crate::queue::{JobContext, JobHandler};
use crate::safety::SafetyCoordinator;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sniper_domain::entities::{JobPayload, JobType, SnipeTarget};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Upstream discovery. Supplies already-scored targets.
#[async_trait]
pub trait TargetSource: Send + Sync {
    /// Targets whose execution time falls within `window` of now, plus
    /// immediate ones.
    async fn upcoming(&self, window: Duration, force: bool) -> Result<Vec<SnipeTarget>, String>;
}

/// Fixed list of targets, for paper trading and tests.
#[derive(Default)]
pub struct StaticTargetSource {
    targets: RwLock<Vec<SnipeTarget>>,
}

impl StaticTargetSource {
    pub fn new(targets: Vec<SnipeTarget>) -> Self {
        Self {
            targets: RwLock::new(targets),
        }
    }

    pub async fn push(&self, target: SnipeTarget) {
        self.targets.write().await.push(target);
    }
}

#[async_trait]
impl TargetSource for StaticTargetSource {
    async fn upcoming(&self, window: Duration, _force: bool) -> Result<Vec<SnipeTarget>, String> {
        let horizon = Utc::now() + window;
        Ok(self
            .targets
            .read()
            .await
            .iter()
            .filter(|t| t.target_execution_time.is_none_or(|at| at <= horizon))
            .cloned()
            .collect())
    }
}

pub struct SyncHandler {
    source: Arc<dyn TargetSource>,
    lifecycle: Arc<TargetLifecycleManager>,
    safety: Option<Arc<SafetyCoordinator>>,
}

impl SyncHandler {
    pub fn new(source: Arc<dyn TargetSource>, lifecycle: Arc<TargetLifecycleManager>) -> Self {
        Self {
            source,
            lifecycle,
            safety: None,
        }
    }

    /// Reports every non-shadow fetch to `safety` as a detection outcome.
    #[must_use]
    pub fn with_safety(mut self, safety: Arc<SafetyCoordinator>) -> Self {
        self.safety = Some(safety);
        self
    }
}

#[async_trait]
impl JobHandler for SyncHandler {
    fn job_type(&self) -> JobType {
        JobType::Sync
    }

    async fn handle(&self, ctx: &JobContext, payload: &JobPayload) -> Result<(), JobError> {
        let JobPayload::Sync(sync) = payload else {
            return Err(JobError::Fatal(format!("expected sync payload, got {}", payload.job_type())));
        };
        let window = Duration::hours(i64::from(sync.time_window_hours));
        let fetched = self.source.upcoming(window, sync.force_sync).await;
        if !ctx.shadow
            && let Some(safety) = &self.safety
        {
            safety.record_detection(fetched.is_ok());
        }
        let upcoming = fetched.map_err(JobError::Retryable)?;

        if ctx.shadow {
            debug!(job_id = %ctx.job_id, found = upcoming.len(), "Shadow sync, nothing written");
            return Ok(());
        }

        let mut added = 0;
        for target in upcoming {
            let known = self
                .lifecycle
                .targets()
                .get(target.id)
                .await
                .map_err(|e| JobError::Retryable(e.to_string()))?;
            if known.is_some() {
                continue;
            }
            match self.lifecycle.submit(target).await {
                Ok(_) => added += 1,
                Err(LifecycleError::InvalidTarget(reason)) => {
                    warn!(reason = %reason, "Discovery handed over an invalid target");
                }
                Err(e) => return Err(JobError::Retryable(e.to_string())),
            }
        }

        let promoted = self
            .lifecycle
            .promote(Utc::now())
            .await
            .map_err(|e| JobError::Retryable(e.to_string()))?;
        info!(
            added,
            activated = promoted.activated,
            ready = promoted.ready,
            missed = promoted.missed,
            abandoned = promoted.abandoned,
            "Calendar sync finished"
        );
        Ok(())
    }
}
