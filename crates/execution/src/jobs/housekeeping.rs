use crate::error::JobError;
use crate::lifecycle::LifecycleTracker;
use crate::queue::{JobContext, JobDispatcher, JobHandler};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sniper_domain::entities::{JobPayload, JobType};
use std::sync::Arc;
use tracing::info;

/// Purges completed jobs and finished target history past retention.
pub struct HousekeepingHandler {
    dispatcher: Arc<JobDispatcher>,
    tracker: Arc<LifecycleTracker>,
}

impl HousekeepingHandler {
    pub fn new(dispatcher: Arc<JobDispatcher>, tracker: Arc<LifecycleTracker>) -> Self {
        Self { dispatcher, tracker }
    }
}

#[async_trait]
impl JobHandler for HousekeepingHandler {
    fn job_type(&self) -> JobType {
        JobType::Housekeeping
    }

    async fn handle(&self, ctx: &JobContext, payload: &JobPayload) -> Result<(), JobError> {
        let JobPayload::Housekeeping(housekeeping) = payload else {
            return Err(JobError::Fatal(format!("expected housekeeping payload, got {}", payload.job_type())));
        };
        if ctx.shadow {
            return Ok(());
        }

        let cutoff = Utc::now() - Duration::days(i64::from(housekeeping.retention_days));
        let jobs = self.dispatcher.purge_completed(cutoff).await;
        let targets = self.tracker.prune_finished(cutoff).await;
        info!(
            retention_days = housekeeping.retention_days,
            jobs_purged = jobs,
            target_histories_pruned = targets,
            "Housekeeping finished"
        );
        Ok(())
    }
}
