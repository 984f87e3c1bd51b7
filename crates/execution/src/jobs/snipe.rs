use crate::error::{JobError, LifecycleError};
use crate::lifecycle::{TargetLifecycleManager, TargetOutcome};
use crate::queue::{JobContext, JobHandler};
use async_trait::async_trait;
use chrono::Utc;
use sniper_domain::entities::{JobPayload, JobType};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Executes one ready target.
///
/// Target-level retries belong to the lifecycle manager, so a failed or
/// retried target still completes the job. Only attempts that never reached
/// the exchange send the job back to the queue.
pub struct SnipeExecutionHandler {
    lifecycle: Arc<TargetLifecycleManager>,
}

impl SnipeExecutionHandler {
    pub fn new(lifecycle: Arc<TargetLifecycleManager>) -> Self {
        Self { lifecycle }
    }
}

#[async_trait]
impl JobHandler for SnipeExecutionHandler {
    fn job_type(&self) -> JobType {
        JobType::SnipeExecution
    }

    async fn handle(&self, ctx: &JobContext, payload: &JobPayload) -> Result<(), JobError> {
        let JobPayload::SnipeExecution(snipe) = payload else {
            return Err(JobError::Fatal(format!(
                "expected snipe_execution payload, got {}",
                payload.job_type()
            )));
        };

        if ctx.shadow {
            // Never places orders; only checks the target is still there.
            let target = self
                .lifecycle
                .targets()
                .get(snipe.target_id)
                .await
                .map_err(|e| JobError::Retryable(e.to_string()))?;
            return match target {
                Some(target) => {
                    debug!(target_id = %target.id, status = %target.status, "Shadow snipe, no order placed");
                    Ok(())
                }
                None => Err(JobError::Fatal(format!("target {} not found", snipe.target_id))),
            };
        }

        match self.lifecycle.execute_target(snipe.target_id, Utc::now()).await {
            Ok(TargetOutcome::Requeued { reason }) => Err(JobError::Retryable(reason)),
            Ok(outcome) => {
                info!(target_id = %snipe.target_id, outcome = ?outcome, "Snipe job finished");
                Ok(())
            }
            Err(LifecycleError::Conflict(id)) => {
                debug!(target_id = %id, "Target claimed by another worker");
                Ok(())
            }
            Err(e @ (LifecycleError::NotFound(_) | LifecycleError::IllegalTransition { .. })) => {
                warn!(target_id = %snipe.target_id, error = %e, "Snipe job not runnable");
                Err(JobError::Fatal(e.to_string()))
            }
            Err(e) => Err(JobError::Retryable(e.to_string())),
        }
    }
}
