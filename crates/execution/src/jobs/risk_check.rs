use crate::error::JobError;
use crate::queue::{JobContext, JobHandler};
use crate::safety::SafetyCoordinator;
use async_trait::async_trait;
use sniper_domain::entities::{JobPayload, JobType};
use std::sync::Arc;
use tracing::{debug, info};

/// Recomputes risk metrics and lets the safety coordinator react.
pub struct RiskCheckHandler {
    safety: Arc<SafetyCoordinator>,
}

impl RiskCheckHandler {
    pub fn new(safety: Arc<SafetyCoordinator>) -> Self {
        Self { safety }
    }
}

#[async_trait]
impl JobHandler for RiskCheckHandler {
    fn job_type(&self) -> JobType {
        JobType::RiskCheck
    }

    async fn handle(&self, ctx: &JobContext, payload: &JobPayload) -> Result<(), JobError> {
        let JobPayload::RiskCheck(check) = payload else {
            return Err(JobError::Fatal(format!("expected risk_check payload, got {}", payload.job_type())));
        };

        // Evaluation mutates safety state, so the shadow copy only reads.
        if ctx.shadow {
            let metrics = self
                .safety
                .compute_metrics()
                .await
                .map_err(|e| JobError::Retryable(e.to_string()))?;
            debug!(job_id = %ctx.job_id, drawdown = %metrics.drawdown_pct, "Shadow risk check");
            return Ok(());
        }

        let assessment = self
            .safety
            .recompute()
            .await
            .map_err(|e| JobError::Retryable(e.to_string()))?;
        info!(
            owner = check.owner.as_deref().unwrap_or("all"),
            status = %assessment.status,
            breaches = assessment.breaches.len(),
            "Risk check finished"
        );
        Ok(())
    }
}
