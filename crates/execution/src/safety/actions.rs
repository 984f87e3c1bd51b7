//! Recovery actions bound to the live kernel.

use crate::coordinator::ExecutionCoordinator;
use crate::emergency::{EmergencyExitManager, ExitStatus, RecoveryAction, RecoveryActionExecutor};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

pub struct KernelRecoveryActions {
    coordinator: Arc<ExecutionCoordinator>,
    exits: Arc<EmergencyExitManager>,
}

impl KernelRecoveryActions {
    pub fn new(coordinator: Arc<ExecutionCoordinator>, exits: Arc<EmergencyExitManager>) -> Self {
        Self { coordinator, exits }
    }
}

#[async_trait]
impl RecoveryActionExecutor for KernelRecoveryActions {
    async fn execute(&self, action: &RecoveryAction) -> Result<Option<RecoveryAction>, String> {
        let halt = self.coordinator.halt_switch();
        match action {
            RecoveryAction::AssessExposure => {
                let open = self
                    .coordinator
                    .positions()
                    .list_open()
                    .await
                    .map_err(|e| e.to_string())?;
                let exposure: Decimal = open.iter().map(|p| p.cost()).sum();
                info!(open_positions = open.len(), %exposure, "Exposure assessed");
                Ok(None)
            }
            RecoveryAction::CloseAllPositions => {
                let results = self.exits.exit_all().await.map_err(|e| e.to_string())?;
                let failed = results
                    .iter()
                    .filter(|r| r.status == ExitStatus::Failed)
                    .count();
                if failed > 0 {
                    return Err(format!("{failed} of {} positions failed to close", results.len()));
                }
                Ok(None)
            }
            RecoveryAction::ReduceExposure { target } => {
                let results = self
                    .exits
                    .reduce_exposure(*target)
                    .await
                    .map_err(|e| e.to_string())?;
                let failed = results
                    .iter()
                    .filter(|r| r.status == ExitStatus::Failed)
                    .count();
                if failed > 0 {
                    return Err(format!("{failed} of {} positions failed to close", results.len()));
                }
                Ok(None)
            }
            RecoveryAction::VerifyFlat => {
                let open = self
                    .coordinator
                    .positions()
                    .list_open()
                    .await
                    .map_err(|e| e.to_string())?;
                if open.is_empty() {
                    Ok(None)
                } else {
                    Err(format!("{} positions still open", open.len()))
                }
            }
            RecoveryAction::ResetBreaker => {
                self.coordinator.breaker().reset().await;
                Ok(None)
            }
            RecoveryAction::EngageHalt { reason } => {
                let was_engaged = halt.is_engaged();
                halt.engage(reason.clone());
                Ok((!was_engaged).then_some(RecoveryAction::ReleaseHalt))
            }
            RecoveryAction::ReleaseHalt => {
                let reason = halt.info().map(|i| i.reason);
                if halt.release() {
                    Ok(Some(RecoveryAction::EngageHalt {
                        reason: reason.unwrap_or_else(|| "recovery rolled back".to_string()),
                    }))
                } else {
                    Ok(None)
                }
            }
            RecoveryAction::Notify { message } => {
                warn!(message = %message, "Recovery notice");
                Ok(None)
            }
        }
    }
}
