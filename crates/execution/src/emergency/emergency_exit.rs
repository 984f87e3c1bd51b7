//! Emergency exit procedures for open positions.

use crate::coordinator::ExecutionCoordinator;
use crate::error::ExecutionError;
use rust_decimal::Decimal;
use serde::Serialize;
use sniper_domain::entities::{Position, PositionId};
use sniper_domain::enums::PositionStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

/// Emergency exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// Exit not started.
    Pending,
    /// Fetching an exit price.
    Pricing,
    /// Sell order in flight.
    Selling,
    /// Exit completed.
    Completed,
    /// Someone else closed the position first.
    Skipped,
    /// Exit failed.
    Failed,
}

/// Result of an emergency exit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitResult {
    pub position_id: PositionId,
    pub symbol: String,
    pub status: ExitStatus,
    /// Error message if failed.
    pub error: Option<String>,
    pub exit_price: Option<Decimal>,
    pub pnl: Option<Decimal>,
    pub attempts: u32,
}

/// Configuration for emergency exit.
#[derive(Debug, Clone)]
pub struct EmergencyExitConfig {
    /// Whether to retry on transient failure.
    pub retry_on_failure: bool,
    /// Maximum retries per position.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for EmergencyExitConfig {
    fn default() -> Self {
        Self {
            retry_on_failure: true,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Closes every open position at market.
pub struct EmergencyExitManager {
    coordinator: Arc<ExecutionCoordinator>,
    config: EmergencyExitConfig,
    /// Results of the current or last exit, appended as positions finish.
    results: RwLock<Vec<ExitResult>>,
    /// Held for the duration of `exit_all`. Released on drop, so a caller
    /// that times out does not block later exits.
    running: Mutex<()>,
}

impl EmergencyExitManager {
    pub fn new(coordinator: Arc<ExecutionCoordinator>, config: EmergencyExitConfig) -> Self {
        Self {
            coordinator,
            config,
            results: RwLock::new(Vec::new()),
            running: Mutex::new(()),
        }
    }

    /// Executes emergency exit for all open positions.
    ///
    /// A concurrent call returns the results gathered so far by the running
    /// exit instead of starting a second one.
    ///
    /// # Errors
    /// Returns an error only if the open positions cannot be listed.
    pub async fn exit_all(&self) -> Result<Vec<ExitResult>, ExecutionError> {
        let Ok(_running) = self.running.try_lock() else {
            warn!("Emergency exit already in progress");
            return Ok(self.results.read().await.clone());
        };

        info!("Starting emergency exit for all positions");
        let positions = self.coordinator.positions().list_open().await?;
        self.results.write().await.clear();

        let mut results = Vec::with_capacity(positions.len());
        for position in positions {
            let result = self.exit_position(&position).await;
            self.results.write().await.push(result.clone());
            results.push(result);
        }

        info!(
            total = results.len(),
            completed = results.iter().filter(|r| r.status == ExitStatus::Completed).count(),
            failed = results.iter().filter(|r| r.status == ExitStatus::Failed).count(),
            "Emergency exit completed"
        );
        Ok(results)
    }

    /// Closes the largest open positions, by cost, until the remaining
    /// exposure is at or below `target`. At least one position is closed when
    /// any is open.
    ///
    /// # Errors
    /// Returns an error only if the open positions cannot be listed.
    pub async fn reduce_exposure(&self, target: Decimal) -> Result<Vec<ExitResult>, ExecutionError> {
        let mut positions = self.coordinator.positions().list_open().await?;
        positions.sort_by(|a, b| b.cost().cmp(&a.cost()));
        let mut exposure: Decimal = positions.iter().map(Position::cost).sum();
        info!(%exposure, %target, open = positions.len(), "Reducing exposure");

        let mut results = Vec::new();
        for position in positions {
            if !results.is_empty() && exposure <= target {
                break;
            }
            let result = self.exit_position(&position).await;
            if matches!(result.status, ExitStatus::Completed | ExitStatus::Skipped) {
                exposure -= position.cost();
            }
            results.push(result);
        }
        info!(%exposure, closed = results.len(), "Exposure reduction finished");
        Ok(results)
    }

    /// Executes emergency exit for a single position.
    pub async fn exit_position(&self, position: &Position) -> ExitResult {
        info!(position_id = %position.id, symbol = %position.symbol, "Starting emergency exit for position");

        let mut result = ExitResult {
            position_id: position.id,
            symbol: position.symbol.clone(),
            status: ExitStatus::Pending,
            error: None,
            exit_price: None,
            pnl: None,
            attempts: 0,
        };

        let max_attempts = if self.config.retry_on_failure {
            self.config.max_retries + 1
        } else {
            1
        };

        while result.attempts < max_attempts {
            result.attempts += 1;

            result.status = ExitStatus::Pricing;
            let price = match self.coordinator.ticker(&position.symbol).await {
                Ok(ticker) => ticker.last_price,
                Err(e) => {
                    warn!(position_id = %position.id, error = %e, "No exit price, using entry price");
                    position.entry_price
                }
            };

            result.status = ExitStatus::Selling;
            match self
                .coordinator
                .close_position(position, PositionStatus::Closed, price)
                .await
            {
                Ok(fill) => {
                    result.status = ExitStatus::Completed;
                    result.exit_price = fill.position.exit_price;
                    result.pnl = Some(fill.pnl);
                    result.error = None;
                    return result;
                }
                Err(ExecutionError::Conflict(_)) => {
                    info!(position_id = %position.id, "Position already closed");
                    result.status = ExitStatus::Skipped;
                    return result;
                }
                Err(e) => {
                    error!(position_id = %position.id, attempt = result.attempts, error = %e, "Emergency exit attempt failed");
                    result.status = ExitStatus::Failed;
                    result.error = Some(e.to_string());
                    let transient = matches!(e.class(), crate::error::FailureClass::Transient);
                    if !transient {
                        return result;
                    }
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
        result
    }

    /// Gets the results of the last exit.
    pub async fn get_results(&self) -> Vec<ExitResult> {
        self.results.read().await.clone()
    }

    /// Checks if an exit is in progress.
    pub fn is_in_progress(&self) -> bool {
        self.running.try_lock().is_err()
    }
}
