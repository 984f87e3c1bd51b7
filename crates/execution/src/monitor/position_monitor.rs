//! Take-profit and stop-loss monitoring of open positions.

use crate::coordinator::ExecutionCoordinator;
use crate::error::ExecutionError;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use sniper_data::StoreError;
use sniper_domain::entities::{Position, PositionId};
use sniper_domain::enums::PositionStatus;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggeredExit {
    pub position_id: PositionId,
    pub symbol: String,
    pub status: PositionStatus,
    pub trigger_price: Decimal,
    pub pnl: Option<Decimal>,
    pub error: Option<String>,
}

/// Result of one monitoring pass.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorReport {
    pub checked: usize,
    pub symbols: usize,
    pub exits: Vec<TriggeredExit>,
    /// Symbols whose price could not be read this pass.
    pub price_failures: Vec<String>,
}

/// Polls prices for every symbol with an open position and closes the
/// positions whose take-profit or stop-loss was crossed.
pub struct PositionMonitor {
    coordinator: Arc<ExecutionCoordinator>,
    interval: RwLock<Duration>,
    running: AtomicBool,
    last_report: RwLock<Option<MonitorReport>>,
}

impl PositionMonitor {
    pub fn new(coordinator: Arc<ExecutionCoordinator>, interval: Duration) -> Self {
        Self {
            coordinator,
            interval: RwLock::new(interval),
            running: AtomicBool::new(false),
            last_report: RwLock::new(None),
        }
    }

    pub async fn set_interval(&self, interval: Duration) {
        *self.interval.write().await = interval;
    }

    /// Runs one pass.
    ///
    /// Prices are fetched concurrently, one call per symbol. A symbol whose
    /// price fails is skipped; the others are still evaluated.
    ///
    /// # Errors
    /// Returns an error only if open positions cannot be listed.
    pub async fn check_once(&self) -> Result<MonitorReport, StoreError> {
        let open = self.coordinator.positions().list_open().await?;
        let mut by_symbol: BTreeMap<String, Vec<Position>> = BTreeMap::new();
        for position in open {
            by_symbol.entry(position.symbol.clone()).or_default().push(position);
        }

        let mut report = MonitorReport {
            checked: by_symbol.values().map(Vec::len).sum(),
            symbols: by_symbol.len(),
            ..Default::default()
        };

        let prices = join_all(by_symbol.keys().map(|symbol| async move {
            (symbol.clone(), self.coordinator.ticker(symbol).await)
        }))
        .await;

        for (symbol, price) in prices {
            let price = match price {
                Ok(ticker) => ticker.last_price,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Price unavailable, skipping symbol");
                    report.price_failures.push(symbol);
                    continue;
                }
            };
            let Some(positions) = by_symbol.get(&symbol) else {
                continue;
            };
            for position in positions {
                let Some(status) = position.exit_trigger(price) else {
                    debug!(position_id = %position.id, %price, "Position within bounds");
                    continue;
                };
                info!(position_id = %position.id, symbol = %symbol, %price, status = %status, "Exit triggered");
                let mut exit = TriggeredExit {
                    position_id: position.id,
                    symbol: symbol.clone(),
                    status,
                    trigger_price: price,
                    pnl: None,
                    error: None,
                };
                match self.coordinator.close_position(position, status, price).await {
                    Ok(fill) => exit.pnl = Some(fill.pnl),
                    Err(ExecutionError::Conflict(_)) => {
                        debug!(position_id = %position.id, "Position already closed elsewhere");
                        continue;
                    }
                    Err(e) => {
                        error!(position_id = %position.id, error = %e, "Exit failed");
                        exit.error = Some(e.to_string());
                    }
                }
                report.exits.push(exit);
            }
        }

        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }

    pub async fn last_report(&self) -> Option<MonitorReport> {
        self.last_report.read().await.clone()
    }

    /// Polls until [`stop`](Self::stop) is called.
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!("Position monitor started");
        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.check_once().await {
                error!(error = %e, "Monitoring pass failed");
            }
            let interval = *self.interval.read().await;
            tokio::time::sleep(interval).await;
        }
        info!("Position monitor stopped");
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
