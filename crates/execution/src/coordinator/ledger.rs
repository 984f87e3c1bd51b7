//! Realized trade results feeding the risk metrics.

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub realized_pnl: Decimal,
    /// Highest realized PnL seen so far, never below zero.
    pub peak_pnl: Decimal,
    pub wins: u64,
    pub losses: u64,
    pub consecutive_losses: u32,
}

impl LedgerSnapshot {
    /// Percentage decline of `capital_base + realized` from its peak.
    pub fn drawdown_pct(&self, capital_base: Decimal) -> Decimal {
        let peak = capital_base + self.peak_pnl;
        if peak <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let equity = capital_base + self.realized_pnl;
        ((peak - equity) / peak * Decimal::ONE_HUNDRED)
            .max(Decimal::ZERO)
            .round_dp(4)
    }
}

#[derive(Default)]
pub struct TradeLedger {
    inner: RwLock<LedgerSnapshot>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, pnl: Decimal) {
        let mut inner = self.inner.write().await;
        inner.realized_pnl += pnl;
        inner.peak_pnl = inner.peak_pnl.max(inner.realized_pnl);
        if pnl < Decimal::ZERO {
            inner.losses += 1;
            inner.consecutive_losses += 1;
        } else {
            inner.wins += 1;
            inner.consecutive_losses = 0;
        }
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.inner.read().await.clone()
    }
}
