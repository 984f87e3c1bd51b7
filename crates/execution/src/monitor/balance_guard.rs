//! Pre-trade balance check.

use crate::exchange::{Balance, ExchangeError};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BlockReason {
    InsufficientBalance {
        asset: String,
        required_total: Decimal,
        available: Decimal,
    },
    /// The balance could not be read; entries are blocked, never assumed.
    BalanceUnavailable { error: String },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientBalance {
                asset,
                required_total,
                available,
            } => write!(f, "insufficient {asset}: need {required_total}, have {available}"),
            Self::BalanceUnavailable { error } => write!(f, "balance unavailable: {error}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allowed { required_total: Decimal, available: Decimal },
    Blocked(BlockReason),
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Requires `required * (1 + buffer/100)` of free quote balance.
#[derive(Debug, Clone)]
pub struct BalanceGuard {
    quote_asset: String,
    buffer_pct: Decimal,
}

impl BalanceGuard {
    pub fn new(quote_asset: impl Into<String>, buffer_pct: Decimal) -> Self {
        Self {
            quote_asset: quote_asset.into(),
            buffer_pct,
        }
    }

    pub fn quote_asset(&self) -> &str {
        &self.quote_asset
    }

    pub fn required_total(&self, required: Decimal) -> Decimal {
        required * (Decimal::ONE + self.buffer_pct / Decimal::ONE_HUNDRED)
    }

    pub fn check(&self, required: Decimal, balances: &Result<Vec<Balance>, ExchangeError>) -> GuardDecision {
        let balances = match balances {
            Ok(balances) => balances,
            Err(e) => {
                return GuardDecision::Blocked(BlockReason::BalanceUnavailable { error: e.to_string() });
            }
        };
        let available = balances
            .iter()
            .find(|b| b.asset == self.quote_asset)
            .map_or(Decimal::ZERO, |b| b.free);
        let required_total = self.required_total(required);
        if available < required_total {
            return GuardDecision::Blocked(BlockReason::InsufficientBalance {
                asset: self.quote_asset.clone(),
                required_total,
                available,
            });
        }
        GuardDecision::Allowed {
            required_total,
            available,
        }
    }
}
