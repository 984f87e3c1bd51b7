use crate::enums::{EntryStrategy, RiskLevel, TargetStatus};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// Take-profit percents for the predefined levels 1 through 4.
pub const TAKE_PROFIT_LEVELS: [Decimal; 4] = [
    Decimal::from_parts(5, 0, 0, false, 0),
    Decimal::from_parts(10, 0, 0, false, 0),
    Decimal::from_parts(15, 0, 0, false, 0),
    Decimal::from_parts(25, 0, 0, false, 0),
];

/// Take-profit setting of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum TakeProfit {
    /// One of the predefined levels (1-4).
    Level(u8),
    /// Custom percent above entry.
    Custom(Decimal),
}

impl TakeProfit {
    /// Percent above entry, `None` for an unknown level.
    pub fn percent(&self) -> Option<Decimal> {
        match self {
            Self::Level(level) => TAKE_PROFIT_LEVELS.get(usize::from(*level).checked_sub(1)?).copied(),
            Self::Custom(pct) => Some(*pct),
        }
    }
}

/// A candidate trade scheduled for execution at or after a specific time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnipeTarget {
    pub id: Uuid,
    pub owner: String,
    pub symbol: String,
    pub entry_strategy: EntryStrategy,
    /// Spend in quote currency.
    pub position_size: Decimal,
    pub take_profit: TakeProfit,
    /// Percent below entry.
    pub stop_loss_pct: Decimal,
    pub status: TargetStatus,
    /// Lower runs sooner.
    pub priority: i32,
    pub confidence_score: Decimal,
    /// `None` means eligible immediately.
    pub target_execution_time: Option<DateTime<Utc>>,
    pub current_retries: u32,
    pub max_retries: u32,
    pub risk_level: RiskLevel,
    pub error_message: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
    pub execution_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SnipeTarget {
    /// Creates a pending target as handed over by discovery.
    pub fn new(owner: impl Into<String>, symbol: impl Into<String>, position_size: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            symbol: symbol.into(),
            entry_strategy: EntryStrategy::Market,
            position_size,
            take_profit: TakeProfit::Level(2),
            stop_loss_pct: Decimal::from(15),
            status: TargetStatus::Pending,
            priority: 5,
            confidence_score: Decimal::ZERO,
            target_execution_time: None,
            current_retries: 0,
            max_retries: 3,
            risk_level: RiskLevel::Medium,
            error_message: None,
            executed_at: None,
            execution_price: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Dispatch eligibility:
    /// `ready AND retries left AND (no time OR time <= now + window)`.
    pub fn is_eligible(&self, now: DateTime<Utc>, advance_window: Duration) -> bool {
        self.status == TargetStatus::Ready
            && self.current_retries < self.max_retries
            && self
                .target_execution_time
                .is_none_or(|at| at <= now + advance_window)
    }

    /// Retries remain after the current attempt.
    pub fn has_retries_left(&self) -> bool {
        self.current_retries < self.max_retries
    }

    /// Take-profit price for a fill at `entry_price`.
    pub fn take_profit_price(&self, entry_price: Decimal) -> Option<Decimal> {
        let pct = self.take_profit.percent()?;
        Some(entry_price * (Decimal::ONE + pct / Decimal::ONE_HUNDRED))
    }

    /// Stop-loss price for a fill at `entry_price`.
    pub fn stop_loss_price(&self, entry_price: Decimal) -> Option<Decimal> {
        if self.stop_loss_pct <= Decimal::ZERO {
            return None;
        }
        Some(entry_price * (Decimal::ONE - self.stop_loss_pct / Decimal::ONE_HUNDRED))
    }
}

/// Dispatch order: ascending priority, then ascending execution time with
/// immediate (null) targets first.
pub fn dispatch_order(a: &SnipeTarget, b: &SnipeTarget) -> Ordering {
    a.priority.cmp(&b.priority).then_with(|| {
        match (a.target_execution_time, b.target_execution_time) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.cmp(&y),
        }
    })
}
