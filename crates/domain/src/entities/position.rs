use crate::enums::PositionStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionId(pub Uuid);

impl PositionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PositionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Holding created by a successful snipe, closed by the monitor or explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: PositionId,
    pub owner: String,
    pub symbol: String,
    /// Target this position was opened for, if any.
    pub target_id: Option<Uuid>,

    pub entry_price: Decimal,
    pub quantity: Decimal,

    pub take_profit_price: Decimal,
    pub stop_loss_price: Decimal,

    pub status: PositionStatus,
    pub entry_time: DateTime<Utc>,

    pub exit_price: Option<Decimal>,
    pub exit_time: Option<DateTime<Utc>>,
}

impl Position {
    pub fn open(
        owner: impl Into<String>,
        symbol: impl Into<String>,
        entry_price: Decimal,
        quantity: Decimal,
        take_profit_price: Decimal,
        stop_loss_price: Decimal,
    ) -> Self {
        Self {
            id: PositionId::new(),
            owner: owner.into(),
            symbol: symbol.into(),
            target_id: None,
            entry_price,
            quantity,
            take_profit_price,
            stop_loss_price,
            status: PositionStatus::Open,
            entry_time: Utc::now(),
            exit_price: None,
            exit_time: None,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target_id: Uuid) -> Self {
        self.target_id = Some(target_id);
        self
    }

    /// Exit status triggered by `current_price`, if any.
    ///
    /// Take-profit wins when both thresholds are crossed by a degenerate
    /// configuration.
    pub fn exit_trigger(&self, current_price: Decimal) -> Option<PositionStatus> {
        if !self.status.is_open() {
            return None;
        }
        if current_price >= self.take_profit_price {
            Some(PositionStatus::TakeProfit)
        } else if current_price <= self.stop_loss_price {
            Some(PositionStatus::StopLoss)
        } else {
            None
        }
    }

    /// Unrealized (or realized, once closed) profit in quote currency.
    pub fn pnl(&self, current_price: Decimal) -> Decimal {
        let price = self.exit_price.unwrap_or(current_price);
        (price - self.entry_price) * self.quantity
    }

    /// Profit as a percent of entry cost.
    pub fn pnl_pct(&self, current_price: Decimal) -> Decimal {
        let cost = self.entry_price * self.quantity;
        if cost.is_zero() {
            return Decimal::ZERO;
        }
        self.pnl(current_price) / cost * Decimal::ONE_HUNDRED
    }

    /// Entry cost in quote currency.
    pub fn cost(&self) -> Decimal {
        self.entry_price * self.quantity
    }

    /// Marks the position closed with `status` at `exit_price`.
    pub fn close(&mut self, status: PositionStatus, exit_price: Decimal) {
        self.status = status;
        self.exit_price = Some(exit_price);
        self.exit_time = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position() -> Position {
        Position::open("user-1", "NEWUSDT", dec!(100), dec!(2), dec!(110), dec!(90))
    }

    #[test]
    fn test_exit_trigger() {
        let p = position();
        assert_eq!(p.exit_trigger(dec!(111)), Some(PositionStatus::TakeProfit));
        assert_eq!(p.exit_trigger(dec!(110)), Some(PositionStatus::TakeProfit));
        assert_eq!(p.exit_trigger(dec!(90)), Some(PositionStatus::StopLoss));
        assert_eq!(p.exit_trigger(dec!(100)), None);
    }

    #[test]
    fn test_closed_position_never_triggers() {
        let mut p = position();
        p.close(PositionStatus::Closed, dec!(105));
        assert_eq!(p.exit_trigger(dec!(200)), None);
        assert_eq!(p.pnl(dec!(200)), dec!(10));
    }

    #[test]
    fn test_pnl() {
        let p = position();
        assert_eq!(p.pnl(dec!(111)), dec!(22));
        assert_eq!(p.pnl_pct(dec!(90)), dec!(-10));
        assert_eq!(p.cost(), dec!(200));
    }
}
