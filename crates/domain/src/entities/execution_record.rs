use crate::enums::{OrderSide, OrderType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum ExecutionOutcome {
    Filled,
    /// Rejected before submission or by the exchange; never retried.
    Rejected(String),
    /// Transport-level failure, eligible for retry.
    Failed(String),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Filled)
    }
}

/// Append-only execution history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub owner: String,
    pub symbol: String,
    pub target_id: Option<Uuid>,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub exchange_order_id: Option<String>,
    pub price: Option<Decimal>,
    pub quantity: Option<Decimal>,
    pub quote_amount: Option<Decimal>,
    pub outcome: ExecutionOutcome,
    pub latency_ms: u64,
    pub executed_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn new(
        owner: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        outcome: ExecutionOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            symbol: symbol.into(),
            target_id: None,
            side,
            order_type,
            exchange_order_id: None,
            price: None,
            quantity: None,
            quote_amount: None,
            outcome,
            latency_ms: 0,
            executed_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_target(mut self, target_id: Uuid) -> Self {
        self.target_id = Some(target_id);
        self
    }

    #[must_use]
    pub fn with_fill(
        mut self,
        exchange_order_id: impl Into<String>,
        price: Decimal,
        quantity: Decimal,
        quote_amount: Decimal,
    ) -> Self {
        self.exchange_order_id = Some(exchange_order_id.into());
        self.price = Some(price);
        self.quantity = Some(quantity);
        self.quote_amount = Some(quote_amount);
        self
    }

    #[must_use]
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}
