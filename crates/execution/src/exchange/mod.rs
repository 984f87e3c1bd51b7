//! Exchange client seam.
//!
//! The kernel only talks to an exchange through [`ExchangeClient`]. Errors
//! are split into retryable transport failures and terminal rejections.

mod mexc;
mod paper;

pub use mexc::{DEFAULT_BASE_URL, MexcClient, MexcCredentials};
pub use paper::PaperExchange;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sniper_domain::enums::{OrderSide, OrderType};
use sniper_domain::precision::SymbolRules;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("rate limited")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("order rejected by exchange: {message}")]
    Rejected { code: Option<i64>, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ExchangeError {
    /// Network, timeout and rate-limit failures may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub symbol: String,
    pub last_price: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

/// Order as sent to the exchange. Quantities are already truncated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Base quantity; absent on quote-denominated market buys.
    pub quantity: Option<Decimal>,
    /// Quote amount to spend on a market buy.
    pub quote_order_qty: Option<Decimal>,
    pub price: Option<Decimal>,
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    pub fn market_buy(symbol: impl Into<String>, quote_amount: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quantity: None,
            quote_order_qty: Some(quote_amount),
            price: None,
            client_order_id: None,
        }
    }

    pub fn limit(symbol: impl Into<String>, side: OrderSide, price: Decimal, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            quantity: Some(quantity),
            quote_order_qty: None,
            price: Some(price),
            client_order_id: None,
        }
    }

    pub fn market_sell(symbol: impl Into<String>, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side: OrderSide::Sell,
            order_type: OrderType::Market,
            quantity: Some(quantity),
            quote_order_qty: None,
            price: None,
            client_order_id: None,
        }
    }

    #[must_use]
    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }
}

/// Fill report of an accepted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    pub order_id: String,
    pub symbol: String,
    pub executed_qty: Decimal,
    /// Quote amount actually spent or received.
    pub cummulative_quote_qty: Decimal,
}

impl OrderAck {
    /// Average fill price, `None` for an unfilled order.
    pub fn avg_price(&self) -> Option<Decimal> {
        self.cummulative_quote_qty.checked_div(self.executed_qty)
    }
}

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn name(&self) -> &str;

    async fn ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError>;

    async fn balances(&self) -> Result<Vec<Balance>, ExchangeError>;

    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules, ExchangeError>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ExchangeError>;
}
