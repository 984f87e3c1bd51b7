//! Order precision validation against per-symbol exchange rules.
//!
//! Every function here is pure. Quantities and prices are truncated toward
//! zero before any minimum check runs; the notional check always uses the
//! truncated values.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Precision rules reported by the exchange for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolRules {
    /// Trading symbol, e.g. `NEWUSDT`.
    pub symbol: String,
    /// Decimal places allowed on base-asset quantities.
    pub base_asset_precision: u32,
    /// Decimal places allowed on quote prices.
    pub quote_precision: u32,
    /// Minimum order size in base asset.
    pub min_base_size: Decimal,
    /// Minimum notional for market orders, in quote asset.
    pub min_notional_market: Decimal,
    /// Minimum notional for limit orders, in quote asset.
    pub min_notional_limit: Decimal,
}

/// Validation failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrecisionErrorCode {
    InvalidQuantity,
    InvalidNotional,
    InvalidPrice,
}

impl PrecisionErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidQuantity => "INVALID_QUANTITY",
            Self::InvalidNotional => "INVALID_NOTIONAL",
            Self::InvalidPrice => "INVALID_PRICE",
        }
    }
}

impl fmt::Display for PrecisionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured rejection of an order before submission. Never retryable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code} on {symbol}: provided {provided}, minimum {minimum}")]
pub struct PrecisionError {
    pub code: PrecisionErrorCode,
    pub provided: Decimal,
    pub minimum: Decimal,
    pub symbol: String,
}

impl PrecisionError {
    fn new(code: PrecisionErrorCode, provided: Decimal, minimum: Decimal, rules: &SymbolRules) -> Self {
        Self {
            code,
            provided,
            minimum,
            symbol: rules.symbol.clone(),
        }
    }
}

/// A limit order that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrderParams {
    /// Price truncated to quote precision.
    pub price: Decimal,
    /// Quantity truncated to base precision.
    pub quantity: Decimal,
    /// `price * quantity` computed from the truncated values.
    pub notional: Decimal,
}

/// Floors `value` toward zero to `decimals` places. Never rounds up.
pub fn truncate(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::ToZero)
}

/// Renders a truncated value without trailing zeros, suitable for order params.
pub fn format_decimal(value: Decimal, decimals: u32) -> String {
    truncate(value, decimals).normalize().to_string()
}

/// Smallest representable step for `decimals` places, e.g. `0.01` for 2.
fn step(decimals: u32) -> Decimal {
    Decimal::new(1, decimals.min(28))
}

/// Validates a market buy spending `quote_amount`.
///
/// The amount is passed through unchanged; the exchange applies its own
/// internal precision for quote-denominated market orders.
pub fn validate_market_buy(
    quote_amount: Decimal,
    rules: &SymbolRules,
) -> Result<Decimal, PrecisionError> {
    if quote_amount <= Decimal::ZERO || quote_amount < rules.min_notional_market {
        return Err(PrecisionError::new(
            PrecisionErrorCode::InvalidNotional,
            quote_amount,
            rules.min_notional_market,
            rules,
        ));
    }
    Ok(quote_amount)
}

/// Validates a limit buy at `bid_price` spending `quote_amount`.
pub fn validate_limit_buy(
    bid_price: Decimal,
    quote_amount: Decimal,
    rules: &SymbolRules,
) -> Result<LimitOrderParams, PrecisionError> {
    let price = truncated_price(bid_price, rules)?;
    let raw_quantity = quote_amount.checked_div(price).ok_or_else(|| {
        PrecisionError::new(
            PrecisionErrorCode::InvalidPrice,
            bid_price,
            step(rules.quote_precision),
            rules,
        )
    })?;
    limit_params(price, raw_quantity, rules)
}

/// Validates a limit sell of `quantity` at `ask_price`.
pub fn validate_limit_sell(
    ask_price: Decimal,
    quantity: Decimal,
    rules: &SymbolRules,
) -> Result<LimitOrderParams, PrecisionError> {
    let price = truncated_price(ask_price, rules)?;
    limit_params(price, quantity, rules)
}

/// Validates a market sell of `quantity`. Only the minimum size applies.
pub fn validate_market_sell(quantity: Decimal, rules: &SymbolRules) -> Result<Decimal, PrecisionError> {
    truncated_quantity(quantity, rules)
}

fn truncated_price(price: Decimal, rules: &SymbolRules) -> Result<Decimal, PrecisionError> {
    let truncated = truncate(price, rules.quote_precision);
    if truncated <= Decimal::ZERO {
        return Err(PrecisionError::new(
            PrecisionErrorCode::InvalidPrice,
            price,
            step(rules.quote_precision),
            rules,
        ));
    }
    Ok(truncated)
}

fn truncated_quantity(quantity: Decimal, rules: &SymbolRules) -> Result<Decimal, PrecisionError> {
    let truncated = truncate(quantity, rules.base_asset_precision);
    if truncated <= Decimal::ZERO || truncated < rules.min_base_size {
        return Err(PrecisionError::new(
            PrecisionErrorCode::InvalidQuantity,
            truncated,
            rules.min_base_size,
            rules,
        ));
    }
    Ok(truncated)
}

fn limit_params(
    price: Decimal,
    raw_quantity: Decimal,
    rules: &SymbolRules,
) -> Result<LimitOrderParams, PrecisionError> {
    let quantity = truncated_quantity(raw_quantity, rules)?;

    // Notional comes from the truncated pair, never from the requested amount.
    let notional = quantity.checked_mul(price).ok_or_else(|| {
        PrecisionError::new(
            PrecisionErrorCode::InvalidQuantity,
            quantity,
            rules.min_base_size,
            rules,
        )
    })?;
    if notional < rules.min_notional_limit {
        return Err(PrecisionError::new(
            PrecisionErrorCode::InvalidNotional,
            notional,
            rules.min_notional_limit,
            rules,
        ));
    }

    Ok(LimitOrderParams {
        price,
        quantity,
        notional,
    })
}
