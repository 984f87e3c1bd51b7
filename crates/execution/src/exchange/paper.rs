//! Simulated exchange for paper trading and tests.

use super::{Balance, ExchangeClient, ExchangeError, OrderAck, OrderRequest, Ticker};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sniper_domain::enums::{OrderSide, OrderType};
use sniper_domain::precision::{SymbolRules, truncate};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct PaperState {
    prices: HashMap<String, Decimal>,
    balances: HashMap<String, Decimal>,
    rules: HashMap<String, SymbolRules>,
    order_failures: VecDeque<ExchangeError>,
    ticker_failures: HashMap<String, ExchangeError>,
    balance_failure: Option<ExchangeError>,
    orders: Vec<OrderRequest>,
}

/// Deterministic in-process exchange.
///
/// Orders fill immediately and completely at the current price (market) or
/// the limit price. Buys are checked against the quote balance; sells are
/// not checked against the base balance.
pub struct PaperExchange {
    quote_asset: String,
    state: Mutex<PaperState>,
    calls: AtomicU64,
    latency_ms: AtomicU64,
    next_order_id: AtomicU64,
}

impl PaperExchange {
    pub fn new(quote_asset: impl Into<String>) -> Self {
        Self {
            quote_asset: quote_asset.into(),
            state: Mutex::new(PaperState::default()),
            calls: AtomicU64::new(0),
            latency_ms: AtomicU64::new(0),
            next_order_id: AtomicU64::new(1),
        }
    }

    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.state.lock().await.prices.insert(symbol.to_string(), price);
    }

    pub async fn set_balance(&self, asset: &str, free: Decimal) {
        self.state.lock().await.balances.insert(asset.to_string(), free);
    }

    pub async fn set_rules(&self, rules: SymbolRules) {
        self.state.lock().await.rules.insert(rules.symbol.clone(), rules);
    }

    /// The next `times` orders fail with `error`.
    pub async fn fail_orders(&self, error: ExchangeError, times: usize) {
        let mut state = self.state.lock().await;
        state.order_failures.extend(std::iter::repeat_n(error, times));
    }

    /// Ticker lookups for `symbol` fail until cleared.
    pub async fn fail_ticker(&self, symbol: &str, error: ExchangeError) {
        self.state.lock().await.ticker_failures.insert(symbol.to_string(), error);
    }

    pub async fn clear_ticker_failure(&self, symbol: &str) {
        self.state.lock().await.ticker_failures.remove(symbol);
    }

    pub async fn fail_balances(&self, error: Option<ExchangeError>) {
        self.state.lock().await.balance_failure = error;
    }

    /// Delay applied to every call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Calls that reached the exchange, successful or not.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Orders accepted so far.
    pub async fn orders(&self) -> Vec<OrderRequest> {
        self.state.lock().await.orders.clone()
    }

    pub async fn balance_of(&self, asset: &str) -> Decimal {
        self.state.lock().await.balances.get(asset).copied().unwrap_or_default()
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
    }

    fn base_asset<'a>(&self, symbol: &'a str) -> &'a str {
        symbol.strip_suffix(self.quote_asset.as_str()).unwrap_or(symbol)
    }
}

impl Default for PaperExchange {
    fn default() -> Self {
        Self::new("USDT")
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    fn name(&self) -> &str {
        "paper"
    }

    async fn ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        self.enter().await;
        let state = self.state.lock().await;
        if let Some(error) = state.ticker_failures.get(symbol) {
            return Err(error.clone());
        }
        let last_price = state
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::InvalidRequest(format!("no price for {symbol}")))?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            last_price,
            volume: Decimal::ZERO,
        })
    }

    async fn balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        self.enter().await;
        let state = self.state.lock().await;
        if let Some(error) = &state.balance_failure {
            return Err(error.clone());
        }
        let mut balances: Vec<_> = state
            .balances
            .iter()
            .map(|(asset, free)| Balance {
                asset: asset.clone(),
                free: *free,
                locked: Decimal::ZERO,
            })
            .collect();
        balances.sort_by(|a, b| a.asset.cmp(&b.asset));
        Ok(balances)
    }

    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules, ExchangeError> {
        self.enter().await;
        self.state
            .lock()
            .await
            .rules
            .get(symbol)
            .cloned()
            .ok_or_else(|| ExchangeError::InvalidRequest(format!("unknown symbol {symbol}")))
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        self.enter().await;
        let mut state = self.state.lock().await;
        if let Some(error) = state.order_failures.pop_front() {
            return Err(error);
        }

        let market_price = state.prices.get(&order.symbol).copied();
        let price = match order.order_type {
            OrderType::Market => market_price,
            OrderType::Limit => order.price,
        }
        .filter(|p| *p > Decimal::ZERO)
        .ok_or_else(|| ExchangeError::InvalidRequest(format!("no price for {}", order.symbol)))?;
        let base_precision = state
            .rules
            .get(&order.symbol)
            .map_or(8, |r| r.base_asset_precision);

        let (quantity, quote) = match (order.quantity, order.quote_order_qty) {
            (Some(qty), _) => (qty, qty * price),
            (None, Some(quote)) => (truncate(quote / price, base_precision), quote),
            (None, None) => {
                return Err(ExchangeError::InvalidRequest("order has no size".to_string()));
            }
        };

        let base = self.base_asset(&order.symbol).to_string();
        let quote_asset = self.quote_asset.clone();
        match order.side {
            OrderSide::Buy => {
                let free = state.balances.get(&quote_asset).copied().unwrap_or_default();
                if free < quote {
                    return Err(ExchangeError::Rejected {
                        code: Some(30004),
                        message: "Insufficient position".to_string(),
                    });
                }
                state.balances.insert(quote_asset, free - quote);
                *state.balances.entry(base).or_default() += quantity;
            }
            OrderSide::Sell => {
                let held = state.balances.entry(base).or_default();
                *held = (*held - quantity).max(Decimal::ZERO);
                *state.balances.entry(quote_asset).or_default() += quote;
            }
        }
        state.orders.push(order.clone());

        let order_id = format!("paper-{}", self.next_order_id.fetch_add(1, Ordering::SeqCst));
        debug!(order_id = %order_id, symbol = %order.symbol, %quantity, %price, "Paper order filled");
        Ok(OrderAck {
            order_id,
            symbol: order.symbol.clone(),
            executed_qty: quantity,
            cummulative_quote_qty: quote,
        })
    }
}
