//! Order execution for entries and exits.

use super::gate::{ConcurrencyGate, GateMetrics};
use super::ledger::{LedgerSnapshot, TradeLedger};
use super::retry::with_retry;
use super::stats::ApiStatsSnapshot;
use crate::config::{KernelConfig, RetryConfig};
use crate::emergency::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats};
use crate::error::ExecutionError;
use crate::exchange::{Balance, ExchangeClient, ExchangeError, OrderAck, OrderRequest, Ticker};
use crate::monitor::{BalanceGuard, GuardDecision};
use crate::safety::HaltSwitch;
use rust_decimal::Decimal;
use serde::Serialize;
use sniper_data::{HistoryStore, PositionStore};
use sniper_domain::entities::{ExecutionOutcome, ExecutionRecord, Position, SnipeTarget};
use sniper_domain::enums::{EntryStrategy, OrderSide, OrderType, PositionStatus};
use sniper_domain::precision::{self, SymbolRules};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Inputs fetched side by side before an entry. Each part settles on its own.
#[derive(Debug)]
pub struct MarketSnapshot {
    pub ticker: Result<Ticker, ExchangeError>,
    pub balances: Result<Vec<Balance>, ExchangeError>,
    pub rules: Result<SymbolRules, ExchangeError>,
}

/// A filled entry.
#[derive(Debug, Clone)]
pub struct EntryFill {
    pub position: Position,
    pub ack: OrderAck,
    pub record: ExecutionRecord,
}

/// A completed exit.
#[derive(Debug, Clone)]
pub struct ExitFill {
    pub position: Position,
    pub ack: OrderAck,
    pub pnl: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorMetrics {
    pub exchange: String,
    pub enabled: bool,
    pub halted: bool,
    pub gate: GateMetrics,
    pub api: ApiStatsSnapshot,
    pub breaker: CircuitBreakerStats,
    pub ledger: LedgerSnapshot,
    pub entries_filled: u64,
    pub entries_failed: u64,
    pub exits_filled: u64,
    pub exits_failed: u64,
}

/// Bounded, breaker-protected path to the exchange.
///
/// Entries pass the halt switch, the breaker, precision checks and the
/// balance guard before an order is sent. Exits skip the breaker so open
/// positions can always be closed.
pub struct ExecutionCoordinator {
    exchange: Arc<dyn ExchangeClient>,
    gate: ConcurrencyGate,
    breaker: Arc<CircuitBreaker>,
    halt: HaltSwitch,
    guard: RwLock<BalanceGuard>,
    retry: RwLock<RetryConfig>,
    positions: Arc<dyn PositionStore>,
    history: Arc<dyn HistoryStore>,
    ledger: TradeLedger,
    rules_cache: RwLock<HashMap<String, SymbolRules>>,
    enabled: AtomicBool,
    entries_filled: AtomicU64,
    entries_failed: AtomicU64,
    exits_filled: AtomicU64,
    exits_failed: AtomicU64,
}

impl ExecutionCoordinator {
    pub fn new(
        config: &KernelConfig,
        exchange: Arc<dyn ExchangeClient>,
        halt: HaltSwitch,
        positions: Arc<dyn PositionStore>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            exchange,
            gate: ConcurrencyGate::new(config.max_concurrent_requests, config.request_timeout()),
            breaker: Arc::new(CircuitBreaker::new(CircuitBreakerConfig::from(&config.breaker))),
            halt,
            guard: RwLock::new(BalanceGuard::new(
                config.monitor.quote_asset.clone(),
                config.monitor.balance_buffer_pct,
            )),
            retry: RwLock::new(config.retry_config.clone()),
            positions,
            history,
            ledger: TradeLedger::new(),
            rules_cache: RwLock::new(HashMap::new()),
            enabled: AtomicBool::new(config.enabled),
            entries_filled: AtomicU64::new(0),
            entries_failed: AtomicU64::new(0),
            exits_filled: AtomicU64::new(0),
            exits_failed: AtomicU64::new(0),
        }
    }

    /// Applies the hot-reloadable parts of a new config.
    pub async fn apply_config(&self, config: &KernelConfig) {
        self.gate.resize(config.max_concurrent_requests);
        self.gate.set_timeout(config.request_timeout());
        self.breaker
            .update_config(CircuitBreakerConfig::from(&config.breaker))
            .await;
        *self.guard.write().await =
            BalanceGuard::new(config.monitor.quote_asset.clone(), config.monitor.balance_buffer_pct);
        *self.retry.write().await = config.retry_config.clone();
        self.set_enabled(config.enabled);
    }

    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::SeqCst) != enabled {
            info!(enabled, "Execution toggled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn halt_switch(&self) -> &HaltSwitch {
        &self.halt
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }

    pub fn positions(&self) -> &Arc<dyn PositionStore> {
        &self.positions
    }

    /// Whether a new entry could be attempted right now.
    pub async fn accepting_entries(&self) -> bool {
        self.is_enabled() && !self.halt.is_engaged() && self.breaker.is_allowed().await
    }

    /// Last price through the gate, with read retries.
    ///
    /// # Errors
    /// Returns the exchange error once retries are exhausted.
    pub async fn ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let retry = self.retry.read().await.clone();
        with_retry(&retry, "ticker", || self.gate.run("ticker", self.exchange.ticker(symbol))).await
    }

    /// Symbol rules, cached after the first successful lookup.
    ///
    /// # Errors
    /// Returns the exchange error once retries are exhausted.
    pub async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules, ExchangeError> {
        if let Some(rules) = self.rules_cache.read().await.get(symbol) {
            return Ok(rules.clone());
        }
        let retry = self.retry.read().await.clone();
        let rules = with_retry(&retry, "symbol_rules", || {
            self.gate.run("symbol_rules", self.exchange.symbol_rules(symbol))
        })
        .await?;
        self.rules_cache
            .write()
            .await
            .insert(symbol.to_string(), rules.clone());
        Ok(rules)
    }

    /// Fetches ticker, balances and rules concurrently.
    pub async fn market_snapshot(&self, symbol: &str) -> MarketSnapshot {
        let retry = self.retry.read().await.clone();
        let balances = with_retry(&retry, "balances", || {
            self.gate.run("balances", self.exchange.balances())
        });
        let (ticker, balances, rules) =
            tokio::join!(self.ticker(symbol), balances, self.symbol_rules(symbol));
        MarketSnapshot {
            ticker,
            balances,
            rules,
        }
    }

    /// Opens a position for `target`.
    ///
    /// The target must already be claimed by the caller. No network call
    /// is made while the breaker is open or trading is halted.
    ///
    /// # Errors
    /// See [`ExecutionError::class`] for how each failure is treated.
    #[instrument(skip(self, target), fields(target_id = %target.id, symbol = %target.symbol))]
    pub async fn execute_entry(&self, target: &SnipeTarget) -> Result<EntryFill, ExecutionError> {
        self.halt.check()?;
        if !self.is_enabled() {
            return Err(ExecutionError::Disabled);
        }
        let Some(admission) = self.breaker.try_acquire().await else {
            debug!("Breaker open, entry rejected without network call");
            return Err(ExecutionError::CircuitOpen);
        };

        let result = self.entry_with_admission(target, admission).await;
        match &result {
            Ok(fill) => {
                self.entries_filled.fetch_add(1, Ordering::SeqCst);
                info!(
                    position_id = %fill.position.id,
                    entry_price = %fill.position.entry_price,
                    quantity = %fill.position.quantity,
                    "Entry filled"
                );
            }
            Err(e) => {
                self.entries_failed.fetch_add(1, Ordering::SeqCst);
                warn!(error = %e, "Entry failed");
            }
        }
        result
    }

    async fn entry_with_admission(
        &self,
        target: &SnipeTarget,
        admission: Admission,
    ) -> Result<EntryFill, ExecutionError> {
        let snapshot = self.market_snapshot(&target.symbol).await;

        let rules = match snapshot.rules {
            Ok(rules) => rules,
            Err(e) => return Err(self.exchange_failure(admission, e).await),
        };
        let ticker = match snapshot.ticker {
            Ok(ticker) => ticker,
            Err(e) => return Err(self.exchange_failure(admission, e).await),
        };

        let (order, spend) = match self.entry_order(target, &ticker, &rules) {
            Ok(order) => order,
            Err(e) => {
                self.breaker.abandon(admission);
                return Err(e);
            }
        };

        let decision = self.guard.read().await.check(spend, &snapshot.balances);
        if let GuardDecision::Blocked(reason) = decision {
            match &snapshot.balances {
                Err(e) if e.is_retryable() => self.breaker.record_failure(admission).await,
                _ => self.breaker.abandon(admission),
            }
            return Err(ExecutionError::Blocked(reason));
        }

        let order = order.with_client_order_id(format!("snipe-{}", target.id.simple()));
        let started = Instant::now();
        let placed = self
            .gate
            .run("place_order", self.exchange.place_order(&order))
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let ack = match placed {
            Ok(ack) => ack,
            Err(e) => {
                self.append_history(
                    ExecutionRecord::new(&target.owner, &target.symbol, OrderSide::Buy, order.order_type, outcome_of(&e))
                        .with_target(target.id)
                        .with_latency(latency_ms),
                )
                .await;
                return Err(self.exchange_failure(admission, e).await);
            }
        };
        self.breaker.record_success(admission).await;

        let entry_price = ack.avg_price().unwrap_or(ticker.last_price);
        let quantity = if ack.executed_qty > Decimal::ZERO {
            ack.executed_qty
        } else {
            order.quantity.unwrap_or_default()
        };
        let position = Position::open(
            &target.owner,
            &target.symbol,
            entry_price,
            quantity,
            target.take_profit_price(entry_price).unwrap_or(Decimal::MAX),
            target.stop_loss_price(entry_price).unwrap_or(Decimal::ZERO),
        )
        .with_target(target.id);

        // History first: a fill must leave a trace even if the position write fails.
        let record = ExecutionRecord::new(
            &target.owner,
            &target.symbol,
            OrderSide::Buy,
            order.order_type,
            ExecutionOutcome::Filled,
        )
        .with_target(target.id)
        .with_fill(&ack.order_id, entry_price, quantity, ack.cummulative_quote_qty)
        .with_latency(latency_ms);
        self.append_history(record.clone()).await;

        if let Err(source) = self.positions.insert(position.clone()).await {
            error!(
                order_id = %ack.order_id,
                %entry_price,
                %quantity,
                error = %source,
                "Entry filled but position not stored, needs manual reconciliation"
            );
            return Err(ExecutionError::FilledUnrecorded {
                order_id: ack.order_id,
                entry_price,
                quantity,
                source,
            });
        }

        Ok(EntryFill {
            position,
            ack,
            record,
        })
    }

    /// Builds the entry order and the quote amount it spends.
    fn entry_order(
        &self,
        target: &SnipeTarget,
        ticker: &Ticker,
        rules: &SymbolRules,
    ) -> Result<(OrderRequest, Decimal), ExecutionError> {
        match target.entry_strategy {
            EntryStrategy::Market => {
                let quote = precision::validate_market_buy(target.position_size, rules)?;
                Ok((OrderRequest::market_buy(&target.symbol, quote), quote))
            }
            EntryStrategy::Limit => {
                let params = precision::validate_limit_buy(ticker.last_price, target.position_size, rules)?;
                Ok((
                    OrderRequest::limit(&target.symbol, OrderSide::Buy, params.price, params.quantity),
                    params.notional,
                ))
            }
        }
    }

    async fn exchange_failure(&self, admission: Admission, error: ExchangeError) -> ExecutionError {
        if error.is_retryable() {
            self.breaker.record_failure(admission).await;
        } else {
            // The exchange answered; the path is healthy.
            self.breaker.record_success(admission).await;
        }
        ExecutionError::Exchange(error)
    }

    /// Closes `position` with a market sell.
    ///
    /// The position is first moved out of `open` with a guarded update, so
    /// two callers cannot both sell it. If the sell fails, or the call is
    /// dropped before the sell answers, the position is reopened. Exits
    /// bypass the breaker and the halt switch.
    ///
    /// # Errors
    /// Returns [`ExecutionError::Conflict`] if another caller closed it first.
    #[instrument(skip(self, position), fields(position_id = %position.id, symbol = %position.symbol))]
    pub async fn close_position(
        &self,
        position: &Position,
        reason: PositionStatus,
        observed_price: Decimal,
    ) -> Result<ExitFill, ExecutionError> {
        let mut claimed = position.clone();
        claimed.close(reason, observed_price);
        if !self
            .positions
            .update_guarded(&claimed, PositionStatus::Open)
            .await?
        {
            return Err(ExecutionError::Conflict(position.id.to_string()));
        }

        let reopen = ReopenOnDrop::arm(self.positions.clone(), position.clone(), reason);
        let sold = self.sell(position).await;
        reopen.disarm();

        match sold {
            Ok(ack) => {
                let exit_price = ack.avg_price().unwrap_or(observed_price);
                claimed.exit_price = Some(exit_price);
                if !self.positions.update_guarded(&claimed, reason).await? {
                    warn!("Position changed while closing");
                }
                let pnl = claimed.pnl(exit_price);
                self.ledger.record(pnl).await;
                self.exits_filled.fetch_add(1, Ordering::SeqCst);
                info!(status = %reason, %exit_price, %pnl, "Position closed");
                Ok(ExitFill {
                    position: claimed,
                    ack,
                    pnl,
                })
            }
            Err(e) => {
                self.exits_failed.fetch_add(1, Ordering::SeqCst);
                if !self.positions.update_guarded(position, reason).await? {
                    error!("Failed to reopen position after rejected exit");
                }
                warn!(error = %e, "Exit failed, position reopened");
                Err(e)
            }
        }
    }

    async fn sell(&self, position: &Position) -> Result<OrderAck, ExecutionError> {
        let rules = self.symbol_rules(&position.symbol).await?;
        let quantity = precision::validate_market_sell(position.quantity, &rules)?;
        let order = OrderRequest::market_sell(&position.symbol, quantity)
            .with_client_order_id(format!("exit-{}", position.id.0.simple()));

        let started = Instant::now();
        let placed = self
            .gate
            .run("place_order", self.exchange.place_order(&order))
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let mut record = ExecutionRecord::new(
            &position.owner,
            &position.symbol,
            OrderSide::Sell,
            OrderType::Market,
            match &placed {
                Ok(_) => ExecutionOutcome::Filled,
                Err(e) => outcome_of(e),
            },
        )
        .with_latency(latency_ms);
        if let Some(target_id) = position.target_id {
            record = record.with_target(target_id);
        }
        if let Ok(ack) = &placed {
            record = record.with_fill(
                &ack.order_id,
                ack.avg_price().unwrap_or_default(),
                ack.executed_qty,
                ack.cummulative_quote_qty,
            );
        }
        self.append_history(record).await;
        Ok(placed?)
    }

    async fn append_history(&self, record: ExecutionRecord) {
        if let Err(e) = self.history.append(record).await {
            warn!(error = %e, "Failed to record execution history");
        }
    }

    pub async fn metrics(&self) -> CoordinatorMetrics {
        CoordinatorMetrics {
            exchange: self.exchange.name().to_string(),
            enabled: self.is_enabled(),
            halted: self.halt.is_engaged(),
            gate: self.gate.metrics(),
            api: self.gate.stats().snapshot().await,
            breaker: self.breaker.stats().await,
            ledger: self.ledger.snapshot().await,
            entries_filled: self.entries_filled.load(Ordering::SeqCst),
            entries_failed: self.entries_failed.load(Ordering::SeqCst),
            exits_filled: self.exits_filled.load(Ordering::SeqCst),
            exits_failed: self.exits_failed.load(Ordering::SeqCst),
        }
    }
}

/// Puts a claimed position back to `open` if the close is abandoned before
/// the sell answered.
struct ReopenOnDrop {
    positions: Arc<dyn PositionStore>,
    position: Option<Position>,
    claimed_as: PositionStatus,
}

impl ReopenOnDrop {
    fn arm(positions: Arc<dyn PositionStore>, position: Position, claimed_as: PositionStatus) -> Self {
        Self {
            positions,
            position: Some(position),
            claimed_as,
        }
    }

    fn disarm(mut self) {
        self.position = None;
    }
}

impl Drop for ReopenOnDrop {
    fn drop(&mut self) {
        let Some(position) = self.position.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(position_id = %position.id, "Close abandoned outside a runtime, position left claimed");
            return;
        };
        warn!(position_id = %position.id, "Close abandoned before the sell answered, reopening");
        let positions = self.positions.clone();
        let claimed_as = self.claimed_as;
        runtime.spawn(async move {
            match positions.update_guarded(&position, claimed_as).await {
                Ok(true) => info!(position_id = %position.id, "Position reopened"),
                Ok(false) => warn!(position_id = %position.id, "Position moved before it could be reopened"),
                Err(e) => error!(position_id = %position.id, error = %e, "Failed to reopen position"),
            }
        });
    }
}

fn outcome_of(error: &ExchangeError) -> ExecutionOutcome {
    match error {
        ExchangeError::Rejected { .. } | ExchangeError::InvalidRequest(_) => {
            ExecutionOutcome::Rejected(error.to_string())
        }
        _ => ExecutionOutcome::Failed(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PaperExchange;
    use rust_decimal_macros::dec;
    use sniper_data::{MemoryHistoryStore, MemoryPositionStore};

    fn rules() -> SymbolRules {
        SymbolRules {
            symbol: "NEWUSDT".to_string(),
            base_asset_precision: 2,
            quote_precision: 4,
            min_base_size: dec!(0.01),
            min_notional_market: dec!(1),
            min_notional_limit: dec!(5),
        }
    }

    async fn setup(config: KernelConfig) -> (Arc<PaperExchange>, ExecutionCoordinator, Arc<MemoryHistoryStore>) {
        let paper = Arc::new(PaperExchange::default());
        paper.set_rules(rules()).await;
        paper.set_price("NEWUSDT", dec!(2)).await;
        paper.set_balance("USDT", dec!(1000)).await;
        let history = Arc::new(MemoryHistoryStore::default());
        let coordinator = ExecutionCoordinator::new(
            &config,
            paper.clone(),
            HaltSwitch::new(),
            Arc::new(MemoryPositionStore::default()),
            history.clone(),
        );
        (paper, coordinator, history)
    }

    fn target() -> SnipeTarget {
        SnipeTarget::new("alice", "NEWUSDT", dec!(100))
    }

    #[tokio::test]
    async fn test_market_entry_opens_position() {
        let (paper, coordinator, history) = setup(KernelConfig::default()).await;
        let fill = coordinator.execute_entry(&target()).await.unwrap();

        assert_eq!(fill.position.entry_price, dec!(2));
        assert_eq!(fill.position.quantity, dec!(50));
        // Level 2 take profit is 10%, default stop loss 15%.
        assert_eq!(fill.position.take_profit_price, dec!(2.2));
        assert_eq!(fill.position.stop_loss_price, dec!(1.7));
        assert_eq!(paper.orders().await.len(), 1);
        assert_eq!(history.recent(10).await.unwrap().len(), 1);
        assert_eq!(coordinator.positions().list_open().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_balance_guard_blocks_before_order() {
        let (paper, coordinator, _) = setup(KernelConfig::default()).await;
        paper.set_balance("USDT", dec!(104)).await;

        let err = coordinator.execute_entry(&target()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Blocked(_)));
        assert!(paper.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_precision_failure_is_terminal_and_sends_nothing() {
        let (paper, coordinator, _) = setup(KernelConfig::default()).await;
        let mut tiny = target();
        tiny.position_size = dec!(0.5);

        let err = coordinator.execute_entry(&tiny).await.unwrap_err();
        assert_eq!(err.class(), crate::error::FailureClass::Terminal);
        assert!(paper.orders().await.is_empty());
        assert_eq!(coordinator.breaker().stats().await.failure_count, 0);
    }

    #[tokio::test]
    async fn test_halt_and_disable_reject_entries() {
        let (_, coordinator, _) = setup(KernelConfig::default()).await;
        coordinator.halt_switch().engage("test");
        assert!(matches!(
            coordinator.execute_entry(&target()).await,
            Err(ExecutionError::Halted(_))
        ));
        coordinator.halt_switch().release();

        coordinator.set_enabled(false);
        assert!(matches!(
            coordinator.execute_entry(&target()).await,
            Err(ExecutionError::Disabled)
        ));
    }

    #[tokio::test]
    async fn test_limit_entry_uses_truncated_quantity() {
        let (paper, coordinator, _) = setup(KernelConfig::default()).await;
        paper.set_price("NEWUSDT", dec!(3)).await;
        let mut limit = target();
        limit.entry_strategy = EntryStrategy::Limit;

        let fill = coordinator.execute_entry(&limit).await.unwrap();
        // 100 / 3 truncated to 2 decimals.
        assert_eq!(fill.position.quantity, dec!(33.33));
    }

    #[tokio::test]
    async fn test_close_position_records_pnl() {
        let (paper, coordinator, _) = setup(KernelConfig::default()).await;
        let fill = coordinator.execute_entry(&target()).await.unwrap();
        paper.set_price("NEWUSDT", dec!(2.5)).await;

        let exit = coordinator
            .close_position(&fill.position, PositionStatus::TakeProfit, dec!(2.5))
            .await
            .unwrap();
        assert_eq!(exit.pnl, dec!(25));
        assert_eq!(exit.position.status, PositionStatus::TakeProfit);
        assert!(coordinator.positions().list_open().await.unwrap().is_empty());

        // Second close loses the race.
        let again = coordinator
            .close_position(&fill.position, PositionStatus::StopLoss, dec!(1))
            .await;
        assert!(matches!(again, Err(ExecutionError::Conflict(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_close_reopens_position() {
        let (paper, coordinator, _) = setup(KernelConfig::default()).await;
        let fill = coordinator.execute_entry(&target()).await.unwrap();
        paper.set_latency(std::time::Duration::from_secs(2));

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            coordinator.close_position(&fill.position, PositionStatus::Closed, dec!(2)),
        )
        .await;
        assert!(abandoned.is_err());

        let mut open = Vec::new();
        for _ in 0..10 {
            open = coordinator.positions().list_open().await.unwrap();
            if !open.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].status, PositionStatus::Open);

        paper.set_latency(std::time::Duration::ZERO);
        let exit = coordinator
            .close_position(&fill.position, PositionStatus::Closed, dec!(2))
            .await
            .unwrap();
        assert_eq!(exit.position.status, PositionStatus::Closed);
    }

    #[tokio::test]
    async fn test_failed_exit_reopens_position() {
        let (paper, coordinator, _) = setup(KernelConfig::default()).await;
        let fill = coordinator.execute_entry(&target()).await.unwrap();
        paper
            .fail_orders(
                ExchangeError::Rejected {
                    code: None,
                    message: "no".to_string(),
                },
                1,
            )
            .await;

        assert!(coordinator
            .close_position(&fill.position, PositionStatus::StopLoss, dec!(1.6))
            .await
            .is_err());
        let open = coordinator.positions().list_open().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].status, PositionStatus::Open);
    }
}
