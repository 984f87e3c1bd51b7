//! Execution coordinator.
//!
//! Every exchange call goes through one [`ConcurrencyGate`]. Entries are
//! additionally protected by the circuit breaker and the balance guard.

mod executor;
mod gate;
mod ledger;
mod retry;
mod stats;

pub use executor::{CoordinatorMetrics, EntryFill, ExecutionCoordinator, ExitFill, MarketSnapshot};
pub use gate::{ConcurrencyGate, GateMetrics};
pub use ledger::{LedgerSnapshot, TradeLedger};
pub use retry::with_retry;
pub use stats::{ApiStats, ApiStatsSnapshot};
