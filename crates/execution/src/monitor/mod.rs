//! Position monitoring and the pre-trade balance guard.

mod balance_guard;
mod position_monitor;

pub use balance_guard::{BalanceGuard, BlockReason, GuardDecision};
pub use position_monitor::{MonitorReport, PositionMonitor, TriggeredExit};
