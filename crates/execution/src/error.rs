//! Error types shared across the kernel.

use crate::exchange::ExchangeError;
use crate::monitor::BlockReason;
use rust_decimal::Decimal;
use sniper_data::StoreError;
use sniper_domain::entities::JobPayloadError;
use sniper_domain::enums::{SafetyStatus, TargetStatus};
use sniper_domain::precision::PrecisionError;
use thiserror::Error;
use uuid::Uuid;

/// Raised while the safety layer holds trading halted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("trading halted ({status}): {reason}")]
pub struct SafetyViolation {
    pub status: SafetyStatus,
    pub reason: String,
}

/// How a failed execution attempt affects the target's retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Nothing reached the exchange; the attempt does not count.
    NotAttempted,
    /// May succeed later; consumes one retry.
    Transient,
    /// Never retried.
    Terminal,
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Halted(#[from] SafetyViolation),

    #[error("execution is disabled")]
    Disabled,

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error(transparent)]
    Precision(#[from] PrecisionError),

    #[error("entry blocked: {0}")]
    Blocked(BlockReason),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The buy filled but the position could not be stored. The fill is in
    /// the execution history; the target must not be bought again.
    #[error("order {order_id} filled at {entry_price} but the position was not stored: {source}")]
    FilledUnrecorded {
        order_id: String,
        entry_price: Decimal,
        quantity: Decimal,
        source: StoreError,
    },

    /// Another worker moved the record first.
    #[error("lost update race on {0}")]
    Conflict(String),
}

impl ExecutionError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Halted(_) | Self::Disabled | Self::CircuitOpen | Self::Conflict(_) => {
                FailureClass::NotAttempted
            }
            Self::Precision(_) | Self::FilledUnrecorded { .. } => FailureClass::Terminal,
            Self::Exchange(e) if e.is_retryable() => FailureClass::Transient,
            Self::Exchange(_) => FailureClass::Terminal,
            Self::Blocked(_) | Self::Store(_) => FailureClass::Transient,
        }
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Payload(#[from] JobPayloadError),

    #[error("job store {0} is not configured")]
    StoreMissing(&'static str),

    #[error("all job stores failed: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Halted(#[from] SafetyViolation),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoveryError {
    #[error("session {session} already has active recovery {execution}")]
    AlreadyActive { session: String, execution: Uuid },

    #[error("invalid recovery plan: {0}")]
    InvalidPlan(String),

    #[error("recovery execution {0} not found")]
    NotFound(Uuid),

    #[error("recovery execution {id} cannot be {action} while {status}")]
    InvalidState {
        id: Uuid,
        action: &'static str,
        status: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("target {0} not found")]
    NotFound(Uuid),

    #[error("target {id} cannot move from {from} to {to}")]
    IllegalTransition {
        id: Uuid,
        from: TargetStatus,
        to: TargetStatus,
    },

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// The stored status changed between read and write.
    #[error("target {0} was updated concurrently")]
    Conflict(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure reported by a job handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// Back to pending with backoff, until attempts run out.
    #[error("{0}")]
    Retryable(String),

    /// Dead-lettered immediately.
    #[error("{0}")]
    Fatal(String),
}
