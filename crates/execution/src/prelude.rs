//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types from the crate.
//!
//! # Example
//!
//! ```rust
//! use sniper_execution::prelude::*;
//! ```

// Config
pub use crate::config::{ConfigError, ConfigWatcher, KernelConfig, QueueConfig, SafetyThresholds, StoreKind};

// Coordinator
pub use crate::coordinator::{
    ConcurrencyGate, CoordinatorMetrics, EntryFill, ExecutionCoordinator, ExitFill, GateMetrics,
};

// Emergency
pub use crate::emergency::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState, EmergencyExitConfig,
    EmergencyExitManager, ExitResult, ExitStatus, RecoveryAction, RecoveryActionExecutor,
    RecoveryExecution, RecoveryExecutor, RecoveryPlan, RecoveryStatus,
};

// Errors
pub use crate::error::{
    ExecutionError, FailureClass, JobError, LifecycleError, QueueError, RecoveryError, SafetyViolation,
};

// Exchange
pub use crate::exchange::{ExchangeClient, ExchangeError, MexcClient, MexcCredentials, PaperExchange};

// Jobs
pub use crate::jobs::{
    HousekeepingHandler, RiskCheckHandler, SnipeExecutionHandler, StaticTargetSource, SyncHandler,
    TargetSource,
};

// Lifecycle
pub use crate::lifecycle::{
    AggregateStats, LifecycleEvent, LifecycleEventType, LifecycleTracker, PassReport, TargetLifecycleManager,
    TargetOutcome,
};

// Monitor
pub use crate::monitor::{BalanceGuard, BlockReason, GuardDecision, MonitorReport, PositionMonitor};

// Queue
pub use crate::queue::{JobContext, JobDispatcher, JobHandler, JobWorker, LeasedJob, QueueHealth};

// Safety
pub use crate::safety::{HaltSwitch, KernelRecoveryActions, RiskMetrics, SafetyCoordinator, SafetySnapshot};

// Scheduler
pub use crate::scheduler::{Schedule, ScheduleBuilder, ScheduledTask, Scheduler, SchedulerHandle, TaskEvent};
