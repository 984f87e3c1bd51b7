pub mod execution_record;
pub mod job;
pub mod position;
pub mod safety;
pub mod target;

// Re-export for easier access
pub use execution_record::{ExecutionOutcome, ExecutionRecord};
pub use job::{
    HousekeepingPayload, Job, JobPayload, JobPayloadError, JobType, RiskCheckPayload,
    SnipeExecutionPayload, SyncPayload,
};
pub use position::{Position, PositionId};
pub use safety::{AlertSeverity, SafetyAction, SafetyActionKind, SafetyAlert};
pub use target::{SnipeTarget, TakeProfit, dispatch_order};
