//! Safety layer: halt switch, risk metrics and the safety coordinator.

mod actions;
mod coordinator;
mod halt;
mod metrics;

pub use actions::KernelRecoveryActions;
pub use coordinator::{SafetyAssessment, SafetyCoordinator, SafetyEvent, SafetySnapshot};
pub use halt::{HaltInfo, HaltSwitch};
pub use metrics::{Breach, DetectionTracker, RiskMetrics, classify};
