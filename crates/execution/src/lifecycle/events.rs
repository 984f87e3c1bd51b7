//! Lifecycle events for snipe targets.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sniper_domain::entities::PositionId;
use sniper_domain::enums::TargetStatus;
use uuid::Uuid;

/// Type of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventType {
    /// Target was submitted.
    Created,
    /// Confidence met the bar; target is tracked for its window.
    Activated,
    /// Inside its execution window.
    Ready,
    /// Claimed by a worker for execution.
    Claimed,
    /// Entry filled.
    Completed,
    /// Attempt failed and the target went back to ready.
    RetryScheduled,
    /// Terminal failure.
    Failed,
    /// Cancelled by an operator or a missed window.
    Cancelled,
}

/// A lifecycle event for a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    /// Event ID.
    pub id: String,
    /// Event type.
    pub event_type: LifecycleEventType,
    pub target_id: Uuid,
    pub symbol: String,
    /// Status the target moved to.
    pub status: TargetStatus,
    /// Timestamp.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Event-specific data.
    pub data: EventData,
}

impl LifecycleEvent {
    /// Creates a new lifecycle event.
    pub fn new(
        event_type: LifecycleEventType,
        target_id: Uuid,
        symbol: impl Into<String>,
        status: TargetStatus,
        data: EventData,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            target_id,
            symbol: symbol.into(),
            status,
            timestamp: chrono::Utc::now(),
            data,
        }
    }
}

/// Event-specific data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventData {
    None,
    Claimed(ClaimedData),
    Completed(CompletedData),
    Retry(RetryData),
    Failed(FailedData),
    Cancelled(CancelledData),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedData {
    pub worker: String,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedData {
    pub position_id: PositionId,
    pub execution_price: Decimal,
    pub quantity: Decimal,
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryData {
    pub retries: u32,
    pub max_retries: u32,
    pub not_before: chrono::DateTime<chrono::Utc>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedData {
    pub retries: u32,
    pub error: String,
}

/// Reason for cancelling a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Operator cancel.
    Manual(String),
    /// The execution window passed before the target became ready.
    MissedWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledData {
    pub previous: TargetStatus,
    pub reason: CancelReason,
}
