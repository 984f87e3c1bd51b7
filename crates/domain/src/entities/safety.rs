use crate::enums::SafetyStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl From<SafetyStatus> for AlertSeverity {
    fn from(status: SafetyStatus) -> Self {
        match status {
            SafetyStatus::Safe => Self::Info,
            SafetyStatus::Warning => Self::Warning,
            SafetyStatus::Critical => Self::Critical,
            SafetyStatus::Emergency => Self::Emergency,
        }
    }
}

/// Detected risk condition. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyAlert {
    pub id: Uuid,
    pub severity: AlertSeverity,
    /// Metric that crossed its threshold, e.g. `drawdown_pct`.
    pub metric: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl SafetyAlert {
    pub fn new(severity: AlertSeverity, metric: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            severity,
            metric: metric.into(),
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyActionKind {
    HaltTrading,
    ReduceExposure,
    EmergencyClose,
    StartRecovery,
}

/// Automated mitigation taken by the safety layer. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyAction {
    pub id: Uuid,
    pub kind: SafetyActionKind,
    pub reason: String,
    /// Alert that caused the action, if any.
    pub alert_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl SafetyAction {
    pub fn new(kind: SafetyActionKind, reason: impl Into<String>, alert_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            reason: reason.into(),
            alert_id,
            created_at: Utc::now(),
        }
    }
}
