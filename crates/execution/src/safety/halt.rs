//! Process-wide trading halt.

use crate::error::SafetyViolation;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sniper_domain::enums::SafetyStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HaltInfo {
    pub reason: String,
    pub since: DateTime<Utc>,
}

#[derive(Default)]
struct HaltInner {
    engaged: AtomicBool,
    info: RwLock<Option<HaltInfo>>,
}

/// Shared halt flag read by the coordinator and the dispatcher.
///
/// Engaging is synchronous so the flag is visible before any task spawned
/// afterwards runs. Clones share the same flag.
#[derive(Clone, Default)]
pub struct HaltSwitch {
    inner: Arc<HaltInner>,
}

impl HaltSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engage(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if let Ok(mut info) = self.inner.info.write() {
            if info.is_none() {
                *info = Some(HaltInfo {
                    reason: reason.clone(),
                    since: Utc::now(),
                });
            }
        }
        if !self.inner.engaged.swap(true, Ordering::SeqCst) {
            error!(reason = %reason, "Trading halted");
        }
    }

    /// Returns true if the switch was engaged.
    pub fn release(&self) -> bool {
        if let Ok(mut info) = self.inner.info.write() {
            *info = None;
        }
        let was_engaged = self.inner.engaged.swap(false, Ordering::SeqCst);
        if was_engaged {
            info!("Trading halt released");
        }
        was_engaged
    }

    pub fn is_engaged(&self) -> bool {
        self.inner.engaged.load(Ordering::SeqCst)
    }

    pub fn info(&self) -> Option<HaltInfo> {
        self.inner.info.read().ok().and_then(|info| info.clone())
    }

    /// # Errors
    /// Returns a [`SafetyViolation`] while engaged.
    pub fn check(&self) -> Result<(), SafetyViolation> {
        if !self.is_engaged() {
            return Ok(());
        }
        Err(SafetyViolation {
            status: SafetyStatus::Emergency,
            reason: self
                .info()
                .map_or_else(|| "halt engaged".to_string(), |info| info.reason),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engage_and_release() {
        let halt = HaltSwitch::new();
        assert!(halt.check().is_ok());

        let shared = halt.clone();
        halt.engage("drawdown");
        assert!(shared.is_engaged());
        let violation = shared.check().unwrap_err();
        assert_eq!(violation.reason, "drawdown");
        assert_eq!(violation.status, SafetyStatus::Emergency);

        // First reason wins while engaged.
        halt.engage("latency");
        assert_eq!(halt.info().unwrap().reason, "drawdown");

        assert!(shared.release());
        assert!(!halt.release());
        assert!(halt.check().is_ok());
    }
}
