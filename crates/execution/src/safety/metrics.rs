//! Risk metrics and threshold classification.

use crate::config::{SafetyThresholds, ThresholdSet};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sniper_domain::enums::SafetyStatus;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Point-in-time risk snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    pub drawdown_pct: Decimal,
    /// Cost basis of open positions, in quote currency.
    pub exposure: Decimal,
    pub open_positions: usize,
    pub consecutive_losses: u32,
    pub api_latency_ms: u64,
    pub api_success_rate: Decimal,
    pub detection_failure_rate: Decimal,
    pub computed_at: DateTime<Utc>,
}

impl Default for RiskMetrics {
    fn default() -> Self {
        Self {
            drawdown_pct: Decimal::ZERO,
            exposure: Decimal::ZERO,
            open_positions: 0,
            consecutive_losses: 0,
            api_latency_ms: 0,
            api_success_rate: Decimal::ONE,
            detection_failure_rate: Decimal::ZERO,
            computed_at: Utc::now(),
        }
    }
}

/// One metric outside its limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breach {
    pub metric: &'static str,
    pub level: SafetyStatus,
    pub observed: String,
    pub limit: String,
}

impl Breach {
    pub fn message(&self) -> String {
        format!(
            "{} at {} breached {} limit {}",
            self.metric, self.observed, self.level, self.limit
        )
    }
}

fn breaches_at(metrics: &RiskMetrics, limits: &ThresholdSet, level: SafetyStatus) -> Vec<Breach> {
    let mut out = Vec::new();
    let mut push = |metric: &'static str, breached: bool, observed: String, limit: String| {
        if breached {
            out.push(Breach {
                metric,
                level,
                observed,
                limit,
            });
        }
    };
    push(
        "drawdown_pct",
        metrics.drawdown_pct >= limits.drawdown_pct,
        metrics.drawdown_pct.to_string(),
        limits.drawdown_pct.to_string(),
    );
    push(
        "exposure",
        metrics.exposure >= limits.exposure,
        metrics.exposure.to_string(),
        limits.exposure.to_string(),
    );
    push(
        "consecutive_losses",
        metrics.consecutive_losses >= limits.consecutive_losses,
        metrics.consecutive_losses.to_string(),
        limits.consecutive_losses.to_string(),
    );
    push(
        "api_latency_ms",
        metrics.api_latency_ms >= limits.api_latency_ms,
        metrics.api_latency_ms.to_string(),
        limits.api_latency_ms.to_string(),
    );
    push(
        "api_success_rate",
        metrics.api_success_rate < limits.api_success_rate,
        metrics.api_success_rate.to_string(),
        limits.api_success_rate.to_string(),
    );
    push(
        "detection_failure_rate",
        metrics.detection_failure_rate >= limits.detection_failure_rate,
        metrics.detection_failure_rate.to_string(),
        limits.detection_failure_rate.to_string(),
    );
    out
}

/// Worst level reached by `metrics` and the breaches behind it.
///
/// A metric past its critical limit reports only the critical breach.
/// Never returns [`SafetyStatus::Emergency`]; escalation is time-based.
pub fn classify(metrics: &RiskMetrics, thresholds: &SafetyThresholds) -> (SafetyStatus, Vec<Breach>) {
    let critical = breaches_at(metrics, &thresholds.critical, SafetyStatus::Critical);
    let mut breaches: Vec<Breach> = breaches_at(metrics, &thresholds.warning, SafetyStatus::Warning)
        .into_iter()
        .filter(|w| !critical.iter().any(|c| c.metric == w.metric))
        .collect();
    breaches.extend(critical);

    let status = breaches
        .iter()
        .map(|b| b.level)
        .max()
        .unwrap_or(SafetyStatus::Safe);
    (status, breaches)
}

/// Rolling failure rate of upstream listing detection.
pub struct DetectionTracker {
    window: usize,
    samples: Mutex<VecDeque<bool>>,
}

impl DetectionTracker {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            samples: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record(&self, success: bool) {
        if let Ok(mut samples) = self.samples.lock() {
            if samples.len() == self.window {
                samples.pop_front();
            }
            samples.push_back(success);
        }
    }

    pub fn failure_rate(&self) -> Decimal {
        let Ok(samples) = self.samples.lock() else {
            return Decimal::ZERO;
        };
        if samples.is_empty() {
            return Decimal::ZERO;
        }
        let failures = samples.iter().filter(|ok| !**ok).count();
        (Decimal::from(failures) / Decimal::from(samples.len())).round_dp(4)
    }
}

impl Default for DetectionTracker {
    fn default() -> Self {
        Self::new(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_metrics_are_safe() {
        let (status, breaches) = classify(&RiskMetrics::default(), &SafetyThresholds::default());
        assert_eq!(status, SafetyStatus::Safe);
        assert!(breaches.is_empty());
    }

    #[test]
    fn test_warning_and_critical_levels() {
        let thresholds = SafetyThresholds::default();
        let warning = RiskMetrics {
            drawdown_pct: dec!(12),
            ..Default::default()
        };
        let (status, breaches) = classify(&warning, &thresholds);
        assert_eq!(status, SafetyStatus::Warning);
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].metric, "drawdown_pct");

        let critical = RiskMetrics {
            drawdown_pct: dec!(25),
            api_success_rate: dec!(0.9),
            ..Default::default()
        };
        let (status, breaches) = classify(&critical, &thresholds);
        assert_eq!(status, SafetyStatus::Critical);
        // Critical drawdown replaces the warning one; success rate is a warning.
        assert_eq!(breaches.len(), 2);
        assert!(breaches.iter().any(|b| b.metric == "drawdown_pct" && b.level == SafetyStatus::Critical));
        assert!(breaches.iter().any(|b| b.metric == "api_success_rate" && b.level == SafetyStatus::Warning));
    }

    #[test]
    fn test_detection_failure_rate() {
        let tracker = DetectionTracker::new(4);
        assert_eq!(tracker.failure_rate(), Decimal::ZERO);
        tracker.record(false);
        tracker.record(true);
        assert_eq!(tracker.failure_rate(), dec!(0.5));
        for _ in 0..4 {
            tracker.record(true);
        }
        assert_eq!(tracker.failure_rate(), Decimal::ZERO);
    }
}
