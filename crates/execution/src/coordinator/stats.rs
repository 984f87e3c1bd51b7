//! Rolling exchange call statistics.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::RwLock;

const DEFAULT_WINDOW: usize = 100;

#[derive(Debug, Clone, Copy)]
struct Sample {
    latency_ms: u64,
    success: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStatsSnapshot {
    /// Samples currently in the window.
    pub samples: usize,
    pub avg_latency_ms: u64,
    /// 1.0 when no samples have been recorded.
    pub success_rate: Decimal,
    pub total_calls: u64,
    pub total_failures: u64,
}

/// Latency and success rate over the last `window` calls.
pub struct ApiStats {
    window: usize,
    inner: RwLock<StatsInner>,
}

#[derive(Default)]
struct StatsInner {
    samples: VecDeque<Sample>,
    total_calls: u64,
    total_failures: u64,
}

impl ApiStats {
    pub fn with_window(window: usize) -> Self {
        Self {
            window: window.max(1),
            inner: RwLock::new(StatsInner::default()),
        }
    }

    pub async fn record(&self, latency_ms: u64, success: bool) {
        let mut inner = self.inner.write().await;
        if inner.samples.len() == self.window {
            inner.samples.pop_front();
        }
        inner.samples.push_back(Sample { latency_ms, success });
        inner.total_calls += 1;
        if !success {
            inner.total_failures += 1;
        }
    }

    pub async fn snapshot(&self) -> ApiStatsSnapshot {
        let inner = self.inner.read().await;
        let samples = inner.samples.len();
        if samples == 0 {
            return ApiStatsSnapshot {
                success_rate: Decimal::ONE,
                total_calls: inner.total_calls,
                total_failures: inner.total_failures,
                ..Default::default()
            };
        }
        let latency: u64 = inner.samples.iter().map(|s| s.latency_ms).sum();
        let successes = inner.samples.iter().filter(|s| s.success).count();
        ApiStatsSnapshot {
            samples,
            avg_latency_ms: latency / samples as u64,
            success_rate: (Decimal::from(successes) / Decimal::from(samples)).round_dp(4),
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
        }
    }
}

impl Default for ApiStats {
    fn default() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }
}
