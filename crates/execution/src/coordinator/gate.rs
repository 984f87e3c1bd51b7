//! Concurrency gate bounding in-flight exchange calls.

use super::stats::ApiStats;
use crate::exchange::ExchangeError;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateMetrics {
    pub active: usize,
    pub queued: usize,
    pub max_concurrency: usize,
    pub timeout_ms: u64,
}

/// Decrements a counter when dropped, including on cancellation.
struct CountGuard<'a>(&'a AtomicUsize);

impl<'a> CountGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for CountGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Admits at most `max_concurrency` calls at once. Each admitted call runs
/// under its own timeout; a timed-out call is dropped and frees its slot
/// without affecting the others.
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    max_concurrency: AtomicUsize,
    timeout_ms: AtomicU64,
    active: AtomicUsize,
    queued: AtomicUsize,
    stats: ApiStats,
}

impl ConcurrencyGate {
    pub fn new(max_concurrency: usize, timeout: Duration) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency: AtomicUsize::new(max_concurrency),
            timeout_ms: AtomicU64::new(timeout.as_millis() as u64),
            active: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
            stats: ApiStats::default(),
        }
    }

    /// Runs `call` once a slot is free.
    ///
    /// # Errors
    /// Returns the call's own error, or [`ExchangeError::Timeout`] when it
    /// outlives the per-call timeout.
    pub async fn run<T, F>(&self, label: &str, call: F) -> Result<T, ExchangeError>
    where
        F: Future<Output = Result<T, ExchangeError>>,
    {
        let permit = {
            let _queued = CountGuard::enter(&self.queued);
            Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .map_err(|_| ExchangeError::Network("concurrency gate closed".to_string()))?
        };
        let _active = CountGuard::enter(&self.active);

        let timeout_ms = self.timeout_ms.load(Ordering::SeqCst);
        let started = Instant::now();
        let result = match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(call = label, timeout_ms, "Exchange call timed out");
                Err(ExchangeError::Timeout(timeout_ms))
            }
        };
        drop(permit);

        let latency_ms = started.elapsed().as_millis() as u64;
        // A rejection is still a healthy round trip.
        let reachable = result.as_ref().map_or_else(|e| !e.is_retryable(), |_| true);
        self.stats.record(latency_ms, reachable).await;
        debug!(call = label, latency_ms, ok = result.is_ok(), "Exchange call finished");
        result
    }

    /// Applies a new limit. Shrinking takes effect as running calls finish.
    pub fn resize(&self, max_concurrency: usize) {
        let new = max_concurrency.max(1);
        let old = self.max_concurrency.swap(new, Ordering::SeqCst);
        if new > old {
            self.semaphore.add_permits(new - old);
        } else if new < old {
            let forgotten = self.semaphore.forget_permits(old - new);
            if forgotten < old - new {
                // Remaining permits are held by running calls; reclaim them later.
                let semaphore = Arc::clone(&self.semaphore);
                let missing = (old - new - forgotten) as u32;
                tokio::spawn(async move {
                    if let Ok(permits) = semaphore.acquire_many_owned(missing).await {
                        permits.forget();
                    }
                });
            }
        }
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms.store(timeout.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn stats(&self) -> &ApiStats {
        &self.stats
    }

    pub fn metrics(&self) -> GateMetrics {
        GateMetrics {
            active: self.active.load(Ordering::SeqCst),
            queued: self.queued.load(Ordering::SeqCst),
            max_concurrency: self.max_concurrency.load(Ordering::SeqCst),
            timeout_ms: self.timeout_ms.load(Ordering::SeqCst),
        }
    }
}
