//! Circuit breaker guarding new entries.
//!
//! `Closed` admits everything. After `failure_threshold` consecutive
//! failures it opens and rejects without touching the network. Once the
//! cool-down elapses the next caller is admitted as the single half-open
//! trial; every other caller is rejected until that trial reports back.

use crate::config::BreakerConfig;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed (normal operation).
    Closed,
    /// Circuit is open (operations blocked).
    Open,
    /// One trial call is allowed through.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

/// How a call was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Normal,
    /// The single half-open trial. Its outcome decides the next state.
    Trial,
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Time spent open before a trial is admitted.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

impl From<&BreakerConfig> for CircuitBreakerConfig {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            cooldown: Duration::from_millis(config.cooldown_ms),
        }
    }
}

/// Three-state circuit breaker.
pub struct CircuitBreaker {
    /// Current state. Always locked before `opened_at`.
    state: RwLock<CircuitState>,
    config: RwLock<CircuitBreakerConfig>,
    failure_count: AtomicU32,
    opened_at: RwLock<Option<Instant>>,
    /// Held open until an operator reset.
    manually_tripped: AtomicBool,
    trial_in_flight: AtomicBool,
    trip_count: AtomicU32,
    rejected_count: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: RwLock::new(CircuitState::Closed),
            config: RwLock::new(config),
            failure_count: AtomicU32::new(0),
            opened_at: RwLock::new(None),
            manually_tripped: AtomicBool::new(false),
            trial_in_flight: AtomicBool::new(false),
            trip_count: AtomicU32::new(0),
            rejected_count: AtomicU64::new(0),
        }
    }

    pub async fn update_config(&self, config: CircuitBreakerConfig) {
        *self.config.write().await = config;
    }

    /// Admits or rejects a call. Never blocks on I/O.
    pub async fn try_acquire(&self) -> Option<Admission> {
        if self.manually_tripped.load(Ordering::SeqCst) {
            self.rejected_count.fetch_add(1, Ordering::SeqCst);
            return None;
        }

        let mut state = self.state.write().await;
        let admission = match *state {
            CircuitState::Closed => Some(Admission::Normal),
            CircuitState::Open => {
                let cooldown = self.config.read().await.cooldown;
                let cooled = self
                    .opened_at
                    .read()
                    .await
                    .is_some_and(|at| at.elapsed() >= cooldown);
                if cooled {
                    info!(old_state = ?*state, new_state = ?CircuitState::HalfOpen, "Circuit breaker state changed");
                    *state = CircuitState::HalfOpen;
                    self.trial_in_flight.store(true, Ordering::SeqCst);
                    Some(Admission::Trial)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => self
                .trial_in_flight
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .ok()
                .map(|_| Admission::Trial),
        };
        if admission.is_none() {
            self.rejected_count.fetch_add(1, Ordering::SeqCst);
        }
        admission
    }

    /// Cheap check without claiming the trial slot.
    pub async fn is_allowed(&self) -> bool {
        if self.manually_tripped.load(Ordering::SeqCst) {
            return false;
        }
        match *self.state.read().await {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => !self.trial_in_flight.load(Ordering::SeqCst),
            CircuitState::Open => {
                let cooldown = self.config.read().await.cooldown;
                self.opened_at
                    .read()
                    .await
                    .is_some_and(|at| at.elapsed() >= cooldown)
            }
        }
    }

    /// Records a successful operation.
    pub async fn record_success(&self, admission: Admission) {
        self.failure_count.store(0, Ordering::SeqCst);
        if admission == Admission::Trial {
            let mut state = self.state.write().await;
            if *state == CircuitState::HalfOpen {
                *state = CircuitState::Closed;
                *self.opened_at.write().await = None;
                info!("Circuit breaker closed after successful trial");
            }
            self.trial_in_flight.store(false, Ordering::SeqCst);
        }
    }

    /// Records a failed operation.
    pub async fn record_failure(&self, admission: Admission) {
        match admission {
            Admission::Trial => {
                self.trial_in_flight.store(false, Ordering::SeqCst);
                self.trip("half-open trial failed").await;
            }
            Admission::Normal => {
                let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                let threshold = self.config.read().await.failure_threshold;
                if *self.state.read().await == CircuitState::Closed && count >= threshold {
                    self.trip("consecutive failures exceeded threshold").await;
                }
            }
        }
    }

    /// Gives back an admission whose call never reached the exchange.
    pub fn abandon(&self, admission: Admission) {
        if admission == Admission::Trial {
            self.trial_in_flight.store(false, Ordering::SeqCst);
        }
    }

    /// Opens the circuit now; it recovers through the normal cool-down.
    pub async fn force_open(&self, reason: &str) {
        self.trip(reason).await;
    }

    /// Opens the circuit and holds it open until [`reset`](Self::reset).
    pub async fn manual_trip(&self, reason: &str) {
        self.manually_tripped.store(true, Ordering::SeqCst);
        self.trip(&format!("manual trip: {reason}")).await;
    }

    async fn trip(&self, reason: &str) {
        let mut state = self.state.write().await;
        if *state != CircuitState::Open {
            info!(old_state = ?*state, new_state = ?CircuitState::Open, "Circuit breaker state changed");
        }
        *state = CircuitState::Open;
        *self.opened_at.write().await = Some(Instant::now());
        self.failure_count.store(0, Ordering::SeqCst);
        self.trip_count.fetch_add(1, Ordering::SeqCst);
        error!(reason = reason, "Circuit breaker tripped");
    }

    /// Gets the current state.
    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }

    /// Operator reset to closed.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        *state = CircuitState::Closed;
        *self.opened_at.write().await = None;
        self.failure_count.store(0, Ordering::SeqCst);
        self.manually_tripped.store(false, Ordering::SeqCst);
        self.trial_in_flight.store(false, Ordering::SeqCst);
        warn!("Circuit breaker reset");
    }

    pub async fn stats(&self) -> CircuitBreakerStats {
        let state = *self.state.read().await;
        let cooldown = self.config.read().await.cooldown;
        let cooldown_remaining_ms = match (state, *self.opened_at.read().await) {
            (CircuitState::Open, Some(at)) => {
                Some(cooldown.saturating_sub(at.elapsed()).as_millis() as u64)
            }
            _ => None,
        };
        CircuitBreakerStats {
            state,
            failure_count: self.failure_count.load(Ordering::SeqCst),
            manually_tripped: self.manually_tripped.load(Ordering::SeqCst),
            trial_in_flight: self.trial_in_flight.load(Ordering::SeqCst),
            trip_count: self.trip_count.load(Ordering::SeqCst),
            rejected_count: self.rejected_count.load(Ordering::SeqCst),
            cooldown_remaining_ms,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

/// Statistics for the circuit breaker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u32,
    pub manually_tripped: bool,
    pub trial_in_flight: bool,
    pub trip_count: u32,
    /// Calls rejected without reaching the exchange.
    pub rejected_count: u64,
    pub cooldown_remaining_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_secs(10),
        })
    }

    #[tokio::test]
    async fn test_circuit_breaker_closed() {
        let cb = CircuitBreaker::default();
        assert_eq!(cb.try_acquire().await, Some(Admission::Normal));
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_circuit_breaker_trips_on_failures() {
        let cb = breaker(2);
        cb.record_failure(Admission::Normal).await;
        assert!(cb.try_acquire().await.is_some());

        cb.record_failure(Admission::Normal).await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(cb.try_acquire().await.is_none());
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_count() {
        let cb = breaker(2);
        cb.record_failure(Admission::Normal).await;
        cb.record_success(Admission::Normal).await;
        cb.record_failure(Admission::Normal).await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_half_open_trial() {
        let cb = breaker(1);
        cb.record_failure(Admission::Normal).await;
        assert!(cb.try_acquire().await.is_none());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cb.try_acquire().await, Some(Admission::Trial));
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        // Only one trial at a time.
        assert!(cb.try_acquire().await.is_none());

        cb.record_success(Admission::Trial).await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(cb.try_acquire().await, Some(Admission::Normal));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens_and_restarts_cooldown() {
        let cb = breaker(1);
        cb.record_failure(Admission::Normal).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        let trial = cb.try_acquire().await.unwrap();
        cb.record_failure(trial).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cb.try_acquire().await.is_none());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cb.try_acquire().await, Some(Admission::Trial));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_frees_slot() {
        let cb = breaker(1);
        cb.record_failure(Admission::Normal).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        let trial = cb.try_acquire().await.unwrap();
        cb.abandon(trial);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        assert_eq!(cb.try_acquire().await, Some(Admission::Trial));
    }

    #[tokio::test]
    async fn test_circuit_breaker_manual_trip_and_reset() {
        let cb = CircuitBreaker::default();
        cb.manual_trip("test").await;
        assert!(cb.try_acquire().await.is_none());
        assert!(cb.stats().await.manually_tripped);

        cb.reset().await;
        assert!(cb.try_acquire().await.is_some());
    }
}
