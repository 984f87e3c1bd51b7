//! Kernel configuration.
//!
//! Resolution order: built-in defaults, then the config file (TOML, or JSON
//! when the extension is `.json`), then `SNIPER_*` environment overrides.
//! The merged result is validated before use. A missing file falls back to
//! defaults; a file that exists but does not parse is an error.

mod watcher;

pub use watcher::ConfigWatcher;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "SNIPER_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Backing store of the job queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Durable relational table.
    Database,
    /// Lightweight broker-style queue.
    Broker,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Broker => "broker",
        }
    }

    /// The store that is not `self`.
    pub fn other(&self) -> Self {
        match self {
            Self::Database => Self::Broker,
            Self::Broker => Self::Database,
        }
    }
}

impl std::str::FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "database" | "db" | "postgres" => Ok(Self::Database),
            "broker" | "memory" => Ok(Self::Broker),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RetryConfig {
    pub max_retries: u32,
    #[serde(rename = "baseDelay")]
    pub base_delay_ms: u64,
    #[serde(rename = "maxDelay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// `base * 2^attempt`, capped at the max delay.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ExecutionWindow {
    /// A target becomes ready this long before its execution time.
    pub pre_buffer_ms: u64,
    /// An active target this long past its execution time is missed.
    pub post_buffer_ms: u64,
}

impl Default for ExecutionWindow {
    fn default() -> Self {
        Self {
            pre_buffer_ms: 5_000,
            post_buffer_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct QueueConfig {
    pub primary: StoreKind,
    pub fallback_enabled: bool,
    pub dual_run: bool,
    /// Visibility timeout of a leased job.
    pub lease_ms: u64,
    /// How long `pop` waits before looking again.
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            primary: StoreKind::Database,
            fallback_enabled: true,
            dual_run: false,
            lease_ms: 30_000,
            poll_interval_ms: 1_000,
            max_attempts: 5,
            backoff_base_ms: 1_000,
            backoff_max_ms: 300_000,
            workers: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct MonitorConfig {
    pub interval_ms: u64,
    /// Balance kept free on top of every entry, in percent of the spend.
    pub balance_buffer_pct: Decimal,
    pub quote_asset: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            balance_buffer_pct: Decimal::from(5),
            quote_asset: "USDT".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
        }
    }
}

/// One severity level of risk limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ThresholdSet {
    pub drawdown_pct: Decimal,
    /// Open exposure in quote currency.
    pub exposure: Decimal,
    pub consecutive_losses: u32,
    pub api_latency_ms: u64,
    /// Lower bound; breached when the observed rate falls below it.
    pub api_success_rate: Decimal,
    pub detection_failure_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SafetyThresholds {
    pub warning: ThresholdSet,
    pub critical: ThresholdSet,
    /// Two critical crossings inside this window escalate to emergency.
    pub escalation_window_ms: u64,
    pub recovery_phase_timeout_ms: u64,
    /// Equity the drawdown is measured against.
    pub capital_base: Decimal,
}

impl Default for SafetyThresholds {
    fn default() -> Self {
        Self {
            warning: ThresholdSet {
                drawdown_pct: Decimal::from(10),
                exposure: Decimal::from(5_000),
                consecutive_losses: 3,
                api_latency_ms: 1_000,
                api_success_rate: Decimal::new(95, 2),
                detection_failure_rate: Decimal::new(20, 2),
            },
            critical: ThresholdSet {
                drawdown_pct: Decimal::from(20),
                exposure: Decimal::from(10_000),
                consecutive_losses: 5,
                api_latency_ms: 3_000,
                api_success_rate: Decimal::new(80, 2),
                detection_failure_rate: Decimal::new(50, 2),
            },
            escalation_window_ms: 300_000,
            recovery_phase_timeout_ms: 60_000,
            capital_base: Decimal::from(10_000),
        }
    }
}

/// Complete kernel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct KernelConfig {
    pub max_concurrent_requests: usize,
    #[serde(rename = "requestTimeout")]
    pub request_timeout_ms: u64,
    /// Master switch for new entries.
    pub enabled: bool,
    pub retry_config: RetryConfig,
    pub execution_window: ExecutionWindow,
    /// How far ahead of its time a ready target may be dispatched.
    pub advance_window_ms: u64,
    pub min_confidence: Decimal,
    pub queue: QueueConfig,
    pub monitor: MonitorConfig,
    pub breaker: BreakerConfig,
    pub safety: SafetyThresholds,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 5,
            request_timeout_ms: 10_000,
            enabled: true,
            retry_config: RetryConfig::default(),
            execution_window: ExecutionWindow::default(),
            advance_window_ms: 30_000,
            min_confidence: Decimal::new(70, 2),
            queue: QueueConfig::default(),
            monitor: MonitorConfig::default(),
            breaker: BreakerConfig::default(),
            safety: SafetyThresholds::default(),
        }
    }
}

impl KernelConfig {
    /// Loads, overrides from the process environment, and validates.
    ///
    /// # Errors
    /// Returns an error if the file is unreadable or malformed, an override
    /// does not parse, or the merged config fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env_overrides_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a config file without applying overrides or validation.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&raw, path)?;
        info!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            serde_json::from_str(raw).map_err(|e| e.to_string())
        } else {
            toml::from_str(raw).map_err(|e| e.to_string())
        };
        parsed.map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Applies `SNIPER_*` overrides looked up through `lookup`.
    ///
    /// # Errors
    /// Returns an error naming the first override that does not parse.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(
            lookup: &dyn Fn(&str) -> Option<String>,
            name: &str,
        ) -> Result<Option<T>, ConfigError> {
            let key = format!("{ENV_PREFIX}{name}");
            match lookup(&key) {
                None => Ok(None),
                Some(value) => value
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| ConfigError::InvalidEnv { key, value }),
            }
        }

        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;
        if let Some(v) = parsed(lookup, "MAX_CONCURRENT_REQUESTS")? {
            self.max_concurrent_requests = v;
        }
        if let Some(v) = parsed(lookup, "REQUEST_TIMEOUT_MS")? {
            self.request_timeout_ms = v;
        }
        if let Some(v) = parsed(lookup, "ENABLED")? {
            self.enabled = v;
        }
        if let Some(v) = parsed(lookup, "RETRY_MAX_RETRIES")? {
            self.retry_config.max_retries = v;
        }
        if let Some(v) = parsed(lookup, "RETRY_BASE_DELAY_MS")? {
            self.retry_config.base_delay_ms = v;
        }
        if let Some(v) = parsed(lookup, "RETRY_MAX_DELAY_MS")? {
            self.retry_config.max_delay_ms = v;
        }
        if let Some(v) = parsed(lookup, "PRE_BUFFER_MS")? {
            self.execution_window.pre_buffer_ms = v;
        }
        if let Some(v) = parsed(lookup, "POST_BUFFER_MS")? {
            self.execution_window.post_buffer_ms = v;
        }
        if let Some(v) = parsed(lookup, "MIN_CONFIDENCE")? {
            self.min_confidence = v;
        }
        if let Some(v) = parsed(lookup, "QUEUE_PRIMARY")? {
            self.queue.primary = v;
        }
        if let Some(v) = parsed(lookup, "QUEUE_FALLBACK")? {
            self.queue.fallback_enabled = v;
        }
        if let Some(v) = parsed(lookup, "QUEUE_DUAL_RUN")? {
            self.queue.dual_run = v;
        }
        if let Some(v) = parsed(lookup, "MONITOR_INTERVAL_MS")? {
            self.monitor.interval_ms = v;
        }
        if let Some(v) = parsed(lookup, "BALANCE_BUFFER_PCT")? {
            self.monitor.balance_buffer_pct = v;
        }
        Ok(())
    }

    /// Rejects settings the kernel cannot run with.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let hundred = Decimal::ONE_HUNDRED;
        let checks: [(bool, &str); 15] = [
            (self.max_concurrent_requests >= 1, "maxConcurrentRequests must be at least 1"),
            (self.request_timeout_ms > 0, "requestTimeout must be positive"),
            (
                self.retry_config.base_delay_ms <= self.retry_config.max_delay_ms,
                "retryConfig.baseDelay must not exceed retryConfig.maxDelay",
            ),
            (
                self.queue.backoff_base_ms <= self.queue.backoff_max_ms,
                "queue.backoffBaseMs must not exceed queue.backoffMaxMs",
            ),
            (self.queue.lease_ms > 0, "queue.leaseMs must be positive"),
            (self.queue.poll_interval_ms > 0, "queue.pollIntervalMs must be positive"),
            (self.queue.max_attempts >= 1, "queue.maxAttempts must be at least 1"),
            (self.monitor.interval_ms > 0, "monitor.intervalMs must be positive"),
            (
                self.monitor.balance_buffer_pct >= Decimal::ZERO
                    && self.monitor.balance_buffer_pct <= hundred,
                "monitor.balanceBufferPct must be within 0..=100",
            ),
            (
                self.min_confidence >= Decimal::ZERO && self.min_confidence <= Decimal::ONE,
                "minConfidence must be within 0..=1",
            ),
            (self.breaker.failure_threshold >= 1, "breaker.failureThreshold must be at least 1"),
            (
                self.safety.warning.drawdown_pct <= self.safety.critical.drawdown_pct
                    && self.safety.warning.exposure <= self.safety.critical.exposure
                    && self.safety.warning.consecutive_losses <= self.safety.critical.consecutive_losses
                    && self.safety.warning.api_latency_ms <= self.safety.critical.api_latency_ms,
                "safety warning limits must not exceed critical limits",
            ),
            (
                self.safety.warning.api_success_rate >= self.safety.critical.api_success_rate
                    && self.safety.critical.api_success_rate >= Decimal::ZERO
                    && self.safety.warning.api_success_rate <= Decimal::ONE,
                "safety apiSuccessRate limits must satisfy 0 <= critical <= warning <= 1",
            ),
            (self.safety.escalation_window_ms > 0, "safety.escalationWindowMs must be positive"),
            (self.safety.capital_base > Decimal::ZERO, "safety.capitalBase must be positive"),
        ];
        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, message)) => Err(ConfigError::Invalid((*message).to_string())),
            None => Ok(()),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// How long a target may sit in `executing` before it counts as
    /// abandoned: one request timeout per attempt, plus one spare.
    pub fn stale_executing(&self) -> chrono::Duration {
        let attempts = u64::from(self.retry_config.max_retries).saturating_add(2);
        let ms = self.request_timeout_ms.saturating_mul(attempts);
        chrono::Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
    }

    pub fn advance_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.advance_window_ms).unwrap_or(i64::MAX))
    }
}
