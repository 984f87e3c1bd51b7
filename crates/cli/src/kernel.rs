//! Wiring of stores, exchange and kernel services for the binary.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use sniper_data::{
    Database, HistoryStore, JobStore, MemoryHistoryStore, MemoryJobStore, MemoryPositionStore,
    MemoryTargetStore, PositionStore, TargetStore,
};
use sniper_domain::entities::SnipeTarget;
use sniper_execution::config::{ConfigWatcher, KernelConfig};
use sniper_execution::coordinator::ExecutionCoordinator;
use sniper_execution::emergency::{EmergencyExitConfig, EmergencyExitManager, RecoveryExecutor};
use sniper_execution::exchange::{
    DEFAULT_BASE_URL, ExchangeClient, MexcClient, MexcCredentials, PaperExchange,
};
use sniper_execution::jobs::{
    HousekeepingHandler, RiskCheckHandler, SnipeExecutionHandler, StaticTargetSource, SyncHandler,
};
use sniper_execution::lifecycle::{TargetLifecycleManager, TargetOutcome};
use sniper_execution::monitor::PositionMonitor;
use sniper_execution::queue::{JobDispatcher, JobWorker};
use sniper_execution::safety::{HaltSwitch, KernelRecoveryActions, SafetyCoordinator};
use sniper_execution::scheduler::{ScheduleBuilder, ScheduledTask, TaskEvent};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const TASK_SNIPE_PASS: &str = "snipe-pass";
pub const TASK_PROMOTE: &str = "promote-targets";
pub const TASK_PERIODIC_JOBS: &str = "periodic-jobs";
pub const TASK_MONITOR: &str = "position-monitor";
pub const TASK_RISK: &str = "risk-recompute";
pub const TASK_CONFIG_RELOAD: &str = "config-reload";

pub struct Stores {
    pub database_jobs: Option<Arc<dyn JobStore>>,
    pub broker_jobs: Option<Arc<dyn JobStore>>,
    pub targets: Arc<dyn TargetStore>,
    pub positions: Arc<dyn PositionStore>,
    pub history: Arc<dyn HistoryStore>,
}

impl Stores {
    /// PostgreSQL-backed when `database_url` is set, in-memory otherwise. The
    /// broker queue is always the in-memory one.
    pub async fn open(database_url: Option<&str>) -> Result<Self> {
        let broker: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new("broker"));
        let Some(url) = database_url else {
            warn!("DATABASE_URL not set, state will not survive a restart");
            return Ok(Self {
                database_jobs: Some(Arc::new(MemoryJobStore::new("database"))),
                broker_jobs: Some(broker),
                targets: Arc::new(MemoryTargetStore::new()),
                positions: Arc::new(MemoryPositionStore::new()),
                history: Arc::new(MemoryHistoryStore::new()),
            });
        };

        let db = Database::connect(url).await.context("connecting to database")?;
        db.migrate().await.context("running migrations")?;
        info!("Database connected");
        Ok(Self {
            database_jobs: Some(Arc::new(db.jobs())),
            broker_jobs: Some(broker),
            targets: Arc::new(db.targets()),
            positions: Arc::new(db.positions()),
            history: Arc::new(db.history()),
        })
    }
}

/// Connection string for commands whose effect must outlive the process.
///
/// # Errors
/// Fails when no database is configured, since in-memory stores would drop
/// the work on exit.
pub fn require_database<'a>(database_url: Option<&'a str>, command: &str) -> Result<&'a str> {
    match database_url {
        Some(url) if !url.trim().is_empty() => Ok(url),
        _ => bail!("`{command}` needs DATABASE_URL; without it there is no shared queue to read or write"),
    }
}

/// MEXC when credentials are present and paper mode is off.
pub fn exchange(config: &KernelConfig, paper: bool) -> Result<Arc<dyn ExchangeClient>> {
    let key = std::env::var("MEXC_API_KEY").ok();
    let secret = std::env::var("MEXC_API_SECRET").ok();
    match (paper, key, secret) {
        (false, Some(key), Some(secret)) => {
            let base_url =
                std::env::var("MEXC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
            let client = MexcClient::new(
                base_url,
                MexcCredentials::new(key, secret),
                config.request_timeout(),
            )?;
            info!("Using MEXC exchange");
            Ok(Arc::new(client))
        }
        (false, _, _) => {
            warn!("MEXC credentials missing, falling back to paper trading");
            Ok(Arc::new(PaperExchange::new(config.monitor.quote_asset.clone())))
        }
        (true, _, _) => {
            info!("Paper trading");
            Ok(Arc::new(PaperExchange::new(config.monitor.quote_asset.clone())))
        }
    }
}

pub fn dispatcher(stores: &Stores, config: &KernelConfig, halt: HaltSwitch) -> Arc<JobDispatcher> {
    Arc::new(JobDispatcher::new(
        stores.database_jobs.clone(),
        stores.broker_jobs.clone(),
        &config.queue,
        halt,
    ))
}

/// Reads candidate targets from a JSON array file.
pub fn load_targets(path: &Path) -> Result<Vec<SnipeTarget>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading targets from {}", path.display()))?;
    let targets: Vec<SnipeTarget> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing targets in {}", path.display()))?;
    Ok(targets)
}

pub struct Kernel {
    pub config: KernelConfig,
    pub coordinator: Arc<ExecutionCoordinator>,
    pub dispatcher: Arc<JobDispatcher>,
    pub lifecycle: Arc<TargetLifecycleManager>,
    pub safety: Arc<SafetyCoordinator>,
    pub monitor: Arc<PositionMonitor>,
    pub source: Arc<StaticTargetSource>,
    pub watcher: Option<ConfigWatcher>,
}

impl Kernel {
    pub fn build(
        config: KernelConfig,
        stores: &Stores,
        exchange: Arc<dyn ExchangeClient>,
        targets: Vec<SnipeTarget>,
    ) -> Self {
        let halt = HaltSwitch::new();
        let coordinator = Arc::new(ExecutionCoordinator::new(
            &config,
            exchange,
            halt.clone(),
            stores.positions.clone(),
            stores.history.clone(),
        ));
        let dispatcher = dispatcher(stores, &config, halt);
        let lifecycle = Arc::new(TargetLifecycleManager::new(
            format!("kernel-{}", std::process::id()),
            stores.targets.clone(),
            coordinator.clone(),
            &config,
        ));
        let exits = Arc::new(EmergencyExitManager::new(
            coordinator.clone(),
            EmergencyExitConfig::default(),
        ));
        let recovery = Arc::new(RecoveryExecutor::new(Arc::new(KernelRecoveryActions::new(
            coordinator.clone(),
            exits,
        ))));
        let safety = Arc::new(SafetyCoordinator::new(
            uuid::Uuid::new_v4().to_string(),
            config.safety.clone(),
            coordinator.clone(),
            recovery,
        ));
        let monitor = Arc::new(PositionMonitor::new(
            coordinator.clone(),
            Duration::from_millis(config.monitor.interval_ms),
        ));

        Self {
            config,
            coordinator,
            dispatcher,
            lifecycle,
            safety,
            monitor,
            source: Arc::new(StaticTargetSource::new(targets)),
            watcher: None,
        }
    }

    pub async fn watch_config(&mut self, path: &Path) {
        self.watcher = Some(ConfigWatcher::new(path, self.config.clone()).await);
    }

    pub fn workers(&self) -> Vec<Arc<JobWorker>> {
        (0..self.config.queue.workers)
            .map(|i| {
                Arc::new(
                    JobWorker::new(format!("worker-{i}"), self.dispatcher.clone())
                        .with_handler(Arc::new(
                            SyncHandler::new(self.source.clone(), self.lifecycle.clone())
                                .with_safety(self.safety.clone()),
                        ))
                        .with_handler(Arc::new(RiskCheckHandler::new(self.safety.clone())))
                        .with_handler(Arc::new(HousekeepingHandler::new(
                            self.dispatcher.clone(),
                            self.lifecycle.tracker().clone(),
                        )))
                        .with_handler(Arc::new(SnipeExecutionHandler::new(self.lifecycle.clone()))),
                )
            })
            .collect()
    }

    pub fn scheduled_tasks(&self) -> Vec<ScheduledTask> {
        let mut tasks = vec![
            ScheduledTask::new(
                TASK_SNIPE_PASS,
                ScheduleBuilder::every(Duration::from_millis(self.config.queue.poll_interval_ms)),
            ),
            ScheduledTask::new(TASK_PROMOTE, ScheduleBuilder::every_secs(5)),
            ScheduledTask::new(
                TASK_PERIODIC_JOBS,
                ScheduleBuilder::every_with_jitter(Duration::from_secs(60), Duration::from_secs(5)),
            ),
            ScheduledTask::new(
                TASK_MONITOR,
                ScheduleBuilder::every(Duration::from_millis(self.config.monitor.interval_ms)),
            ),
            ScheduledTask::new(TASK_RISK, ScheduleBuilder::every_secs(15)),
        ];
        if self.watcher.is_some() {
            tasks.push(ScheduledTask::new(TASK_CONFIG_RELOAD, ScheduleBuilder::every_secs(5)));
        }
        tasks
    }

    pub async fn on_task(&self, event: &TaskEvent) {
        debug!(task = %event.task_name, run = event.run, "Handling task");
        match event.task_name.as_str() {
            TASK_SNIPE_PASS => {
                let limit = self
                    .watcher
                    .as_ref()
                    .map_or(self.config.max_concurrent_requests, |w| {
                        w.current().max_concurrent_requests
                    });
                match self.lifecycle.run_pass(Utc::now(), limit).await {
                    Ok(report) if report.claimed > 0 => info!(
                        claimed = report.claimed,
                        completed = report.count(|o| matches!(o, TargetOutcome::Completed { .. })),
                        failed = report.count(|o| matches!(o, TargetOutcome::Failed { .. })),
                        "Snipe pass finished"
                    ),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Snipe pass failed"),
                }
            }
            TASK_PROMOTE => {
                if let Err(e) = self.lifecycle.promote(Utc::now()).await {
                    error!(error = %e, "Promotion failed");
                }
            }
            TASK_PERIODIC_JOBS => match self.dispatcher.enqueue_periodic_set().await {
                Ok(ids) => debug!(count = ids.len(), "Periodic jobs enqueued"),
                Err(e) => warn!(error = %e, "Periodic jobs not enqueued"),
            },
            TASK_MONITOR => {
                if let Err(e) = self.monitor.check_once().await {
                    error!(error = %e, "Position monitor pass failed");
                }
            }
            TASK_RISK => {
                if let Err(e) = self.safety.recompute().await {
                    error!(error = %e, "Risk recompute failed");
                }
            }
            TASK_CONFIG_RELOAD => self.reload_config().await,
            other => warn!(task = other, "Unknown task"),
        }
    }

    async fn reload_config(&self) {
        let Some(watcher) = &self.watcher else {
            return;
        };
        // Rejected revisions are logged by the watcher.
        if !matches!(watcher.check_once().await, Ok(true)) {
            return;
        }
        let config = watcher.current();
        self.coordinator.apply_config(&config).await;
        self.lifecycle.apply_config(&config).await;
        self.dispatcher.apply_config(&config.queue).await;
        self.safety.update_thresholds(config.safety.clone()).await;
        self.monitor
            .set_interval(Duration::from_millis(config.monitor.interval_ms))
            .await;
        info!("Config applied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn task(name: &str) -> TaskEvent {
        TaskEvent {
            task_name: name.to_string(),
            run: 1,
            scheduled_at: Instant::now(),
            triggered_at: Instant::now(),
        }
    }

    #[test]
    fn test_queue_commands_need_a_database() {
        assert!(require_database(None, "enqueue").is_err());
        assert!(require_database(Some("  "), "health").is_err());
        assert_eq!(
            require_database(Some("postgres://localhost/sniper"), "enqueue").unwrap(),
            "postgres://localhost/sniper"
        );
    }

    #[tokio::test]
    async fn test_reload_task_applies_new_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.toml");
        std::fs::write(&path, "enabled = true\n").unwrap();
        let config = KernelConfig::from_file(&path).unwrap();

        let stores = Stores::open(None).await.unwrap();
        let exchange = Arc::new(PaperExchange::new(config.monitor.quote_asset.clone()));
        let mut kernel = Kernel::build(config, &stores, exchange, Vec::new());
        assert!(!kernel.scheduled_tasks().iter().any(|t| t.name == TASK_CONFIG_RELOAD));
        kernel.watch_config(&path).await;
        assert!(kernel.scheduled_tasks().iter().any(|t| t.name == TASK_CONFIG_RELOAD));
        assert!(kernel.coordinator.accepting_entries().await);

        // Longer content changes the stamp even within one mtime tick.
        std::fs::write(&path, "enabled = false\nmaxConcurrentRequests = 2\n").unwrap();
        kernel.on_task(&task(TASK_CONFIG_RELOAD)).await;
        assert!(!kernel.coordinator.accepting_entries().await);
    }
}
