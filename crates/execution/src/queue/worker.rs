//! Worker loop that leases jobs and hands them to typed handlers.

use super::dispatcher::{AckOutcome, JobDispatcher, LeasedJob};
use crate::config::StoreKind;
use crate::error::{JobError, QueueError};
use async_trait::async_trait;
use sniper_domain::entities::{JobPayload, JobType};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What a handler knows about the job it runs.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    pub worker: String,
    /// 1-based.
    pub attempt: u32,
    /// Dual-run comparison copy. Handlers must not cause side effects.
    pub shadow: bool,
    pub store: StoreKind,
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> JobType;

    async fn handle(&self, ctx: &JobContext, payload: &JobPayload) -> Result<(), JobError>;
}

/// One processed job.
#[derive(Debug, Clone)]
pub struct ProcessedJob {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub shadow: bool,
    pub ack: AckOutcome,
}

pub struct JobWorker {
    id: String,
    dispatcher: Arc<JobDispatcher>,
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
    running: AtomicBool,
}

impl JobWorker {
    pub fn new(id: impl Into<String>, dispatcher: Arc<JobDispatcher>) -> Self {
        Self {
            id: id.into(),
            dispatcher,
            handlers: HashMap::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Registers a handler, replacing any previous one for the same type.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(handler.job_type(), handler);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Leases and runs at most one job.
    ///
    /// # Errors
    /// Fails when the queue cannot be reached.
    pub async fn process_one(&self) -> Result<Option<ProcessedJob>, QueueError> {
        let Some(leased) = self.dispatcher.pop(&self.id).await? else {
            return Ok(None);
        };
        self.process(leased).await.map(Some)
    }

    async fn process(&self, leased: LeasedJob) -> Result<ProcessedJob, QueueError> {
        let job_type = leased.payload.job_type();
        let ctx = JobContext {
            job_id: leased.job.id,
            worker: self.id.clone(),
            attempt: leased.job.attempts,
            shadow: leased.is_shadow(),
            store: leased.store,
        };

        let result = match self.handlers.get(&job_type) {
            Some(handler) => handler.handle(&ctx, &leased.payload).await,
            None => Err(JobError::Fatal(format!("no handler for {job_type}"))),
        };

        let ack = match result {
            Ok(()) => {
                debug!(job_id = %ctx.job_id, job_type = %job_type, shadow = ctx.shadow, "Job completed");
                self.dispatcher.complete(&leased, &self.id).await?
            }
            Err(JobError::Retryable(e)) => self.dispatcher.fail(&leased, &self.id, &e).await?,
            Err(JobError::Fatal(e)) => self.dispatcher.dead_letter(&leased, &self.id, &e).await?,
        };

        Ok(ProcessedJob {
            job_id: ctx.job_id,
            job_type,
            shadow: ctx.shadow,
            ack,
        })
    }

    /// Processes jobs until [`stop`](Self::stop) is called. Waits up to
    /// `idle_wait` for work between leases.
    pub async fn run(&self, idle_wait: Duration) {
        self.running.store(true, Ordering::SeqCst);
        info!(worker = %self.id, handlers = self.handlers.len(), "Job worker started");

        while self.running.load(Ordering::SeqCst) {
            match self.dispatcher.pop_wait(&self.id, idle_wait).await {
                Ok(Some(leased)) => {
                    if let Err(e) = self.process(leased).await {
                        error!(worker = %self.id, error = %e, "Could not acknowledge job");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(worker = %self.id, error = %e, "Queue unavailable");
                    tokio::time::sleep(idle_wait).await;
                }
            }
        }

        info!(worker = %self.id, "Job worker stopped");
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::safety::HaltSwitch;
    use sniper_data::{JobStore, MemoryJobStore};
    use sniper_domain::entities::{HousekeepingPayload, SyncPayload};
    use sniper_domain::enums::JobStatus;
    use std::sync::Mutex;

    struct Recorder {
        job_type: JobType,
        result: Result<(), JobError>,
        seen: Mutex<Vec<JobContext>>,
    }

    #[async_trait]
    impl JobHandler for Recorder {
        fn job_type(&self) -> JobType {
            self.job_type
        }

        async fn handle(&self, ctx: &JobContext, _payload: &JobPayload) -> Result<(), JobError> {
            self.seen.lock().unwrap().push(ctx.clone());
            self.result.clone()
        }
    }

    fn dispatcher(store: &Arc<MemoryJobStore>) -> Arc<JobDispatcher> {
        Arc::new(JobDispatcher::new(
            Some(store.clone()),
            None,
            &QueueConfig {
                fallback_enabled: false,
                ..QueueConfig::default()
            },
            HaltSwitch::new(),
        ))
    }

    #[tokio::test]
    async fn test_routes_to_handler_and_acks() {
        let store = Arc::new(MemoryJobStore::new("database"));
        let dispatcher = dispatcher(&store);
        let handler = Arc::new(Recorder {
            job_type: JobType::Sync,
            result: Ok(()),
            seen: Mutex::new(Vec::new()),
        });
        let worker = JobWorker::new("w1", dispatcher.clone()).with_handler(handler.clone());

        let id = dispatcher.enqueue(JobPayload::Sync(SyncPayload::default())).await.unwrap();
        let processed = worker.process_one().await.unwrap().unwrap();

        assert_eq!(processed.job_id, id);
        assert_eq!(processed.ack, AckOutcome::Completed);
        let seen = handler.seen.lock().unwrap();
        assert_eq!(seen[0].attempt, 1);
        assert!(!seen[0].shadow);
        drop(seen);
        assert!(worker.process_one().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fatal_and_missing_handler_dead_letter() {
        let store = Arc::new(MemoryJobStore::new("database"));
        let dispatcher = dispatcher(&store);
        let worker = JobWorker::new("w1", dispatcher.clone()).with_handler(Arc::new(Recorder {
            job_type: JobType::Sync,
            result: Err(JobError::Fatal("bad calendar".into())),
            seen: Mutex::new(Vec::new()),
        }));

        let sync = dispatcher.enqueue(JobPayload::Sync(SyncPayload::default())).await.unwrap();
        let processed = worker.process_one().await.unwrap().unwrap();
        assert_eq!(processed.ack, AckOutcome::Dead);
        assert_eq!(store.get(sync).await.unwrap().unwrap().status, JobStatus::Dead);

        let housekeeping = dispatcher
            .enqueue(JobPayload::Housekeeping(HousekeepingPayload::default()))
            .await
            .unwrap();
        worker.process_one().await.unwrap().unwrap();
        let job = store.get(housekeeping).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Dead);
        assert_eq!(job.last_error.as_deref(), Some("no handler for housekeeping"));
    }
}
