//! Durable job queue: dispatcher over two stores, workers and dual-run
//! comparison.

mod dispatcher;
mod dual_run;
mod worker;

pub use dispatcher::{
    AckOutcome, BrokerQueueHealth, DbQueueHealth, ExecutionMode, JobDispatcher, LeasedJob, QueueHealth,
};
pub use dual_run::{DualRunReport, DualRunTracker, Mismatch, RunOutcome};
pub use worker::{JobContext, JobHandler, JobWorker, ProcessedJob};
