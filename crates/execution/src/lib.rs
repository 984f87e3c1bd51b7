//! Execution and coordination kernel for timed listing snipes.
//!
//! This crate provides:
//! - Concurrency-bounded order execution against an exchange client
//! - The snipe target lifecycle state machine
//! - A lease-based job queue over two stores, with workers and dual-run
//! - Take-profit/stop-loss monitoring and the pre-trade balance guard
//! - Circuit breaker, emergency exit and scripted recovery plans
//! - The safety coordinator that ties risk metrics to mitigations

/// Prelude module for convenient imports.
pub mod prelude;

/// Kernel configuration and hot reload.
pub mod config;
/// Concurrency gate and order execution.
pub mod coordinator;
/// Circuit breaker, emergency exit and recovery plans.
pub mod emergency;
/// Error types.
pub mod error;
/// Exchange client seam.
pub mod exchange;
/// Job handlers.
pub mod jobs;
/// Snipe target lifecycle.
pub mod lifecycle;
/// Position monitoring and balance guard.
pub mod monitor;
/// Job queue.
pub mod queue;
/// Safety coordination.
pub mod safety;
/// Scheduler for periodic work.
pub mod scheduler;
