//! Persistence for the sniping kernel.
//!
//! Store traits live in [`stores`]; [`repositories`] backs them with
//! PostgreSQL and [`memory`] with process memory.

pub mod error;
pub mod memory;
pub mod repositories;
pub mod stores;

pub use error::StoreError;
pub use memory::{MemoryHistoryStore, MemoryJobStore, MemoryPositionStore, MemoryTargetStore};
pub use repositories::Database;
pub use stores::{
    HistoryStore, JobRelease, JobStore, LEASE_EXHAUSTED, PositionStore, QueueCounts, TargetStore,
};
