//! Snipe target lifecycle: state machine and event history.

mod events;
mod manager;
mod tracker;

pub use events::*;
pub use manager::*;
pub use tracker::*;
