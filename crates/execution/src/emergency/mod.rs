//! Emergency controls: circuit breaker, emergency exit and recovery plans.

mod circuit_breaker;
mod emergency_exit;
mod recovery;

pub use circuit_breaker::*;
pub use emergency_exit::*;
pub use recovery::*;
