//! HTTP surface of the sniping kernel.
//!
//! Exposes the queue health snapshot, a bearer-authenticated trigger for the
//! periodic job set, and read-only views of safety and execution state.

/// Authentication module.
pub mod auth;
/// Error types.
pub mod error;
/// Request handlers.
pub mod handlers;
/// Route definitions.
pub mod routes;
/// Server configuration and startup.
pub mod server;
/// Application state.
pub mod state;

pub use auth::{AuthConfig, AuthError, AuthState};
pub use error::ApiError;
pub use routes::create_router;
pub use server::{ApiServer, ServerConfig};
pub use state::AppState;
