use thiserror::Error;

/// Failure of a backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store {0} is unavailable")]
    Unavailable(String),

    #[error("record {0} not found")]
    NotFound(String),

    #[error("failed to decode stored record: {0}")]
    Decode(String),
}

impl StoreError {
    /// True for connection-level failures that a fallback store can absorb.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Tls(_)
            ),
            Self::NotFound(_) | Self::Decode(_) => false,
        }
    }
}
