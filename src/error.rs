//! Application error types

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Upstream had no usable price this cycle. Recoverable; the item is
    /// retried on the next scheduled cycle.
    #[error("No price available for '{0}'")]
    PriceUnavailable(String),

    #[error("Price fetch timed out after {timeout_secs}s for '{item}'")]
    FetchTimeout { item: String, timeout_secs: u64 },

    #[error("Price fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether this error means "no price this cycle" rather than a hard
    /// failure. Batch callers treat timeouts and network errors the same
    /// way as a missing quote.
    pub fn is_price_miss(&self) -> bool {
        matches!(
            self,
            AppError::PriceUnavailable(_) | AppError::FetchTimeout { .. } | AppError::Fetch(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
