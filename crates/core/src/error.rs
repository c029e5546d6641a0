//! Unified error types for the invoice builder.
//!
//! Every error is fatal to a run: an invoice is never computed from
//! incomplete data, so callers propagate rather than recover.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the invoice builder.
#[derive(Debug, Error)]
pub enum Error {
    /// Login failed or the platform rejected our credentials.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// A feed record or profile page did not have the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// A derived value was requested before any session was ingested.
    #[error("no session has been ingested yet")]
    EmptyAggregate,

    /// The platform kept answering 429 after all retries.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<u64>,
    },

    #[error("http error: {0}")]
    Http(String),

    /// The feed stopped moving the pagination cursor backward.
    #[error("pagination error: {0}")]
    Pagination(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a rate limit error.
    pub fn rate_limited(msg: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self::RateLimited {
            message: msg.into(),
            retry_after,
        }
    }

    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    pub fn pagination(msg: impl Into<String>) -> Self {
        Self::Pagination(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error came from the platform's throttling.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}
