//! Error types for the engagement engine.
//!
//! Store failures are never swallowed: a batch computation either completes
//! over fully-read data or aborts with one of these.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Referenced student, class, or evaluation does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backing store read or write failed
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Caller supplied a value outside its allowed range
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::SourceUnavailable(_))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => EngineError::NotFound("row not found".to_string()),
            other => EngineError::SourceUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
