use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AiBenchError {
    #[error("Backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed stats: {0}")]
    MalformedStats(String),

    #[error("No prompts completed successfully ({attempted} attempted)")]
    NoSuccessfulPrompts { attempted: usize },

    #[error("Benchmark cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl AiBenchError {
    /// True when the backend could not be reached at all, as opposed to
    /// answering with an error or stalling.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, AiBenchError::BackendUnreachable(_))
    }
}

pub type Result<T> = std::result::Result<T, AiBenchError>;
