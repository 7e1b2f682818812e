//! Error types for the fan-out processor.

use thiserror::Error;

/// Result type alias using the volley error type.
pub type Result<T> = std::result::Result<T, VolleyError>;

/// Main error type for the fan-out processor.
#[derive(Error, Debug)]
pub enum VolleyError {
    /// Raw input could not be coerced into any accepted batch shape.
    /// This is the only fault that aborts a batch before dispatch.
    #[error("Normalization error: {0}")]
    Normalization(String),

    /// A processing function failed for a single item.
    ///
    /// Never escapes `dispatch` - the dispatcher converts it into a
    /// synthesized failed [`TaskResult`](crate::task::TaskResult).
    #[error("Task failed: {0}")]
    Task(String),

    /// A single task exceeded the configured per-task timeout.
    #[error("Task timed out after {0}ms")]
    TaskTimeout(u64),

    /// The batch deadline expired before this task finished.
    #[error("Batch deadline of {0}ms exceeded")]
    DeadlineExceeded(u64),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
