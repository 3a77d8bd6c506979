//! Error types for the batch writer
//!
//! This module defines all error types used throughout the writer,
//! providing clear, actionable error messages for developers.

use thiserror::Error;

/// Failure of one row inside a partially failed batch
///
/// `index` is the 0-based position of the row in the batch that was
/// submitted, not in any earlier batch the row may have travelled in.
#[derive(Debug, Clone)]
pub struct RowFailure {
    /// 0-based index of the failed row in the submitted batch
    pub index: usize,
    /// The error that failed this row
    pub error: Box<WriterError>,
}

impl RowFailure {
    pub fn new(index: usize, error: WriterError) -> Self {
        Self {
            index,
            error: Box::new(error),
        }
    }
}

/// Error type for writer operations
///
/// All errors are descriptive and actionable, providing sufficient
/// information for developers to diagnose and resolve issues.
#[derive(Debug, Clone, Error)]
pub enum WriterError {
    /// Invalid configuration error
    ///
    /// Occurs when configuration values are invalid or missing required fields.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A bucket's inbound queue is momentarily full
    ///
    /// Capacity rejection is caller-visible and resolved at enqueue time;
    /// the row never reaches the network.
    #[error("Bucket {bucket} queue is full")]
    QueueFull { bucket: usize },

    /// A single row can never satisfy its own batch limits
    ///
    /// Permanent: the row is larger than `max_batch_bytes`, or its identity
    /// key collides even inside an otherwise empty batch. Never retried,
    /// never sent.
    #[error("Row rejected: {0}")]
    RowRejected(String),

    /// Network/connectivity failure
    ///
    /// Always retryable, subject only to the retry deadline.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Classified logical failure from the remote service
    ///
    /// Retryable when the HTTP status is 5xx or the error code matches the
    /// configured retry policy.
    #[error("Remote error {code} (http {status}): {message}")]
    Remote {
        code: String,
        status: u16,
        message: String,
    },

    /// A batch where some rows failed and some succeeded
    ///
    /// Retryable only when every failed row is independently retryable.
    #[error("Partial batch failure: {} row(s) failed", .0.len())]
    PartialBatch(Vec<RowFailure>),

    /// All retry attempts exhausted or deadline exceeded
    #[error("Retry exhausted: {0}")]
    RetryExhausted(String),

    /// The writer has been closed
    #[error("Writer is closed")]
    Closed,
}

impl WriterError {
    /// Short stable name for the variant, used for grouping in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            WriterError::Configuration(_) => "Configuration",
            WriterError::QueueFull { .. } => "QueueFull",
            WriterError::RowRejected(_) => "RowRejected",
            WriterError::Transport(_) => "Transport",
            WriterError::Remote { .. } => "Remote",
            WriterError::PartialBatch(_) => "PartialBatch",
            WriterError::RetryExhausted(_) => "RetryExhausted",
            WriterError::Closed => "Closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_every_variant() {
        assert_eq!(WriterError::Closed.kind(), "Closed");
        assert_eq!(
            WriterError::QueueFull { bucket: 3 }.kind(),
            "QueueFull"
        );
        assert_eq!(
            WriterError::Transport("reset".to_string()).kind(),
            "Transport"
        );
        assert_eq!(
            WriterError::PartialBatch(vec![RowFailure::new(
                0,
                WriterError::Closed
            )])
            .kind(),
            "PartialBatch"
        );
    }

    #[test]
    fn messages_carry_diagnostic_detail() {
        let error = WriterError::Remote {
            code: "Throttled".to_string(),
            status: 429,
            message: "slow down".to_string(),
        };
        let rendered = error.to_string();
        assert!(rendered.contains("Throttled"));
        assert!(rendered.contains("429"));
    }
}
