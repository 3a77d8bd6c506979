//! Configuration types for the batch writer
//!
//! This module defines the configuration structure and validation logic.

use crate::error::WriterError;
use crate::writer::retry::RetryPolicy;
use crate::writer::router::DispatchMode;
use serde::{Deserialize, Serialize};

/// Whether batches from one bucket may be in flight concurrently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// One batch in flight per bucket: strict per-bucket serialization
    Sequential,
    /// Up to `concurrency` batches in flight per bucket
    Parallel,
}

/// Complete configuration for initializing a writer
///
/// Covers batch limits, bucket layout, the two-level concurrency gate,
/// duplicate suppression, background flushing, and the retry policy.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum rows per batch (default: 200)
    pub max_batch_row_count: usize,
    /// Maximum estimated bytes per batch (default: 1 MiB)
    pub max_batch_bytes: usize,
    /// Number of write partitions (default: 4)
    pub bucket_count: usize,
    /// Global concurrency: total outstanding RPCs system-wide (default: 10)
    pub concurrency: usize,
    /// Per-bucket serialization mode (default: sequential)
    pub write_mode: WriteMode,
    /// Allow two rows with the same identity key in one batch (default: false)
    pub allow_duplicate_identity_in_batch: bool,
    /// Background auto-flush interval in milliseconds; 0 disables it
    /// (default: 10000)
    pub flush_interval_ms: u64,
    /// Retry deadline per logical submission in milliseconds (default: 10000)
    pub retry_timeout_ms: u64,
    /// Error-code retry policy (default: deny-list with no codes)
    pub retry_policy: RetryPolicy,
    /// Capacity of each bucket's inbound event queue (default: 1024)
    pub queue_capacity: usize,
    /// How requests are mapped to buckets (default: hash of identity key)
    pub dispatch_mode: DispatchMode,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl WriterConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            max_batch_row_count: 200,
            max_batch_bytes: 1024 * 1024,
            bucket_count: 4,
            concurrency: 10,
            write_mode: WriteMode::Sequential,
            allow_duplicate_identity_in_batch: false,
            flush_interval_ms: 10_000,
            retry_timeout_ms: 10_000,
            retry_policy: RetryPolicy::default(),
            queue_capacity: 1024,
            dispatch_mode: DispatchMode::HashIdentityKey,
        }
    }

    pub fn with_batch_limits(mut self, max_row_count: usize, max_bytes: usize) -> Self {
        self.max_batch_row_count = max_row_count;
        self.max_batch_bytes = max_bytes;
        self
    }

    pub fn with_bucket_count(mut self, bucket_count: usize) -> Self {
        self.bucket_count = bucket_count;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    pub fn with_allow_duplicate_identity(mut self, allow: bool) -> Self {
        self.allow_duplicate_identity_in_batch = allow;
        self
    }

    pub fn with_flush_interval_ms(mut self, interval_ms: u64) -> Self {
        self.flush_interval_ms = interval_ms;
        self
    }

    pub fn with_retry_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.retry_timeout_ms = timeout_ms;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    /// Size of each bucket's permit pool
    ///
    /// One permit in sequential mode; the full configured concurrency in
    /// parallel mode.
    pub fn bucket_permits(&self) -> usize {
        match self.write_mode {
            WriteMode::Sequential => 1,
            WriteMode::Parallel => self.concurrency,
        }
    }

    /// Whether identity keys are deduplicated inside one batch
    pub fn dedup_enabled(&self) -> bool {
        !self.allow_duplicate_identity_in_batch
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns `WriterError::Configuration` if any limit or pool size is
    /// zero where a positive value is required.
    pub fn validate(&self) -> Result<(), WriterError> {
        if self.max_batch_row_count == 0 {
            return Err(WriterError::Configuration(
                "max_batch_row_count must be > 0".to_string(),
            ));
        }
        if self.max_batch_bytes == 0 {
            return Err(WriterError::Configuration(
                "max_batch_bytes must be > 0".to_string(),
            ));
        }
        if self.bucket_count == 0 {
            return Err(WriterError::Configuration(
                "bucket_count must be > 0".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(WriterError::Configuration(
                "concurrency must be > 0".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(WriterError::Configuration(
                "queue_capacity must be > 0".to_string(),
            ));
        }
        if self.retry_timeout_ms == 0 {
            return Err(WriterError::Configuration(
                "retry_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(WriterConfig::new().validate().is_ok());
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(WriterConfig::new()
            .with_batch_limits(0, 1024)
            .validate()
            .is_err());
        assert!(WriterConfig::new()
            .with_batch_limits(10, 0)
            .validate()
            .is_err());
        assert!(WriterConfig::new().with_bucket_count(0).validate().is_err());
        assert!(WriterConfig::new().with_concurrency(0).validate().is_err());
        assert!(WriterConfig::new()
            .with_queue_capacity(0)
            .validate()
            .is_err());
        assert!(WriterConfig::new()
            .with_retry_timeout_ms(0)
            .validate()
            .is_err());
    }

    #[test]
    fn bucket_permits_follow_write_mode() {
        let config = WriterConfig::new().with_concurrency(8);
        assert_eq!(config.bucket_permits(), 1);
        assert_eq!(
            config.with_write_mode(WriteMode::Parallel).bucket_permits(),
            8
        );
    }

    #[test]
    fn dedup_defaults_on() {
        assert!(WriterConfig::new().dedup_enabled());
        assert!(!WriterConfig::new()
            .with_allow_duplicate_identity(true)
            .dedup_enabled());
    }
}
