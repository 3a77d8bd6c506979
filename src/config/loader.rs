//! Configuration loader for the batch writer
//!
//! This module handles loading configuration from YAML files and
//! environment variables.

use crate::config::types::{WriteMode, WriterConfig};
use crate::error::WriterError;
use crate::writer::retry::{RetryPolicy, RetryPolicyMode};
use crate::writer::router::DispatchMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// YAML configuration structure (for deserialization)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigYaml {
    pub max_batch_row_count: Option<usize>,
    pub max_batch_bytes: Option<usize>,
    pub bucket_count: Option<usize>,
    pub concurrency: Option<usize>,
    pub write_mode: Option<WriteMode>,
    pub allow_duplicate_identity_in_batch: Option<bool>,
    pub flush_interval_ms: Option<u64>,
    pub queue_capacity: Option<usize>,
    pub dispatch_mode: Option<DispatchMode>,
    pub retry: Option<RetryYaml>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryYaml {
    pub timeout_ms: Option<u64>,
    pub policy_mode: Option<RetryPolicyMode>,
    pub codes: Option<Vec<String>>,
}

/// Load configuration from a YAML file
///
/// Every field is optional; missing fields keep their defaults.
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<WriterConfig, WriterError> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        WriterError::Configuration(format!(
            "Failed to read config file {}: {}",
            path.as_ref().display(),
            e
        ))
    })?;

    let yaml: ConfigYaml = serde_yaml::from_str(&content)
        .map_err(|e| WriterError::Configuration(format!("Failed to parse YAML: {}", e)))?;

    let mut config = WriterConfig::new();

    if let Some(max_rows) = yaml.max_batch_row_count {
        config.max_batch_row_count = max_rows;
    }
    if let Some(max_bytes) = yaml.max_batch_bytes {
        config.max_batch_bytes = max_bytes;
    }
    if let Some(buckets) = yaml.bucket_count {
        config = config.with_bucket_count(buckets);
    }
    if let Some(concurrency) = yaml.concurrency {
        config = config.with_concurrency(concurrency);
    }
    if let Some(mode) = yaml.write_mode {
        config = config.with_write_mode(mode);
    }
    if let Some(allow) = yaml.allow_duplicate_identity_in_batch {
        config = config.with_allow_duplicate_identity(allow);
    }
    if let Some(interval) = yaml.flush_interval_ms {
        config = config.with_flush_interval_ms(interval);
    }
    if let Some(capacity) = yaml.queue_capacity {
        config = config.with_queue_capacity(capacity);
    }
    if let Some(mode) = yaml.dispatch_mode {
        config = config.with_dispatch_mode(mode);
    }

    if let Some(retry) = yaml.retry {
        if let Some(timeout) = retry.timeout_ms {
            config = config.with_retry_timeout_ms(timeout);
        }
        if let Some(mode) = retry.policy_mode {
            let codes = retry.codes.unwrap_or_default();
            let policy = match mode {
                RetryPolicyMode::AllowList => RetryPolicy::allow_list(codes),
                RetryPolicyMode::DenyList => RetryPolicy::deny_list(codes),
            };
            config = config.with_retry_policy(policy);
        }
    }

    config.validate()?;
    Ok(config)
}

/// Load configuration overrides from environment variables
///
/// Reads `WRITER_`-prefixed variables on top of the defaults:
/// `WRITER_MAX_BATCH_ROW_COUNT`, `WRITER_MAX_BATCH_BYTES`,
/// `WRITER_BUCKET_COUNT`, `WRITER_CONCURRENCY`, `WRITER_WRITE_MODE`,
/// `WRITER_ALLOW_DUPLICATE_IDENTITY`, `WRITER_FLUSH_INTERVAL_MS`,
/// `WRITER_QUEUE_CAPACITY`, `WRITER_RETRY_TIMEOUT_MS`.
pub fn load_from_env() -> Result<WriterConfig, WriterError> {
    let mut config = WriterConfig::new();

    if let Ok(value) = std::env::var("WRITER_MAX_BATCH_ROW_COUNT") {
        config.max_batch_row_count = parse_env("WRITER_MAX_BATCH_ROW_COUNT", &value)?;
    }
    if let Ok(value) = std::env::var("WRITER_MAX_BATCH_BYTES") {
        config.max_batch_bytes = parse_env("WRITER_MAX_BATCH_BYTES", &value)?;
    }
    if let Ok(value) = std::env::var("WRITER_BUCKET_COUNT") {
        config.bucket_count = parse_env("WRITER_BUCKET_COUNT", &value)?;
    }
    if let Ok(value) = std::env::var("WRITER_CONCURRENCY") {
        config.concurrency = parse_env("WRITER_CONCURRENCY", &value)?;
    }
    if let Ok(value) = std::env::var("WRITER_WRITE_MODE") {
        config.write_mode = match value.as_str() {
            "sequential" => WriteMode::Sequential,
            "parallel" => WriteMode::Parallel,
            other => {
                return Err(WriterError::Configuration(format!(
                    "WRITER_WRITE_MODE must be 'sequential' or 'parallel', got: '{}'",
                    other
                )))
            }
        };
    }
    if let Ok(value) = std::env::var("WRITER_ALLOW_DUPLICATE_IDENTITY") {
        config.allow_duplicate_identity_in_batch = value == "true";
    }
    if let Ok(value) = std::env::var("WRITER_FLUSH_INTERVAL_MS") {
        config.flush_interval_ms = parse_env("WRITER_FLUSH_INTERVAL_MS", &value)?;
    }
    if let Ok(value) = std::env::var("WRITER_QUEUE_CAPACITY") {
        config.queue_capacity = parse_env("WRITER_QUEUE_CAPACITY", &value)?;
    }
    if let Ok(value) = std::env::var("WRITER_RETRY_TIMEOUT_MS") {
        config.retry_timeout_ms = parse_env("WRITER_RETRY_TIMEOUT_MS", &value)?;
    }

    config.validate()?;
    Ok(config)
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, WriterError> {
    value.parse().map_err(|_| {
        WriterError::Configuration(format!("{} has invalid value: '{}'", name, value))
    })
}
