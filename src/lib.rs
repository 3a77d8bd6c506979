//! Tabular Batch Writer
//!
//! Client-side write buffering and dispatch engine for a remote tabular
//! data store. Row mutations stream in from application tasks, get grouped
//! into size/row-bounded batches per bucket, and are sent asynchronously to
//! a remote write RPC under two-level concurrency control, with
//! classification-driven retry and positional partial-failure merging.
//!
//! # Features
//!
//! - Non-blocking `add` with per-bucket bounded queues
//! - Per-row outcome futures and aggregate `Group` completion handles
//! - Batch assembly with row-count/byte caps and in-batch duplicate
//!   suppression
//! - Sequential or parallel per-bucket dispatch under a shared global
//!   concurrency gate
//! - Allow-list / deny-list retry policies with jittered exponential
//!   backoff and a hard deadline
//! - A flush barrier guaranteeing every previously enqueued row has a
//!   terminal outcome
//!
//! # Example
//!
//! ```no_run
//! use tabular_batch_writer::{TableWriter, WriteRequest, WriterConfig};
//! use std::sync::Arc;
//!
//! # async fn example(remote: Arc<dyn tabular_batch_writer::RemoteWriter>) -> Result<(), tabular_batch_writer::WriterError> {
//! let writer = TableWriter::new(WriterConfig::new(), remote)?;
//! let accepted = writer.add(WriteRequest::new("metrics", "row-1", b"payload".to_vec()));
//! assert!(accepted);
//! writer.flush().await?;
//! writer.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod writer;

pub use config::{WriteMode, WriterConfig};
pub use error::{RowFailure, WriterError};
pub use writer::group::{Group, GroupResult};
pub use writer::request::{
    Batch, BatchResult, CapacityCost, RemoteWriter, RowOutcome, RowStatus, WriteRequest,
};
pub use writer::retry::{RetryPolicy, RetryPolicyMode, RetryStrategy};
pub use writer::router::DispatchMode;
pub use writer::statistics::StatisticsSnapshot;
pub use writer::{RowFuture, TableWriter};
