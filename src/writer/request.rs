//! Write requests, batches, and the remote writer interface
//!
//! A [`WriteRequest`] is one pending row mutation; a [`Batch`] is a frozen
//! group of requests for one table, submitted together in a single remote
//! call. The remote side is abstracted behind the [`RemoteWriter`] trait,
//! which returns one [`RowStatus`] per submitted row, in input order.

use crate::error::WriterError;
use crate::writer::group::Group;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::oneshot;

/// One pending row mutation
///
/// Immutable once enqueued. The identity key is the value used for
/// duplicate detection within a single in-flight batch (typically the
/// primary key); the optional partition key only affects bucket routing.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    /// Destination table name
    pub table: String,
    /// Primary key or equivalent dedup key
    pub identity_key: String,
    /// Optional partition-key subset, used by partition-key routing
    pub partition_key: Option<String>,
    /// Serialized row payload
    pub payload: Vec<u8>,
}

impl WriteRequest {
    pub fn new(
        table: impl Into<String>,
        identity_key: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            table: table.into(),
            identity_key: identity_key.into(),
            partition_key: None,
            payload,
        }
    }

    pub fn with_partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    /// Estimated wire size of this row, counted against `max_batch_bytes`
    pub fn size_bytes(&self) -> usize {
        self.table.len() + self.identity_key.len() + self.payload.len()
    }
}

/// Opaque cost metadata returned by the remote service for a written row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapacityCost {
    /// Write capacity units consumed
    pub capacity_units: u64,
}

/// Terminal per-row status inside a [`BatchResult`]
#[derive(Debug, Clone)]
pub enum RowStatus {
    Succeeded { cost: CapacityCost },
    Failed(WriterError),
}

impl RowStatus {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, RowStatus::Succeeded { .. })
    }
}

/// Terminal outcome for one submitted [`WriteRequest`]
pub type RowOutcome = Result<CapacityCost, WriterError>;

/// Result of one remote write call: one status per submitted row,
/// preserving input order
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub statuses: Vec<RowStatus>,
}

impl BatchResult {
    pub fn all_succeeded(&self) -> bool {
        self.statuses.iter().all(RowStatus::is_succeeded)
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.statuses
            .iter()
            .enumerate()
            .filter_map(|(i, s)| (!s.is_succeeded()).then_some(i))
            .collect()
    }
}

/// An immutable group of rows submitted together in one remote write call
///
/// Never exceeds the configured row-count or byte-size caps, and never
/// contains two rows with the same identity key when duplicate suppression
/// is enabled.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Destination table for every row in the batch
    pub table: String,
    /// Bucket the batch was assembled in, carried for logging
    pub bucket: usize,
    /// Frozen row snapshot
    pub rows: Vec<WriteRequest>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.rows.iter().map(|r| r.size_bytes()).sum()
    }

    /// Sub-batch containing only the rows at `indices`, in order
    pub fn subset(&self, indices: &[usize]) -> Batch {
        Batch {
            table: self.table.clone(),
            bucket: self.bucket,
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

/// The remote write RPC consumed by the engine
///
/// Implementations must return exactly one status per submitted row, in
/// input order. Transport-level failures (connection refused, timeout)
/// surface as `Err(WriterError::Transport)`; classified service failures
/// affecting the whole request surface as `Err(WriterError::Remote)`.
pub trait RemoteWriter: Send + Sync + 'static {
    fn submit(&self, batch: Batch) -> BoxFuture<'static, Result<BatchResult, WriterError>>;
}

/// Where a row's terminal outcome goes
///
/// Either or both of a oneshot future and a [`Group`] aggregate; a row added
/// through the plain `add` path carries neither and only counts in the
/// statistics.
#[derive(Debug, Default)]
pub struct RowCompletion {
    pub(crate) future_tx: Option<oneshot::Sender<RowOutcome>>,
    pub(crate) group: Option<Arc<Group>>,
}

impl RowCompletion {
    pub(crate) fn none() -> Self {
        Self::default()
    }

    pub(crate) fn for_future(tx: oneshot::Sender<RowOutcome>) -> Self {
        Self {
            future_tx: Some(tx),
            group: None,
        }
    }

    pub(crate) fn for_group(group: Arc<Group>) -> Self {
        Self {
            future_tx: None,
            group: Some(group),
        }
    }

    /// Deliver the terminal outcome for `request` exactly once
    pub(crate) fn complete(self, request: &WriteRequest, outcome: RowOutcome) {
        if let Some(group) = self.group {
            match &outcome {
                Ok(_) => group.succeed_one_row(request.clone()),
                Err(e) => group.fail_one_row(request.clone(), e.clone()),
            }
        }
        if let Some(tx) = self.future_tx {
            // The caller may have dropped the future; that is not an error.
            let _ = tx.send(outcome);
        }
    }
}

/// One row travelling through a bucket: the request plus its outcome channel
#[derive(Debug)]
pub struct PendingRow {
    pub request: WriteRequest,
    pub completion: RowCompletion,
}

impl PendingRow {
    pub fn new(request: WriteRequest, completion: RowCompletion) -> Self {
        Self {
            request,
            completion,
        }
    }
}
