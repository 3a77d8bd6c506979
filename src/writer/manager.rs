//! Batch assembly state machine
//!
//! One [`RequestManager`] exists per (bucket, table) pair and is only ever
//! touched by that bucket's single consumer task, so it needs no internal
//! locking. It accumulates rows until a limit is hit, then freezes them into
//! an immutable [`Batch`].

use crate::writer::request::{Batch, PendingRow, RowCompletion};
use std::collections::HashSet;

/// Per (bucket, table) accumulator of pending rows
#[derive(Debug)]
pub struct RequestManager {
    table: String,
    bucket: usize,
    max_batch_row_count: usize,
    max_batch_bytes: usize,
    dedup: bool,
    rows: Vec<PendingRow>,
    total_bytes: usize,
    pending_keys: HashSet<String>,
}

/// A frozen batch plus the outcome channels of its rows, positionally
/// aligned with `batch.rows`
#[derive(Debug)]
pub struct OutboundBatch {
    pub batch: Batch,
    pub completions: Vec<RowCompletion>,
}

impl RequestManager {
    pub fn new(
        table: String,
        bucket: usize,
        max_batch_row_count: usize,
        max_batch_bytes: usize,
        dedup: bool,
    ) -> Self {
        Self {
            table,
            bucket,
            max_batch_row_count,
            max_batch_bytes,
            dedup,
            rows: Vec::new(),
            total_bytes: 0,
            pending_keys: HashSet::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Try to append one row
    ///
    /// Fails without mutating state when the byte cap would be exceeded,
    /// the row cap is already reached, or (with dedup enabled) the identity
    /// key is already pending. The rejected row is handed back so the caller
    /// can roll the batch and retry.
    pub fn append(&mut self, row: PendingRow) -> Result<(), PendingRow> {
        let size = row.request.size_bytes();
        if self.total_bytes + size > self.max_batch_bytes {
            return Err(row);
        }
        if self.rows.len() >= self.max_batch_row_count {
            return Err(row);
        }
        if self.dedup && self.pending_keys.contains(&row.request.identity_key) {
            return Err(row);
        }

        if self.dedup {
            self.pending_keys.insert(row.request.identity_key.clone());
        }
        self.total_bytes += size;
        self.rows.push(row);
        Ok(())
    }

    /// Freeze the pending rows into a batch and clear all state
    ///
    /// Returns `None` when empty. Clearing (rows, totals, pending keys) is a
    /// single step relative to the dispatch loop, which is safe because the
    /// loop is the only mutator.
    pub fn make_batch(&mut self) -> Option<OutboundBatch> {
        if self.rows.is_empty() {
            return None;
        }
        let rows = std::mem::take(&mut self.rows);
        self.total_bytes = 0;
        self.pending_keys.clear();

        let mut requests = Vec::with_capacity(rows.len());
        let mut completions = Vec::with_capacity(rows.len());
        for row in rows {
            requests.push(row.request);
            completions.push(row.completion);
        }
        Some(OutboundBatch {
            batch: Batch {
                table: self.table.clone(),
                bucket: self.bucket,
                rows: requests,
            },
            completions,
        })
    }
}
