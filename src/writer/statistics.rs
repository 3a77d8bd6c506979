//! Writer statistics
//!
//! Counters are plain atomics: they are the only writer state mutated from
//! multiple tasks besides the permit pools, and must stay lock-free.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters shared by all buckets and send tasks
#[derive(Debug, Default)]
pub struct Statistics {
    requests_issued: AtomicU64,
    rows_submitted: AtomicU64,
    rows_succeeded: AtomicU64,
    rows_failed: AtomicU64,
    single_row_fallbacks: AtomicU64,
}

/// Read-only snapshot of [`Statistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    /// Remote write RPCs issued, including retry rounds and fallbacks
    pub requests_issued: u64,
    /// Rows accepted into a bucket queue
    pub rows_submitted: u64,
    /// Rows with a terminal success outcome
    pub rows_succeeded: u64,
    /// Rows with a terminal failure outcome
    pub rows_failed: u64,
    /// Single-row requests issued by the partial-failure fallback path
    pub single_row_fallbacks: u64,
}

impl Statistics {
    pub fn record_request_issued(&self) {
        self.requests_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rows_submitted(&self, n: u64) {
        self.rows_submitted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_rows_succeeded(&self, n: u64) {
        self.rows_succeeded.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_rows_failed(&self, n: u64) {
        self.rows_failed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_single_row_fallback(&self) {
        self.single_row_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            requests_issued: self.requests_issued.load(Ordering::Relaxed),
            rows_submitted: self.rows_submitted.load(Ordering::Relaxed),
            rows_succeeded: self.rows_succeeded.load(Ordering::Relaxed),
            rows_failed: self.rows_failed.load(Ordering::Relaxed),
            single_row_fallbacks: self.single_row_fallbacks.load(Ordering::Relaxed),
        }
    }
}
