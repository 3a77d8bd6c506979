//! Bucket: one write partition with its own queue and batch state
//!
//! Each bucket owns a bounded inbound queue of data/flush events and a
//! single consumer task that drains it strictly in arrival order. All
//! [`RequestManager`] mutation happens on that one task, so batch assembly
//! needs no locking. Ready batches are handed to the sender under the
//! two-level permit gate; the loop itself never blocks on network I/O.

use crate::config::types::WriterConfig;
use crate::error::WriterError;
use crate::writer::manager::{OutboundBatch, RequestManager};
use crate::writer::request::{PendingRow, RemoteWriter};
use crate::writer::sender;
use crate::writer::statistics::Statistics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Event drained by a bucket's consumer task
#[derive(Debug)]
pub enum BucketEvent {
    /// One row to accumulate
    Data(PendingRow),
    /// Flush barrier sentinel; the sender side is signalled once every row
    /// enqueued before it has a terminal outcome
    Flush(oneshot::Sender<()>),
}

/// Single-consumer worker draining one bucket
pub(crate) struct BucketWorker {
    index: usize,
    config: Arc<WriterConfig>,
    remote: Arc<dyn RemoteWriter>,
    stats: Arc<Statistics>,
    /// Bounds in-flight batches from this bucket; also the flush barrier
    bucket_permits: Arc<Semaphore>,
    /// Bounds in-flight batches system-wide, shared across buckets
    global_permits: Arc<Semaphore>,
    managers: HashMap<String, RequestManager>,
}

impl BucketWorker {
    /// Spawn the consumer task for bucket `index`
    pub(crate) fn spawn(
        index: usize,
        config: Arc<WriterConfig>,
        remote: Arc<dyn RemoteWriter>,
        stats: Arc<Statistics>,
        global_permits: Arc<Semaphore>,
    ) -> (mpsc::Sender<BucketEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let worker = Self {
            index,
            bucket_permits: Arc::new(Semaphore::new(config.bucket_permits())),
            config,
            remote,
            stats,
            global_permits,
            managers: HashMap::new(),
        };
        let handle = tokio::spawn(worker.run(rx));
        (tx, handle)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<BucketEvent>) {
        debug!(bucket = self.index, "bucket consumer started");
        while let Some(event) = rx.recv().await {
            match event {
                BucketEvent::Data(row) => self.on_data(row).await,
                BucketEvent::Flush(done) => self.on_flush(done).await,
            }
        }
        // Channel closed: drain whatever is still buffered before exiting,
        // so close() never silently drops rows.
        self.flush_pending().await;
        self.wait_in_flight().await;
        debug!(bucket = self.index, "bucket consumer stopped");
    }

    async fn on_data(&mut self, row: PendingRow) {
        let table = row.request.table.clone();
        let manager = self.managers.entry(table).or_insert_with(|| {
            RequestManager::new(
                row.request.table.clone(),
                self.index,
                self.config.max_batch_row_count,
                self.config.max_batch_bytes,
                self.config.dedup_enabled(),
            )
        });

        let row = match manager.append(row) {
            Ok(()) => return,
            Err(row) => row,
        };

        // Limits hit or key duplicated: roll the current batch and retry
        // into the now-empty manager.
        if let Some(out) = manager.make_batch() {
            self.dispatch(out).await;
        }

        let manager = self
            .managers
            .get_mut(&row.request.table)
            .expect("manager created above");
        if let Err(row) = manager.append(row) {
            // The row can never fit its own limits: permanent failure,
            // resolved without touching the network.
            warn!(
                bucket = self.index,
                table = %row.request.table,
                identity_key = %row.request.identity_key,
                size_bytes = row.request.size_bytes(),
                "row rejected: cannot fit batch limits on its own"
            );
            self.stats.record_rows_failed(1);
            let error = WriterError::RowRejected(format!(
                "row with identity key '{}' cannot fit batch limits ({} bytes)",
                row.request.identity_key,
                row.request.size_bytes()
            ));
            row.completion.complete(&row.request, Err(error));
        }
    }

    async fn on_flush(&mut self, done: oneshot::Sender<()>) {
        debug!(bucket = self.index, "flush barrier reached");
        self.flush_pending().await;
        self.wait_in_flight().await;
        // The flush caller may have given up waiting; that is fine.
        let _ = done.send(());
    }

    /// Materialize and dispatch a batch for every table holding pending rows
    async fn flush_pending(&mut self) {
        let tables: Vec<String> = self
            .managers
            .iter()
            .filter(|(_, m)| !m.is_empty())
            .map(|(t, _)| t.clone())
            .collect();
        for table in tables {
            if let Some(out) = self
                .managers
                .get_mut(&table)
                .and_then(RequestManager::make_batch)
            {
                self.dispatch(out).await;
            }
        }
    }

    /// Wait until no batch from this bucket is in flight
    ///
    /// Every in-flight batch holds exactly one bucket permit until its
    /// completion path has delivered all row outcomes, so holding the full
    /// pool is equivalent to an empty in-flight set.
    async fn wait_in_flight(&self) {
        let all = self.config.bucket_permits() as u32;
        let permits = self
            .bucket_permits
            .acquire_many(all)
            .await
            .expect("bucket permit pool closed");
        drop(permits);
    }

    /// Hand a ready batch to the sender under the two-level gate
    ///
    /// Acquisition order is fixed: bucket permit first, then global permit.
    /// Both are owned by the send task and released when it finishes,
    /// whatever path it takes.
    async fn dispatch(&self, out: OutboundBatch) {
        let bucket_permit = self
            .bucket_permits
            .clone()
            .acquire_owned()
            .await
            .expect("bucket permit pool closed");
        let global_permit = self
            .global_permits
            .clone()
            .acquire_owned()
            .await
            .expect("global permit pool closed");

        debug!(
            bucket = self.index,
            table = %out.batch.table,
            rows = out.batch.len(),
            bytes = out.batch.size_bytes(),
            "dispatching batch"
        );

        tokio::spawn(sender::send_batch(
            self.remote.clone(),
            self.config.retry_policy.clone(),
            std::time::Duration::from_millis(self.config.retry_timeout_ms),
            out,
            self.stats.clone(),
            bucket_permit,
            global_permit,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::request::{RowCompletion, WriteRequest};

    // Queue capacity 2, three enqueues, no consumer draining: the third
    // try_send must fail immediately rather than block.
    #[tokio::test]
    async fn full_queue_rejects_enqueue_without_blocking() {
        let (tx, _rx) = mpsc::channel::<BucketEvent>(2);
        let event = |key: &str| {
            BucketEvent::Data(PendingRow::new(
                WriteRequest::new("metrics", key, vec![0u8; 8]),
                RowCompletion::none(),
            ))
        };
        assert!(tx.try_send(event("a")).is_ok());
        assert!(tx.try_send(event("b")).is_ok());
        assert!(matches!(
            tx.try_send(event("c")),
            Err(mpsc::error::TrySendError::Full(_))
        ));
    }
}
