//! Writer facade and its building blocks
//!
//! [`TableWriter`] is the surface exposed to application code: non-blocking
//! `add`, future-returning `add_with_future`, aggregate `add_group`, a
//! blocking `flush` barrier, `close`, and a statistics snapshot. Everything
//! else in this module tree is the machinery behind it.

pub mod bucket;
pub mod group;
pub mod manager;
pub mod merge;
pub mod request;
pub mod retry;
pub mod router;
pub(crate) mod sender;
pub mod statistics;

use crate::config::types::WriterConfig;
use crate::error::WriterError;
use crate::writer::bucket::{BucketEvent, BucketWorker};
use crate::writer::group::Group;
use crate::writer::request::{PendingRow, RemoteWriter, RowCompletion, RowOutcome, WriteRequest};
use crate::writer::router::Router;
use crate::writer::statistics::{Statistics, StatisticsSnapshot};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Bounded spin used only when injecting a flush sentinel into a full queue
const FLUSH_ENQUEUE_RETRIES: u32 = 100;
const FLUSH_ENQUEUE_PAUSE: Duration = Duration::from_millis(5);

/// Future resolving to the terminal outcome of one row added through
/// [`TableWriter::add_with_future`]
#[derive(Debug)]
pub struct RowFuture {
    rx: oneshot::Receiver<RowOutcome>,
}

impl Future for RowFuture {
    type Output = RowOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The worker dropped the channel without an outcome; only
            // possible when the writer is torn down.
            Poll::Ready(Err(_)) => Poll::Ready(Err(WriterError::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Buffering batch writer for a remote tabular store
///
/// Owns `bucket_count` buckets, each with its own bounded queue and single
/// consumer task, plus the global concurrency permit pool shared by all
/// buckets and an optional background auto-flush task.
pub struct TableWriter {
    config: Arc<WriterConfig>,
    router: Router,
    stats: Arc<Statistics>,
    senders: Mutex<Vec<mpsc::Sender<BucketEvent>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    flusher: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl TableWriter {
    /// Create a writer and start its bucket consumers
    ///
    /// # Errors
    ///
    /// Returns `WriterError::Configuration` when the configuration fails
    /// validation.
    pub fn new(
        config: WriterConfig,
        remote: Arc<dyn RemoteWriter>,
    ) -> Result<Self, WriterError> {
        config.validate()?;
        info!(
            buckets = config.bucket_count,
            concurrency = config.concurrency,
            write_mode = ?config.write_mode,
            "initializing table writer"
        );

        let config = Arc::new(config);
        let stats = Arc::new(Statistics::default());
        let global_permits = Arc::new(Semaphore::new(config.concurrency));

        let mut senders = Vec::with_capacity(config.bucket_count);
        let mut workers = Vec::with_capacity(config.bucket_count);
        for index in 0..config.bucket_count {
            let (tx, handle) = BucketWorker::spawn(
                index,
                config.clone(),
                remote.clone(),
                stats.clone(),
                global_permits.clone(),
            );
            senders.push(tx);
            workers.push(handle);
        }

        let flusher = if config.flush_interval_ms > 0 {
            Some(Self::spawn_auto_flush(
                config.flush_interval_ms,
                senders.clone(),
            ))
        } else {
            None
        };

        Ok(Self {
            router: Router::new(config.dispatch_mode, config.bucket_count),
            config,
            stats,
            senders: Mutex::new(senders),
            workers: Mutex::new(workers),
            flusher: Mutex::new(flusher),
            closed: AtomicBool::new(false),
        })
    }

    fn spawn_auto_flush(
        interval_ms: u64,
        senders: Vec<mpsc::Sender<BucketEvent>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                for tx in &senders {
                    let (done_tx, _done_rx) = oneshot::channel();
                    // A full queue means the bucket is already busy; skip
                    // this round rather than wait.
                    let _ = tx.try_send(BucketEvent::Flush(done_tx));
                }
            }
        })
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Non-blocking enqueue of one row
    ///
    /// Returns `false` when the destination bucket's queue is momentarily
    /// full or the writer is closed; the caller decides whether to back off
    /// and re-try.
    pub fn add(&self, request: WriteRequest) -> bool {
        self.enqueue(request, RowCompletion::none()).is_ok()
    }

    /// Enqueue one row and get a future for its terminal outcome
    ///
    /// # Errors
    ///
    /// `WriterError::QueueFull` when the destination bucket queue is full,
    /// `WriterError::Closed` after `close`.
    pub fn add_with_future(&self, request: WriteRequest) -> Result<RowFuture, WriterError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(request, RowCompletion::for_future(tx))?;
        Ok(RowFuture { rx })
    }

    /// Enqueue a set of rows sharing one aggregate completion handle
    ///
    /// The group always expects exactly `requests.len()` outcomes. Rows
    /// rejected at enqueue time (full queue) are failed into the group
    /// immediately, so `Group::wait` terminates regardless.
    pub fn add_group(&self, requests: Vec<WriteRequest>) -> Result<Arc<Group>, WriterError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WriterError::Closed);
        }
        let group = Arc::new(Group::new(requests.len()));
        for request in requests {
            match self.enqueue(request.clone(), RowCompletion::for_group(group.clone())) {
                Ok(()) => {}
                Err(error) => {
                    self.stats.record_rows_submitted(1);
                    self.stats.record_rows_failed(1);
                    group.fail_one_row(request, error);
                }
            }
        }
        Ok(group)
    }

    fn enqueue(
        &self,
        request: WriteRequest,
        completion: RowCompletion,
    ) -> Result<(), WriterError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WriterError::Closed);
        }
        let bucket = self.router.route(&request);
        let sender = {
            let senders = self.senders.lock().expect("senders lock poisoned");
            match senders.get(bucket) {
                Some(tx) => tx.clone(),
                None => return Err(WriterError::Closed),
            }
        };
        match sender.try_send(BucketEvent::Data(PendingRow::new(request, completion))) {
            Ok(()) => {
                self.stats.record_rows_submitted(1);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                debug!(bucket, "bucket queue full, enqueue rejected");
                Err(WriterError::QueueFull { bucket })
            }
            Err(TrySendError::Closed(_)) => Err(WriterError::Closed),
        }
    }

    /// Block until every row enqueued before this call has a terminal
    /// outcome
    ///
    /// Injects a flush sentinel into each bucket queue (bounded spin when a
    /// queue is full, since flush is rare and not latency-critical), then
    /// waits for every bucket's barrier signal.
    pub async fn flush(&self) -> Result<(), WriterError> {
        let senders: Vec<(usize, mpsc::Sender<BucketEvent>)> = {
            let guard = self.senders.lock().expect("senders lock poisoned");
            guard.iter().cloned().enumerate().collect()
        };
        if senders.is_empty() {
            return Err(WriterError::Closed);
        }

        let mut barriers = Vec::with_capacity(senders.len());
        for (bucket, sender) in senders {
            let (done_tx, done_rx) = oneshot::channel();
            let mut event = BucketEvent::Flush(done_tx);
            let mut attempts = 0u32;
            loop {
                match sender.try_send(event) {
                    Ok(()) => break,
                    Err(TrySendError::Full(back)) => {
                        attempts += 1;
                        if attempts >= FLUSH_ENQUEUE_RETRIES {
                            return Err(WriterError::QueueFull { bucket });
                        }
                        event = back;
                        tokio::time::sleep(FLUSH_ENQUEUE_PAUSE).await;
                    }
                    Err(TrySendError::Closed(_)) => return Err(WriterError::Closed),
                }
            }
            barriers.push(done_rx);
        }

        for barrier in barriers {
            barrier.await.map_err(|_| WriterError::Closed)?;
        }
        debug!("flush barrier complete");
        Ok(())
    }

    /// Flush all buffered rows, then stop consumers and release resources
    ///
    /// Idempotent: a second call returns immediately.
    pub async fn close(&self) -> Result<(), WriterError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("closing table writer");

        if let Some(flusher) = self
            .flusher
            .lock()
            .expect("flusher lock poisoned")
            .take()
        {
            flusher.abort();
        }

        self.flush().await?;

        // Dropping the senders closes every bucket queue; consumers drain
        // and exit.
        self.senders
            .lock()
            .expect("senders lock poisoned")
            .clear();

        let workers = std::mem::take(
            &mut *self.workers.lock().expect("workers lock poisoned"),
        );
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "bucket consumer ended abnormally");
            }
        }
        Ok(())
    }

    /// Read-only snapshot of the writer's counters
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }
}
