//! Asynchronous batch transmission with classification-driven retry
//!
//! One send task exists per dispatched batch. It holds one bucket permit
//! and one global permit for its whole lifetime; the permits are owned
//! values, so release happens on every exit path, including panics. The
//! task drives the retry rounds, merges partial results positionally, runs
//! the single-row fallback when a partial failure is not retryable as a
//! whole, and finally delivers exactly one terminal outcome per row.

use crate::error::{RowFailure, WriterError};
use crate::writer::manager::OutboundBatch;
use crate::writer::merge::{failed_positions, merge_round};
use crate::writer::request::{Batch, RemoteWriter, RowStatus};
use crate::writer::retry::{RetryPolicy, RetryStrategy};
use crate::writer::statistics::Statistics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, warn};

/// Send one batch to completion and deliver per-row outcomes
///
/// `_bucket_permit` and `_global_permit` are intentionally held until the
/// task returns: the flush barrier counts on the bucket permit staying
/// acquired until every row outcome of this batch is recorded.
pub(crate) async fn send_batch(
    remote: Arc<dyn RemoteWriter>,
    policy: RetryPolicy,
    retry_timeout: Duration,
    out: OutboundBatch,
    stats: Arc<Statistics>,
    _bucket_permit: OwnedSemaphorePermit,
    _global_permit: OwnedSemaphorePermit,
) {
    let OutboundBatch { batch, completions } = out;
    let mut strategy = RetryStrategy::new(policy, retry_timeout);
    let statuses = run_rounds(&remote, &mut strategy, &batch, &stats).await;

    let mut succeeded = 0u64;
    let mut failed = 0u64;
    for ((request, completion), status) in
        batch.rows.iter().zip(completions).zip(statuses)
    {
        match status {
            RowStatus::Succeeded { cost } => {
                succeeded += 1;
                completion.complete(request, Ok(cost));
            }
            RowStatus::Failed(error) => {
                failed += 1;
                completion.complete(request, Err(error));
            }
        }
    }
    stats.record_rows_succeeded(succeeded);
    stats.record_rows_failed(failed);

    debug!(
        bucket = batch.bucket,
        table = %batch.table,
        succeeded,
        failed,
        attempts = strategy.attempts() + 1,
        "batch finished"
    );
}

/// Drive retry rounds until every row has a terminal status
async fn run_rounds(
    remote: &Arc<dyn RemoteWriter>,
    strategy: &mut RetryStrategy,
    batch: &Batch,
    stats: &Statistics,
) -> Vec<RowStatus> {
    let never_attempted =
        RowStatus::Failed(WriterError::Transport("row was never attempted".to_string()));
    let mut merged: Vec<RowStatus> = vec![never_attempted; batch.len()];
    let mut pending: Vec<usize> = (0..batch.len()).collect();

    loop {
        let attempt = batch.subset(&pending);
        stats.record_request_issued();
        let result = submit_checked(remote, attempt).await;

        match result {
            Ok(statuses) => {
                merge_round(&mut merged, &pending, &statuses);

                let failures: Vec<RowFailure> = statuses
                    .iter()
                    .enumerate()
                    .filter_map(|(pos, status)| match status {
                        RowStatus::Failed(e) => Some(RowFailure::new(pos, e.clone())),
                        RowStatus::Succeeded { .. } => None,
                    })
                    .collect();
                if failures.is_empty() {
                    return merged;
                }

                let error = WriterError::PartialBatch(failures);
                let pause = strategy.next_pause(&error);
                if pause.is_zero() {
                    // Not retryable as a whole (or out of budget). Rows that
                    // are individually retryable get one last chance as
                    // single-row requests.
                    single_row_fallback(remote, strategy, batch, &mut merged, stats).await;
                    return merged;
                }
                warn!(
                    table = %batch.table,
                    still_failed = failed_positions(&merged).len(),
                    attempt = strategy.attempts(),
                    pause_ms = pause.as_millis() as u64,
                    "partial batch failure, retrying failed rows"
                );
                tokio::time::sleep(pause).await;
                pending = failed_positions(&merged);
            }
            Err(error) => {
                let pause = strategy.next_pause(&error);
                if pause.is_zero() {
                    for &i in &pending {
                        merged[i] = RowStatus::Failed(error.clone());
                    }
                    return merged;
                }
                warn!(
                    table = %batch.table,
                    error = %error,
                    kind = error.kind(),
                    attempt = strategy.attempts(),
                    pause_ms = pause.as_millis() as u64,
                    "request failed, retrying"
                );
                tokio::time::sleep(pause).await;
            }
        }
    }
}

/// Submit one batch and enforce the one-status-per-row contract
///
/// A response whose length does not match the submitted row count is a
/// protocol violation and is surfaced as a transport failure for the whole
/// request.
async fn submit_checked(
    remote: &Arc<dyn RemoteWriter>,
    batch: Batch,
) -> Result<Vec<RowStatus>, WriterError> {
    let submitted = batch.len();
    let result = remote.submit(batch).await?;
    if result.statuses.len() != submitted {
        return Err(WriterError::Transport(format!(
            "remote returned {} statuses for {} submitted rows",
            result.statuses.len(),
            submitted
        )));
    }
    Ok(result.statuses)
}

/// Re-submit still-failed, individually retryable rows one by one
///
/// Runs only while the submission deadline has not passed. Rows whose own
/// error is non-retryable keep their failure untouched.
async fn single_row_fallback(
    remote: &Arc<dyn RemoteWriter>,
    strategy: &RetryStrategy,
    batch: &Batch,
    merged: &mut [RowStatus],
    stats: &Statistics,
) {
    let deadline = strategy.deadline();
    for index in failed_positions(merged) {
        if std::time::Instant::now() >= deadline {
            return;
        }
        let retryable = match &merged[index] {
            RowStatus::Failed(e) => strategy.policy().should_retry(e),
            RowStatus::Succeeded { .. } => false,
        };
        if !retryable {
            continue;
        }

        stats.record_single_row_fallback();
        debug!(
            table = %batch.table,
            row = index,
            "single-row fallback"
        );
        let mut row_strategy = RetryStrategy::with_deadline(strategy.policy().clone(), deadline);
        let single = batch.subset(&[index]);
        loop {
            stats.record_request_issued();
            match submit_checked(remote, single.clone()).await {
                Ok(statuses) => match statuses.into_iter().next() {
                    Some(RowStatus::Succeeded { cost }) => {
                        merged[index] = RowStatus::Succeeded { cost };
                        break;
                    }
                    Some(RowStatus::Failed(error)) => {
                        let pause = row_strategy.next_pause(&error);
                        merged[index] = RowStatus::Failed(error);
                        if pause.is_zero() {
                            break;
                        }
                        tokio::time::sleep(pause).await;
                    }
                    // submit_checked guarantees one status per row.
                    None => break,
                },
                Err(error) => {
                    let pause = row_strategy.next_pause(&error);
                    if pause.is_zero() {
                        merged[index] = RowStatus::Failed(error);
                        break;
                    }
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }
}
