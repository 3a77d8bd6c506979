//! Mock remote writer for integration tests
//!
//! Scripted per-call replies make retry rounds deterministic without a real
//! service behind the writer.

use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tabular_batch_writer::{Batch, BatchResult, CapacityCost, RemoteWriter, RowStatus, WriterError};

/// Behavior of one `submit` call
#[derive(Clone, Debug)]
pub enum MockReply {
    /// Every row succeeds
    Success,
    /// Every row succeeds after a delay
    SlowSuccess(Duration),
    /// The whole request fails with a transport error
    Transport(String),
    /// The whole request fails with a classified remote error
    Remote { code: String, status: u16 },
    /// Rows whose identity key is listed fail with (code, status); the rest
    /// succeed
    FailKeys(Vec<(String, String, u16)>),
}

/// Scripted [`RemoteWriter`]
///
/// Replies are consumed front-to-back; once the script is exhausted every
/// further call gets the default reply.
pub struct MockRemoteWriter {
    script: Mutex<VecDeque<MockReply>>,
    default_reply: MockReply,
    calls: AtomicU64,
}

impl MockRemoteWriter {
    pub fn succeeding() -> Self {
        Self::with_default(MockReply::Success)
    }

    pub fn with_default(default_reply: MockReply) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_reply,
            calls: AtomicU64::new(0),
        }
    }

    pub fn with_script(script: Vec<MockReply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            default_reply: MockReply::Success,
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> MockReply {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

fn succeeded() -> RowStatus {
    RowStatus::Succeeded {
        cost: CapacityCost { capacity_units: 1 },
    }
}

impl RemoteWriter for MockRemoteWriter {
    fn submit(&self, batch: Batch) -> BoxFuture<'static, Result<BatchResult, WriterError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.next_reply();
        Box::pin(async move {
            match reply {
                MockReply::Success => Ok(BatchResult {
                    statuses: batch.rows.iter().map(|_| succeeded()).collect(),
                }),
                MockReply::SlowSuccess(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(BatchResult {
                        statuses: batch.rows.iter().map(|_| succeeded()).collect(),
                    })
                }
                MockReply::Transport(message) => Err(WriterError::Transport(message)),
                MockReply::Remote { code, status } => Err(WriterError::Remote {
                    code,
                    status,
                    message: "mock remote failure".to_string(),
                }),
                MockReply::FailKeys(failures) => Ok(BatchResult {
                    statuses: batch
                        .rows
                        .iter()
                        .map(|row| {
                            match failures.iter().find(|(key, _, _)| key == &row.identity_key)
                            {
                                Some((_, code, status)) => {
                                    RowStatus::Failed(WriterError::Remote {
                                        code: code.clone(),
                                        status: *status,
                                        message: "mock row failure".to_string(),
                                    })
                                }
                                None => succeeded(),
                            }
                        })
                        .collect(),
                }),
            }
        })
    }
}
