//! Aggregate completion handle for one caller-issued set of rows
//!
//! A [`Group`] expects exactly N row outcomes and completes once the Nth is
//! recorded. Recording more than N outcomes is a programming error in the
//! engine, not a data error, and panics immediately rather than being
//! silently ignored.

use crate::error::WriterError;
use crate::writer::request::WriteRequest;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug)]
struct GroupState {
    succeeded: Vec<WriteRequest>,
    failed: Vec<(WriteRequest, WriterError)>,
}

impl GroupState {
    fn recorded(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Expects exactly `expected` row outcomes; completes a future when the
/// last one is recorded
#[derive(Debug)]
pub struct Group {
    expected: usize,
    state: Mutex<GroupState>,
    notify: Notify,
}

/// Final aggregate result of a completed [`Group`]
#[derive(Debug, Clone)]
pub struct GroupResult {
    pub expected: usize,
    pub succeeded: Vec<WriteRequest>,
    pub failed: Vec<(WriteRequest, WriterError)>,
}

impl GroupResult {
    pub fn all_finished(&self) -> bool {
        self.succeeded.len() + self.failed.len() == self.expected
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && self.succeeded.len() == self.expected
    }
}

impl Group {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            state: Mutex::new(GroupState {
                succeeded: Vec::new(),
                failed: Vec::new(),
            }),
            notify: Notify::new(),
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Record one successful row outcome
    ///
    /// # Panics
    ///
    /// Panics when the group already holds `expected` outcomes.
    pub fn succeed_one_row(&self, row: WriteRequest) {
        self.record(|state| state.succeeded.push(row));
    }

    /// Record one failed row outcome with its cause
    ///
    /// # Panics
    ///
    /// Panics when the group already holds `expected` outcomes.
    pub fn fail_one_row(&self, row: WriteRequest, cause: WriterError) {
        self.record(|state| state.failed.push((row, cause)));
    }

    fn record(&self, push: impl FnOnce(&mut GroupState)) {
        let recorded = {
            let mut state = self.state.lock().expect("group state poisoned");
            if state.recorded() >= self.expected {
                panic!(
                    "group over-completion: {} outcomes already recorded, expected {}",
                    state.recorded(),
                    self.expected
                );
            }
            push(&mut state);
            state.recorded()
        };
        if recorded == self.expected {
            self.notify.notify_waiters();
        }
    }

    fn try_result(&self) -> Option<GroupResult> {
        let state = self.state.lock().expect("group state poisoned");
        if state.recorded() < self.expected {
            return None;
        }
        Some(GroupResult {
            expected: self.expected,
            succeeded: state.succeeded.clone(),
            failed: state.failed.clone(),
        })
    }

    /// Block the caller until all `expected` outcomes are recorded
    pub async fn wait(&self) -> GroupResult {
        loop {
            // Register interest before checking, so a completion between the
            // check and the await cannot be missed.
            let notified = self.notify.notified();
            if let Some(result) = self.try_result() {
                return result;
            }
            notified.await;
        }
    }

    /// Like [`Group::wait`], bounded by a timeout
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<GroupResult, WriterError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| {
                WriterError::RetryExhausted(format!(
                    "group did not complete within {} ms",
                    timeout.as_millis()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn req(key: &str) -> WriteRequest {
        WriteRequest::new("metrics", key, vec![1, 2, 3])
    }

    #[tokio::test]
    async fn wait_returns_once_all_outcomes_recorded() {
        let group = Arc::new(Group::new(3));
        let waiter = {
            let group = group.clone();
            tokio::spawn(async move { group.wait().await })
        };
        group.succeed_one_row(req("a"));
        group.fail_one_row(req("b"), WriterError::Transport("reset".to_string()));
        group.succeed_one_row(req("c"));

        let result = waiter.await.expect("waiter task");
        assert!(result.all_finished());
        assert!(!result.all_succeeded());
        assert_eq!(result.succeeded.len() + result.failed.len(), 3);
    }

    #[tokio::test]
    async fn wait_after_completion_returns_immediately() {
        let group = Group::new(1);
        group.succeed_one_row(req("a"));
        let result = group.wait().await;
        assert!(result.all_succeeded());
    }

    #[tokio::test]
    async fn wait_timeout_elapses_when_outcomes_missing() {
        let group = Group::new(2);
        group.succeed_one_row(req("a"));
        let result = group.wait_timeout(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(WriterError::RetryExhausted(_))));
    }

    #[test]
    #[should_panic(expected = "over-completion")]
    fn recording_more_than_expected_panics() {
        let group = Group::new(1);
        group.succeed_one_row(req("a"));
        group.succeed_one_row(req("b"));
    }

    #[test]
    #[should_panic(expected = "over-completion")]
    fn failure_past_expected_also_panics() {
        let group = Group::new(1);
        group.fail_one_row(req("a"), WriterError::Closed);
        group.fail_one_row(req("b"), WriterError::Closed);
    }
}
