//! Retry classification and backoff
//!
//! Retry decisions are a pure function of the error variant and the
//! configured policy; the strategy itself only tracks attempt count,
//! the doubling base delay and the submission deadline.

use crate::error::WriterError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Initial backoff base delay in milliseconds
pub const BASE_DELAY_MS: u64 = 10;

/// Ceiling for the doubling base delay in milliseconds
pub const MAX_DELAY_MS: u64 = 320;

/// How the configured code set is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicyMode {
    /// Retry only the listed error codes
    AllowList,
    /// Retry everything except the listed error codes
    DenyList,
}

/// Error-code retry policy
///
/// The two modes are mutually exclusive: an allow-list retries only the
/// listed codes, a deny-list retries everything except the listed codes.
/// HTTP 5xx responses are retryable regardless of the code set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub mode: RetryPolicyMode,
    pub codes: HashSet<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // Deny-list with no codes: retry every classified remote error.
        Self {
            mode: RetryPolicyMode::DenyList,
            codes: HashSet::new(),
        }
    }
}

impl RetryPolicy {
    pub fn allow_list<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: RetryPolicyMode::AllowList,
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn deny_list<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: RetryPolicyMode::DenyList,
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a remote error code is retryable under this policy
    pub fn code_retryable(&self, code: &str) -> bool {
        match self.mode {
            RetryPolicyMode::AllowList => self.codes.contains(code),
            RetryPolicyMode::DenyList => !self.codes.contains(code),
        }
    }

    /// Classify one error independently of attempt state
    ///
    /// - Transport failures are always retryable.
    /// - Remote failures are retryable iff the HTTP status is 5xx or the
    ///   code matches the policy.
    /// - A partial batch is retryable iff every failed row is independently
    ///   retryable; one non-retryable row makes the whole decision negative.
    /// - Everything else is not retryable.
    pub fn should_retry(&self, error: &WriterError) -> bool {
        match error {
            WriterError::Transport(_) => true,
            WriterError::Remote { code, status, .. } => {
                *status >= 500 || self.code_retryable(code)
            }
            WriterError::PartialBatch(rows) => {
                rows.iter().all(|f| self.should_retry(&f.error))
            }
            _ => false,
        }
    }
}

/// Per-submission retry state
///
/// `next_pause` is the single decision point: it returns a zero duration
/// when the error is not retryable or the deadline has passed, otherwise a
/// uniformly random pause in `[1, min(base, remaining_ms)]`, bumping the
/// attempt count and doubling the base (capped) as a side effect.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    policy: RetryPolicy,
    attempts: u32,
    base_delay_ms: u64,
    deadline: Instant,
}

impl RetryStrategy {
    /// New strategy with the deadline at `now + timeout`
    pub fn new(policy: RetryPolicy, timeout: Duration) -> Self {
        Self::with_deadline(policy, Instant::now() + timeout)
    }

    /// New strategy sharing an existing deadline (used by the single-row
    /// fallback path, which inherits the remaining budget of its batch)
    pub fn with_deadline(policy: RetryPolicy, deadline: Instant) -> Self {
        Self {
            policy,
            attempts: 0,
            base_delay_ms: BASE_DELAY_MS,
            deadline,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Next backoff pause, or zero if retrying is over
    ///
    /// Zero means terminal: the error is not retryable, or the deadline has
    /// passed. A non-zero pause consumes one attempt.
    pub fn next_pause(&mut self, error: &WriterError) -> Duration {
        if !self.policy.should_retry(error) {
            return Duration::ZERO;
        }
        let now = Instant::now();
        if now >= self.deadline {
            return Duration::ZERO;
        }
        let remaining_ms = self
            .deadline
            .saturating_duration_since(now)
            .as_millis()
            .min(u64::MAX as u128) as u64;
        let cap = self.base_delay_ms.min(remaining_ms).max(1);
        let pause_ms = rand::thread_rng().gen_range(1..=cap);

        self.attempts += 1;
        self.base_delay_ms = (self.base_delay_ms * 2).min(MAX_DELAY_MS);

        Duration::from_millis(pause_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RowFailure;

    fn transport() -> WriterError {
        WriterError::Transport("connection reset".to_string())
    }

    fn remote(code: &str, status: u16) -> WriterError {
        WriterError::Remote {
            code: code.to_string(),
            status,
            message: "test".to_string(),
        }
    }

    fn partial(codes: &[(&str, u16)]) -> WriterError {
        WriterError::PartialBatch(
            codes
                .iter()
                .enumerate()
                .map(|(i, (code, status))| RowFailure::new(i, remote(code, *status)))
                .collect(),
        )
    }

    #[test]
    fn transport_is_always_retryable() {
        let policy = RetryPolicy::allow_list(Vec::<String>::new());
        assert!(policy.should_retry(&transport()));
    }

    #[test]
    fn server_errors_are_retryable_regardless_of_policy() {
        let policy = RetryPolicy::allow_list(Vec::<String>::new());
        assert!(policy.should_retry(&remote("OTSInternalServerError", 503)));
        assert!(!policy.should_retry(&remote("OTSParameterInvalid", 400)));
    }

    #[test]
    fn allow_list_retries_only_listed_codes() {
        let policy = RetryPolicy::allow_list(["Throttled"]);
        assert!(policy.should_retry(&remote("Throttled", 400)));
        assert!(!policy.should_retry(&remote("ConditionCheckFail", 400)));
    }

    #[test]
    fn deny_list_retries_everything_but_listed_codes() {
        let policy = RetryPolicy::deny_list(["ConditionCheckFail"]);
        assert!(policy.should_retry(&remote("Throttled", 400)));
        assert!(!policy.should_retry(&remote("ConditionCheckFail", 400)));
    }

    #[test]
    fn partial_batch_requires_every_row_retryable() {
        let policy = RetryPolicy::allow_list(["RETRYABLE"]);
        assert!(policy.should_retry(&partial(&[("RETRYABLE", 400), ("RETRYABLE", 400)])));
        assert!(!policy.should_retry(&partial(&[
            ("RETRYABLE", 400),
            ("RETRYABLE", 400),
            ("NON_RETRYABLE", 400),
        ])));
    }

    #[test]
    fn other_errors_are_not_retryable() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(&WriterError::RowRejected("too large".to_string())));
        assert!(!policy.should_retry(&WriterError::Closed));
    }

    #[test]
    fn base_delay_doubles_up_to_ceiling() {
        let mut strategy =
            RetryStrategy::new(RetryPolicy::default(), Duration::from_secs(60));
        let mut last_base = strategy.base_delay_ms();
        assert_eq!(last_base, BASE_DELAY_MS);
        for _ in 0..10 {
            let pause = strategy.next_pause(&transport());
            assert!(pause > Duration::ZERO);
            assert!(pause.as_millis() as u64 <= last_base);
            let base = strategy.base_delay_ms();
            assert!(base >= last_base);
            assert!(base <= MAX_DELAY_MS);
            last_base = base;
        }
        assert_eq!(strategy.base_delay_ms(), MAX_DELAY_MS);
        assert_eq!(strategy.attempts(), 10);
    }

    #[test]
    fn pause_is_zero_once_deadline_passed() {
        let mut strategy = RetryStrategy::with_deadline(
            RetryPolicy::default(),
            Instant::now() - Duration::from_millis(1),
        );
        assert_eq!(strategy.next_pause(&transport()), Duration::ZERO);
        assert_eq!(strategy.attempts(), 0);
    }

    #[test]
    fn pause_is_zero_for_non_retryable_error() {
        let mut strategy =
            RetryStrategy::new(RetryPolicy::default(), Duration::from_secs(60));
        let err = WriterError::RowRejected("oversized".to_string());
        assert_eq!(strategy.next_pause(&err), Duration::ZERO);
    }
}
