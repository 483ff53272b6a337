//! Retry ceiling for failed processing attempts.
//!
//! Only the attempt-count bound lives here; delays between attempts are the
//! task dispatcher's own backoff.

use serde::{Deserialize, Serialize};

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts allowed before a job is forced to `Failed`.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

/// Outcome of applying the policy to a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-dispatch the job; `attempts_before + 1` attempts have been used.
    Retry { attempts_before: u32 },
    /// Terminal failure.
    GiveUp { attempts_before: u32 },
}

impl RetryDecision {
    pub fn attempts_after(&self) -> u32 {
        match self {
            RetryDecision::Retry { attempts_before } | RetryDecision::GiveUp { attempts_before } => {
                attempts_before + 1
            }
        }
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, RetryDecision::Retry { .. })
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Create a policy that never retries.
    pub fn no_retry() -> Self {
        Self { max_attempts: 0 }
    }

    /// Decide what a failure does to a job that had used `attempts_before`
    /// attempts. Reaching the ceiling forces `GiveUp` even when retryable.
    pub fn decide(&self, attempts_before: u32, retryable: bool) -> RetryDecision {
        if retryable && attempts_before.saturating_add(1) < self.max_attempts {
            RetryDecision::Retry { attempts_before }
        } else {
            RetryDecision::GiveUp { attempts_before }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_retryable_failure_is_retried() {
        let policy = RetryPolicy::default();
        let d = policy.decide(0, true);
        assert_eq!(d, RetryDecision::Retry { attempts_before: 0 });
        assert_eq!(d.attempts_after(), 1);
    }

    #[test]
    fn ceiling_forces_give_up() {
        let policy = RetryPolicy::new(5);
        let d = policy.decide(4, true);
        assert_eq!(d, RetryDecision::GiveUp { attempts_before: 4 });
        assert_eq!(d.attempts_after(), 5);
    }

    #[test]
    fn non_retryable_gives_up_immediately() {
        assert!(!RetryPolicy::new(5).decide(0, false).is_retry());
    }

    #[test]
    fn no_retry_policy() {
        assert!(!RetryPolicy::no_retry().decide(0, true).is_retry());
    }
}
