//! Status mutations: the only ways a stored job may change.
//!
//! Every mutation names the status it expects to find. Stores apply a
//! mutation as one conditional write ("set X only if currently Y"), so
//! duplicated or reordered callbacks resolve to no-ops instead of double
//! side effects.

use serde_json::Value as JsonValue;

use crate::job::{DispatchToken, JobStatus};
use crate::retry::RetryDecision;

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMutation {
    expected_status: JobStatus,
    expected_attempts: Option<u32>,
    target_status: JobStatus,
    result: Option<JsonValue>,
    error: Option<String>,
    attempt_increment: u32,
    dispatch_token: Option<DispatchToken>,
}

impl StatusMutation {
    fn edge(from: JobStatus, to: JobStatus) -> Self {
        Self {
            expected_status: from,
            expected_attempts: None,
            target_status: to,
            result: None,
            error: None,
            attempt_increment: 0,
            dispatch_token: None,
        }
    }

    /// `Pending → Queued` after the initial enqueue succeeded.
    pub fn queue(token: DispatchToken) -> Self {
        Self {
            dispatch_token: Some(token),
            ..Self::edge(JobStatus::Pending, JobStatus::Queued)
        }
    }

    /// `Queued → Processing`.
    pub fn begin_processing() -> Self {
        Self::edge(JobStatus::Queued, JobStatus::Processing)
    }

    /// `Processing → Completed`, storing the result and clearing any error.
    pub fn complete(result: JsonValue) -> Self {
        Self {
            result: Some(result),
            ..Self::edge(JobStatus::Processing, JobStatus::Completed)
        }
    }

    /// `Processing → Queued` or `Processing → Failed`, as decided by the
    /// retry policy. Guarded on the attempt count the decision was made from.
    pub fn fail(decision: RetryDecision, error: impl Into<String>) -> Self {
        match decision {
            RetryDecision::Retry { attempts_before } => Self {
                expected_attempts: Some(attempts_before),
                attempt_increment: 1,
                ..Self::edge(JobStatus::Processing, JobStatus::Queued)
            },
            RetryDecision::GiveUp { attempts_before } => Self {
                expected_attempts: Some(attempts_before),
                attempt_increment: 1,
                error: Some(error.into()),
                ..Self::edge(JobStatus::Processing, JobStatus::Failed)
            },
        }
    }

    /// Record a fresh dispatch token on a job that stays `Queued`.
    ///
    /// Not a status transition; used when a queued job is enqueued again.
    pub fn refresh_dispatch(token: DispatchToken) -> Self {
        Self {
            dispatch_token: Some(token),
            ..Self::edge(JobStatus::Queued, JobStatus::Queued)
        }
    }

    pub fn expected_status(&self) -> JobStatus {
        self.expected_status
    }

    pub fn expected_attempts(&self) -> Option<u32> {
        self.expected_attempts
    }

    pub fn target_status(&self) -> JobStatus {
        self.target_status
    }

    pub fn result(&self) -> Option<&JsonValue> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn attempt_increment(&self) -> u32 {
        self.attempt_increment
    }

    pub fn dispatch_token(&self) -> Option<&DispatchToken> {
        self.dispatch_token.as_ref()
    }

    /// Whether the mutation moves the job to a different status.
    pub fn is_transition(&self) -> bool {
        self.expected_status != self.target_status
    }

    /// Whether applying this mutation records a new processing start time.
    pub fn stamps_started(&self) -> bool {
        self.is_transition() && self.target_status == JobStatus::Processing
    }

    /// Whether applying this mutation records the completion time.
    pub fn stamps_completed(&self) -> bool {
        self.is_transition() && self.target_status.is_terminal()
    }
}
