use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use jobrelay_infra::jobs::{CallbackAck, CallbackOutcome};
use jobrelay_jobs::{JobStatus, JobView};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    /// Missing payload deserializes as `null` and fails validation.
    #[serde(default)]
    pub payload: JsonValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListJobsQuery {
    pub fn status_filter(&self) -> Result<Option<JobStatus>, axum::response::Response> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => s.parse().map(Some).map_err(|_| {
                errors::validation_error(
                    "status must be one of: pending, queued, processing, completed, failed",
                )
            }),
        }
    }
}

/// Outcome reported by the task dispatcher.
#[derive(Debug, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallbackRequest {
    BeginProcessing,
    /// `result` must be present; an explicit `null` is accepted.
    Success { result: JsonValue },
    Failure {
        error: String,
        #[serde(default)]
        retryable: bool,
    },
}

impl From<CallbackRequest> for CallbackOutcome {
    fn from(value: CallbackRequest) -> Self {
        match value {
            CallbackRequest::BeginProcessing => CallbackOutcome::BeginProcessing,
            CallbackRequest::Success { result } => CallbackOutcome::Success(result),
            CallbackRequest::Failure { error, retryable } => {
                CallbackOutcome::Failure { error, retryable }
            }
        }
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub items: Vec<JobView>,
    /// Matching jobs across all pages.
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    /// `false` when the callback was absorbed because the job had already
    /// moved on.
    pub applied: bool,
    pub job: JobView,
}

impl From<CallbackAck> for CallbackResponse {
    fn from(ack: CallbackAck) -> Self {
        Self {
            applied: ack.is_applied(),
            job: ack.into_view(),
        }
    }
}
