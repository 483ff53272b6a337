use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use jobrelay_core::{DomainError, DomainResult, JobId, OwnerId};

use crate::lifecycle::StatusMutation;
use crate::payload::PayloadLimits;

/// Lifecycle status of a job.
///
/// `Pending → Queued → Processing → {Completed | Failed}`, with the single
/// backwards edge `Processing → Queued` taken when a retryable failure is
/// re-dispatched.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self → next` is an edge of the transition table.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Queued)
                | (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Queued)
        )
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::validation(format!("unknown job status: {other}"))),
        }
    }
}

/// Opaque handle returned by the task dispatcher for an enqueued invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DispatchToken(String);

impl DispatchToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for DispatchToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tracked unit of asynchronous work.
///
/// Fields are private: the only way to change a job is [`Job::apply`] with a
/// [`StatusMutation`] built by the lifecycle functions, which keeps
/// `result`/`error` consistent with `status` and `attempt_count` monotonic.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    id: JobId,
    owner_id: OwnerId,
    status: JobStatus,
    payload: JsonValue,
    result: Option<JsonValue>,
    error: Option<String>,
    attempt_count: u32,
    dispatch_token: Option<DispatchToken>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// When the latest processing attempt began.
    started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    completed_at: Option<DateTime<Utc>>,
}

/// Raw stored representation of a job, used by store adapters to rebuild a
/// [`Job`] from a row or document.
#[derive(Debug, Clone, PartialEq)]
pub struct RawJob {
    pub id: JobId,
    pub owner_id: OwnerId,
    pub status: JobStatus,
    pub payload: JsonValue,
    pub result: Option<JsonValue>,
    pub error: Option<String>,
    pub attempt_count: u32,
    pub dispatch_token: Option<DispatchToken>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Validate a creation request and build a new `Pending` job.
    pub fn new(
        owner_id: OwnerId,
        payload: JsonValue,
        limits: &PayloadLimits,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        limits.validate(&payload)?;
        Ok(Self {
            id: JobId::new(),
            owner_id,
            status: JobStatus::Pending,
            payload,
            result: None,
            error: None,
            attempt_count: 0,
            dispatch_token: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        })
    }

    /// Rebuild a job from storage, rejecting records that break the
    /// result/error or timestamp invariants.
    pub fn rehydrate(raw: RawJob) -> DomainResult<Self> {
        if raw.result.is_some() != (raw.status == JobStatus::Completed) {
            return Err(DomainError::invalid_transition(format!(
                "job {}: result present with status {}",
                raw.id, raw.status
            )));
        }
        if raw.error.is_some() != (raw.status == JobStatus::Failed) {
            return Err(DomainError::invalid_transition(format!(
                "job {}: error present with status {}",
                raw.id, raw.status
            )));
        }
        if raw.completed_at.is_some() != raw.status.is_terminal() {
            return Err(DomainError::invalid_transition(format!(
                "job {}: completed_at present with status {}",
                raw.id, raw.status
            )));
        }
        if raw.started_at.is_none()
            && matches!(
                raw.status,
                JobStatus::Processing | JobStatus::Completed | JobStatus::Failed
            )
        {
            return Err(DomainError::invalid_transition(format!(
                "job {}: status {} without started_at",
                raw.id, raw.status
            )));
        }
        Ok(Self {
            id: raw.id,
            owner_id: raw.owner_id,
            status: raw.status,
            payload: raw.payload,
            result: raw.result,
            error: raw.error,
            attempt_count: raw.attempt_count,
            dispatch_token: raw.dispatch_token,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            started_at: raw.started_at,
            completed_at: raw.completed_at,
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    pub fn result(&self) -> Option<&JsonValue> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn dispatch_token(&self) -> Option<&DispatchToken> {
        self.dispatch_token.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Check that `mutation` may be applied to the job in its current state.
    ///
    /// Returns `false` when the stored status (or attempt count, for guarded
    /// mutations) differs from what the mutation expects.
    pub fn matches(&self, mutation: &StatusMutation) -> bool {
        self.status == mutation.expected_status()
            && mutation
                .expected_attempts()
                .is_none_or(|expected| expected == self.attempt_count)
    }

    /// Apply a mutation. Fails without changing anything when the
    /// precondition does not hold.
    pub fn apply(&mut self, mutation: &StatusMutation, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.matches(mutation) {
            return Err(DomainError::invalid_transition(format!(
                "job {} is {} (attempt {}), mutation expects {}",
                self.id,
                self.status,
                self.attempt_count,
                mutation.expected_status()
            )));
        }

        self.status = mutation.target_status();
        self.result = mutation.result().cloned();
        self.error = mutation.error().map(str::to_owned);
        self.attempt_count += mutation.attempt_increment();
        if let Some(token) = mutation.dispatch_token() {
            self.dispatch_token = Some(token.clone());
        }
        // Keep updated_at strictly advancing even under a coarse clock.
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + chrono::Duration::microseconds(1)
        };
        if mutation.stamps_started() {
            self.started_at = Some(self.updated_at);
        }
        if mutation.stamps_completed() {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }

    pub fn view(&self) -> JobView {
        JobView::from(self)
    }
}

/// Client-facing projection of a job. Never carries dispatch internals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            result: job.result.clone(),
            error: job.error.clone(),
            attempt_count: job.attempt_count,
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn owner() -> OwnerId {
        OwnerId::new("owner-1").unwrap()
    }

    fn new_job() -> Job {
        Job::new(owner(), json!({"x": 1}), &PayloadLimits::default(), Utc::now()).unwrap()
    }

    #[test]
    fn new_job_is_pending_with_no_outcome() {
        let job = new_job();
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.attempt_count(), 0);
        assert!(job.result().is_none());
        assert!(job.error().is_none());
        assert!(job.dispatch_token().is_none());
        assert_eq!(job.created_at(), job.updated_at());
    }

    #[test]
    fn new_job_rejects_empty_payload() {
        let err = Job::new(owner(), json!({}), &PayloadLimits::default(), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn transition_table_edges() {
        use JobStatus::*;
        let allowed = [
            (Pending, Queued),
            (Queued, Processing),
            (Processing, Completed),
            (Processing, Failed),
            (Processing, Queued),
        ];
        for from in JobStatus::ALL {
            for to in JobStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Queued".parse::<JobStatus>().unwrap(), JobStatus::Queued);
        assert!("cancelled".parse::<JobStatus>().is_err());
    }

    #[test]
    fn apply_rejects_mismatched_status_without_side_effects() {
        let mut job = new_job();
        let before = job.clone();
        let err = job.apply(&StatusMutation::begin_processing(), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
        assert_eq!(job, before);
    }

    #[test]
    fn apply_advances_updated_at() {
        let mut job = new_job();
        let created = job.updated_at();
        job.apply(&StatusMutation::queue(DispatchToken::new("t-1")), created)
            .unwrap();
        assert!(job.updated_at() > created);
        assert_eq!(job.dispatch_token().map(|t| t.as_str()), Some("t-1"));
    }

    #[test]
    fn rehydrate_rejects_result_on_non_completed() {
        let job = new_job();
        let raw = RawJob {
            id: job.id(),
            owner_id: job.owner_id().clone(),
            status: JobStatus::Queued,
            payload: job.payload().clone(),
            result: Some(json!({"y": 2})),
            error: None,
            attempt_count: 0,
            dispatch_token: None,
            created_at: job.created_at(),
            updated_at: job.updated_at(),
            started_at: None,
            completed_at: None,
        };
        assert!(Job::rehydrate(raw).is_err());
    }

    #[test]
    fn rehydrate_rejects_terminal_job_without_completed_at() {
        let job = new_job();
        let now = Utc::now();
        let raw = RawJob {
            id: job.id(),
            owner_id: job.owner_id().clone(),
            status: JobStatus::Failed,
            payload: job.payload().clone(),
            result: None,
            error: Some("boom".to_string()),
            attempt_count: 1,
            dispatch_token: None,
            created_at: now,
            updated_at: now,
            started_at: Some(now),
            completed_at: None,
        };
        assert!(Job::rehydrate(raw.clone()).is_err());

        let ok = RawJob {
            completed_at: Some(now),
            ..raw.clone()
        };
        assert!(Job::rehydrate(ok).is_ok());

        let never_started = RawJob {
            started_at: None,
            completed_at: Some(now),
            ..raw
        };
        assert!(Job::rehydrate(never_started).is_err());
    }

    #[test]
    fn processing_and_completion_are_timestamped() {
        let mut job = new_job();
        job.apply(&StatusMutation::queue(DispatchToken::new("t-1")), Utc::now())
            .unwrap();
        assert!(job.started_at().is_none());

        job.apply(&StatusMutation::begin_processing(), Utc::now()).unwrap();
        let started = job.started_at().unwrap();
        assert_eq!(started, job.updated_at());
        assert!(job.completed_at().is_none());

        job.apply(&StatusMutation::complete(json!({"y": 2})), Utc::now())
            .unwrap();
        assert_eq!(job.started_at(), Some(started));
        assert_eq!(job.completed_at(), Some(job.updated_at()));
        assert!(job.completed_at().unwrap() > started);

        let json = serde_json::to_value(job.view()).unwrap();
        assert!(json.get("started_at").is_some());
        assert!(json.get("completed_at").is_some());
    }

    #[test]
    fn view_omits_absent_outcome_fields() {
        let view = new_job().view();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("result").is_none());
        assert!(json.get("error").is_none());
        assert!(json.get("dispatch_token").is_none());
        assert!(json.get("started_at").is_none());
        assert!(json.get("completed_at").is_none());
    }
}
