//! Job lifecycle orchestration.
//!
//! The orchestrator owns the state machine at runtime: it validates and
//! persists new jobs, hands them to the task dispatcher, and advances them in
//! response to dispatcher callbacks. It keeps no job state of its own. Every
//! decision is taken on a fresh read or through the store's conditional
//! update, so concurrent and duplicated callbacks are safe.
//!
//! ## Ordering
//!
//! - Initial dispatch enqueues first, then moves `Pending → Queued`. A
//!   failed enqueue leaves the job `Pending` for the reconciliation sweep.
//! - A retry moves `Processing → Queued` first, then enqueues. A failed
//!   enqueue leaves the job `Queued`; the sweep enqueues it again later.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use jobrelay_core::{DomainError, JobId, OwnerId};
use jobrelay_jobs::{DispatchToken, Job, JobStatus, JobView, PayloadLimits, RetryPolicy, StatusMutation};

use super::store::{JobRecordStore, JobStats, JobStoreError, Pagination};
use crate::config::OrchestratorConfig;
use crate::dispatcher::{DispatchError, TaskDispatcher};

/// Outcome reported by the dispatcher for one job.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    BeginProcessing,
    Success(JsonValue),
    Failure { error: String, retryable: bool },
}

impl CallbackOutcome {
    fn name(&self) -> &'static str {
        match self {
            CallbackOutcome::BeginProcessing => "begin_processing",
            CallbackOutcome::Success(_) => "success",
            CallbackOutcome::Failure { .. } => "failure",
        }
    }
}

/// Acknowledgement returned to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackAck {
    /// The callback advanced the job.
    Applied(JobView),
    /// The job had already moved past the state the callback expects.
    /// Nothing was changed.
    AlreadyAdvanced(JobView),
}

impl CallbackAck {
    pub fn is_applied(&self) -> bool {
        matches!(self, CallbackAck::Applied(_))
    }

    pub fn view(&self) -> &JobView {
        match self {
            CallbackAck::Applied(view) | CallbackAck::AlreadyAdvanced(view) => view,
        }
    }

    pub fn into_view(self) -> JobView {
        match self {
            CallbackAck::Applied(view) | CallbackAck::AlreadyAdvanced(view) => view,
        }
    }
}

/// Result of a dispatch attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// A task was enqueued and the job is `Queued`.
    Enqueued(JobView),
    /// The job was not in the state the dispatch expects; nothing enqueued.
    Skipped(JobView),
}

impl DispatchOutcome {
    pub fn view(&self) -> &JobView {
        match self {
            DispatchOutcome::Enqueued(view) | DispatchOutcome::Skipped(view) => view,
        }
    }
}

/// A page of an owner's jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPage {
    pub items: Vec<JobView>,
    /// Jobs matching the status filter, ignoring pagination.
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("store error: {0}")]
    Store(String),
}

impl From<DomainError> for OrchestratorError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::Conflict(msg) | DomainError::InvalidTransition(msg) => {
                Self::Conflict(msg)
            }
        }
    }
}

impl From<JobStoreError> for OrchestratorError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::NotFound(id) => Self::NotFound(id),
            JobStoreError::Conflict(id) => Self::Conflict(format!("job {id} already exists")),
            e @ JobStoreError::PreconditionFailed { .. } => Self::Conflict(e.to_string()),
            JobStoreError::Storage(msg) => Self::Store(msg),
        }
    }
}

const UNSPECIFIED_FAILURE: &str = "unspecified failure";

/// Runtime owner of the job state machine.
///
/// Generic over its two collaborators; both are passed in explicitly and
/// there is no process-wide state.
#[derive(Debug)]
pub struct JobOrchestrator<S, D> {
    store: S,
    dispatcher: D,
    retry_policy: RetryPolicy,
    payload_limits: PayloadLimits,
}

impl<S, D> JobOrchestrator<S, D>
where
    S: JobRecordStore,
    D: TaskDispatcher,
{
    pub fn new(store: S, dispatcher: D, config: OrchestratorConfig) -> Self {
        Self {
            store,
            dispatcher,
            retry_policy: config.retry_policy(),
            payload_limits: config.payload_limits(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Validate, persist and dispatch a new job.
    ///
    /// A failed enqueue is a degraded success: the job is returned `Pending`
    /// and the reconciliation sweep dispatches it later.
    pub async fn create_job(
        &self,
        owner_id: OwnerId,
        payload: JsonValue,
    ) -> Result<JobView, OrchestratorError> {
        let job = Job::new(owner_id, payload, &self.payload_limits, Utc::now())?;
        let job = self.store.insert(job).await?;
        info!(job_id = %job.id(), owner_id = %job.owner_id(), "job created");

        match self.dispatch(job.id()).await {
            Ok(outcome) => Ok(outcome.view().clone()),
            Err(OrchestratorError::Dispatch(e)) => {
                warn!(job_id = %job.id(), error = %e, "initial dispatch failed; job left pending");
                Ok(job.view())
            }
            Err(e) => Err(e),
        }
    }

    /// Hand a `Pending` job to the dispatcher and move it to `Queued`.
    ///
    /// Jobs in any other state are skipped.
    pub async fn dispatch(&self, id: JobId) -> Result<DispatchOutcome, OrchestratorError> {
        let job = self.store.get(id).await?;
        if job.status() != JobStatus::Pending {
            return Ok(DispatchOutcome::Skipped(job.view()));
        }

        let token = self.dispatcher.enqueue(id, None).await?;
        match self
            .store
            .compare_and_update_status(id, JobStatus::Pending, StatusMutation::queue(token))
            .await
        {
            Ok(job) => {
                debug!(job_id = %id, "job queued");
                Ok(DispatchOutcome::Enqueued(job.view()))
            }
            Err(JobStoreError::PreconditionFailed { actual, .. }) => {
                // Another path dispatched it first; the extra task is a
                // duplicate delivery and is absorbed by the callbacks.
                debug!(job_id = %id, status = %actual, "dispatch lost race");
                Ok(DispatchOutcome::Skipped(self.store.get(id).await?.view()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Enqueue a `Queued` job again and record the new dispatch token.
    ///
    /// Not a status transition. Jobs in any other state are skipped.
    pub async fn redispatch(&self, id: JobId) -> Result<DispatchOutcome, OrchestratorError> {
        let job = self.store.get(id).await?;
        if job.status() != JobStatus::Queued {
            return Ok(DispatchOutcome::Skipped(job.view()));
        }

        let token = self.dispatcher.enqueue(id, None).await?;
        Ok(match self.record_dispatch(id, token).await? {
            Some(job) => DispatchOutcome::Enqueued(job.view()),
            None => DispatchOutcome::Skipped(self.store.get(id).await?.view()),
        })
    }

    /// Fetch a job visible to `owner_id`.
    ///
    /// A job owned by someone else is reported as not found.
    pub async fn get_job(&self, owner_id: &OwnerId, id: JobId) -> Result<JobView, OrchestratorError> {
        let job = self.store.get(id).await?;
        if job.owner_id() != owner_id {
            return Err(OrchestratorError::NotFound(id));
        }
        Ok(job.view())
    }

    /// One page of the jobs of `owner_id`, newest first, with the number of
    /// jobs matching the filter across all pages.
    pub async fn list_jobs(
        &self,
        owner_id: &OwnerId,
        status: Option<JobStatus>,
        pagination: Pagination,
    ) -> Result<JobPage, OrchestratorError> {
        let jobs = self.store.list_by_owner(owner_id, status, pagination).await?;
        let stats = self.store.stats_by_owner(owner_id).await?;
        Ok(JobPage {
            items: jobs.iter().map(Job::view).collect(),
            total: status.map_or_else(|| stats.total(), |s| stats.count(s)),
        })
    }

    pub async fn job_stats(&self, owner_id: &OwnerId) -> Result<JobStats, OrchestratorError> {
        Ok(self.store.stats_by_owner(owner_id).await?)
    }

    /// Ids of jobs sitting in `status` since before `updated_before`.
    pub async fn stalled_jobs(
        &self,
        status: JobStatus,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobId>, OrchestratorError> {
        let jobs = self.store.list_stalled(status, updated_before, limit).await?;
        Ok(jobs.iter().map(Job::id).collect())
    }

    /// Advance a job in response to a dispatcher callback.
    ///
    /// Safe under duplicate and reordered delivery: a callback that finds the
    /// job elsewhere than it expects is acknowledged as `AlreadyAdvanced` and
    /// changes nothing.
    pub async fn handle_callback(
        &self,
        id: JobId,
        outcome: CallbackOutcome,
    ) -> Result<CallbackAck, OrchestratorError> {
        debug!(job_id = %id, outcome = outcome.name(), "callback received");

        match outcome {
            CallbackOutcome::BeginProcessing => {
                self.advance(id, StatusMutation::begin_processing()).await
            }
            CallbackOutcome::Success(result) => {
                self.advance(id, StatusMutation::complete(result)).await
            }
            CallbackOutcome::Failure { error, retryable } => {
                self.fail(id, error, retryable).await
            }
        }
    }

    async fn fail(
        &self,
        id: JobId,
        error: String,
        retryable: bool,
    ) -> Result<CallbackAck, OrchestratorError> {
        let job = self.store.get(id).await?;
        if job.status() != JobStatus::Processing {
            return Ok(CallbackAck::AlreadyAdvanced(job.view()));
        }

        let error = if error.trim().is_empty() {
            UNSPECIFIED_FAILURE.to_string()
        } else {
            error
        };
        let decision = self.retry_policy.decide(job.attempt_count(), retryable);
        let ack = self
            .advance(id, StatusMutation::fail(decision, error.as_str()))
            .await?;

        let view = match ack {
            CallbackAck::Applied(view) => view,
            already => return Ok(already),
        };

        if !decision.is_retry() {
            info!(
                job_id = %id,
                attempt_count = view.attempt_count,
                retryable,
                error = %error,
                "job failed"
            );
            return Ok(CallbackAck::Applied(view));
        }

        info!(job_id = %id, attempt_count = view.attempt_count, "job requeued for retry");
        match self.dispatcher.enqueue(id, None).await {
            Ok(token) => {
                if let Some(job) = self.record_dispatch(id, token).await? {
                    return Ok(CallbackAck::Applied(job.view()));
                }
            }
            Err(e) => {
                warn!(job_id = %id, error = %e, "retry enqueue failed; job left queued");
            }
        }
        Ok(CallbackAck::Applied(view))
    }

    /// Conditionally apply `mutation`, absorbing a lost race.
    async fn advance(
        &self,
        id: JobId,
        mutation: StatusMutation,
    ) -> Result<CallbackAck, OrchestratorError> {
        let expected = mutation.expected_status();
        let target = mutation.target_status();

        match self.store.compare_and_update_status(id, expected, mutation).await {
            Ok(job) => {
                debug!(job_id = %id, from = %expected, to = %target, "job advanced");
                Ok(CallbackAck::Applied(job.view()))
            }
            Err(JobStoreError::PreconditionFailed { actual, .. }) => {
                debug!(
                    job_id = %id,
                    expected = %expected,
                    actual = %actual,
                    "callback absorbed; job already advanced"
                );
                let job = self.store.get(id).await?;
                Ok(CallbackAck::AlreadyAdvanced(job.view()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Store a fresh dispatch token on a `Queued` job. `None` when the job
    /// has left `Queued` meanwhile.
    async fn record_dispatch(
        &self,
        id: JobId,
        token: DispatchToken,
    ) -> Result<Option<Job>, OrchestratorError> {
        match self
            .store
            .compare_and_update_status(
                id,
                JobStatus::Queued,
                StatusMutation::refresh_dispatch(token),
            )
            .await
        {
            Ok(job) => Ok(Some(job)),
            Err(JobStoreError::PreconditionFailed { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
