//! Job record storage: contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jobrelay_core::{JobId, OwnerId};
use jobrelay_jobs::{Job, JobStatus, StatusMutation};

/// Persistence boundary for job records.
///
/// The store exclusively owns durable job state. Callers never hold an
/// authoritative copy: every decision reads fresh or goes through
/// [`JobRecordStore::compare_and_update_status`].
///
/// ## Implementation Requirements
///
/// - `insert` must reject an existing id with `Conflict`
/// - `compare_and_update_status` must check the expected status (and the
///   expected attempt count, when the mutation carries one) and apply the
///   mutation as **one atomic operation** of the backing store; never a
///   read followed by a separate write
/// - listing may be eventually consistent
#[async_trait]
pub trait JobRecordStore: Send + Sync {
    /// Persist a new job.
    async fn insert(&self, job: Job) -> Result<Job, JobStoreError>;

    /// Fetch a job by id.
    async fn get(&self, id: JobId) -> Result<Job, JobStoreError>;

    /// Atomically apply `mutation` if the stored status equals `expected`.
    ///
    /// Returns the updated record, or `PreconditionFailed` (carrying the
    /// status actually found) without applying anything.
    async fn compare_and_update_status(
        &self,
        id: JobId,
        expected: JobStatus,
        mutation: StatusMutation,
    ) -> Result<Job, JobStoreError>;

    /// Jobs of one owner, newest first.
    async fn list_by_owner(
        &self,
        owner_id: &OwnerId,
        status: Option<JobStatus>,
        pagination: Pagination,
    ) -> Result<Vec<Job>, JobStoreError>;

    /// Per-status counts for one owner.
    async fn stats_by_owner(&self, owner_id: &OwnerId) -> Result<JobStats, JobStoreError>;

    /// Jobs in `status` whose last update is older than `updated_before`,
    /// oldest first. Used by reconciliation sweeps.
    async fn list_stalled(
        &self,
        status: JobStatus,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    Conflict(JobId),
    #[error("job {id} is {actual}, expected {expected}")]
    PreconditionFailed {
        id: JobId,
        expected: JobStatus,
        actual: JobStatus,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

/// Pagination parameters for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of jobs to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 100;
    pub const MAX_LIMIT: u32 = 1000;

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).min(Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Job counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub pending: u64,
    pub queued: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl JobStats {
    pub fn record(&mut self, status: JobStatus, count: u64) {
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Queued => self.queued += count,
            JobStatus::Processing => self.processing += count,
            JobStatus::Completed => self.completed += count,
            JobStatus::Failed => self.failed += count,
        }
    }

    pub fn count(&self, status: JobStatus) -> u64 {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Queued => self.queued,
            JobStatus::Processing => self.processing,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
        }
    }

    pub fn total(&self) -> u64 {
        self.pending + self.queued + self.processing + self.completed + self.failed
    }
}

/// In-memory job store for tests/dev.
///
/// The conditional update runs entirely under one write lock, which is what
/// makes it atomic here.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn poisoned<T>(_: T) -> JobStoreError {
        JobStoreError::Storage("job map lock poisoned".to_string())
    }
}

#[async_trait]
impl JobRecordStore for InMemoryJobStore {
    async fn insert(&self, job: Job) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(Self::poisoned)?;
        if jobs.contains_key(&job.id()) {
            return Err(JobStoreError::Conflict(job.id()));
        }
        jobs.insert(job.id(), job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Job, JobStoreError> {
        let jobs = self.jobs.read().map_err(Self::poisoned)?;
        jobs.get(&id).cloned().ok_or(JobStoreError::NotFound(id))
    }

    async fn compare_and_update_status(
        &self,
        id: JobId,
        expected: JobStatus,
        mutation: StatusMutation,
    ) -> Result<Job, JobStoreError> {
        if mutation.expected_status() != expected {
            return Err(JobStoreError::Storage(format!(
                "mutation expects {} but caller expected {expected}",
                mutation.expected_status()
            )));
        }

        let mut jobs = self.jobs.write().map_err(Self::poisoned)?;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        if !job.matches(&mutation) {
            return Err(JobStoreError::PreconditionFailed {
                id,
                expected,
                actual: job.status(),
            });
        }
        job.apply(&mutation, Utc::now())
            .map_err(|e| JobStoreError::Storage(e.to_string()))?;
        Ok(job.clone())
    }

    async fn list_by_owner(
        &self,
        owner_id: &OwnerId,
        status: Option<JobStatus>,
        pagination: Pagination,
    ) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(Self::poisoned)?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| j.owner_id() == owner_id && status.is_none_or(|s| j.status() == s))
            .cloned()
            .collect();

        result.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        Ok(result
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect())
    }

    async fn stats_by_owner(&self, owner_id: &OwnerId) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs.read().map_err(Self::poisoned)?;
        let mut stats = JobStats::default();
        for job in jobs.values().filter(|j| j.owner_id() == owner_id) {
            stats.record(job.status(), 1);
        }
        Ok(stats)
    }

    async fn list_stalled(
        &self,
        status: JobStatus,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(Self::poisoned)?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| j.status() == status && j.updated_at() < updated_before)
            .cloned()
            .collect();

        result.sort_by_key(|j| j.updated_at());
        result.truncate(limit);
        Ok(result)
    }
}

#[async_trait]
impl<S> JobRecordStore for Arc<S>
where
    S: JobRecordStore + ?Sized,
{
    async fn insert(&self, job: Job) -> Result<Job, JobStoreError> {
        (**self).insert(job).await
    }

    async fn get(&self, id: JobId) -> Result<Job, JobStoreError> {
        (**self).get(id).await
    }

    async fn compare_and_update_status(
        &self,
        id: JobId,
        expected: JobStatus,
        mutation: StatusMutation,
    ) -> Result<Job, JobStoreError> {
        (**self).compare_and_update_status(id, expected, mutation).await
    }

    async fn list_by_owner(
        &self,
        owner_id: &OwnerId,
        status: Option<JobStatus>,
        pagination: Pagination,
    ) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_owner(owner_id, status, pagination).await
    }

    async fn stats_by_owner(&self, owner_id: &OwnerId) -> Result<JobStats, JobStoreError> {
        (**self).stats_by_owner(owner_id).await
    }

    async fn list_stalled(
        &self,
        status: JobStatus,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_stalled(status, updated_before, limit).await
    }
}
