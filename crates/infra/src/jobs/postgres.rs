//! Postgres-backed job record store.
//!
//! Jobs are stored one row per id, with `payload`/`result` as `jsonb`
//! documents. The conditional status update is a single
//! `UPDATE ... WHERE id = $1 AND status = $2 ... RETURNING` statement, so the
//! check and the write are atomic at the database level.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | JobStoreError | Scenario |
//! |------------|----------------------|---------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Insert with an id that already exists |
//! | Database (other) | Any other | `Storage` | Constraint or server errors |
//! | PoolClosed | N/A | `Storage` | Connection pool was closed |
//! | Other | N/A | `Storage` | Network errors, connection failures, etc. |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use jobrelay_core::{JobId, OwnerId};
use jobrelay_jobs::{DispatchToken, Job, JobStatus, RawJob, StatusMutation};

use super::store::{JobRecordStore, JobStats, JobStoreError, Pagination};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id UUID PRIMARY KEY,
        owner_id TEXT NOT NULL,
        status TEXT NOT NULL,
        payload JSONB NOT NULL,
        result JSONB NULL,
        error TEXT NULL,
        attempt_count INTEGER NOT NULL DEFAULT 0 CHECK (attempt_count >= 0),
        dispatch_token TEXT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        started_at TIMESTAMPTZ NULL,
        completed_at TIMESTAMPTZ NULL
    )
    "#,
    "ALTER TABLE jobs ADD COLUMN IF NOT EXISTS started_at TIMESTAMPTZ NULL",
    "ALTER TABLE jobs ADD COLUMN IF NOT EXISTS completed_at TIMESTAMPTZ NULL",
    "CREATE INDEX IF NOT EXISTS jobs_owner_created_idx ON jobs (owner_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS jobs_status_updated_idx ON jobs (status, updated_at)",
];

const JOB_COLUMNS: &str = "id, owner_id, status, payload, result, error, attempt_count, dispatch_token, created_at, updated_at, started_at, completed_at";

/// Postgres-backed job store.
///
/// Uses the SQLx connection pool, which is `Send + Sync`; the store handle is
/// cheap to clone and is passed explicitly to whoever needs it.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the `jobs` table and its indexes if missing.
    pub async fn ensure_schema(&self) -> Result<(), JobStoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    async fn current_status(&self, id: JobId) -> Result<Option<JobStatus>, JobStoreError> {
        let row = sqlx::query("SELECT status FROM jobs WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("current_status", e))?;

        row.map(|r| {
            let status: String = r
                .try_get("status")
                .map_err(|e| JobStoreError::Storage(format!("failed to read status: {e}")))?;
            parse_status(&status)
        })
        .transpose()
    }
}

#[async_trait]
impl JobRecordStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id(), owner_id = %job.owner_id()), err)]
    async fn insert(&self, job: Job) -> Result<Job, JobStoreError> {
        let sql = format!(
            "INSERT INTO jobs ({JOB_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(job.id().as_uuid())
            .bind(job.owner_id().as_str())
            .bind(job.status().as_str())
            .bind(job.payload())
            .bind(job.result())
            .bind(job.error())
            .bind(job.attempt_count() as i32)
            .bind(job.dispatch_token().map(|t| t.as_str()))
            .bind(job.created_at())
            .bind(job.updated_at())
            .bind(job.started_at())
            .bind(job.completed_at())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    JobStoreError::Conflict(job.id())
                } else {
                    map_sqlx_error("insert", e)
                }
            })?;

        row.into_job()
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn get(&self, id: JobId) -> Result<Job, JobStoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?
            .ok_or(JobStoreError::NotFound(id))?
            .into_job()
    }

    #[instrument(
        skip(self, mutation),
        fields(
            job_id = %id,
            expected = %expected,
            target = %mutation.target_status()
        )
    )]
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

        // One statement: the WHERE clause is the precondition. SET sees the
        // old row, so the stamp repeats the updated_at expression.
        let sql = format!(
            r#"
            UPDATE jobs SET
                status = $3,
                result = $4,
                error = $5,
                attempt_count = attempt_count + $6,
                dispatch_token = COALESCE($7, dispatch_token),
                updated_at = GREATEST(NOW(), updated_at + INTERVAL '1 microsecond'),
                started_at = CASE WHEN $9
                    THEN GREATEST(NOW(), updated_at + INTERVAL '1 microsecond')
                    ELSE started_at END,
                completed_at = CASE WHEN $10
                    THEN GREATEST(NOW(), updated_at + INTERVAL '1 microsecond')
                    ELSE completed_at END
            WHERE id = $1
                AND status = $2
                AND ($8::integer IS NULL OR attempt_count = $8)
            RETURNING {JOB_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id.as_uuid())
            .bind(expected.as_str())
            .bind(mutation.target_status().as_str())
            .bind(mutation.result())
            .bind(mutation.error())
            .bind(mutation.attempt_increment() as i32)
            .bind(mutation.dispatch_token().map(|t| t.as_str()))
            .bind(mutation.expected_attempts().map(|a| a as i32))
            .bind(mutation.stamps_started())
            .bind(mutation.stamps_completed())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("compare_and_update_status", e))?;

        if let Some(row) = updated {
            return row.into_job();
        }

        // Nothing matched: report why. This read is diagnostic only.
        match self.current_status(id).await? {
            Some(actual) => Err(JobStoreError::PreconditionFailed {
                id,
                expected,
                actual,
            }),
            None => Err(JobStoreError::NotFound(id)),
        }
    }

    #[instrument(skip(self), fields(owner_id = %owner_id), err)]
    async fn list_by_owner(
        &self,
        owner_id: &OwnerId,
        status: Option<JobStatus>,
        pagination: Pagination,
    ) -> Result<Vec<Job>, JobStoreError> {
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE owner_id = $1
                AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(owner_id.as_str())
            .bind(status.map(|s| s.as_str()))
            .bind(pagination.limit as i64)
            .bind(pagination.offset as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_by_owner", e))?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    #[instrument(skip(self), fields(owner_id = %owner_id), err)]
    async fn stats_by_owner(&self, owner_id: &OwnerId) -> Result<JobStats, JobStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count
            FROM jobs
            WHERE owner_id = $1
            GROUP BY status
            "#,
        )
        .bind(owner_id.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stats_by_owner", e))?;

        let mut stats = JobStats::default();
        for row in rows {
            let status: String = row
                .try_get("status")
                .map_err(|e| JobStoreError::Storage(format!("failed to read status: {e}")))?;
            let count: i64 = row
                .try_get("count")
                .map_err(|e| JobStoreError::Storage(format!("failed to read count: {e}")))?;
            stats.record(parse_status(&status)?, count.max(0) as u64);
        }
        Ok(stats)
    }

    #[instrument(skip(self), fields(status = %status), err)]
    async fn list_stalled(
        &self,
        status: JobStatus,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE status = $1 AND updated_at < $2
            ORDER BY updated_at ASC
            LIMIT $3
            "#
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(status.as_str())
            .bind(updated_before)
            .bind(limit as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_stalled", e))?;

        rows.into_iter().map(JobRow::into_job).collect()
    }
}

/// Database row representation of a job.
#[derive(Debug)]
struct JobRow {
    id: Uuid,
    owner_id: String,
    status: String,
    payload: serde_json::Value,
    result: Option<serde_json::Value>,
    error: Option<String>,
    attempt_count: i32,
    dispatch_token: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for JobRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            status: row.try_get("status")?,
            payload: row.try_get("payload")?,
            result: row.try_get("result")?,
            error: row.try_get("error")?,
            attempt_count: row.try_get("attempt_count")?,
            dispatch_token: row.try_get("dispatch_token")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

impl JobRow {
    fn into_job(self) -> Result<Job, JobStoreError> {
        let owner_id = OwnerId::new(self.owner_id)
            .map_err(|e| JobStoreError::Storage(format!("corrupt owner_id: {e}")))?;
        let attempt_count = u32::try_from(self.attempt_count).map_err(|_| {
            JobStoreError::Storage(format!("corrupt attempt_count: {}", self.attempt_count))
        })?;

        Job::rehydrate(RawJob {
            id: JobId::from_uuid(self.id),
            owner_id,
            status: parse_status(&self.status)?,
            payload: self.payload,
            result: self.result,
            error: self.error,
            attempt_count,
            dispatch_token: self.dispatch_token.map(DispatchToken::new),
            created_at: self.created_at,
            updated_at: self.updated_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
        .map_err(|e| JobStoreError::Storage(format!("corrupt job row: {e}")))
    }
}

fn parse_status(s: &str) -> Result<JobStatus, JobStoreError> {
    s.parse()
        .map_err(|_| JobStoreError::Storage(format!("unknown status in store: {s}")))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

/// Map SQLx errors to JobStoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            JobStoreError::Storage(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            JobStoreError::Storage(format!("connection pool closed in {operation}"))
        }
        _ => JobStoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}
