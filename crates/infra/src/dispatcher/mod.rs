//! Task dispatch: hand a job id to the external worker fleet.
//!
//! Dispatch is at-least-once. A job id may reach workers more than once;
//! the orchestrator's conditional updates make duplicate work harmless.

mod in_memory;
#[cfg(feature = "redis")]
mod redis_streams;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use jobrelay_core::JobId;
use jobrelay_jobs::DispatchToken;

pub use in_memory::{DispatchedTask, InMemoryTaskDispatcher};
#[cfg(feature = "redis")]
pub use redis_streams::{RedisTaskDispatcher, DEFAULT_TASK_STREAM_KEY};

/// Boundary to the durable task transport.
///
/// `enqueue` returns only after the transport has durably accepted the
/// task. The returned token identifies the enqueued entry.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn enqueue(
        &self,
        job_id: JobId,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<DispatchToken, DispatchError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatcher connection error: {0}")]
    Connection(String),

    #[error("dispatcher command error: {0}")]
    Command(String),

    #[error("dispatcher unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
impl<D> TaskDispatcher for Arc<D>
where
    D: TaskDispatcher + ?Sized,
{
    async fn enqueue(
        &self,
        job_id: JobId,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<DispatchToken, DispatchError> {
        (**self).enqueue(job_id, not_before).await
    }
}
