//! Redis Streams-backed task dispatcher.
//!
//! Each task is one `XADD` entry on the task stream with the fields
//! `job_id`, `callback_url` and `not_before` (RFC 3339, empty when the task
//! may run immediately). Workers consume the stream through their own
//! consumer groups; the stream entry id is returned as the dispatch token.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use redis::aio::MultiplexedConnection;
use tokio::sync::OnceCell;
use tracing::{instrument, warn};

use jobrelay_core::JobId;
use jobrelay_jobs::DispatchToken;

use super::{DispatchError, TaskDispatcher};

/// Default stream key for tasks.
pub const DEFAULT_TASK_STREAM_KEY: &str = "jobrelay:tasks";

#[derive(Clone)]
pub struct RedisTaskDispatcher {
    client: Arc<redis::Client>,
    connection: Arc<OnceCell<MultiplexedConnection>>,
    stream_key: String,
    callback_base_url: String,
}

impl std::fmt::Debug for RedisTaskDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTaskDispatcher")
            .field("stream_key", &self.stream_key)
            .field("callback_base_url", &self.callback_base_url)
            .finish_non_exhaustive()
    }
}

impl RedisTaskDispatcher {
    /// Create a dispatcher. No connection is made until the first enqueue.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `stream_key` - task stream key (default: "jobrelay:tasks")
    /// * `callback_base_url` - base URL workers report outcomes to
    pub fn new(
        redis_url: impl AsRef<str>,
        stream_key: Option<String>,
        callback_base_url: impl Into<String>,
    ) -> Result<Self, DispatchError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| DispatchError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            connection: Arc::new(OnceCell::new()),
            stream_key: stream_key.unwrap_or_else(|| DEFAULT_TASK_STREAM_KEY.to_string()),
            callback_base_url: callback_base_url.into(),
        })
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    async fn connection(&self) -> Result<MultiplexedConnection, DispatchError> {
        self.connection
            .get_or_try_init(|| async {
                self.client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(|e| DispatchError::Connection(e.to_string()))
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl TaskDispatcher for RedisTaskDispatcher {
    #[instrument(skip(self), fields(stream_key = %self.stream_key, job_id = %job_id), err)]
    async fn enqueue(
        &self,
        job_id: JobId,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<DispatchToken, DispatchError> {
        let mut conn = self.connection().await?;
        let callback_url = callback_url(&self.callback_base_url, job_id);
        let not_before = not_before
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default();

        let entry_id: String = redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("*")
            .arg("job_id")
            .arg(job_id.to_string())
            .arg("callback_url")
            .arg(&callback_url)
            .arg("not_before")
            .arg(&not_before)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(error = %e, "XADD failed");
                DispatchError::Command(e.to_string())
            })?;

        Ok(DispatchToken::new(entry_id))
    }
}

fn callback_url(base: &str, job_id: JobId) -> String {
    format!("{}/internal/jobs/{job_id}/callback", base.trim_end_matches('/'))
}
