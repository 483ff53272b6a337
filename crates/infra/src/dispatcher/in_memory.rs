use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use jobrelay_core::JobId;
use jobrelay_jobs::DispatchToken;

use super::{DispatchError, TaskDispatcher};

/// A task accepted by [`InMemoryTaskDispatcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedTask {
    pub job_id: JobId,
    pub not_before: Option<DateTime<Utc>>,
    pub token: DispatchToken,
}

/// In-process dispatcher for tests and local development.
///
/// Tasks accumulate in a FIFO queue until [`drain`](Self::drain)ed. The
/// dispatcher can be switched into a failing mode to simulate an
/// unavailable transport.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskDispatcher {
    queue: Arc<Mutex<VecDeque<DispatchedTask>>>,
    failing: Arc<AtomicBool>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryTaskDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `enqueue` calls fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Take every queued task, oldest first.
    pub fn drain(&self) -> Vec<DispatchedTask> {
        match self.queue.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskDispatcher for InMemoryTaskDispatcher {
    async fn enqueue(
        &self,
        job_id: JobId,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<DispatchToken, DispatchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::Unavailable(
                "in-memory dispatcher set to fail".to_string(),
            ));
        }

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let token = DispatchToken::new(format!("mem-{seq}"));
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| DispatchError::Unavailable("task queue lock poisoned".to_string()))?;
        queue.push_back(DispatchedTask {
            job_id,
            not_before,
            token: token.clone(),
        });
        Ok(token)
    }
}
