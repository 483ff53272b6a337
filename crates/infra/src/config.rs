//! Tunables for the orchestrator and the reconciliation sweep.

use std::time::Duration;

use jobrelay_jobs::{PayloadLimits, RetryPolicy};

/// Orchestrator limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Processing attempts allowed before a job is forced to `Failed`.
    pub max_attempts: u32,
    /// Upper bound on the serialized size of a job payload.
    pub max_payload_bytes: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: RetryPolicy::default().max_attempts,
            max_payload_bytes: PayloadLimits::default().max_bytes,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts)
    }

    pub fn payload_limits(&self) -> PayloadLimits {
        PayloadLimits::new(self.max_payload_bytes)
    }
}

/// Reconciliation sweep thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    /// Time between passes.
    pub interval: Duration,
    /// A `Pending` job older than this is dispatched again.
    pub pending_after: Duration,
    /// A `Queued` job older than this is enqueued again.
    pub queued_after: Duration,
    /// A `Processing` job older than this is failed as timed out (retryable).
    pub processing_after: Duration,
    /// Max jobs per status handled in one pass.
    pub batch_size: usize,
    /// Name for logging
    pub name: String,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            pending_after: Duration::from_secs(5 * 60),
            queued_after: Duration::from_secs(15 * 60),
            processing_after: Duration::from_secs(30 * 60),
            batch_size: 100,
            name: "reconciliation-sweep".to_string(),
        }
    }
}

impl SweepConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_pending_after(mut self, after: Duration) -> Self {
        self.pending_after = after;
        self
    }

    pub fn with_queued_after(mut self, after: Duration) -> Self {
        self.queued_after = after;
        self
    }

    pub fn with_processing_after(mut self, after: Duration) -> Self {
        self.processing_after = after;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}
