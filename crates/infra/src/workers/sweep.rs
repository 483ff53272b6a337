use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use jobrelay_core::JobId;
use jobrelay_jobs::JobStatus;

use crate::config::SweepConfig;
use crate::dispatcher::TaskDispatcher;
use crate::jobs::orchestrator::{CallbackOutcome, DispatchOutcome, JobOrchestrator};
use crate::jobs::store::JobRecordStore;

/// Error recorded on jobs failed by the sweep.
pub const PROCESSING_TIMEOUT_ERROR: &str = "processing timed out";

/// Shortest period the spawned sweep will tick at.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// What one sweep pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub dispatched: usize,
    pub redispatched: usize,
    pub timed_out: usize,
    pub errors: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Handle to control and join the background sweep.
#[derive(Debug)]
pub struct SweepHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Request graceful shutdown and wait for the current pass to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(j) = self.join.take() {
            if let Err(e) = j.await {
                warn!(error = %e, "sweep task ended abnormally");
            }
        }
    }
}

/// Periodic recovery of jobs stuck in a non-terminal state.
///
/// - `Pending` past `pending_after`: dispatched again
/// - `Queued` past `queued_after`: enqueued again
/// - `Processing` past `processing_after`: failed as timed out (retryable),
///   through the normal callback path
///
/// Only orchestrator operations are used, so every recovery is a
/// conditional update and races with live callbacks are harmless.
#[derive(Debug)]
pub struct ReconciliationSweep<S, D> {
    orchestrator: Arc<JobOrchestrator<S, D>>,
    config: SweepConfig,
}

impl<S, D> ReconciliationSweep<S, D>
where
    S: JobRecordStore + 'static,
    D: TaskDispatcher + 'static,
{
    pub fn new(orchestrator: Arc<JobOrchestrator<S, D>>, config: SweepConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Run one pass over all three stale states.
    pub async fn run_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for id in self.stalled(JobStatus::Pending, self.config.pending_after, &mut report).await {
            match self.orchestrator.dispatch(id).await {
                Ok(DispatchOutcome::Enqueued(_)) => report.dispatched += 1,
                Ok(DispatchOutcome::Skipped(_)) => {}
                Err(e) => {
                    warn!(job_id = %id, error = %e, "sweep dispatch failed");
                    report.errors += 1;
                }
            }
        }

        for id in self.stalled(JobStatus::Queued, self.config.queued_after, &mut report).await {
            match self.orchestrator.redispatch(id).await {
                Ok(DispatchOutcome::Enqueued(_)) => report.redispatched += 1,
                Ok(DispatchOutcome::Skipped(_)) => {}
                Err(e) => {
                    warn!(job_id = %id, error = %e, "sweep redispatch failed");
                    report.errors += 1;
                }
            }
        }

        for id in self
            .stalled(JobStatus::Processing, self.config.processing_after, &mut report)
            .await
        {
            let outcome = CallbackOutcome::Failure {
                error: PROCESSING_TIMEOUT_ERROR.to_string(),
                retryable: true,
            };
            match self.orchestrator.handle_callback(id, outcome).await {
                Ok(ack) if ack.is_applied() => report.timed_out += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(job_id = %id, error = %e, "sweep timeout failed");
                    report.errors += 1;
                }
            }
        }

        report
    }

    async fn stalled(
        &self,
        status: JobStatus,
        after: Duration,
        report: &mut SweepReport,
    ) -> Vec<JobId> {
        let cutoff = chrono::Duration::from_std(after)
            .ok()
            .and_then(|after| Utc::now().checked_sub_signed(after));
        let Some(cutoff) = cutoff else {
            warn!(status = %status, after_secs = after.as_secs(), "sweep threshold out of range");
            report.errors += 1;
            return Vec::new();
        };

        match self
            .orchestrator
            .stalled_jobs(status, cutoff, self.config.batch_size)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!(status = %status, error = %e, "sweep listing failed");
                report.errors += 1;
                Vec::new()
            }
        }
    }

    /// Spawn the sweep on the current tokio runtime.
    ///
    /// The first pass runs after one full `interval`. Intervals shorter than
    /// [`MIN_SWEEP_INTERVAL`] are raised to it.
    pub fn spawn(self) -> SweepHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let name = self.config.name.clone();
            if self.config.interval < MIN_SWEEP_INTERVAL {
                warn!(worker = %name, "sweep interval below minimum; clamping");
            }
            let period = self.config.interval.max(MIN_SWEEP_INTERVAL);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval() fires immediately; skip that tick.
            ticker.tick().await;

            info!(worker = %name, interval_ms = period.as_millis() as u64, "sweep started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.run_once().await;
                        if !report.is_empty() {
                            info!(
                                worker = %name,
                                dispatched = report.dispatched,
                                redispatched = report.redispatched,
                                timed_out = report.timed_out,
                                errors = report.errors,
                                "sweep pass finished"
                            );
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!(worker = %name, "sweep stopped");
        });

        SweepHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}
