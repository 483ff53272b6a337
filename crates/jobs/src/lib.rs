//! Job lifecycle domain module.
//!
//! This crate contains the job state machine, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage). Adapters in
//! `jobrelay-infra` persist what this crate decides.

pub mod job;
pub mod lifecycle;
pub mod payload;
pub mod retry;

pub use job::{DispatchToken, Job, JobStatus, JobView, RawJob};
pub use lifecycle::StatusMutation;
pub use payload::PayloadLimits;
pub use retry::{RetryDecision, RetryPolicy};
