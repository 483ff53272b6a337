//! Infrastructure layer: job storage, task dispatch, orchestration and
//! background reconciliation.

pub mod config;
pub mod dispatcher;
pub mod jobs;
pub mod workers;

pub use config::{OrchestratorConfig, SweepConfig};
pub use dispatcher::{DispatchError, TaskDispatcher};
pub use jobs::{JobOrchestrator, JobRecordStore};
