//! Job lifecycle runtime: persistence adapters and the orchestrator.
//!
//! ## Components
//!
//! - `JobRecordStore`: persistence contract with a status-conditioned update
//! - `InMemoryJobStore` / `PostgresJobStore`: store adapters
//! - `JobOrchestrator`: drives jobs through the state machine, from creation
//!   through dispatch to the dispatcher's callbacks

pub mod orchestrator;
pub mod postgres;
pub mod store;

pub use orchestrator::{
    CallbackAck, CallbackOutcome, DispatchOutcome, JobOrchestrator, JobPage, OrchestratorError,
};
pub use postgres::PostgresJobStore;
pub use store::{InMemoryJobStore, JobRecordStore, JobStats, JobStoreError, Pagination};
