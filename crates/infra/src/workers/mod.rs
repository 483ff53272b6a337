//! Background workers.

pub mod sweep;

pub use sweep::{ReconciliationSweep, SweepHandle, SweepReport};
