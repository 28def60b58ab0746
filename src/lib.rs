//! Daemon wiring for timetab.
//!
//! The cycle scheduler lives here (rather than in the binary) so integration
//! tests can drive the whole pipeline in-process.

pub mod scheduler;

pub use scheduler::{CycleReport, CycleScheduler};
