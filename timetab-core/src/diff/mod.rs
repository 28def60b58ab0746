//! Snapshot diffing.

mod change_set;

pub use change_set::{diff_snapshots, ChangeSet, ChangedEvent, Timing};
