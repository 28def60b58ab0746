//! Snapshot persistence for group schedules.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{TimetabError, TimetabResult};
use crate::event::ScheduleEvent;

const SNAPSHOT_FILE: &str = "last_schedule.json";

/// The complete set of schedule events for one group at one observation time.
///
/// Immutable once written: a new cycle produces a new snapshot, never edits a
/// stored one in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub group_id: String,
    pub captured_at: DateTime<Utc>,
    pub events: Vec<ScheduleEvent>,
}

impl Snapshot {
    /// Build a snapshot, dropping duplicate identity keys (first occurrence
    /// wins) so the per-snapshot uniqueness invariant always holds.
    pub fn new(
        group_id: impl Into<String>,
        events: Vec<ScheduleEvent>,
        captured_at: DateTime<Utc>,
    ) -> Snapshot {
        let group_id = group_id.into();
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(events.len());
        for event in events {
            if seen.insert(event.identity_key()) {
                unique.push(event);
            } else {
                warn!(
                    group = %group_id,
                    date = %event.date,
                    title = %event.title,
                    "dropping duplicate event in snapshot"
                );
            }
        }
        Snapshot {
            group_id,
            captured_at,
            events: unique,
        }
    }
}

/// Durable per-group storage of the last published snapshot.
///
/// One JSON file per group, replaced wholesale on save. Writes go through a
/// temp file + rename so a concurrent reader never observes a partial
/// snapshot, and a crash between diff and save simply re-diffs against the
/// old baseline on the next cycle.
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> SnapshotStore {
        SnapshotStore { root: root.into() }
    }

    fn path(&self, group_id: &str) -> PathBuf {
        self.root.join(group_id).join(SNAPSHOT_FILE)
    }

    /// Last successfully saved snapshot, or `None` on first run.
    ///
    /// An unparsable file also loads as `None` (with a warning) so one bad
    /// write cannot wedge a group forever; the next cycle rebuilds the
    /// baseline.
    pub fn load(&self, group_id: &str) -> TimetabResult<Option<Snapshot>> {
        let path = self.path(group_id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        match serde_json::from_str(&contents) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!(
                    group = group_id,
                    path = %path.display(),
                    error = %e,
                    "unparsable snapshot; treating as first run"
                );
                Ok(None)
            }
        }
    }

    pub fn save(&self, snapshot: &Snapshot) -> TimetabResult<()> {
        let dir = self.root.join(&snapshot.group_id);
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(SNAPSHOT_FILE);
        let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));

        let contents = serde_json::to_string_pretty(snapshot)
            .map_err(|e| TimetabError::Serialization(e.to_string()))?;

        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}
