//! Change-set computation between two observations of one group.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::event::ScheduleEvent;
use crate::snapshot::Snapshot;

/// Whether a changed event lies before or after the cycle timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timing {
    Past,
    Future,
}

/// One added or removed event with its future/past classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangedEvent {
    pub event: ScheduleEvent,
    pub timing: Timing,
}

/// Structured difference between two snapshots of one group.
///
/// There is no "modified" category: identity keys encode content, so an edit
/// shows up as one removal plus one addition. Display layers may pair those
/// up cosmetically; correctness never depends on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: Vec<ChangedEvent>,
    pub removed: Vec<ChangedEvent>,
    /// First observation of this group: `added` holds the whole snapshot and
    /// callers normally suppress broadcasting.
    pub baseline: bool,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn has_future_changes(&self) -> bool {
        self.added
            .iter()
            .chain(self.removed.iter())
            .any(|c| c.timing == Timing::Future)
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{}, −{}", self.added.len(), self.removed.len())
    }
}

/// Classify an event's start against `now` in the timetable's zone.
///
/// Strictly before `now` is `Past`; on or after is `Future`.
fn classify(event: &ScheduleEvent, now: DateTime<Utc>, tz: Tz) -> Timing {
    let local = event.date.and_time(event.start);
    let start_utc = match tz.from_local_datetime(&local).earliest() {
        Some(start) => start.with_timezone(&Utc),
        // Nonexistent local time (DST gap): compare as if the wall clock were UTC.
        None => Utc.from_utc_datetime(&local),
    };
    if start_utc < now {
        Timing::Past
    } else {
        Timing::Future
    }
}

/// Compare two snapshots for one group.
///
/// A missing previous snapshot marks the result as a baseline with every
/// current event in `added`. Output ordering is deterministic (date, start,
/// identity key), so equal inputs always produce an identical change-set.
pub fn diff_snapshots(
    previous: Option<&Snapshot>,
    current: &Snapshot,
    now: DateTime<Utc>,
    tz: Tz,
) -> ChangeSet {
    let changed = |event: &ScheduleEvent| ChangedEvent {
        event: event.clone(),
        timing: classify(event, now, tz),
    };

    let mut set = match previous {
        None => ChangeSet {
            added: current.events.iter().map(changed).collect(),
            removed: Vec::new(),
            baseline: true,
        },
        Some(prev) => {
            let prev_keys: HashSet<String> =
                prev.events.iter().map(|e| e.identity_key()).collect();
            let curr_keys: HashSet<String> =
                current.events.iter().map(|e| e.identity_key()).collect();

            ChangeSet {
                added: current
                    .events
                    .iter()
                    .filter(|e| !prev_keys.contains(&e.identity_key()))
                    .map(changed)
                    .collect(),
                removed: prev
                    .events
                    .iter()
                    .filter(|e| !curr_keys.contains(&e.identity_key()))
                    .map(changed)
                    .collect(),
                baseline: false,
            }
        }
    };

    let order = |c: &ChangedEvent| c.event.sort_key();
    set.added.sort_by_key(order);
    set.removed.sort_by_key(order);
    set
}
