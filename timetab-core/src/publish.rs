//! Feed publication: calendar documents, per-group metadata, and the group
//! index.
//!
//! Everything here writes through a temp file + rename, so the HTTP server can
//! read concurrently without ever seeing a torn document.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{TimetabError, TimetabResult};
use crate::ics::build_calendar;
use crate::snapshot::Snapshot;

pub const CALENDAR_FILE: &str = "calendar.ics";
pub const META_FILE: &str = "meta.json";
pub const INDEX_FILE: &str = "groups.json";

/// Per-group metadata consumed by the landing page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMeta {
    pub id: String,
    pub name: String,
    pub last_updated: DateTime<Utc>,
    pub event_count: usize,
}

/// The storage-root index of known groups (id → display name).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupIndex {
    pub groups: Vec<GroupIndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupIndexEntry {
    pub id: String,
    pub name: String,
}

#[derive(Debug)]
pub struct PublishOutcome {
    pub event_count: usize,
    /// Whether the written bytes differ from the previously published feed.
    pub changed: bool,
}

/// Writes calendar documents and metadata under the storage root.
pub struct FeedPublisher {
    root: PathBuf,
    tz: Tz,
}

impl FeedPublisher {
    pub fn new(root: impl Into<PathBuf>, tz: Tz) -> FeedPublisher {
        FeedPublisher {
            root: root.into(),
            tz,
        }
    }

    pub fn calendar_path(&self, group_id: &str) -> PathBuf {
        self.root.join(group_id).join(CALENDAR_FILE)
    }

    /// Render and publish one group's feed plus its metadata.
    pub fn publish(
        &self,
        snapshot: &Snapshot,
        display_name: &str,
    ) -> TimetabResult<PublishOutcome> {
        let data = build_calendar(snapshot, self.tz)?;

        let dir = self.root.join(&snapshot.group_id);
        std::fs::create_dir_all(&dir).map_err(publish_err)?;

        let path = dir.join(CALENDAR_FILE);
        let previous = std::fs::read(&path).unwrap_or_default();
        let changed = previous != data.as_bytes();

        atomic_write(&path, data.as_bytes())?;

        let meta = GroupMeta {
            id: snapshot.group_id.clone(),
            name: display_name.to_string(),
            last_updated: snapshot.captured_at,
            event_count: snapshot.events.len(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| TimetabError::Serialization(e.to_string()))?;
        atomic_write(&dir.join(META_FILE), meta_json.as_bytes())?;

        Ok(PublishOutcome {
            event_count: snapshot.events.len(),
            changed,
        })
    }

    /// Rewrite groups.json with the configured id → display-name mapping.
    pub fn write_index(&self, groups: &[(String, String)]) -> TimetabResult<()> {
        std::fs::create_dir_all(&self.root).map_err(publish_err)?;
        let index = GroupIndex {
            groups: groups
                .iter()
                .map(|(id, name)| GroupIndexEntry {
                    id: id.clone(),
                    name: name.clone(),
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&index)
            .map_err(|e| TimetabError::Serialization(e.to_string()))?;
        atomic_write(&self.root.join(INDEX_FILE), json.as_bytes())
    }
}

fn publish_err(e: std::io::Error) -> TimetabError {
    TimetabError::Publish(e.to_string())
}

fn atomic_write(path: &Path, data: &[u8]) -> TimetabResult<()> {
    let tmp = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => path.with_file_name(format!("{name}.tmp")),
        None => {
            return Err(TimetabError::Publish(format!(
                "bad publish path: {}",
                path.display()
            )))
        }
    };
    std::fs::write(&tmp, data).map_err(publish_err)?;
    std::fs::rename(&tmp, path).map_err(publish_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ScheduleEvent;
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use chrono_tz::Europe::Moscow;

    fn event(title: &str, room: &str) -> ScheduleEvent {
        ScheduleEvent {
            group_id: "104".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 9, 8).unwrap(),
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            title: title.to_string(),
            kind: None,
            room: Some(room.to_string()),
            teacher: None,
            group_info: None,
            pair_label: None,
            added_at: None,
            raw: None,
        }
    }

    fn snapshot(events: Vec<ScheduleEvent>) -> Snapshot {
        Snapshot::new(
            "104",
            events,
            Utc.with_ymd_and_hms(2025, 9, 8, 6, 0, 0).unwrap(),
        )
    }

    #[test]
    fn publishes_feed_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = FeedPublisher::new(dir.path(), Moscow);

        let outcome = publisher
            .publish(&snapshot(vec![event("Философия", "А-301")]), "104б")
            .unwrap();
        assert_eq!(outcome.event_count, 1);
        assert!(outcome.changed);

        let ics = std::fs::read_to_string(publisher.calendar_path("104")).unwrap();
        assert!(ics.contains("BEGIN:VEVENT"));

        let meta: GroupMeta = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("104").join(META_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(meta.id, "104");
        assert_eq!(meta.name, "104б");
        assert_eq!(meta.event_count, 1);
    }

    #[test]
    fn republishing_the_same_snapshot_is_not_a_change() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = FeedPublisher::new(dir.path(), Moscow);
        let snap = snapshot(vec![event("Философия", "А-301")]);

        assert!(publisher.publish(&snap, "104").unwrap().changed);
        assert!(!publisher.publish(&snap, "104").unwrap().changed);

        let edited = snapshot(vec![event("Философия", "Б-105")]);
        assert!(publisher.publish(&edited, "104").unwrap().changed);
    }

    #[test]
    fn index_lists_groups_in_configured_order() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = FeedPublisher::new(dir.path(), Moscow);
        publisher
            .write_index(&[
                ("104".to_string(), "104б".to_string()),
                ("205".to_string(), "205а".to_string()),
            ])
            .unwrap();

        let index: GroupIndex = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(INDEX_FILE)).unwrap(),
        )
        .unwrap();
        let ids: Vec<&str> = index.groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["104", "205"]);
    }

    #[test]
    fn no_temp_files_survive_a_publish() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = FeedPublisher::new(dir.path(), Moscow);
        publisher
            .publish(&snapshot(vec![event("Физика", "А-1")]), "104")
            .unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("104"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
