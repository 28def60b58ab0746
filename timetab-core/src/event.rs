//! Canonical timetable event types.
//!
//! `RawItem` is the loose shape the external scraper hands over; `ScheduleEvent`
//! is the normalized representation the rest of the pipeline works with. The
//! identity key computed here doubles as the calendar UID and the diff
//! comparison key, so everything user-visible participates in it and nothing
//! else does.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One raw row handed over by the external scraper.
///
/// Everything is optional at this boundary; the normalizer decides what is
/// required and rejects the rest with `MalformedItem`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawItem {
    pub date: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub title: Option<String>,
    pub room: Option<String>,
    pub teacher: Option<String>,
    pub group_info: Option<String>,
    pub pair: Option<u32>,
    pub pair_label: Option<String>,
    pub added_at: Option<String>,
    pub raw: Option<String>,
}

/// A normalized schedule occurrence for one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub group_id: String,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub title: String,
    /// Lesson kind parsed from the bracketed marker ("Лк", "Сем", ...).
    pub kind: Option<String>,
    pub room: Option<String>,
    pub teacher: Option<String>,
    pub group_info: Option<String>,
    pub pair_label: Option<String>,
    pub added_at: Option<String>,
    /// Scraper-provided debug text; excluded from identity on purpose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl ScheduleEvent {
    /// Deterministic fingerprint of the event's visible content.
    ///
    /// Missing optionals hash as empty strings, so presence/absence alone does
    /// not move the key unless the visible text changes.
    pub fn identity_key(&self) -> String {
        fn opt(v: &Option<String>) -> &str {
            v.as_deref().unwrap_or("")
        }

        let key = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            self.group_id,
            self.date.format("%Y-%m-%d"),
            self.start.format("%H:%M"),
            self.end.format("%H:%M"),
            self.title,
            opt(&self.kind),
            opt(&self.room),
            opt(&self.teacher),
        );
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    /// Sort key used wherever a deterministic ordering over events is needed.
    pub fn sort_key(&self) -> (NaiveDate, NaiveTime, String) {
        (self.date, self.start, self.identity_key())
    }

    /// Time span as shown to users, e.g. "09:00–10:30".
    pub fn time_span(&self) -> String {
        format!("{}–{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_event() -> ScheduleEvent {
        ScheduleEvent {
            group_id: "104".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 9, 8).unwrap(),
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            title: "История России".to_string(),
            kind: Some("Сем".to_string()),
            room: Some("А-301".to_string()),
            teacher: Some("Иванов И.И.".to_string()),
            group_info: None,
            pair_label: Some("1 пара".to_string()),
            added_at: None,
            raw: None,
        }
    }

    #[test]
    fn identity_is_stable_across_clones() {
        let a = sample_event();
        let b = a.clone();
        assert_eq!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn visible_field_changes_move_the_key() {
        let base = sample_event();

        let mut titled = base.clone();
        titled.title = "Философия".to_string();
        assert_ne!(base.identity_key(), titled.identity_key());

        let mut moved = base.clone();
        moved.start = NaiveTime::from_hms_opt(10, 45, 0).unwrap();
        assert_ne!(base.identity_key(), moved.identity_key());

        let mut relocated = base.clone();
        relocated.room = Some("Б-105".to_string());
        assert_ne!(base.identity_key(), relocated.identity_key());
    }

    #[test]
    fn debug_fields_do_not_move_the_key() {
        let base = sample_event();
        let mut annotated = base.clone();
        annotated.raw = Some("tooltip :: 09:00-10:30 История России".to_string());
        annotated.group_info = Some("поток 1".to_string());
        annotated.pair_label = None;
        assert_eq!(base.identity_key(), annotated.identity_key());
    }

    #[test]
    fn absent_and_empty_optionals_hash_alike() {
        let mut with_none = sample_event();
        with_none.room = None;
        let mut with_empty = sample_event();
        with_empty.room = Some(String::new());
        assert_eq!(with_none.identity_key(), with_empty.identity_key());
    }
}
