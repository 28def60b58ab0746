//! Human-readable change summaries.
//!
//! Formatting is deterministic for a given change-set, which is what makes
//! at-least-once delivery tolerable: a re-sent notification is identical to
//! the first one.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveTime};

use timetab_core::diff::{ChangeSet, ChangedEvent, Timing};
use timetab_core::event::ScheduleEvent;
use timetab_core::normalize::{is_language_block, language_segments};

const RU_MONTHS: [&str; 12] = [
    "января",
    "февраля",
    "марта",
    "апреля",
    "мая",
    "июня",
    "июля",
    "августа",
    "сентября",
    "октября",
    "ноября",
    "декабря",
];

const RU_WEEKDAYS_SHORT: [&str; 7] = ["Пн", "Вт", "Ср", "Чт", "Пт", "Сб", "Вс"];

pub fn format_ru_date(date: NaiveDate) -> String {
    format!("{} {}", date.day(), RU_MONTHS[date.month0() as usize])
}

fn weekday_short_ru(date: NaiveDate) -> &'static str {
    RU_WEEKDAYS_SHORT[date.weekday().num_days_from_monday() as usize]
}

/// Which changes go into the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    FutureOnly,
}

/// One-line rendering of an event inside a day section.
fn event_line(event: &ScheduleEvent) -> String {
    let mut line = format!("{} {}", event.time_span(), event.title);
    if let Some(ref kind) = event.kind {
        line.push_str(&format!(" [{kind}]"));
    }
    // Merged language titles already carry their room lists.
    if !is_language_block(&event.title) {
        if let Some(ref room) = event.room {
            line.push_str(&format!(" ({room})"));
        }
    }
    if let Some(ref teacher) = event.teacher {
        line.push_str(&format!(" — {teacher}"));
    }
    line
}

/// Title canonicalized for the cosmetic removed+added pairing: kind is
/// already split off, whitespace collapses, and language segments sort so
/// that reordering alone never reads as a change.
fn normalized_title(title: &str) -> String {
    if is_language_block(title) {
        let mut segments: Vec<String> = language_segments(title)
            .into_iter()
            .map(|(lang, mut rooms)| {
                for room in &mut rooms {
                    *room = room.to_lowercase();
                }
                rooms.sort();
                if rooms.is_empty() {
                    lang.to_lowercase()
                } else {
                    format!("{} {}", lang.to_lowercase(), rooms.join(", "))
                }
            })
            .collect();
        segments.sort();
        segments.join("; ")
    } else {
        title
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// Render a change-set as the broadcast message body.
///
/// Entries are grouped by day. A removed and an added event sharing the same
/// slot and normalized title collapse into one ✏️ line; that pairing is
/// display sugar only, the underlying change-set still carries them as a
/// removal plus an addition. `limit` caps the entries per day section.
pub fn format_change_set(change_set: &ChangeSet, scope: Scope, limit: usize) -> String {
    let keep = |c: &&ChangedEvent| scope == Scope::All || c.timing == Timing::Future;
    let added: Vec<&ScheduleEvent> = change_set.added.iter().filter(keep).map(|c| &c.event).collect();
    let removed: Vec<&ScheduleEvent> = change_set
        .removed
        .iter()
        .filter(keep)
        .map(|c| &c.event)
        .collect();

    let slot_key = |e: &ScheduleEvent| {
        format!(
            "{}|{}|{}",
            e.date,
            e.time_span(),
            normalized_title(&e.title)
        )
    };

    let mut used = vec![false; added.len()];
    let mut modified: Vec<(&ScheduleEvent, &ScheduleEvent)> = Vec::new();
    let mut plain_removed: Vec<&ScheduleEvent> = Vec::new();
    for old in &removed {
        let slot = slot_key(old);
        match (0..added.len()).find(|&i| !used[i] && slot_key(added[i]) == slot) {
            Some(i) => {
                used[i] = true;
                modified.push((*old, added[i]));
            }
            None => plain_removed.push(*old),
        }
    }
    let plain_added: Vec<&ScheduleEvent> = added
        .iter()
        .enumerate()
        .filter(|(i, _)| !used[*i])
        .map(|(_, e)| *e)
        .collect();

    let mut by_day: BTreeMap<NaiveDate, Vec<(NaiveTime, u8, String)>> = BTreeMap::new();
    for event in &plain_added {
        by_day
            .entry(event.date)
            .or_default()
            .push((event.start, 0, format!("➕ {}", event_line(event))));
    }
    for event in &plain_removed {
        by_day
            .entry(event.date)
            .or_default()
            .push((event.start, 1, format!("➖ {}", event_line(event))));
    }
    for (old, new) in &modified {
        by_day.entry(old.date).or_default().push((
            old.start,
            2,
            format!("✏️ {} → {}", event_line(old), event_line(new)),
        ));
    }

    let mut lines = vec![format!(
        "Обновление расписания: +{}, −{}, ✏️ {}",
        plain_added.len(),
        plain_removed.len(),
        modified.len()
    )];
    for (day, mut entries) in by_day {
        entries.sort();
        lines.push(String::new());
        lines.push(format!("📌 {} ({})", format_ru_date(day), weekday_short_ru(day)));
        let total = entries.len();
        for (_, _, text) in entries.into_iter().take(limit) {
            lines.push(text);
        }
        if total > limit {
            lines.push(format!("… и ещё {}", total - limit));
        }
    }
    lines.join("\n")
}
