//! Raw item normalization.
//!
//! Turns scraper rows into `ScheduleEvent`s and merges parallel language-track
//! lessons into one event per timeslot. Normalization is pure: bad rows come
//! back as `MalformedItem` and never touch pipeline state.

use chrono::{NaiveDate, NaiveTime};

use crate::error::{TimetabError, TimetabResult};
use crate::event::{RawItem, ScheduleEvent};

fn required<'a>(field: &str, value: &'a Option<String>) -> TimetabResult<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(TimetabError::MalformedItem(format!(
            "missing field '{field}'"
        ))),
    }
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_date(s: &str) -> TimetabResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| TimetabError::MalformedItem(format!("bad date '{s}': {e}")))
}

fn parse_time(field: &str, s: &str) -> TimetabResult<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|e| TimetabError::MalformedItem(format!("bad {field} '{s}': {e}")))
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split "История России [Сем]" into ("История России", Some("Сем")).
fn split_kind(title: &str) -> (String, Option<String>) {
    if let (Some(open), Some(close)) = (title.find('['), title.rfind(']')) {
        if open < close {
            let kind = title[open + 1..close].trim();
            let core = collapse_ws(&format!("{} {}", &title[..open], &title[close + 1..]));
            if kind.is_empty() {
                return (core, None);
            }
            return (core, Some(kind.to_string()));
        }
    }
    (collapse_ws(title), None)
}

/// Normalize one scraper row into a canonical event.
///
/// `date`, `start`, `end` and `title` are required; everything else is trimmed
/// and mapped to `None` when empty so that presence/absence of an optional
/// never shifts identity on its own.
pub fn normalize_item(group_id: &str, item: &RawItem) -> TimetabResult<ScheduleEvent> {
    let date = parse_date(required("date", &item.date)?)?;
    let start = parse_time("start", required("start", &item.start)?)?;
    let end = parse_time("end", required("end", &item.end)?)?;
    let (title, kind) = split_kind(required("title", &item.title)?);

    // The site labels slots "N пара"; fall back to the bare pair number.
    let pair_label =
        optional(&item.pair_label).or_else(|| item.pair.map(|n| format!("{n} пара")));

    Ok(ScheduleEvent {
        group_id: group_id.to_string(),
        date,
        start,
        end,
        title,
        kind,
        room: optional(&item.room),
        teacher: optional(&item.teacher),
        group_info: optional(&item.group_info),
        pair_label,
        added_at: optional(&item.added_at),
        raw: optional(&item.raw),
    })
}

/// Base language name for titles like "Английский язык", if any.
///
/// Merged titles ("Английский 203; Немецкий 105") deliberately do not match,
/// which is what makes the merge idempotent.
fn language_base(title: &str) -> Option<&str> {
    let mut tokens = title.split_whitespace();
    let first = tokens.next()?;
    let second = tokens.next()?;
    let starts_upper = first.chars().next().is_some_and(char::is_uppercase);
    if starts_upper && second.to_lowercase().starts_with("язык") {
        Some(first)
    } else {
        None
    }
}

/// Parse a merged language title back into (language, rooms) segments.
///
/// Returns one segment per "; "-separated part; an empty vec for titles that
/// do not look like a merged slot at all.
pub fn language_segments(title: &str) -> Vec<(String, Vec<String>)> {
    title
        .split(';')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            let mut tokens = part.splitn(2, char::is_whitespace);
            let lang = tokens.next()?.to_string();
            let rooms = tokens
                .next()
                .map(|rest| {
                    rest.split(',')
                        .map(|r| r.trim().to_string())
                        .filter(|r| !r.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            Some((lang, rooms))
        })
        .collect()
}

/// A merged language slot renders differently from a regular lesson.
pub fn is_language_block(title: &str) -> bool {
    language_segments(title).len() >= 2
}

/// Flag emoji for known language names.
pub fn language_flag(lang: &str) -> Option<&'static str> {
    match lang {
        "Английский" => Some("🇬🇧"),
        "Немецкий" => Some("🇩🇪"),
        "Французский" => Some("🇫🇷"),
        "Испанский" => Some("🇪🇸"),
        "Итальянский" => Some("🇮🇹"),
        "Китайский" => Some("🇨🇳"),
        "Японский" => Some("🇯🇵"),
        _ => None,
    }
}

/// "- 🇬🇧 Английский: 203, 204" bullet for one language segment.
pub fn language_bullet(lang: &str, rooms: &[String]) -> String {
    let label = match language_flag(lang) {
        Some(flag) => format!("{flag} {lang}"),
        None => lang.to_string(),
    };
    if rooms.is_empty() {
        format!("- {label}")
    } else {
        format!("- {label}: {}", rooms.join(", "))
    }
}

struct LanguageSlot {
    group_id: String,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    /// Languages in order of first occurrence, each with its rooms in order of
    /// first occurrence.
    langs: Vec<(String, Vec<String>)>,
    pair_label: Option<String>,
    added_at: Option<String>,
    sources: Vec<String>,
}

/// Merge parallel language-track lessons occupying the same timeslot into one
/// event whose title lists each language with its rooms.
///
/// Re-running the merge over its own output is a no-op.
pub fn merge_language_lessons(events: Vec<ScheduleEvent>) -> Vec<ScheduleEvent> {
    let mut out: Vec<ScheduleEvent> = Vec::with_capacity(events.len());
    let mut slots: Vec<LanguageSlot> = Vec::new();

    for ev in events {
        let Some(base) = language_base(&ev.title).map(str::to_string) else {
            out.push(ev);
            continue;
        };

        let idx = match slots.iter().position(|s| {
            s.group_id == ev.group_id && s.date == ev.date && s.start == ev.start && s.end == ev.end
        }) {
            Some(idx) => idx,
            None => {
                slots.push(LanguageSlot {
                    group_id: ev.group_id.clone(),
                    date: ev.date,
                    start: ev.start,
                    end: ev.end,
                    langs: Vec::new(),
                    pair_label: None,
                    added_at: None,
                    sources: Vec::new(),
                });
                slots.len() - 1
            }
        };
        let slot = &mut slots[idx];

        let room = ev.room.as_deref().map(str::trim).filter(|r| !r.is_empty());
        match slot.langs.iter_mut().find(|(lang, _)| *lang == base) {
            Some((_, rooms)) => {
                if let Some(room) = room {
                    if !rooms.iter().any(|r| r == room) {
                        rooms.push(room.to_string());
                    }
                }
            }
            None => {
                let rooms = room.map(|r| vec![r.to_string()]).unwrap_or_default();
                slot.langs.push((base, rooms));
            }
        }

        if slot.pair_label.is_none() {
            slot.pair_label = ev.pair_label.clone();
        }
        if slot.added_at.is_none() {
            slot.added_at = ev.added_at.clone();
        }
        slot.sources.push(match &ev.room {
            Some(room) => format!("{} ({room})", ev.title),
            None => ev.title.clone(),
        });
    }

    for slot in slots {
        let mut parts: Vec<String> = Vec::new();
        let mut all_rooms: Vec<String> = Vec::new();
        for (lang, rooms) in &slot.langs {
            if rooms.is_empty() {
                parts.push(lang.clone());
            } else {
                parts.push(format!("{lang} {}", rooms.join(", ")));
            }
            for room in rooms {
                if !all_rooms.contains(room) {
                    all_rooms.push(room.clone());
                }
            }
        }
        let title = if parts.is_empty() {
            "Иностранные языки".to_string()
        } else {
            parts.join("; ")
        };

        out.push(ScheduleEvent {
            group_id: slot.group_id,
            date: slot.date,
            start: slot.start,
            end: slot.end,
            title,
            kind: None,
            room: if all_rooms.is_empty() {
                None
            } else {
                Some(all_rooms.join(", "))
            },
            teacher: None,
            group_info: None,
            pair_label: slot.pair_label,
            added_at: slot.added_at,
            raw: Some(format!(
                "объединено из языковых занятий: {}",
                slot.sources.join("; ")
            )),
        });
    }

    out
}
