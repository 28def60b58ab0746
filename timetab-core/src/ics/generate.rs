//! ICS document generation.

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use icalendar::{Calendar, Component, EventLike, Property};

use crate::error::TimetabResult;
use crate::event::ScheduleEvent;
use crate::normalize::{is_language_block, language_bullet, language_segments};
use crate::snapshot::Snapshot;

const PRODID: &str = "-//timetab//ru//";

/// Summary shown to calendar clients for a merged language slot.
const LANGUAGE_SUMMARY: &str = "🇬🇧🇩🇪🇫🇷 Иностранный язык";

/// Render a snapshot into a VCALENDAR document.
///
/// Rendering the same snapshot twice yields byte-identical output: events are
/// sorted, property order is fixed, and DTSTAMP comes from `captured_at`
/// rather than the wall clock.
pub fn build_calendar(snapshot: &Snapshot, tz: Tz) -> TimetabResult<String> {
    let mut events: Vec<&ScheduleEvent> = snapshot.events.iter().collect();
    events.sort_by_key(|e| e.sort_key());

    let dtstamp = snapshot.captured_at.format("%Y%m%dT%H%M%SZ").to_string();

    let mut cal = Calendar::new();
    for event in events {
        let mut ics_event = icalendar::Event::new();
        ics_event.uid(&event.identity_key());
        ics_event.summary(&summary_line(event));
        ics_event.add_property("DTSTAMP", &dtstamp);

        add_local_datetime(&mut ics_event, "DTSTART", event.date, event.start, tz);
        add_local_datetime(&mut ics_event, "DTEND", event.date, event.end, tz);

        if let Some(ref room) = event.room {
            ics_event.location(room);
        }

        let description = description_lines(event).join("\n");
        if !description.is_empty() {
            ics_event.description(&description);
        }

        ics_event.add_property("STATUS", "CONFIRMED");
        ics_event.add_property("TRANSP", "OPAQUE");

        cal.push(ics_event.done());
    }
    let cal = cal.done();

    Ok(normalize_output(&cal.to_string()))
}

/// ICS SUMMARY label: title plus kind marker; merged language slots get a
/// constant label instead of the concatenated room list.
fn summary_line(event: &ScheduleEvent) -> String {
    if is_language_block(&event.title) {
        return LANGUAGE_SUMMARY.to_string();
    }
    match &event.kind {
        Some(kind) => format!("{} [{kind}]", event.title),
        None => event.title.clone(),
    }
}

/// Plain-text description lines, mirroring the notification formatting.
fn description_lines(event: &ScheduleEvent) -> Vec<String> {
    let mut out = Vec::new();

    let label = event.pair_label.as_deref().unwrap_or("Пара");
    out.push(format!("- ⏰ {label} ({})", event.time_span()));

    if is_language_block(&event.title) {
        for (lang, rooms) in language_segments(&event.title) {
            out.push(language_bullet(&lang, &rooms));
        }
        if let Some(ref teacher) = event.teacher {
            out.push(format!("- 🧑‍🏫 Преподаватель: {teacher}"));
        }
        return out;
    }

    out.push(match &event.kind {
        Some(kind) => format!("- 📚 {} [{kind}]", event.title),
        None => format!("- 📚 {}", event.title),
    });
    if let Some(ref room) = event.room {
        out.push(format!("- 📍 Аудитория: {room}"));
    }
    if let Some(ref teacher) = event.teacher {
        out.push(format!("- 🧑‍🏫 Преподаватель: {teacher}"));
    }
    if let Some(ref info) = event.group_info {
        out.push(format!("- 👥 {info}"));
    }
    if let Some(ref added) = event.added_at {
        out.push(format!("- Добавлено: {added}"));
    }
    if let Some(ref raw) = event.raw {
        out.push(format!("- ℹ️ {raw}"));
    }
    out
}

/// Add a local wall-clock datetime property with a TZID parameter.
fn add_local_datetime(
    ics_event: &mut icalendar::Event,
    name: &str,
    date: NaiveDate,
    time: NaiveTime,
    tz: Tz,
) {
    let mut prop = Property::new(
        name,
        date.and_time(time).format("%Y%m%dT%H%M%S").to_string(),
    );
    prop.add_parameter("TZID", tz.name());
    ics_event.append_property(prop);
}

/// Clean up the icalendar crate's output: fixed PRODID, no CALSCALE line.
fn normalize_output(ics: &str) -> String {
    let mut result = String::with_capacity(ics.len());
    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:");
            result.push_str(PRODID);
            result.push_str("\r\n");
            continue;
        }
        if line == "CALSCALE:GREGORIAN" {
            continue;
        }
        result.push_str(line);
        result.push_str("\r\n");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, TimeZone, Utc};
    use chrono_tz::Europe::Moscow;
    use icalendar::parser::{read_calendar, unfold};

    fn event(title: &str, room: Option<&str>) -> ScheduleEvent {
        ScheduleEvent {
            group_id: "104".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 9, 8).unwrap(),
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            title: title.to_string(),
            kind: Some("Сем".to_string()),
            room: room.map(str::to_string),
            teacher: Some("Иванов И.И.".to_string()),
            group_info: None,
            pair_label: Some("1 пара".to_string()),
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
    fn renders_one_vevent_per_item() {
        let snap = snapshot(vec![
            event("История России", Some("А-301")),
            event("Философия", None),
        ]);
        let ics = build_calendar(&snap, Moscow).unwrap();

        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
        assert!(ics.contains("PRODID:-//timetab//ru//"));
        assert!(!ics.contains("CALSCALE"));
        assert!(ics.contains("DTSTART;TZID=Europe/Moscow:20250908T090000"));
        assert!(ics.contains("DTEND;TZID=Europe/Moscow:20250908T103000"));
        assert!(ics.contains("LOCATION:А-301"));
        assert!(ics.contains("DTSTAMP:20250908T060000Z"));
    }

    #[test]
    fn rendering_is_byte_stable() {
        let snap = snapshot(vec![
            event("История России", Some("А-301")),
            event("Философия", None),
        ]);
        let first = build_calendar(&snap, Moscow).unwrap();
        let second = build_calendar(&snap, Moscow).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn round_trip_recovers_identity_and_times() {
        let original = vec![
            event("История России", Some("А-301")),
            event("Философия", None),
        ];
        let snap = snapshot(original.clone());
        let ics = build_calendar(&snap, Moscow).unwrap();

        let unfolded = unfold(&ics);
        let parsed = read_calendar(&unfolded).unwrap();

        let mut recovered: Vec<(String, String, String)> = parsed
            .components
            .iter()
            .filter(|c| c.name == "VEVENT")
            .map(|vevent| {
                let uid = vevent.find_prop("UID").unwrap().val.to_string();
                let start = vevent.find_prop("DTSTART").unwrap().val.to_string();
                let end = vevent.find_prop("DTEND").unwrap().val.to_string();
                (uid, start, end)
            })
            .collect();
        recovered.sort();

        let mut expected: Vec<(String, String, String)> = original
            .iter()
            .map(|e| {
                (
                    e.identity_key(),
                    e.date
                        .and_time(e.start)
                        .format("%Y%m%dT%H%M%S")
                        .to_string(),
                    e.date.and_time(e.end).format("%Y%m%dT%H%M%S").to_string(),
                )
            })
            .collect();
        expected.sort();
        assert_eq!(recovered, expected);

        // Parsed values stay machine-readable local datetimes.
        for (_, start, _) in &recovered {
            NaiveDateTime::parse_from_str(start, "%Y%m%dT%H%M%S").unwrap();
        }
    }

    #[test]
    fn language_slot_renders_bullets_and_constant_summary() {
        let mut lang = event("Английский 203, 204; Немецкий 105", Some("203, 204, 105"));
        lang.kind = None;
        lang.teacher = None;
        let ics = build_calendar(&snapshot(vec![lang]), Moscow).unwrap();

        assert!(ics.contains("Иностранный язык"));
        let unfolded = unfold(&ics);
        assert!(unfolded.contains("🇬🇧 Английский"));
        assert!(unfolded.contains("🇩🇪 Немецкий: 105"));
    }
}
