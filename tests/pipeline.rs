//! End-to-end pipeline tests: scrape fixture → normalize → diff → publish →
//! broadcast → save, plus the no-overlap guarantee for same-group cycles.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::util::ServiceExt;

use timetab::scheduler::CycleScheduler;
use timetab_core::config::{AppConfig, DatabaseConfig, ServerConfig, TelegramConfig};
use timetab_core::error::{TimetabError, TimetabResult};
use timetab_core::event::RawItem;
use timetab_core::source::{JsonFileSource, ScheduleSource};
use timetab_notify::{Broadcaster, DeliveryChannel, FileSubscriberStore, NotifyResult, SubscriberStore};
use timetab_server::AppState;

fn test_config(root: &Path) -> AppConfig {
    AppConfig {
        groups: vec!["104б__Философия".to_string()],
        timezone: "Europe/Moscow".to_string(),
        watch_interval_seconds: 300,
        scrape_timeout_seconds: 1,
        merge_languages: true,
        storage_dir: root.join("timetable"),
        source_dir: root.join("incoming"),
        server: ServerConfig::default(),
        telegram: TelegramConfig::default(),
        database: DatabaseConfig::default(),
    }
}

/// Raw item JSON the scraper would drop, dated far in the future so the
/// future-only broadcast mode keeps everything.
fn item(date: &str, start: &str, end: &str, title: &str, room: &str) -> serde_json::Value {
    serde_json::json!({
        "date": date,
        "start": start,
        "end": end,
        "title": title,
        "room": room,
        "teacher": "Иванов И.И.",
        "pair": 1
    })
}

fn write_drop_file(source_dir: &Path, group_id: &str, items: &[serde_json::Value]) {
    std::fs::create_dir_all(source_dir).unwrap();
    std::fs::write(
        source_dir.join(format!("{group_id}.json")),
        serde_json::to_string_pretty(&serde_json::Value::Array(items.to_vec())).unwrap(),
    )
    .unwrap();
}

#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<(i64, String)>>,
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn send(&self, chat_id: i64, text: &str) -> NotifyResult<()> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

fn subscribers(root: &Path, entries: &[(i64, &str)]) -> Arc<FileSubscriberStore> {
    let store = FileSubscriberStore::open(&root.join("telegram")).unwrap();
    for (chat_id, group) in entries {
        store.add_subscriber(*chat_id).unwrap();
        store.set_selected_group(*chat_id, group).unwrap();
    }
    Arc::new(store)
}

#[tokio::test]
async fn first_cycle_is_a_quiet_baseline_and_second_notifies() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    write_drop_file(
        &config.source_dir,
        "104",
        &[
            item("2030-09-09", "09:00", "10:30", "Философия [Сем]", "А-301"),
            item("2030-09-09", "10:45", "12:15", "История России [Лк]", "А-301"),
            item("2030-09-10", "09:00", "10:30", "Физика [Лк]", "Б-105"),
        ],
    );

    let store = subscribers(dir.path(), &[(42, "104"), (43, "205")]);
    let channel = Arc::new(RecordingChannel::default());
    let broadcaster = Arc::new(Broadcaster::new(store, channel.clone(), None, true));
    let source = Arc::new(JsonFileSource::new(&config.source_dir));
    let scheduler = CycleScheduler::new(&config, source, Some(broadcaster)).unwrap();

    // First cycle: previously empty store → baseline, no notification.
    let report = scheduler.run_cycle("104б__Философия").await.unwrap();
    assert_eq!(report.group_id, "104");
    assert_eq!(report.event_count, 3);
    assert_eq!(report.added, 3);
    assert_eq!(report.removed, 0);
    assert_eq!(report.delivered, 0);
    assert!(channel.sent.lock().unwrap().is_empty());

    // The published document has one component per event and is served.
    let ics = std::fs::read_to_string(config.storage_dir.join("104/calendar.ics")).unwrap();
    assert_eq!(ics.matches("BEGIN:VEVENT").count(), 3);

    let app = timetab_server::app(AppState {
        storage_root: config.storage_dir.clone(),
        base_path: "/timetable".to_string(),
        display_tz: chrono_tz::Europe::Moscow,
    });
    let response = app
        .clone()
        .oneshot(Request::get("/timetable/104").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Second cycle: one room changed → one removed+added pair, one delivery
    // to the subscriber of "104" only.
    write_drop_file(
        &config.source_dir,
        "104",
        &[
            item("2030-09-09", "09:00", "10:30", "Философия [Сем]", "Б-202"),
            item("2030-09-09", "10:45", "12:15", "История России [Лк]", "А-301"),
            item("2030-09-10", "09:00", "10:30", "Физика [Лк]", "Б-105"),
        ],
    );
    let report = scheduler.run_cycle("104б__Философия").await.unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(report.delivered, 1);

    let sent = channel.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, 42);
    assert!(sent[0].1.starts_with("104: обновление расписания"));
    assert!(sent[0].1.contains("Б-202"));
    drop(sent);

    // Served document reflects the new room.
    let response = app
        .oneshot(Request::get("/timetable/104").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body.contains("Б-202"));

    // Third cycle with unchanged input: nothing to say.
    let report = scheduler.run_cycle("104б__Философия").await.unwrap();
    assert_eq!(report.added, 0);
    assert_eq!(report.removed, 0);
    assert_eq!(report.delivered, 0);
    assert_eq!(channel.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_items_are_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    write_drop_file(
        &config.source_dir,
        "104",
        &[
            item("2030-09-09", "09:00", "10:30", "Философия", "А-301"),
            serde_json::json!({"start": "09:00", "end": "10:30", "title": "Без даты"}),
        ],
    );

    let source = Arc::new(JsonFileSource::new(&config.source_dir));
    let scheduler = CycleScheduler::new(&config, source, None).unwrap();

    let report = scheduler.run_cycle("104").await.unwrap();
    assert_eq!(report.event_count, 1);
    assert_eq!(report.skipped_items, 1);
}

/// Source that parks inside fetch and records how many fetches are in flight.
struct SlowSource {
    delay: Duration,
    active: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl ScheduleSource for SlowSource {
    async fn fetch(&self, _group_id: &str) -> TimetabResult<Vec<RawItem>> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![])
    }
}

#[tokio::test]
async fn same_group_cycles_never_interleave() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.scrape_timeout_seconds = 5;

    let source = Arc::new(SlowSource {
        delay: Duration::from_millis(200),
        active: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
    });
    let scheduler = Arc::new(CycleScheduler::new(&config, source.clone(), None).unwrap());

    let a = Arc::clone(&scheduler);
    let b = Arc::clone(&scheduler);
    let (first, second) = tokio::join!(a.run_cycle("104"), b.run_cycle("104"));
    first.unwrap();
    second.unwrap();

    // The second cycle must have blocked until the first finished.
    assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scrape_timeout_abandons_the_pass_without_saving() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let source = Arc::new(SlowSource {
        delay: Duration::from_secs(10),
        active: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
    });
    let scheduler = CycleScheduler::new(&config, source, None).unwrap();

    let result = scheduler.run_cycle("104").await;
    let err = result.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TimetabError>(),
        Some(TimetabError::ScrapeTimeout(_))
    ));

    // No partial snapshot, no published feed.
    assert!(!config.storage_dir.join("104/last_schedule.json").exists());
    assert!(!config.storage_dir.join("104/calendar.ics").exists());
}
