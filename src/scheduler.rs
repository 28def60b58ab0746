//! The per-group sync cycle and its scheduler.
//!
//! Cycle order matters: publish and broadcast happen before the snapshot is
//! saved as the new baseline, so a crash mid-cycle re-diffs against the old
//! baseline on the next tick instead of losing a notification.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use timetab_core::config::AppConfig;
use timetab_core::diff::diff_snapshots;
use timetab_core::error::TimetabError;
use timetab_core::group::group_id_from_name;
use timetab_core::normalize::{merge_language_lessons, normalize_item};
use timetab_core::publish::FeedPublisher;
use timetab_core::snapshot::{Snapshot, SnapshotStore};
use timetab_core::source::ScheduleSource;
use timetab_notify::Broadcaster;

/// Counters from one completed pipeline pass.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub group_id: String,
    pub event_count: usize,
    pub added: usize,
    pub removed: usize,
    pub delivered: usize,
    pub skipped_items: usize,
    pub feed_changed: bool,
}

/// Runs the fetch → normalize → diff → publish → broadcast → save pipeline
/// for every configured group on a fixed interval.
///
/// Groups are independent: each gets its own task, and a per-group lock
/// guarantees two cycles for the same group never interleave.
pub struct CycleScheduler {
    source: Arc<dyn ScheduleSource>,
    snapshots: SnapshotStore,
    publisher: FeedPublisher,
    broadcaster: Option<Arc<Broadcaster>>,
    tz: Tz,
    scrape_timeout: Duration,
    merge_languages: bool,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CycleScheduler {
    pub fn new(
        config: &AppConfig,
        source: Arc<dyn ScheduleSource>,
        broadcaster: Option<Arc<Broadcaster>>,
    ) -> Result<CycleScheduler> {
        let tz = config.tz()?;
        Ok(CycleScheduler {
            source,
            snapshots: SnapshotStore::new(&config.storage_dir),
            publisher: FeedPublisher::new(&config.storage_dir, tz),
            broadcaster,
            tz,
            scrape_timeout: Duration::from_secs(config.scrape_timeout_seconds),
            merge_languages: config.merge_languages,
            locks: Mutex::new(HashMap::new()),
        })
    }

    async fn lock_for(&self, group_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(group_id.to_string()).or_default())
    }

    /// One pipeline pass for one configured group label.
    pub async fn run_cycle(&self, group_name: &str) -> Result<CycleReport> {
        let group_id = group_id_from_name(group_name);
        let lock = self.lock_for(&group_id).await;
        let _guard = lock.lock().await;

        let raw_items =
            match tokio::time::timeout(self.scrape_timeout, self.source.fetch(&group_id)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(TimetabError::ScrapeTimeout(self.scrape_timeout.as_secs()).into())
                }
            };

        let mut skipped = 0usize;
        let mut events = Vec::with_capacity(raw_items.len());
        for item in &raw_items {
            match normalize_item(&group_id, item) {
                Ok(event) => events.push(event),
                Err(e) => {
                    skipped += 1;
                    warn!(group = %group_id, error = %e, "skipping malformed item");
                }
            }
        }

        if self.merge_languages {
            let before = events.len();
            events = merge_language_lessons(events);
            if events.len() != before {
                info!(group = %group_id, before, after = events.len(), "merged language lessons");
            }
        }

        let current = Snapshot::new(group_id.clone(), events, Utc::now());
        let previous = self.snapshots.load(&group_id)?;
        let changes = diff_snapshots(previous.as_ref(), &current, current.captured_at, self.tz);

        let outcome = self.publisher.publish(&current, group_name)?;
        if outcome.changed && changes.is_empty() {
            debug!(group = %group_id, "feed bytes changed without schedule changes (metadata only)");
        }

        let mut delivered = 0;
        match &self.broadcaster {
            Some(broadcaster) => {
                // A broadcast failure keeps the old baseline: the next tick
                // re-diffs and re-notifies (at-least-once).
                let result = broadcaster
                    .broadcast(&group_id, &changes)
                    .await
                    .context("broadcasting change-set")?;
                delivered = result.delivered;
            }
            None => debug!(group = %group_id, "notifications disabled"),
        }

        self.snapshots.save(&current)?;

        Ok(CycleReport {
            group_id,
            event_count: outcome.event_count,
            added: changes.added.len(),
            removed: changes.removed.len(),
            delivered,
            skipped_items: skipped,
            feed_changed: outcome.changed,
        })
    }

    /// Drive all configured groups forever on the watch interval.
    pub async fn run(self: Arc<Self>, config: &AppConfig) {
        if let Err(e) = self.publisher.write_index(&config.group_ids()) {
            warn!(error = %e, "failed to write group index");
        }

        let interval = Duration::from_secs(config.watch_interval_seconds.max(1));
        let mut handles = Vec::new();
        for group_name in config.groups.clone() {
            let scheduler = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    match scheduler.run_cycle(&group_name).await {
                        Ok(report) => info!(
                            group = %report.group_id,
                            events = report.event_count,
                            added = report.added,
                            removed = report.removed,
                            delivered = report.delivered,
                            skipped = report.skipped_items,
                            changed = report.feed_changed,
                            "cycle finished"
                        ),
                        Err(e) => {
                            error!(group = %group_name, error = %e, "cycle failed");
                            if let Some(broadcaster) = &scheduler.broadcaster {
                                broadcaster
                                    .report_error(&format!(
                                        "Сбой обработки группы {group_name}: {e}"
                                    ))
                                    .await;
                            }
                        }
                    }
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }
}
