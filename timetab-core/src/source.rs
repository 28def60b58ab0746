//! The hand-over boundary from the external scraper.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{TimetabError, TimetabResult};
use crate::event::RawItem;

/// Supplies raw timetable rows for a group.
///
/// Implementations wrap whatever actually produces the rows (the browser
/// scraper in production, fixtures in tests). Fetching must not mutate any
/// pipeline state; the cycle scheduler bounds each call with its scrape
/// timeout.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn fetch(&self, group_id: &str) -> TimetabResult<Vec<RawItem>>;
}

/// Reads raw-item drop files written by the scraper process.
///
/// Layout: `<root>/<group_id>.json`, a JSON array of raw items. The file is
/// re-read on every fetch so the scraper can replace it between cycles; a
/// missing or unreadable file fails that pass only.
pub struct JsonFileSource {
    root: PathBuf,
}

impl JsonFileSource {
    pub fn new(root: impl Into<PathBuf>) -> JsonFileSource {
        JsonFileSource { root: root.into() }
    }
}

#[async_trait]
impl ScheduleSource for JsonFileSource {
    async fn fetch(&self, group_id: &str) -> TimetabResult<Vec<RawItem>> {
        let path = self.root.join(format!("{group_id}.json"));
        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
            TimetabError::Scrape(group_id.to_string(), format!("{}: {e}", path.display()))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            TimetabError::Scrape(
                group_id.to_string(),
                format!("bad drop file {}: {e}", path.display()),
            )
        })
    }
}
