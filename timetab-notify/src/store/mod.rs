//! Subscriber persistence.
//!
//! Two interchangeable backends behind one contract: a JSON file for simple
//! deployments and SQLite when a database path is configured. The backend is
//! resolved once at startup; the broadcaster never knows which one is active.

mod file;
mod sqlite;

pub use file::FileSubscriberStore;
pub use sqlite::SqliteSubscriberStore;

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::NotifyResult;

/// Durable subscriber state, partitioned by selected group for reads.
pub trait SubscriberStore: Send + Sync {
    /// Chats subscribed to notifications whose selected group matches.
    fn list_subscribers(&self, group_id: &str) -> NotifyResult<Vec<i64>>;

    /// Returns true if the chat was not subscribed before.
    fn add_subscriber(&self, chat_id: i64) -> NotifyResult<bool>;

    /// Returns true if the chat was subscribed.
    fn remove_subscriber(&self, chat_id: i64) -> NotifyResult<bool>;

    fn set_selected_group(&self, chat_id: i64, group_id: &str) -> NotifyResult<()>;

    fn selected_group(&self, chat_id: i64) -> NotifyResult<Option<String>>;
}

/// Resolve the backend once at startup: SQLite when a path is configured and
/// opens, otherwise the JSON file store. The fallback is logged a single time
/// and never revisited mid-run.
pub fn open_store(
    database_path: Option<&Path>,
    persist_dir: &Path,
) -> NotifyResult<Arc<dyn SubscriberStore>> {
    if let Some(db_path) = database_path {
        match SqliteSubscriberStore::open(db_path) {
            Ok(store) => {
                info!(path = %db_path.display(), "using SQLite subscriber store");
                return Ok(Arc::new(store));
            }
            Err(e) => warn!(
                path = %db_path.display(),
                error = %e,
                "database store unavailable; falling back to file store"
            ),
        }
    }
    let store = FileSubscriberStore::open(persist_dir)?;
    info!(dir = %persist_dir.display(), "using file subscriber store");
    Ok(Arc::new(store))
}
