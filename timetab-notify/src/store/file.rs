//! JSON-file subscriber store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NotifyError, NotifyResult};
use crate::store::SubscriberStore;

const STATE_FILE: &str = "subscribers.json";

/// On-disk shape: a subscriber list plus a per-chat group selection, the same
/// two logical tables the SQLite backend keeps.
#[derive(Debug, Default, Serialize, Deserialize)]
struct FileState {
    /// chat id (string key for JSON) → subscription time.
    #[serde(default)]
    subscribers: BTreeMap<String, DateTime<Utc>>,
    /// chat id → selected group.
    #[serde(default)]
    selected_groups: BTreeMap<String, String>,
}

/// Subscriber state in one JSON file, rewritten atomically on every change.
///
/// Operations serialize on an internal mutex; no cross-process coordination
/// is attempted (single-process deployment).
pub struct FileSubscriberStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileSubscriberStore {
    pub fn open(persist_dir: &Path) -> NotifyResult<FileSubscriberStore> {
        std::fs::create_dir_all(persist_dir)?;
        let path = persist_dir.join(STATE_FILE);
        let state = if path.is_file() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents).map_err(|e| {
                NotifyError::Store(format!("bad subscriber file {}: {e}", path.display()))
            })?
        } else {
            FileState::default()
        };
        Ok(FileSubscriberStore {
            path,
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, FileState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, state: &FileState) -> NotifyResult<()> {
        let contents = serde_json::to_string_pretty(state)
            .map_err(|e| NotifyError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SubscriberStore for FileSubscriberStore {
    fn list_subscribers(&self, group_id: &str) -> NotifyResult<Vec<i64>> {
        let state = self.lock();
        Ok(state
            .subscribers
            .keys()
            .filter(|chat| state.selected_groups.get(*chat).map(String::as_str) == Some(group_id))
            .filter_map(|chat| chat.parse().ok())
            .collect())
    }

    fn add_subscriber(&self, chat_id: i64) -> NotifyResult<bool> {
        let mut state = self.lock();
        let key = chat_id.to_string();
        if state.subscribers.contains_key(&key) {
            return Ok(false);
        }
        state.subscribers.insert(key, Utc::now());
        self.persist(&state)?;
        Ok(true)
    }

    fn remove_subscriber(&self, chat_id: i64) -> NotifyResult<bool> {
        let mut state = self.lock();
        let removed = state.subscribers.remove(&chat_id.to_string()).is_some();
        if removed {
            self.persist(&state)?;
        }
        Ok(removed)
    }

    fn set_selected_group(&self, chat_id: i64, group_id: &str) -> NotifyResult<()> {
        let mut state = self.lock();
        state
            .selected_groups
            .insert(chat_id.to_string(), group_id.to_string());
        self.persist(&state)
    }

    fn selected_group(&self, chat_id: i64) -> NotifyResult<Option<String>> {
        Ok(self.lock().selected_groups.get(&chat_id.to_string()).cloned())
    }
}
