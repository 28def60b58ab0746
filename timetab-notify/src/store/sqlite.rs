//! SQLite subscriber store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::Connection;

use crate::error::{NotifyError, NotifyResult};
use crate::store::SubscriberStore;

/// Subscriber state in SQLite: a subscriber list plus a per-chat group
/// selection, mirroring the file backend's two maps.
pub struct SqliteSubscriberStore {
    conn: Mutex<Connection>,
}

impl SqliteSubscriberStore {
    /// Open (or create) the database and initialise the schema. Safe to call
    /// on every startup: CREATE IF NOT EXISTS keeps it idempotent.
    pub fn open(path: &Path) -> NotifyResult<SqliteSubscriberStore> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .map_err(|e| NotifyError::StoreUnavailable(e.to_string()))?;
            }
        }
        let conn =
            Connection::open(path).map_err(|e| NotifyError::StoreUnavailable(e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS subscribers (
                chat_id    INTEGER PRIMARY KEY,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS group_selection (
                chat_id    INTEGER PRIMARY KEY,
                group_id   TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .map_err(|e| NotifyError::StoreUnavailable(e.to_string()))?;
        Ok(SqliteSubscriberStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SubscriberStore for SqliteSubscriberStore {
    fn list_subscribers(&self, group_id: &str) -> NotifyResult<Vec<i64>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT s.chat_id FROM subscribers s
             JOIN group_selection g ON g.chat_id = s.chat_id
             WHERE g.group_id = ?1
             ORDER BY s.chat_id",
        )?;
        let rows = stmt.query_map([group_id], |row| row.get::<_, i64>(0))?;
        let mut out = Vec::new();
        for chat_id in rows {
            out.push(chat_id?);
        }
        Ok(out)
    }

    fn add_subscriber(&self, chat_id: i64) -> NotifyResult<bool> {
        let changed = self.lock().execute(
            "INSERT OR IGNORE INTO subscribers (chat_id, created_at) VALUES (?1, ?2)",
            rusqlite::params![chat_id, Utc::now().to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    fn remove_subscriber(&self, chat_id: i64) -> NotifyResult<bool> {
        let changed = self
            .lock()
            .execute("DELETE FROM subscribers WHERE chat_id = ?1", [chat_id])?;
        Ok(changed > 0)
    }

    fn set_selected_group(&self, chat_id: i64, group_id: &str) -> NotifyResult<()> {
        self.lock().execute(
            "INSERT INTO group_selection (chat_id, group_id, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(chat_id) DO UPDATE SET
                 group_id = excluded.group_id,
                 updated_at = excluded.updated_at",
            rusqlite::params![chat_id, group_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn selected_group(&self, chat_id: i64) -> NotifyResult<Option<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT group_id FROM group_selection WHERE chat_id = ?1")?;
        let mut rows = stmt.query([chat_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscribers.db");
        {
            let store = SqliteSubscriberStore::open(&path).unwrap();
            store.add_subscriber(1).unwrap();
            store.set_selected_group(1, "104").unwrap();
        }
        // Second open must keep existing rows.
        let store = SqliteSubscriberStore::open(&path).unwrap();
        assert_eq!(store.list_subscribers("104").unwrap(), vec![1]);
    }

    #[test]
    fn selection_upsert_replaces_the_group() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteSubscriberStore::open(&dir.path().join("s.db")).unwrap();
        store.add_subscriber(1).unwrap();
        store.set_selected_group(1, "104").unwrap();
        store.set_selected_group(1, "205").unwrap();
        assert_eq!(store.selected_group(1).unwrap().as_deref(), Some("205"));
        assert!(store.list_subscribers("104").unwrap().is_empty());
        assert_eq!(store.list_subscribers("205").unwrap(), vec![1]);
    }
}
