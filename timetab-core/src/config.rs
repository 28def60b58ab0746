//! Daemon configuration.
//!
//! One immutable `AppConfig`, loaded from TOML once at startup and passed
//! explicitly into each component. The Telegram bot token is the only value
//! taken from the environment, never from the file.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::{TimetabError, TimetabResult};
use crate::group::group_id_from_name;

pub const DEFAULT_TIMEZONE: &str = "Europe/Moscow";

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_watch_interval() -> u64 {
    300
}

fn default_scrape_timeout() -> u64 {
    20
}

fn default_true() -> bool {
    true
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("var/timetable")
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("var/incoming")
}

/// Process-wide immutable configuration, constructed once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Human-entered group labels, e.g. "104" or "104б__Философия".
    pub groups: Vec<String>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_watch_interval")]
    pub watch_interval_seconds: u64,
    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout_seconds: u64,
    /// Merge parallel language-track lessons into one event per timeslot.
    #[serde(default = "default_true")]
    pub merge_languages: bool,
    /// Root for published feeds, metadata and snapshots.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    /// Where the scraper drops raw-item JSON files.
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
    #[serde(default = "ServerConfig::default_base_path")]
    pub base_path: String,
}

impl ServerConfig {
    fn default_host() -> String {
        "127.0.0.1".to_string()
    }

    fn default_port() -> u16 {
        8080
    }

    fn default_base_path() -> String {
        "/timetable".to_string()
    }
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            enabled: true,
            host: Self::default_host(),
            port: Self::default_port(),
            base_path: Self::default_base_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Bot token; populated from TELEGRAM_BOT_TOKEN, never from the file.
    #[serde(skip)]
    pub token: Option<String>,
    /// Chat that receives error reports and delivery-failure summaries.
    #[serde(default)]
    pub admin_chat_id: Option<i64>,
    /// Directory for the file-backed subscriber store.
    #[serde(default = "TelegramConfig::default_persist_dir")]
    pub persist_dir: PathBuf,
    /// Notify only when future-dated lessons changed.
    #[serde(default = "default_true")]
    pub future_only: bool,
}

impl TelegramConfig {
    fn default_persist_dir() -> PathBuf {
        PathBuf::from("var/telegram")
    }

    /// Notifications are on only when enabled and a token is present.
    pub fn active(&self) -> bool {
        self.enabled && self.token.is_some()
    }
}

impl Default for TelegramConfig {
    fn default() -> TelegramConfig {
        TelegramConfig {
            enabled: true,
            token: None,
            admin_chat_id: None,
            persist_dir: Self::default_persist_dir(),
            future_only: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path; when set and reachable, the subscriber store
    /// prefers it over the JSON file backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AppConfig {
    /// Load from an explicit path, `./timetab.toml`, or the platform config
    /// directory.
    pub fn load(explicit: Option<&Path>) -> TimetabResult<AppConfig> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => {
                let local = PathBuf::from("timetab.toml");
                if local.is_file() {
                    local
                } else {
                    Self::default_path()?
                }
            }
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| TimetabError::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config: AppConfig = toml::from_str(&content)
            .map_err(|e| TimetabError::Config(format!("{}: {e}", path.display())))?;

        config.telegram.token = std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        config.validate()?;
        Ok(config)
    }

    /// Config location at ~/.config/timetab/config.toml (platform equivalent).
    pub fn default_path() -> TimetabResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| TimetabError::Config("Could not determine config directory".into()))?
            .join("timetab");
        Ok(config_dir.join("config.toml"))
    }

    pub fn validate(&self) -> TimetabResult<()> {
        if self.groups.iter().all(|g| g.trim().is_empty()) {
            return Err(TimetabError::Config(
                "at least one group must be configured".into(),
            ));
        }
        self.tz()?;
        Ok(())
    }

    /// The timetable's IANA zone.
    pub fn tz(&self) -> TimetabResult<Tz> {
        Tz::from_str(&self.timezone)
            .map_err(|_| TimetabError::Config(format!("unknown time zone '{}'", self.timezone)))
    }

    /// (group_id, display name) pairs in configured order, skipping blanks.
    pub fn group_ids(&self) -> Vec<(String, String)> {
        self.groups
            .iter()
            .map(|g| g.trim())
            .filter(|g| !g.is_empty())
            .map(|g| (group_id_from_name(g), g.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_file_with_defaults() {
        let config: AppConfig = toml::from_str(r#"groups = ["104б__Философия"]"#).unwrap();
        assert_eq!(config.timezone, DEFAULT_TIMEZONE);
        assert_eq!(config.watch_interval_seconds, 300);
        assert!(config.server.enabled);
        assert_eq!(config.server.base_path, "/timetable");
        assert!(config.telegram.future_only);
        assert!(config.database.path.is_none());
        assert_eq!(config.group_ids(), vec![("104".to_string(), "104б__Философия".to_string())]);
    }

    #[test]
    fn parses_nested_sections() {
        let config: AppConfig = toml::from_str(
            r#"
            groups = ["104", "205"]
            timezone = "Europe/Moscow"

            [server]
            port = 9090
            base_path = "/tt"

            [telegram]
            admin_chat_id = 42
            future_only = false

            [database]
            path = "var/subscribers.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.telegram.admin_chat_id, Some(42));
        assert!(!config.telegram.future_only);
        assert_eq!(
            config.database.path.as_deref(),
            Some(Path::new("var/subscribers.db"))
        );
        config.validate().unwrap();
    }

    #[test]
    fn rejects_empty_groups_and_bad_zones() {
        let config: AppConfig = toml::from_str(r#"groups = []"#).unwrap();
        assert!(config.validate().is_err());

        let config: AppConfig =
            toml::from_str(r#"groups = ["104"]
timezone = "Mars/Olympus""#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn telegram_is_inactive_without_a_token() {
        let config = TelegramConfig::default();
        assert!(!config.active());
        let with_token = TelegramConfig {
            token: Some("123:abc".to_string()),
            ..TelegramConfig::default()
        };
        assert!(with_token.active());
    }
}
