//! Shared server state.

use std::path::PathBuf;

use chrono_tz::Tz;

/// Read-only view over the publisher's storage root.
///
/// The server owns no pipeline state: it serves whatever the feed publisher
/// last renamed into place.
#[derive(Clone)]
pub struct AppState {
    pub storage_root: PathBuf,
    pub base_path: String,
    pub display_tz: Tz,
}
