//! Landing page and feed endpoints.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use timetab_core::publish::{self, GroupIndex, GroupMeta};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(landing))
        .route("/{group_id}", get(feed))
}

/// GET <base>/{group_id}[.ics]: the group's published calendar.
async fn feed(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let gid = group_id.strip_suffix(".ics").unwrap_or(&group_id);
    if !is_valid_group_id(gid) {
        return not_found();
    }

    let path = state.storage_root.join(gid).join(publish::CALENDAR_FILE);
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(_) => return not_found(),
    };

    let etag = format!("\"{}\"", hex::encode(Sha256::digest(&data)));
    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(str::trim);
    if if_none_match == Some(etag.as_str()) {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
    }

    info!(group = gid, bytes = data.len(), "served calendar");
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (header::ETAG, etag),
        ],
        data,
    )
        .into_response()
}

/// Group ids are digit runs or slugs; anything else (separators, dots, path
/// tricks) is a 404, not an error.
fn is_valid_group_id(gid: &str) -> bool {
    !gid.is_empty()
        && gid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "not found").into_response()
}

struct LandingRow {
    id: String,
    name: Option<String>,
    event_count: usize,
    updated: String,
}

/// GET <base>/: HTML page listing the published groups.
async fn landing(State(state): State<AppState>) -> Html<String> {
    debug!(root = %state.storage_root.display(), "rendering landing page");
    let rows = collect_rows(&state).await;
    Html(render_landing(&state.base_path, &rows))
}

async fn collect_rows(state: &AppState) -> Vec<LandingRow> {
    let index: GroupIndex =
        match tokio::fs::read_to_string(state.storage_root.join(publish::INDEX_FILE)).await {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => GroupIndex::default(),
        };

    let mut rows = Vec::new();
    for entry in index.groups {
        let dir = state.storage_root.join(&entry.id);
        if tokio::fs::metadata(dir.join(publish::CALENDAR_FILE))
            .await
            .is_err()
        {
            continue; // never published
        }
        let meta: Option<GroupMeta> =
            match tokio::fs::read_to_string(dir.join(publish::META_FILE)).await {
                Ok(contents) => serde_json::from_str(&contents).ok(),
                Err(_) => None,
            };
        let (event_count, updated) = match meta {
            Some(meta) => (
                meta.event_count,
                format_updated(meta.last_updated, state.display_tz),
            ),
            None => (0, String::new()),
        };
        let name = Some(entry.name.clone()).filter(|n| !n.is_empty() && *n != entry.id);
        rows.push(LandingRow {
            id: entry.id,
            name,
            event_count,
            updated,
        });
    }
    rows
}

fn format_updated(at: DateTime<Utc>, tz: Tz) -> String {
    let label = if tz == chrono_tz::Europe::Moscow {
        "МСК"
    } else {
        tz.name()
    };
    format!("{} {label}", at.with_timezone(&tz).format("%Y-%m-%d %H:%M"))
}

fn render_landing(base: &str, rows: &[LandingRow]) -> String {
    let base = base.trim_end_matches('/');
    let mut html = vec![
        "<!doctype html>".to_string(),
        r#"<html lang="ru">"#.to_string(),
        r#"<head><meta charset="utf-8"><meta name="viewport" content="width=device-width, initial-scale=1">"#.to_string(),
        "<title>Расписание — группы</title>".to_string(),
        "<style>body{font-family:-apple-system,BlinkMacSystemFont,Segoe UI,Roboto,Helvetica,Arial,sans-serif;padding:24px;max-width:900px;margin:0 auto} a{color:#0366d6;text-decoration:none} .card{border:1px solid #e5e7eb;border-radius:8px;padding:16px;margin:12px 0;box-shadow:0 1px 2px rgba(0,0,0,0.03)} .meta{color:#6b7280;font-size:14px;margin-top:8px}</style>".to_string(),
        "</head><body>".to_string(),
        "<h1>Доступные группы</h1>".to_string(),
    ];
    if rows.is_empty() {
        html.push("<p>Нет опубликованных групп (ожидаются файлы calendar.ics).</p>".to_string());
    } else {
        for row in rows {
            html.push(r#"<div class="card">"#.to_string());
            html.push(format!(
                r#"<div><a href="{base}/{id}"><strong>Группа {id}</strong></a></div>"#,
                id = row.id
            ));
            if let Some(ref name) = row.name {
                html.push(format!(r#"<div class="meta">{name}</div>"#));
            }
            let updated = if row.updated.is_empty() {
                String::new()
            } else {
                format!(" · {}", row.updated)
            };
            html.push(format!(
                r#"<div class="meta">Занятий: {}{updated}</div>"#,
                row.event_count
            ));
            html.push("</div>".to_string());
        }
    }
    html.push("</body></html>".to_string());
    html.join("\n")
}
