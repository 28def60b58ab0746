//! HTTP server for timetab: serves the calendars the feed publisher writes.
//!
//! Stateless with respect to the pipeline: it never triggers a scrape or a
//! diff, and torn reads are impossible because the publisher renames files
//! into place.

mod routes;
mod state;

pub use state::AppState;

use std::net::SocketAddr;

use anyhow::Result;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Build the application router with the base path mounted.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let base = normalize_base(&state.base_path);
    let inner = routes::router().with_state(state);
    let router = if base == "/" {
        inner
    } else {
        Router::new().nest(&base, inner)
    };
    router.layer(cors)
}

/// Serve forever on the given address.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let router = app(state);
    info!(%addr, "timetable server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

fn normalize_base(base: &str) -> String {
    let trimmed = base.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
