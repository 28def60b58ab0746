use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use timetab::scheduler::CycleScheduler;
use timetab_core::config::AppConfig;
use timetab_core::source::JsonFileSource;
use timetab_notify::{open_store, Broadcaster, TelegramChannel};
use timetab_server::AppState;

#[derive(Parser)]
#[command(name = "timetab")]
#[command(version)]
#[command(about = "Watch a university timetable, publish ICS feeds and notify subscribers of changes")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let tz = config.tz()?;
    info!(groups = config.groups.len(), tz = %tz, "starting timetab");

    let broadcaster = if config.telegram.active() {
        let store = open_store(
            config.database.path.as_deref(),
            &config.telegram.persist_dir,
        )
        .context("opening subscriber store")?;
        let token = config.telegram.token.as_deref().unwrap_or_default();
        let channel = Arc::new(TelegramChannel::new(token));
        Some(Arc::new(Broadcaster::new(
            store,
            channel,
            config.telegram.admin_chat_id,
            config.telegram.future_only,
        )))
    } else {
        warn!("TELEGRAM_BOT_TOKEN not set or telegram disabled; notifications are off");
        None
    };

    let source = Arc::new(JsonFileSource::new(&config.source_dir));
    let scheduler = Arc::new(CycleScheduler::new(&config, source, broadcaster)?);

    let server = if config.server.enabled {
        let state = AppState {
            storage_root: config.storage_dir.clone(),
            base_path: config.server.base_path.clone(),
            display_tz: tz,
        };
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .context("invalid server address")?;
        Some(tokio::spawn(async move {
            if let Err(e) = timetab_server::serve(state, addr).await {
                error!(error = %e, "timetable server failed");
            }
        }))
    } else {
        None
    };

    scheduler.run(&config).await;

    if let Some(server) = server {
        let _ = server.await;
    }
    Ok(())
}
