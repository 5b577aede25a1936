//! # geocast
//!
//! Server binary: loads settings, opens the location store and serves the
//! STOMP/WebSocket gateway until interrupted.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use geocast_core::logging::{LogFormat, init_subscriber};
use geocast_server::config::ServerConfig;
use geocast_server::metrics::install_recorder;
use geocast_server::server::GeocastServer;
use geocast_settings::{GeocastSettings, geocast_home, load_settings_from_path, settings_path};
use geocast_store::{ConnectionConfig, LocationStore, SqliteLocationStore};

/// Realtime location fan-out server.
#[derive(Parser, Debug)]
#[command(name = "geocast", version, about = "Realtime location fan-out server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// `SQLite` database path, or `:memory:` (overrides settings).
    #[arg(long)]
    db_path: Option<String>,

    /// Settings file (default: `~/.geocast/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Command-line flags win over the settings file and environment.
    fn apply(&self, settings: &mut GeocastSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref db_path) = self.db_path {
            settings.storage.db_path.clone_from(db_path);
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn open_store(settings: &GeocastSettings, home: &Path) -> Result<SqliteLocationStore> {
    let storage = &settings.storage;
    if storage.is_in_memory() {
        tracing::warn!("using in-memory database, positions will not survive a restart");
        return SqliteLocationStore::open_in_memory().context("failed to open in-memory database");
    }
    let path = storage.resolve_db_path(home);
    ensure_parent_dir(&path)?;
    let config = ConnectionConfig {
        pool_size: storage.pool_size,
        busy_timeout_ms: storage.busy_timeout_ms,
        connection_timeout_ms: storage.connection_timeout_ms,
    };
    let store = SqliteLocationStore::open(&path, &config)
        .with_context(|| format!("failed to open database: {}", path.display()))?;
    tracing::info!(path = %path.display(), "database opened");
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_subscriber(&settings.logging.level, format);

    let store = open_store(&settings, &geocast_home())?;
    let records = store.count().context("database is not readable")?;
    tracing::info!(records, "location store ready");

    let metrics = match install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder not installed, /metrics disabled");
            None
        }
    };

    let config = ServerConfig::from_settings(&settings);
    let server = GeocastServer::new(config, Arc::new(store), metrics);
    let (addr, handle) = server
        .listen()
        .await
        .with_context(|| format!("failed to bind {}", server.config().bind_addr()))?;
    tracing::info!(%addr, version = geocast_core::constants::VERSION, "geocast started");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown requested");
    server.shutdown().graceful_shutdown(vec![handle], None).await;
    tracing::info!("geocast stopped");
    Ok(())
}
