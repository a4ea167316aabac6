//! SensorHub service binary.
//!
//! Wires together the reading store, the single writer, the observer
//! registry, and the HTTP/`WebSocket` API, then serves until a shutdown
//! signal arrives.
//!
//! # Startup Sequence
//!
//! 1. Read `.env`, then load configuration from `sensorhub-config.yaml`
//!    (or `SENSORHUB_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Connect the reading store (`PostgreSQL` + migrations, or memory)
//! 4. Spawn the writer and assemble the API state
//! 5. Install Ctrl-C / SIGTERM handlers
//! 6. Serve until shutdown
//!
//! # Shutdown Sequence
//!
//! 1. Cancel the shutdown token: the server stops accepting connections,
//!    waiting submitters get a cancellation response, and `WebSocket`
//!    streams close
//! 2. Wait for the writer to drain whatever is already queued
//! 3. Close the database pool

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sensorhub_api::{AppState, start_server};
use sensorhub_core::config::{
    CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, ENV_FILE, LoggingConfig, StorageConfig,
};
use sensorhub_core::{Environment, HubConfig, StorageBackend};
use sensorhub_db::{MemoryReadingStore, PgReadingStore, ReadingStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// How long shutdown waits for the writer to finish queued requests.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, the store, or the server fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let env = Environment::load(Path::new(ENV_FILE)).map_err(EngineError::from)?;
    let config_path = env
        .get(CONFIG_PATH_ENV)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config_found = config_path.exists();
    let config = HubConfig::load_or_default(&config_path, &env).map_err(EngineError::from)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);

    info!("sensorhub-engine starting");
    if env.file_len() > 0 {
        info!(path = ENV_FILE, variables = env.file_len(), "Environment file loaded");
    }
    if config_found {
        info!(path = %config_path.display(), "Configuration loaded");
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }
    info!(
        bind = %config.server.bind_address(),
        backend = ?config.storage.backend,
        submit_timeout_ms = config.ingest.submit_timeout_ms,
        snapshot_limit = config.ingest.snapshot_limit,
        "Configuration resolved"
    );

    // 3. Connect the reading store.
    let (store, pg) = connect_store(&config.storage).await?;
    info!(backend = store.backend(), "Reading store ready");

    // 4. Spawn the writer and assemble API state.
    let shutdown = CancellationToken::new();
    let (state, writer) = AppState::start(store, &config.ingest, shutdown.clone());
    info!("Writer spawned");

    // 5. Install signal handlers.
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(signal) => info!(signal, "Shutdown signal received"),
            Err(e) => error!(error = %e, "Signal handler failed, shutting down"),
        }
        signal_token.cancel();
    });

    // 6. Serve until shutdown.
    let served = start_server(&config.server, Arc::new(state), shutdown.clone()).await;
    if let Err(e) = &served {
        error!(error = %e, "Server exited with error");
    }
    shutdown.cancel();

    // Drain the writer. It exits once the last API state clone is gone.
    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await {
        Ok(Ok(summary)) => info!(
            accepted = summary.accepted,
            persisted = summary.persisted,
            failed = summary.failed,
            "Writer drained"
        ),
        Ok(Err(e)) => error!(error = %e, "Writer task failed"),
        Err(_elapsed) => warn!(
            timeout_secs = WRITER_DRAIN_TIMEOUT.as_secs(),
            "Writer did not drain in time"
        ),
    }

    if let Some(pg) = pg {
        pg.close().await;
    }

    served.map_err(EngineError::from)?;
    info!("sensorhub-engine shutdown complete");
    Ok(())
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
fn init_tracing(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Connect the configured backend. The Postgres handle is returned
/// separately so its pool can be closed after the writer drains.
async fn connect_store(
    config: &StorageConfig,
) -> Result<(ReadingStore, Option<PgReadingStore>), EngineError> {
    match config.backend {
        StorageBackend::Postgres => {
            let pg = PgReadingStore::connect(&config.postgres_url, config.max_connections).await?;
            pg.migrate().await?;
            Ok((ReadingStore::from(pg.clone()), Some(pg)))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory store, readings are lost on restart");
            Ok((ReadingStore::from(MemoryReadingStore::new()), None))
        }
    }
}

/// Resolve on Ctrl-C or, on Unix, SIGTERM. Returns the signal's name.
async fn shutdown_signal() -> Result<&'static str, EngineError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate()).map_err(|e| EngineError::Signal {
            message: format!("failed to install SIGTERM handler: {e}"),
        })?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => result
                .map(|()| "ctrl-c")
                .map_err(|e| EngineError::Signal {
                    message: format!("failed to listen for ctrl-c: {e}"),
                }),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| EngineError::Signal {
                message: format!("failed to listen for ctrl-c: {e}"),
            })?;
        Ok("ctrl-c")
    }
}
