//! Clock Signal service binary.
//!
//! Wires the settings store, paced sessions, notification hub, and
//! lifecycle controller together and serves the control API until
//! `Ctrl-C`. Runs are started and stopped over HTTP, not at startup.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `clocksignal-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Open the JSON settings store
//! 4. Assemble the service around paced sessions
//! 5. Start the API server
//! 6. Wait for `Ctrl-C`
//! 7. Stop any active run, then shut the server down

mod error;

use std::path::Path;
use std::sync::Arc;

use clocksignal_core::config::ClockSignalConfig;
use clocksignal_core::session::{PacedSessionFactory, SessionFactory};
use clocksignal_core::settings::{JsonFileSettingsStore, SettingsStore};
use clocksignal_observer::state::AppState;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Default configuration file, relative to the working directory.
const CONFIG_PATH: &str = "clocksignal-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded, the server cannot
/// bind, or the active run does not stop within the stop timeout.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging. RUST_LOG wins over the config level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("clocksignal-engine starting");
    if !from_file {
        info!(path = CONFIG_PATH, "Config file not found, using defaults");
    }
    info!(
        host = config.server.host,
        port = config.server.port,
        settings_path = %config.settings.path.display(),
        stop_timeout_ms = config.service.stop_timeout_ms,
        tick_interval_ms = config.session.tick_interval_ms,
        "Configuration loaded"
    );

    // 3. Open the settings store.
    let store: Arc<dyn SettingsStore> =
        Arc::new(JsonFileSettingsStore::new(config.settings.path.clone()));
    if let Err(e) = store.get() {
        warn!(error = %e, "Stored run settings are unreadable, fix them before starting a run");
    }

    // 4. Assemble the service.
    let sessions: Arc<dyn SessionFactory> =
        Arc::new(PacedSessionFactory::new(config.session.tick_interval()));
    let state = Arc::new(AppState::assemble(
        store,
        sessions,
        config.service.notification_capacity,
        config.service.stop_timeout(),
    ));

    // 5. Start the API server.
    let shutdown = CancellationToken::new();
    let server = clocksignal_observer::spawn_server(
        &config.server,
        Arc::clone(&state),
        shutdown.clone(),
    )
    .await?;
    info!(addr = %server.addr, "Clock Signal API ready");

    // 6. Wait for Ctrl-C.
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C, shutting down");
    }
    info!("Shutdown requested");

    // 7. Stop the run, then the server.
    let stopped = state.service.stop().await;
    match &stopped {
        Ok(()) => info!("Run state settled"),
        Err(e) => error!(error = %e, "Active run did not stop cleanly"),
    }

    shutdown.cancel();
    if let Err(e) = server.task.await {
        error!(error = %e, "Server task panicked");
    }

    info!("clocksignal-engine stopped");
    stopped.map_err(EngineError::from)
}

/// Load configuration from `clocksignal-config.yaml` in the working
/// directory.
///
/// Falls back to defaults (with environment overrides) when the file
/// does not exist. The flag reports whether the file was read.
fn load_config() -> Result<(ClockSignalConfig, bool), EngineError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        Ok((ClockSignalConfig::from_file(config_path)?, true))
    } else {
        let mut config = ClockSignalConfig::default();
        config.apply_env_overrides();
        Ok((config, false))
    }
}
