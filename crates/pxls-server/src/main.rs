//! Server binary for the Pxls shared canvas.
//!
//! Wires the core together, restores the persisted board, and serves the
//! HTTP API until interrupted.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `pxls-config.yaml` (or `PXLS_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Allocate the board and restore it from the board file
//! 4. Start the background persister and the cooldown sweeper
//! 5. Serve HTTP until Ctrl-C
//! 6. Write a final save and exit

mod error;
mod sweeper;

use std::path::PathBuf;
use std::sync::Arc;

use pxls_api::AppState;
use pxls_core::config::PxlsConfig;
use pxls_core::{
    Board, BroadcastHub, Clock, CooldownTracker, FileStorage, Persister, PlacementService,
    SystemClock,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::LaunchError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "pxls-config.yaml";

/// Application entry point for the server.
///
/// # Errors
///
/// Returns an error if any initialization step or the server itself fails.
#[tokio::main]
async fn main() -> Result<(), LaunchError> {
    // 1. Load configuration. Logging is not up yet, so remember whether
    //    defaults were used and report it afterwards.
    let (config, config_path) = load_config()?;

    // 2. Initialize structured logging. RUST_LOG wins over the config.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("pxls-server starting");
    match &config_path {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Config file not found, using defaults"),
    }
    info!(
        width = config.board.width,
        height = config.board.height,
        colors = config.board.palette.len(),
        cooldown_seconds = config.game.cooldown_seconds,
        "Canvas configuration"
    );

    // 3. Allocate and restore the board.
    let board = Arc::new(Board::new(
        config.board.width,
        config.board.height,
        config.palette()?,
    )?);
    let storage = Arc::new(FileStorage::new(config.board.file.clone()));
    let board_file = storage.path().display().to_string();
    let persister = Persister::new(Arc::clone(&board), storage);
    if persister.restore()? {
        info!(%board_file, "Board restored from disk");
    } else {
        info!(%board_file, "No saved board, starting blank");
        // Write the blank board now so an unwritable path shows up at startup.
        if let Err(e) = persister.save_now() {
            warn!(%board_file, error = %e, "board file is not writable, placements will not persist");
        }
    }

    // 4. Background tasks.
    let persist = persister.handle();
    let persist_task = persister.spawn();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cooldowns = Arc::new(CooldownTracker::with_retention(
        config.game.cooldown(),
        config.game.cooldown_retention(),
    ));
    let sweep_task = sweeper::spawn_sweeper(
        Arc::clone(&cooldowns),
        Arc::clone(&clock),
        config.game.sweep_interval(),
    );

    let hub = Arc::new(BroadcastHub::new(config.server.subscriber_buffer));
    let placement = Arc::new(PlacementService::new(
        board,
        cooldowns,
        hub,
        persist.clone(),
        clock,
    ));

    let mut state = AppState::new(placement);
    match config.server.admin_token.clone() {
        Some(token) => state = state.with_admin_token(token),
        None => info!("No admin token configured, operator routes disabled"),
    }

    // 5. Serve until interrupted.
    let served = pxls_api::start_server(&config.server, Arc::new(state), shutdown_signal()).await;

    // 6. Flush the board whether or not the server exited cleanly.
    sweep_task.abort();
    persist.shutdown();
    persist_task.await.map_err(|e| LaunchError::Persister {
        message: format!("persister task failed: {e}"),
    })?;
    info!(
        saves = persist.completed_saves(),
        failed_saves = persist.failed_saves(),
        "pxls-server shutdown complete"
    );

    served?;
    Ok(())
}

/// Load configuration from `PXLS_CONFIG` or [`DEFAULT_CONFIG_PATH`].
///
/// A missing file yields the defaults (with environment overrides
/// applied); any other read or parse failure is an error. Returns the
/// path that was read, if any.
fn load_config() -> Result<(PxlsConfig, Option<PathBuf>), LaunchError> {
    let path = std::env::var_os("PXLS_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        let config = PxlsConfig::from_file(&path)?;
        Ok((config, Some(path)))
    } else {
        let config = PxlsConfig::parse("")?;
        Ok((config, None))
    }
}

/// Resolve when the process receives Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C, shutting down");
    }
    info!("Shutdown signal received");
}
