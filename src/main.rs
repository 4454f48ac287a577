//! Parley bot — gateway entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load the startup document; any problem is fatal
//!   3. Init logger at the configured level
//!   4. Load the shared reply-chain memory
//!   5. Start one bot per credential
//!   6. Serve until Ctrl-C, then drain the bots

use std::sync::Arc;

use parley_bot::backend::BackendClient;
use parley_bot::error::AppError;
use parley_bot::memory::MemoryStore;
use parley_bot::supervisor::{self, Shared};
use parley_bot::{config, logger};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let config = config::load()?;
    logger::init(&config.log_level, config.log_level_overridden, config.log_file.as_deref())?;

    info!(
        bots = config.credentials.len(),
        history = %config.history_path.display(),
        profiles = %config.profile_dir.display(),
        memory_limit = config.memory_limit,
        backend = %config.backend.api_url,
        "config loaded"
    );

    let memory = MemoryStore::load(&config.history_path);
    let backend = BackendClient::new(&config.backend)
        .map_err(|e| AppError::Config(format!("backend client: {e}")))?;

    let shared = Arc::new(Shared {
        config: Arc::new(config),
        memory,
        backend: Arc::new(backend),
    });

    let shutdown = CancellationToken::new();
    let bots = supervisor::start(shared, shutdown.clone());

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("ctrl-c received, shutting down"),
        Err(e) => error!(error = %e, "cannot listen for ctrl-c, shutting down"),
    }
    shutdown.cancel();

    let summary = bots.join().await?;
    if !summary.failed.is_empty() {
        warn!(failed = ?summary.failed, "some bots stopped with errors");
    }
    info!(clean = summary.clean, "all bots stopped");
    Ok(())
}
