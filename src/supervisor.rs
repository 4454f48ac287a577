//! Supervisor — starts one bot component per credential.
//!
//! All bots share one [`Shared`] bundle: the configuration, the memory store
//! and the backend client. A bot that fails to start or dies later is logged
//! by the runtime; the others keep serving.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::BackendClient;
use crate::config::Config;
use crate::memory::MemoryStore;
use crate::runtime::{Component, ComponentsHandle, spawn_components};

/// State every bot component captures at construction.
pub struct Shared {
    pub config: Arc<Config>,
    pub memory: MemoryStore,
    pub backend: Arc<BackendClient>,
}

/// Spawn one component per configured credential and return at once.
pub fn start(shared: Arc<Shared>, shutdown: CancellationToken) -> ComponentsHandle {
    let mut components: Vec<Box<dyn Component>> = Vec::new();

    #[cfg(feature = "channel-telegram")]
    {
        for (index, token) in shared.config.credentials.iter().enumerate() {
            components.push(Box::new(crate::comms::telegram::TelegramBot::new(
                format!("telegram{index}"),
                token.clone(),
                shared.clone(),
            )));
        }
    }

    if components.is_empty() {
        warn!("no platform binding compiled in, nothing to run");
    } else {
        info!(bots = components.len(), "starting bots");
    }

    spawn_components(components, shutdown)
}
