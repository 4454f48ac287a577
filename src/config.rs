//! Startup configuration loading with env-var overrides.
//!
//! Reads the JSON startup document at `./init.json` (or `PARLEY_INIT`), then
//! applies the `PARLEY_LOG_LEVEL` override. Any problem here is fatal: the
//! process cannot serve without credentials and paths.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::logger;

/// Startup document path used when `PARLEY_INIT` is unset.
pub const DEFAULT_INIT_PATH: &str = "./init.json";

/// Generation backend settings.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL; requests go to `<api_url>/api/chat`.
    pub api_url: String,
    /// Per-attempt HTTP timeout.
    pub timeout: Duration,
}

/// Fully-resolved startup configuration.
#[derive(Clone)]
pub struct Config {
    /// One platform credential per bot identity. Never logged.
    pub credentials: Vec<String>,
    /// Handles allowed to talk to the bots in private chats.
    pub admins: Vec<String>,
    /// bot handle -> command tokens recognised by that bot.
    pub orders: HashMap<String, Vec<String>>,
    /// Directory holding the per-bot parameter profiles.
    pub profile_dir: PathBuf,
    /// JSON file holding the shared reply-chain memory.
    pub history_path: PathBuf,
    /// Upper bound on reconstructed dialogue length.
    pub memory_limit: usize,
    pub backend: BackendConfig,
    pub log_level: String,
    /// Set when the log level came from `PARLEY_LOG_LEVEL`.
    pub log_level_overridden: bool,
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Command tokens for `handle`; empty when the bot has none configured.
    pub fn orders_for(&self, handle: &str) -> Vec<String> {
        self.orders.get(handle).cloned().unwrap_or_default()
    }

    /// Profile path template for `handle`, with one `%s` slot for the order.
    pub fn profile_template(&self, handle: &str) -> String {
        self.profile_dir
            .join(format!("{handle}%s.json"))
            .to_string_lossy()
            .into_owned()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("credentials", &format_args!("[{} redacted]", self.credentials.len()))
            .field("admins", &self.admins)
            .field("orders", &self.orders)
            .field("profile_dir", &self.profile_dir)
            .field("history_path", &self.history_path)
            .field("memory_limit", &self.memory_limit)
            .field("backend", &self.backend)
            .field("log_level", &self.log_level)
            .field("log_file", &self.log_file)
            .finish()
    }
}

/// Raw JSON shape, the `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(rename = "keysAPI")]
    keys_api: Vec<String>,
    #[serde(default)]
    admins: Vec<String>,
    #[serde(default)]
    orders: HashMap<String, Vec<String>>,
    config_path: String,
    history_path: String,
    memory_limit: usize,
    #[serde(default = "default_api_url")]
    api_url: String,
    #[serde(default = "default_request_timeout_seconds")]
    request_timeout_seconds: u64,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
}

fn default_api_url() -> String { "http://0.0.0.0:8000".to_string() }
fn default_request_timeout_seconds() -> u64 { 300 }
fn default_log_level() -> String { "info".to_string() }

/// Load the startup document named by `PARLEY_INIT` (default `./init.json`),
/// then apply env-var overrides.
pub fn load() -> Result<Config, AppError> {
    let path = env::var("PARLEY_INIT").unwrap_or_else(|_| DEFAULT_INIT_PATH.to_string());
    let log_level_override = env::var("PARLEY_LOG_LEVEL").ok();
    load_from(Path::new(&path), log_level_override.as_deref())
}

/// Internal loader: explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(path: &Path, log_level_override: Option<&str>) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = serde_json::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    if parsed.keys_api.is_empty() {
        return Err(AppError::Config("keysAPI must list at least one credential".into()));
    }
    if parsed.keys_api.iter().any(|k| k.trim().is_empty()) {
        return Err(AppError::Config("keysAPI contains an empty credential".into()));
    }
    if parsed.memory_limit == 0 {
        return Err(AppError::Config("memory_limit must be a positive integer".into()));
    }

    let log_level = log_level_override.unwrap_or(&parsed.log_level).to_string();
    logger::check_filter(&log_level)
        .map_err(|e| AppError::Config(format!("log_level: {e}")))?;

    Ok(Config {
        credentials: parsed.keys_api,
        admins: parsed.admins,
        orders: parsed.orders,
        profile_dir: expand_home(&parsed.config_path),
        history_path: expand_home(&parsed.history_path),
        memory_limit: parsed.memory_limit,
        backend: BackendConfig {
            api_url: parsed.api_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(parsed.request_timeout_seconds),
        },
        log_level,
        log_level_overridden: log_level_override.is_some(),
        log_file: parsed.log_file.as_deref().map(expand_home),
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
