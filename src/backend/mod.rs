//! Generation backend — turns a dialogue into reply text.
//!
//! [`Backend`] is the seam the bot worker talks to; [`BackendClient`] is the
//! HTTP implementation against the `/api/chat` endpoint. Workers are
//! generic over `Backend`, so no trait objects or `async-trait` are needed.

pub mod client;
pub mod profile;

pub use client::BackendClient;
pub use profile::{Profile, profile_path};

use std::future::Future;
use std::path::Path;

use thiserror::Error;

use crate::chat::Line;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("profile error: {0}")]
    Profile(String),
    #[error("backend request failed: {0}")]
    Request(String),
    #[error("backend returned status {0}")]
    Status(u16),
    #[error("backend response undecodable: {0}")]
    Decode(String),
}

/// Anything that can answer a dialogue.
pub trait Backend: Send + Sync + 'static {
    /// Produce the bot's next line for `dialogue` (oldest first), using the
    /// parameter profile at `profile_path`. `chat_title` fills the system
    /// prompt's `%s`, if it has one.
    fn generate(
        &self,
        dialogue: &[Line],
        profile_path: &Path,
        chat_title: &str,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;
}
