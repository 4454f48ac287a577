//! Per-bot parameter profiles and how an order picks one.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::BackendError;

/// Generation knobs forwarded verbatim to the backend.
///
/// Every knob is optional: a key absent from the file is absent from the
/// request too, so the backend applies its own default. Keys this struct
/// does not name are kept in `extra` and sent back out unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// May contain one `%s`, filled with the chat title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub think_prompts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_token_shift: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_tokens: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resp_batch_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_batch_size: Option<i64>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self, BackendError> {
        let data = fs::read_to_string(path)
            .map_err(|e| BackendError::Profile(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&data)
            .map_err(|e| BackendError::Profile(format!("malformed {}: {e}", path.display())))
    }

    /// Fill the first `%s` of the system prompt with `chat_title`.
    /// Prompts without a placeholder are left alone.
    pub fn with_chat_title(mut self, chat_title: &str) -> Self {
        if let Some(prompt) = self.system_prompt.as_mut().filter(|p| p.contains("%s")) {
            *prompt = prompt.replacen("%s", chat_title, 1);
        }
        self
    }
}

/// Resolve the profile file for `order` from a template with one `%s`.
///
/// A leading `/` in the order becomes `_`, so `"/translate"` turns
/// `/cfg/bravo_bot%s.json` into `/cfg/bravo_bot_translate.json` and the empty
/// order collapses the slot to `/cfg/bravo_bot.json`.
pub fn profile_path(template: &str, order: &str) -> PathBuf {
    let suffix = match order.strip_prefix('/') {
        Some(rest) => format!("_{rest}"),
        None => order.to_string(),
    };
    PathBuf::from(template.replacen("%s", &suffix, 1))
}
