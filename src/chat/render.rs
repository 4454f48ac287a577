//! Line renderer — deterministic single-line rendering of a message.
//!
//! A line is the unit the memory store keys on and the unit sent to the
//! generation backend, so two renders of the same message must agree
//! byte-for-byte.

use super::{BotIdentity, Sender, Utterance};

/// Rendered form of one message. The empty line means "no line".
pub type Line = String;

const ANONYMOUS: &str = "Anonymous";

/// Render `msg` as seen by bot `me`, with `order` the matched command token
/// (empty when none matched).
///
/// - absent message or no text/caption → `""`
/// - `@<handle>` → `<first name>,`
/// - non-empty `order` → text with every `order` removed, no sender prefix
/// - otherwise `"<Sender>: <text>"`
pub fn render<U: Utterance>(msg: Option<&U>, me: &BotIdentity, order: &str) -> Line {
    let Some(msg) = msg else {
        return Line::new();
    };
    let Some(text) = msg.text() else {
        return Line::new();
    };

    let text = substitute_mention(text, me);
    if !order.is_empty() {
        return text.replace(order, "");
    }

    format!("{}: {text}", sender_name(msg.sender()))
}

/// Rewrite every `@<handle>` of `me` into `<first name>,`.
pub fn substitute_mention(text: &str, me: &BotIdentity) -> String {
    if me.handle.is_empty() {
        return text.to_string();
    }
    text.replace(&me.mention(), &format!("{},", me.first_name))
}

/// Display name for a line prefix: bots go by first name, users by handle.
pub fn sender_name(sender: Option<&Sender>) -> String {
    let name = match sender {
        Some(s) if s.is_bot => s.first_name.as_str(),
        Some(s) => s
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(s.first_name.as_str()),
        None => ANONYMOUS,
    };
    if name.is_empty() {
        return ANONYMOUS.to_string();
    }
    capitalize(name)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
