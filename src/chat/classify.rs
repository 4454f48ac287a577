//! Addressing classifier — is this message for this bot?
//!
//! In public chats a bot answers replies to itself, mentions of its first
//! name, and configured command tokens ("orders"). In private chats it only
//! answers administrators.

use super::render::{sender_name, substitute_mention};
use super::{BotIdentity, ChatMessage, Utterance};

/// Classification context for one incoming message as seen by one bot.
#[derive(Debug, Clone)]
pub struct Addressing<'a> {
    pub me: &'a BotIdentity,
    pub msg: &'a ChatMessage,
    /// Rendered sender name (`"Alice"`, `"Anonymous"`, …).
    pub sender: String,
    /// Message text with the bot's `@handle` already rewritten.
    pub text: String,
    /// Matched command token, empty when none matched.
    pub order: String,
}

impl<'a> Addressing<'a> {
    /// Build the context, or `None` when the message carries no text at all.
    pub fn inspect(msg: &'a ChatMessage, me: &'a BotIdentity, orders: &[String]) -> Option<Self> {
        let raw = msg.text()?;
        let text = substitute_mention(raw, me);
        let order = get_order(&text, orders).to_string();
        Some(Self { me, msg, sender: sender_name(msg.sender()), text, order })
    }

    /// Direct reply to one of this bot's messages.
    pub fn is_replied(&self) -> bool {
        self.msg
            .reply_to()
            .and_then(|parent| parent.from.as_ref())
            .is_some_and(|from| from.id == self.me.id)
    }

    /// Text names the bot. Matches the first name, which is what mentions
    /// are rewritten into.
    pub fn is_mentioned(&self) -> bool {
        !self.me.first_name.is_empty() && self.text.contains(&self.me.first_name)
    }

    pub fn is_ordered(&self) -> bool {
        !self.order.is_empty()
    }

    /// Sender handle is on the allow-list. A leading `@` is ignored on both sides.
    pub fn is_admin(&self, admins: &[String]) -> bool {
        let Some(handle) = self.msg.from.as_ref().and_then(|f| f.username.as_deref()) else {
            return false;
        };
        let handle = handle.trim_start_matches('@');
        !handle.is_empty() && admins.iter().any(|a| a.trim_start_matches('@') == handle)
    }
}

/// True when the message is addressed to the bot in `ctx`.
pub fn is_asked(ctx: &Addressing<'_>, admins: &[String]) -> bool {
    let kind = ctx.msg.chat.kind;
    let asked_publicly = kind.is_public() && (ctx.is_replied() || ctx.is_mentioned() || ctx.is_ordered());
    let asked_privately = kind == super::ChatKind::Private && ctx.is_admin(admins);
    asked_publicly || asked_privately
}

/// First token of `orders` that occurs anywhere in `text`, or `""`.
///
/// Matching is by substring, so `/sum` also fires inside `(/summary)`.
/// Empty tokens never match.
pub fn get_order<'o>(text: &str, orders: &'o [String]) -> &'o str {
    orders
        .iter()
        .find(|o| !o.is_empty() && text.contains(o.as_str()))
        .map(String::as_str)
        .unwrap_or("")
}
