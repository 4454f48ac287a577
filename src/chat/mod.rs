//! Platform-neutral message model.
//!
//! Platform bindings (see [`crate::comms`]) convert their native messages
//! into [`ChatMessage`] before anything else looks at them. The renderer and
//! the classifier only depend on the [`Utterance`] capability set, so any
//! value that can report its text and sender can be turned into a line.

pub mod classify;
pub mod render;

pub use classify::{Addressing, get_order, is_asked};
pub use render::{Line, render};

/// Identity of the bot a worker speaks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: u64,
    /// Platform handle without the leading `@`.
    pub handle: String,
    pub first_name: String,
}

impl BotIdentity {
    /// The `@handle` form users type to mention the bot.
    pub fn mention(&self) -> String {
        format!("@{}", self.handle)
    }
}

/// Author of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: u64,
    pub username: Option<String>,
    pub first_name: String,
    pub is_bot: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    /// Group and super-group chats are the public channels bots answer in.
    pub fn is_public(self) -> bool {
        matches!(self, ChatKind::Group | ChatKind::Supergroup)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatInfo {
    pub id: i64,
    pub kind: ChatKind,
    /// Group title; `None` for private chats.
    pub title: Option<String>,
}

/// One incoming or outgoing platform message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: i32,
    pub chat: ChatInfo,
    /// `None` when the platform hides the author.
    pub from: Option<Sender>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub reply_to: Option<Box<ChatMessage>>,
}

impl ChatMessage {
    /// Key the memory store files this message's chat under: the sender id
    /// for private chats, the chat id otherwise.
    pub fn chat_key(&self) -> i64 {
        match (self.chat.kind, &self.from) {
            (ChatKind::Private, Some(from)) => from.id as i64,
            _ => self.chat.id,
        }
    }

    pub fn reply_to(&self) -> Option<&ChatMessage> {
        self.reply_to.as_deref()
    }
}

/// Capability set shared by everything that can be rendered into a line.
pub trait Utterance {
    /// Primary text, falling back to the caption. Empty strings count as absent.
    fn text(&self) -> Option<&str>;
    fn sender(&self) -> Option<&Sender>;
}

impl Utterance for ChatMessage {
    fn text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or_else(|| self.caption.as_deref().filter(|c| !c.is_empty()))
    }

    fn sender(&self) -> Option<&Sender> {
        self.from.as_ref()
    }
}
