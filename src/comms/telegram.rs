//! Telegram binding — one [`TelegramBot`] component per configured token.
//!
//! The teloxide dispatcher converts each incoming message into a
//! [`ChatMessage`] and queues it for the bot's worker; the worker answers
//! through [`TelegramMessenger`].

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{ChatAction, MessageId, ReplyParameters, User};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Messenger;
use crate::chat::{BotIdentity, ChatInfo, ChatKind, ChatMessage, Sender};
use crate::error::AppError;
use crate::runtime::{Component, ComponentFuture};
use crate::supervisor::Shared;
use crate::worker::{BotWorker, WorkerSettings};

/// Telegram refuses messages longer than this many characters.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// Messages queued between the dispatcher and the worker.
const UPDATE_BUFFER: usize = 64;

// ── TelegramMessenger ────────────────────────────────────────────────────────

/// Outbound half of one bot's connection.
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat_id: i64, text: &str, reply_to: Option<i32>) -> Result<ChatMessage, AppError> {
        let mut request = self.bot.send_message(ChatId(chat_id), truncate(text));
        if let Some(id) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(MessageId(id)));
        }
        let sent = request
            .await
            .map_err(|e| AppError::Platform(format!("send_message: {e}")))?;
        Ok(to_chat_message(&sent))
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), AppError> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
            .map(|_| ())
            .map_err(|e| AppError::Platform(format!("send_chat_action: {e}")))
    }
}

/// Cut `text` to [`MAX_MESSAGE_LENGTH`] characters.
pub fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_MESSAGE_LENGTH) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

// ── Conversion ───────────────────────────────────────────────────────────────

/// Convert a teloxide message (and the message it replies to) into the
/// platform-neutral model.
///
/// Messages sent on behalf of a chat (anonymous group admins, channel
/// posts) carry a placeholder user such as `GroupAnonymousBot` in `from`;
/// their author is treated as hidden.
pub fn to_chat_message(msg: &Message) -> ChatMessage {
    let chat = &msg.chat;
    let kind = if chat.is_private() {
        ChatKind::Private
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else if chat.is_group() {
        ChatKind::Group
    } else {
        ChatKind::Channel
    };

    ChatMessage {
        id: msg.id.0,
        chat: ChatInfo { id: chat.id.0, kind, title: chat.title().map(str::to_string) },
        from: match msg.sender_chat {
            Some(_) => None,
            None => msg.from.as_ref().map(to_sender),
        },
        text: msg.text().map(str::to_string),
        caption: msg.caption().map(str::to_string),
        reply_to: msg.reply_to_message().map(|m| Box::new(to_chat_message(m))),
    }
}

fn to_sender(user: &User) -> Sender {
    Sender {
        id: user.id.0,
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        is_bot: user.is_bot,
    }
}

// ── TelegramBot ──────────────────────────────────────────────────────────────

/// One bot identity: authorizes its token, then runs dispatcher and worker.
pub struct TelegramBot {
    component_id: String,
    token: String,
    shared: Arc<Shared>,
}

impl TelegramBot {
    pub fn new(component_id: impl Into<String>, token: impl Into<String>, shared: Arc<Shared>) -> Self {
        Self { component_id: component_id.into(), token: token.into(), shared }
    }
}

impl Component for TelegramBot {
    fn id(&self) -> &str {
        &self.component_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_telegram(self.component_id, self.token, self.shared, shutdown))
    }
}

async fn run_telegram(
    component_id: String,
    token: String,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let bot = Bot::new(token);
    let me = bot
        .get_me()
        .await
        .map_err(|e| AppError::Platform(format!("authorization failed: {e}")))?;
    let identity = BotIdentity {
        id: me.user.id.0,
        handle: me.username().to_string(),
        first_name: me.user.first_name.clone(),
    };
    info!(%component_id, bot = %identity.handle, "authorized");

    let settings = WorkerSettings::for_bot(&shared.config, &identity.handle);
    let worker = BotWorker::new(
        identity,
        settings,
        &shared.memory,
        Arc::new(TelegramMessenger::new(bot.clone())),
        shared.backend.clone(),
        shutdown.clone(),
    )?;
    if let Err(e) = worker.prepare().await {
        warn!(%component_id, error = %e, "initial history cleanup failed");
    }

    let (tx, rx) = mpsc::channel::<ChatMessage>(UPDATE_BUFFER);
    let handler = Update::filter_message().endpoint(move |msg: Message| {
        let tx = tx.clone();
        async move {
            debug!(chat_id = msg.chat.id.0, message_id = msg.id.0, "telegram update");
            if tx.send(to_chat_message(&msg)).await.is_err() {
                debug!("worker gone, update dropped");
            }
            respond(())
        }
    });

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .build();

    tokio::select! {
        biased;

        _ = shutdown.cancelled() => {
            info!(%component_id, "shutdown signal received, closing telegram bot");
        }
        _ = dispatcher.dispatch() => {
            warn!(%component_id, "telegram dispatcher exited unexpectedly");
        }
        _ = worker.run(rx) => {
            warn!(%component_id, "bot worker exited");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::render;
    use serde_json::json;

    fn bravo() -> BotIdentity {
        BotIdentity { id: 1000, handle: "bravo_bot".into(), first_name: "Bravo".into() }
    }

    fn lounge() -> serde_json::Value {
        json!({ "id": -1001234, "type": "supergroup", "title": "Lounge" })
    }

    fn parse(value: serde_json::Value) -> Message {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn anonymous_admin_renders_as_anonymous() {
        let msg = parse(json!({
            "message_id": 5,
            "date": 1_700_000_000,
            "chat": lounge(),
            "from": { "id": 1087968824u64, "is_bot": true, "first_name": "Group", "username": "GroupAnonymousBot" },
            "sender_chat": lounge(),
            "text": "@bravo_bot hi"
        }));

        let converted = to_chat_message(&msg);
        assert!(converted.from.is_none());
        assert_eq!(converted.chat.kind, ChatKind::Supergroup);
        assert_eq!(render(Some(&converted), &bravo(), ""), "Anonymous: Bravo, hi");
    }

    #[test]
    fn regular_user_keeps_sender() {
        let msg = parse(json!({
            "message_id": 6,
            "date": 1_700_000_000,
            "chat": lounge(),
            "from": { "id": 42, "is_bot": false, "first_name": "Carol", "username": "carol" },
            "text": "Bravo, hi"
        }));

        let converted = to_chat_message(&msg);
        assert_eq!(converted.from.as_ref().map(|s| s.id), Some(42));
        assert_eq!(converted.chat.title.as_deref(), Some("Lounge"));
        assert_eq!(render(Some(&converted), &bravo(), ""), "Carol: Bravo, hi");
    }

    #[test]
    fn short_text_untouched() {
        assert_eq!(truncate("hello"), "hello");
    }

    #[test]
    fn long_text_cut_on_char_boundary() {
        let text = "é".repeat(MAX_MESSAGE_LENGTH + 10);
        let cut = truncate(&text);
        assert_eq!(cut.chars().count(), MAX_MESSAGE_LENGTH);
        assert!(text.starts_with(&cut));
    }
}
