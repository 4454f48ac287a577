//! Bot worker — the per-identity update loop.
//!
//! One worker serves one bot identity. It consumes that bot's incoming
//! messages strictly in arrival order; for each one it decides whether the
//! bot is addressed, records the reply edge, asks the backend for a reply
//! (with the typing indicator running), posts it, records the bot's own
//! edge and persists the shared memory.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, profile_path};
use crate::chat::{Addressing, BotIdentity, ChatMessage, is_asked, render};
use crate::comms::{self, Messenger, typing};
use crate::config::Config;
use crate::error::AppError;
use crate::memory::{BotMemory, MemoryStore};

/// Per-bot knobs, resolved from [`Config`] once the bot's handle is known.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub admins: Vec<String>,
    pub orders: Vec<String>,
    /// Profile path with one `%s` slot for the order suffix.
    pub profile_template: String,
    pub memory_limit: usize,
}

impl WorkerSettings {
    pub fn for_bot(config: &Config, handle: &str) -> Self {
        Self {
            admins: config.admins.clone(),
            orders: config.orders_for(handle),
            profile_template: config.profile_template(handle),
            memory_limit: config.memory_limit,
        }
    }
}

/// What became of one incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No text, or the bot was not addressed.
    Ignored,
    /// Addressed, but the backend produced nothing to post.
    Dropped,
    /// Addressed and answered; the message as posted.
    Replied(ChatMessage),
    /// Addressed and generated, but the platform refused both posts.
    Unsent,
}

pub struct BotWorker<M, B> {
    me: BotIdentity,
    settings: WorkerSettings,
    memory: BotMemory,
    messenger: Arc<M>,
    backend: Arc<B>,
    shutdown: CancellationToken,
}

impl<M: Messenger, B: Backend> BotWorker<M, B> {
    pub fn new(
        me: BotIdentity,
        settings: WorkerSettings,
        store: &MemoryStore,
        messenger: Arc<M>,
        backend: Arc<B>,
        shutdown: CancellationToken,
    ) -> Result<Self, AppError> {
        let memory = store.bot(&me.handle)?;
        Ok(Self { me, settings, memory, messenger, backend, shutdown })
    }

    pub fn identity(&self) -> &BotIdentity {
        &self.me
    }

    /// Drop what expired while the process was down and write the result
    /// back before the first update is served.
    pub async fn prepare(&self) -> Result<(), AppError> {
        self.memory.store().persist().await
    }

    /// Serve updates until the stream closes or shutdown is requested.
    /// A failed update is logged; the loop goes on with the next one.
    pub async fn run(&self, mut updates: mpsc::Receiver<ChatMessage>) {
        loop {
            let msg = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,
                msg = updates.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };

            if let Err(e) = self.handle(&msg).await {
                error!(bot = %self.me.handle, chat_id = msg.chat.id, message_id = msg.id, error = %e, "update failed");
            }
        }
        debug!(bot = %self.me.handle, "update loop finished");
    }

    /// Process one message end to end.
    pub async fn handle(&self, msg: &ChatMessage) -> Result<Outcome, AppError> {
        let Some(ctx) = Addressing::inspect(msg, &self.me, &self.settings.orders) else {
            return Ok(Outcome::Ignored);
        };
        if !is_asked(&ctx, &self.settings.admins) {
            return Ok(Outcome::Ignored);
        }

        let order = ctx.order.clone();
        info!(
            bot = %self.me.handle,
            chat_id = msg.chat.id,
            from = %ctx.sender,
            order = %order,
            replied = ctx.is_replied(),
            "addressed"
        );

        let chat = self.memory.chat(msg.chat_key())?;
        let user_line = render(Some(msg), &self.me, &order);
        // Parent lines are keyed the way they were stored: no order stripping.
        let parent_line = render(msg.reply_to(), &self.me, "");
        chat.record(&user_line, &parent_line)?;

        let typing = typing::start(self.messenger.clone(), msg.chat.id, &self.shutdown);

        let mut dialogue = chat.dialogue(&user_line, &parent_line, self.settings.memory_limit)?;
        dialogue.retain(|line| !line.is_empty());
        let profile = profile_path(&self.settings.profile_template, &order);
        let title = msg.chat.title.as_deref().unwrap_or("");
        debug!(bot = %self.me.handle, lines = dialogue.len(), profile = %profile.display(), "generating");

        let text = match self.backend.generate(&dialogue, &profile, title).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                typing.stop().await;
                warn!(bot = %self.me.handle, chat_id = msg.chat.id, "backend returned empty text, nothing to post");
                self.memory.store().persist().await?;
                return Ok(Outcome::Dropped);
            }
            Err(e) => {
                typing.stop().await;
                warn!(bot = %self.me.handle, chat_id = msg.chat.id, error = %e, "generation failed, update dropped");
                self.memory.store().persist().await?;
                return Ok(Outcome::Dropped);
            }
        };

        let posted = comms::reply(self.messenger.as_ref(), msg, &text).await;
        typing.stop().await;

        let outcome = match posted {
            Ok(sent) => {
                let bot_line = render(Some(&sent), &self.me, "");
                chat.record(&bot_line, &user_line)?;
                info!(bot = %self.me.handle, chat_id = msg.chat.id, message_id = sent.id, "replied");
                Outcome::Replied(sent)
            }
            Err(e) => {
                warn!(bot = %self.me.handle, chat_id = msg.chat.id, error = %e, "could not post reply");
                Outcome::Unsent
            }
        };

        self.memory.store().persist().await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn settings_resolved_per_handle() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(
            br#"{ "keysAPI": ["k"], "admins": ["alice"], "orders": { "bravo_bot": ["/translate"] },
                 "config_path": "/cfg", "history_path": "/tmp/h.json", "memory_limit": 6 }"#,
        )
        .unwrap();
        let config = crate::config::load_from(f.path(), None).unwrap();

        let bravo = WorkerSettings::for_bot(&config, "bravo_bot");
        assert_eq!(bravo.orders, vec!["/translate"]);
        assert_eq!(bravo.profile_template, "/cfg/bravo_bot%s.json");
        assert_eq!(bravo.memory_limit, 6);
        assert_eq!(bravo.admins, vec!["alice"]);

        let charlie = WorkerSettings::for_bot(&config, "charlie_bot");
        assert!(charlie.orders.is_empty());
        assert_eq!(charlie.profile_template, "/cfg/charlie_bot%s.json");
    }
}
