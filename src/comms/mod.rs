//! Comms — the messaging-platform side of a bot.
//!
//! Incoming traffic reaches a worker as a stream of [`ChatMessage`]s; the
//! only outbound operations a worker needs are a text message (optionally
//! replying to another) and the "typing" chat action. [`Messenger`] is that
//! outbound capability; each platform binding implements it.

#[cfg(feature = "channel-telegram")]
pub mod telegram;
pub mod typing;

use std::future::Future;

use tracing::warn;

use crate::chat::ChatMessage;
use crate::error::AppError;

/// Outbound side of a platform connection for one bot identity.
pub trait Messenger: Send + Sync + 'static {
    /// Post `text` to `chat_id`, as a reply to message `reply_to` when set.
    /// Returns the message as the platform stored it.
    fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
    ) -> impl Future<Output = Result<ChatMessage, AppError>> + Send;

    /// Show the "typing" indicator in `chat_id`.
    fn send_typing(&self, chat_id: i64) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Reply to `msg` with `text`. If the platform refuses the reply target
/// (e.g. the message was deleted meanwhile), post once more without it.
pub async fn reply<M: Messenger>(
    messenger: &M,
    msg: &ChatMessage,
    text: &str,
) -> Result<ChatMessage, AppError> {
    match messenger.send_text(msg.chat.id, text, Some(msg.id)).await {
        Ok(sent) => Ok(sent),
        Err(e) => {
            warn!(chat_id = msg.chat.id, error = %e, "reply failed, posting without reply target");
            messenger.send_text(msg.chat.id, text, None).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::chat::{ChatInfo, ChatKind};

    /// Refuses replies with a target; accepts plain posts.
    #[derive(Default)]
    struct NoReplyTargets {
        sent: Mutex<Vec<(i64, String, Option<i32>)>>,
    }

    impl Messenger for NoReplyTargets {
        async fn send_text(&self, chat_id: i64, text: &str, reply_to: Option<i32>) -> Result<ChatMessage, AppError> {
            self.sent.lock().unwrap().push((chat_id, text.to_string(), reply_to));
            if reply_to.is_some() {
                return Err(AppError::Platform("message to be replied not found".into()));
            }
            Ok(ChatMessage {
                id: 99,
                chat: ChatInfo { id: chat_id, kind: ChatKind::Group, title: None },
                from: None,
                text: Some(text.to_string()),
                caption: None,
                reply_to: None,
            })
        }

        async fn send_typing(&self, _chat_id: i64) -> Result<(), AppError> {
            Ok(())
        }
    }

    fn incoming() -> ChatMessage {
        ChatMessage {
            id: 12,
            chat: ChatInfo { id: -300, kind: ChatKind::Group, title: Some("Lounge".into()) },
            from: None,
            text: Some("hi".into()),
            caption: None,
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn reply_falls_back_to_plain_message() {
        let m = NoReplyTargets::default();
        let sent = reply(&m, &incoming(), "hello").await.unwrap();
        assert_eq!(sent.text.as_deref(), Some("hello"));

        let calls = m.sent.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (-300, "hello".to_string(), Some(12)));
        assert_eq!(calls[1], (-300, "hello".to_string(), None));
    }
}
