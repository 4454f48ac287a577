//! Typing keep-alive — repeats the "typing" action until cancelled.
//!
//! Platforms expire the indicator after a few seconds, so it is re-sent on a
//! fixed cadence while a reply is being generated. The returned
//! [`TypingGuard`] cancels the loop when dropped, so every exit path of the
//! reply step stops it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{trace, warn};

use super::Messenger;

/// Cadence of the typing indicator.
pub const TYPING_INTERVAL: Duration = Duration::from_secs(3);

/// Keeps the typing loop alive; dropping it cancels the loop.
pub struct TypingGuard {
    cancel: DropGuard,
    task: JoinHandle<()>,
}

impl TypingGuard {
    /// Cancel the loop and wait until it has exited.
    pub async fn stop(self) {
        drop(self.cancel);
        if let Err(e) = self.task.await {
            warn!(error = %e, "typing task failed");
        }
    }
}

/// Start showing "typing" in `chat_id`: once immediately, then every
/// [`TYPING_INTERVAL`]. Also stops when `parent` is cancelled.
pub fn start<M: Messenger>(messenger: Arc<M>, chat_id: i64, parent: &CancellationToken) -> TypingGuard {
    start_with_interval(messenger, chat_id, parent, TYPING_INTERVAL)
}

pub fn start_with_interval<M: Messenger>(
    messenger: Arc<M>,
    chat_id: i64,
    parent: &CancellationToken,
    interval: Duration,
) -> TypingGuard {
    let token = parent.child_token();
    let loop_token = token.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;

                _ = loop_token.cancelled() => break,
                _ = ticker.tick() => {
                    match messenger.send_typing(chat_id).await {
                        Ok(()) => trace!(chat_id, "typing"),
                        Err(e) => warn!(chat_id, error = %e, "typing action failed"),
                    }
                }
            }
        }
    });

    TypingGuard { cancel: token.drop_guard(), task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::chat::ChatMessage;
    use crate::error::AppError;

    #[derive(Default)]
    struct CountingTyper {
        typed: AtomicUsize,
        failing: bool,
    }

    impl Messenger for CountingTyper {
        async fn send_text(&self, _: i64, _: &str, _: Option<i32>) -> Result<ChatMessage, AppError> {
            Err(AppError::Platform("not used".into()))
        }

        async fn send_typing(&self, _chat_id: i64) -> Result<(), AppError> {
            self.typed.fetch_add(1, Ordering::SeqCst);
            if self.failing {
                return Err(AppError::Platform("too many requests".into()));
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn types_on_cadence_until_stopped() {
        let m = Arc::new(CountingTyper::default());
        let guard = start(m.clone(), 5, &CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(6_500)).await;
        assert_eq!(m.typed.load(Ordering::SeqCst), 3);

        guard.stop().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(m.typed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_cadence() {
        let m = Arc::new(CountingTyper { failing: true, ..Default::default() });
        let guard = start(m.clone(), 5, &CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(9_500)).await;
        assert_eq!(m.typed.load(Ordering::SeqCst), 4);
        guard.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_guard_cancels() {
        let m = Arc::new(CountingTyper::default());
        {
            let _guard = start(m.clone(), 5, &CancellationToken::new());
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let before = m.typed.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(m.typed.load(Ordering::SeqCst), before);
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_stops_loop() {
        let m = Arc::new(CountingTyper::default());
        let parent = CancellationToken::new();
        let guard = start(m.clone(), 5, &parent);
        tokio::time::sleep(Duration::from_millis(100)).await;
        parent.cancel();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(m.typed.load(Ordering::SeqCst), 1);
        guard.stop().await;
    }
}
