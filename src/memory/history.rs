//! In-memory shape of the reply-chain memory.
//!
//! `History` → bot handle → chat id → child line → [`MemoryEntry`].
//! Plain data with no locking; [`super::MemoryStore`] owns the lock.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::Line;

/// Entries older than this are evicted by [`History::sweep`].
pub const ENTRY_TTL_HOURS: i64 = 24;

pub fn entry_ttl() -> TimeDelta {
    TimeDelta::hours(ENTRY_TTL_HOURS)
}

/// The message a line replied to, and when that edge was last seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    #[serde(rename = "parent")]
    pub parent_line: Line,
    pub timestamp: DateTime<Utc>,
}

/// child line → entry, for one chat.
pub type ChatHistory = HashMap<Line, MemoryEntry>;

/// chat id → chat history, for one bot.
pub type BotHistory = HashMap<i64, ChatHistory>;

/// Every bot's memory. One per process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    bots: HashMap<String, BotHistory>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bot history for `handle`, installing an empty one if absent.
    pub fn bot_mut(&mut self, handle: &str) -> &mut BotHistory {
        self.bots.entry(handle.to_string()).or_default()
    }

    /// Chat history for `(handle, chat_id)`, installing empty maps as needed.
    pub fn chat_mut(&mut self, handle: &str, chat_id: i64) -> &mut ChatHistory {
        self.bot_mut(handle).entry(chat_id).or_default()
    }

    pub fn bot(&self, handle: &str) -> Option<&BotHistory> {
        self.bots.get(handle)
    }

    pub fn chat(&self, handle: &str, chat_id: i64) -> Option<&ChatHistory> {
        self.bots.get(handle).and_then(|b| b.get(&chat_id))
    }

    /// Total number of stored edges across all bots and chats.
    pub fn len(&self) -> usize {
        self.chats().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn chats(&self) -> impl Iterator<Item = &ChatHistory> {
        self.bots.values().flat_map(|b| b.values())
    }

    fn chats_mut(&mut self) -> impl Iterator<Item = &mut ChatHistory> {
        self.bots.values_mut().flat_map(|b| b.values_mut())
    }

    /// Evict every entry older than `ttl` at `now`. Returns how many went.
    pub fn sweep(&mut self, now: DateTime<Utc>, ttl: TimeDelta) -> usize {
        let mut evicted = 0;
        for chat in self.chats_mut() {
            let before = chat.len();
            chat.retain(|_, entry| now - entry.timestamp <= ttl);
            evicted += before - chat.len();
        }
        evicted
    }

    /// Drop entries with an empty child or parent line. Returns how many went.
    pub fn sanitize(&mut self) -> usize {
        let mut dropped = 0;
        for chat in self.chats_mut() {
            let before = chat.len();
            chat.retain(|child, entry| !child.is_empty() && !entry.parent_line.is_empty());
            dropped += before - chat.len();
        }
        dropped
    }
}

/// Store the reply edge `child → parent` seen at `at`.
///
/// Both lines must be non-empty; otherwise nothing is stored and `false` is
/// returned. Re-observing a child line overwrites its parent and timestamp.
pub fn record(chat: &mut ChatHistory, child: &str, parent: &str, at: DateTime<Utc>) -> bool {
    if child.is_empty() || parent.is_empty() {
        return false;
    }
    chat.insert(
        child.to_string(),
        MemoryEntry { parent_line: parent.to_string(), timestamp: at },
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazy_creation_installs_empty_maps() {
        let mut h = History::new();
        assert!(h.bot("bravo_bot").is_none());
        assert!(h.chat_mut("bravo_bot", -5).is_empty());
        assert!(h.bot("bravo_bot").is_some());
        assert!(h.chat("bravo_bot", -5).is_some());
        assert!(h.is_empty());
    }

    #[test]
    fn record_rejects_empty_lines() {
        let mut chat = ChatHistory::new();
        let now = Utc::now();
        assert!(!record(&mut chat, "", "Alice: hi", now));
        assert!(!record(&mut chat, "Bravo: hi", "", now));
        assert!(chat.is_empty());
    }

    #[test]
    fn record_overwrites_and_refreshes() {
        let mut chat = ChatHistory::new();
        let old = Utc::now() - TimeDelta::hours(3);
        let now = Utc::now();
        assert!(record(&mut chat, "B: ok", "A: one", old));
        assert!(record(&mut chat, "B: ok", "A: two", now));
        assert_eq!(chat.len(), 1);
        assert_eq!(chat["B: ok"].parent_line, "A: two");
        assert_eq!(chat["B: ok"].timestamp, now);
    }

    #[test]
    fn sweep_evicts_only_stale_entries() {
        let mut h = History::new();
        let now = Utc::now();
        record(h.chat_mut("a", 1), "stale", "p", now - TimeDelta::hours(25));
        record(h.chat_mut("a", 1), "fresh", "p", now - TimeDelta::hours(23));
        record(h.chat_mut("b", 2), "stale too", "p", now - TimeDelta::days(3));

        assert_eq!(h.sweep(now, entry_ttl()), 2);
        assert_eq!(h.len(), 1);
        assert!(h.chat("a", 1).unwrap().contains_key("fresh"));
        assert!(h.chat("b", 2).unwrap().is_empty());
    }

    #[test]
    fn sweep_keeps_entry_exactly_at_ttl() {
        let mut h = History::new();
        let now = Utc::now();
        record(h.chat_mut("a", 1), "edge", "p", now - entry_ttl());
        assert_eq!(h.sweep(now, entry_ttl()), 0);
    }

    #[test]
    fn sanitize_drops_invalid_entries() {
        let mut h = History::new();
        let now = Utc::now();
        let chat = h.chat_mut("a", 1);
        chat.insert(String::new(), MemoryEntry { parent_line: "p".into(), timestamp: now });
        chat.insert("c".into(), MemoryEntry { parent_line: String::new(), timestamp: now });
        chat.insert("ok".into(), MemoryEntry { parent_line: "p".into(), timestamp: now });
        assert_eq!(h.sanitize(), 2);
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn json_shape_nests_bot_chat_line() {
        let mut h = History::new();
        let at = DateTime::parse_from_rfc3339("2026-10-01T12:00:00Z").unwrap().with_timezone(&Utc);
        record(h.chat_mut("bravo_bot", 42), "Bravo: hi", "Alice: hello", at);
        let v = serde_json::to_value(&h).unwrap();
        assert_eq!(v["bravo_bot"]["42"]["Bravo: hi"]["parent"], "Alice: hello");
        assert!(v["bravo_bot"]["42"]["Bravo: hi"]["timestamp"].is_string());
    }
}
