//! Reply-chain memory shared by every bot worker.
//!
//! # Layout
//!
//! - [`history`] — the plain `History` maps, edge recording and TTL sweep.
//! - [`dialogue`] — backward walks that turn stored edges into a dialogue.
//! - [`persist`] — JSON snapshot load/save.
//!
//! # Locking
//!
//! [`MemoryStore`] guards the one `History` with a single reader-writer lock.
//! Recording, lazy creation, sweeping and encoding a snapshot take the write
//! lock; walks take the read lock. No lock is held across an `.await`:
//! callers get owned values back, never references into the maps.
//!
//! Saving is serialized by a separate save lock. [`MemoryStore::persist`]
//! takes it, sweeps and encodes under the write lock, releases the history
//! and only then writes the file, on the blocking pool. A save therefore
//! observes every write made before it, snapshots reach the disk in the
//! order they were taken, and readers are not held up by disk I/O.

pub mod dialogue;
pub mod history;
pub mod persist;

pub use history::{BotHistory, ChatHistory, History, MemoryEntry, entry_ttl};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::chat::Line;
use crate::error::AppError;

/// Process-wide handle to the shared history.
///
/// Cheaply cloneable (`Arc`-backed); every worker holds a clone.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    path: PathBuf,
    history: RwLock<History>,
    /// Held from snapshot to file write.
    saving: Mutex<()>,
}

impl MemoryStore {
    /// Load the snapshot at `path`; a bad or missing file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let history = persist::load_history(&path);
        Self::with_history(path, history)
    }

    /// Wrap an existing history that will be saved to `path`.
    pub fn with_history(path: impl Into<PathBuf>, history: History) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                path: path.into(),
                history: RwLock::new(history),
                saving: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, History>, AppError> {
        self.inner
            .history
            .read()
            .map_err(|_| AppError::Memory("history lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, History>, AppError> {
        self.inner
            .history
            .write()
            .map_err(|_| AppError::Memory("history lock poisoned".into()))
    }

    /// Memory of bot `handle`, installing an empty one if absent.
    pub fn bot(&self, handle: &str) -> Result<BotMemory, AppError> {
        self.write()?.bot_mut(handle);
        Ok(BotMemory { store: self.clone(), handle: handle.to_string() })
    }

    /// Evict stale entries now. Returns how many were evicted.
    pub fn sweep(&self) -> Result<usize, AppError> {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let evicted = self.write()?.sweep(now, entry_ttl());
        if evicted > 0 {
            debug!(evicted, "swept stale history entries");
        }
        Ok(evicted)
    }

    /// Write the current snapshot to disk.
    pub fn save(&self) -> Result<(), AppError> {
        self.sweep_and_save(false)
    }

    /// Sweep then save on the blocking pool.
    pub async fn persist(&self) -> Result<(), AppError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.sweep_and_save(true))
            .await
            .map_err(|e| AppError::Memory(format!("persist join: {e}")))?
    }

    fn sweep_and_save(&self, sweep: bool) -> Result<(), AppError> {
        let _saving = self
            .inner
            .saving
            .lock()
            .map_err(|_| AppError::Memory("save lock poisoned".into()))?;

        let (data, entries) = {
            let mut history = self.write()?;
            if sweep {
                let evicted = history.sweep(Utc::now(), entry_ttl());
                if evicted > 0 {
                    debug!(evicted, "swept stale history entries");
                }
            }
            (persist::encode_history(&history)?, history.len())
        };
        persist::write_snapshot(&self.inner.path, &data, entries)
    }

    /// Owned copy of the whole history.
    pub fn snapshot(&self) -> Result<History, AppError> {
        Ok(self.read()?.clone())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").field("path", &self.inner.path).finish()
    }
}

/// One bot's slice of the shared memory.
#[derive(Debug, Clone)]
pub struct BotMemory {
    store: MemoryStore,
    handle: String,
}

impl BotMemory {
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// The shared store this slice belongs to.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Memory of `chat_id` for this bot, installing an empty one if absent.
    pub fn chat(&self, chat_id: i64) -> Result<ChatMemory, AppError> {
        self.store.write()?.chat_mut(&self.handle, chat_id);
        Ok(ChatMemory { store: self.store.clone(), handle: self.handle.clone(), chat_id })
    }
}

/// One chat's reply edges as seen by one bot.
#[derive(Debug, Clone)]
pub struct ChatMemory {
    store: MemoryStore,
    handle: String,
    chat_id: i64,
}

impl ChatMemory {
    /// Store `child → parent` stamped now. `false` when either line is empty.
    pub fn record(&self, child: &str, parent: &str) -> Result<bool, AppError> {
        self.record_at(child, parent, Utc::now())
    }

    /// Store `child → parent` with an explicit timestamp.
    pub fn record_at(&self, child: &str, parent: &str, at: DateTime<Utc>) -> Result<bool, AppError> {
        let mut guard = self.store.write()?;
        Ok(history::record(guard.chat_mut(&self.handle, self.chat_id), child, parent, at))
    }

    /// `[seed, parent(seed), …]`, at most `limit` lines.
    pub fn walk(&self, seed: &str, limit: usize) -> Result<Vec<Line>, AppError> {
        let history = self.store.read()?;
        Ok(match history.chat(&self.handle, self.chat_id) {
            Some(chat) => dialogue::walk(chat, seed, limit),
            None => dialogue::walk(&ChatHistory::new(), seed, limit),
        })
    }

    /// Oldest-first dialogue ending in `child`; see [`dialogue::build_dialogue`].
    pub fn dialogue(&self, child: &str, parent: &str, mem_lim: usize) -> Result<Vec<Line>, AppError> {
        let history = self.store.read()?;
        Ok(match history.chat(&self.handle, self.chat_id) {
            Some(chat) => dialogue::build_dialogue(chat, child, parent, mem_lim),
            None => dialogue::build_dialogue(&ChatHistory::new(), child, parent, mem_lim),
        })
    }

    /// Owned copy of this chat's edges.
    pub fn snapshot(&self) -> Result<ChatHistory, AppError> {
        Ok(self
            .store
            .read()?
            .chat(&self.handle, self.chat_id)
            .cloned()
            .unwrap_or_default())
    }
}
