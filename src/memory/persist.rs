//! JSON snapshot of the [`History`] on disk.
//!
//! Loading never fails: a missing, unreadable, empty or malformed file gives
//! an empty history. Saving truncates and rewrites the whole file.

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::AppError;

use super::history::History;

/// Read the snapshot at `path`, degrading to an empty history on any problem.
pub fn load_history(path: &Path) -> History {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no history file, starting empty");
            return History::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read history, starting empty");
            return History::new();
        }
    };

    if data.trim().is_empty() {
        info!(path = %path.display(), "history file is empty");
        return History::new();
    }

    let mut history: History = match serde_json::from_str(&data) {
        Ok(h) => h,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed history, starting empty");
            return History::new();
        }
    };

    let dropped = history.sanitize();
    if dropped > 0 {
        warn!(dropped, "dropped history entries with empty lines");
    }
    info!(path = %path.display(), entries = history.len(), "history read");
    history
}

/// Serialize `history` and overwrite `path`, creating its directory if needed.
pub fn save_history(path: &Path, history: &History) -> Result<(), AppError> {
    let data = encode_history(history)?;
    write_snapshot(path, &data, history.len())
}

/// JSON bytes of `history`, ready for [`write_snapshot`].
pub fn encode_history(history: &History) -> Result<Vec<u8>, AppError> {
    serde_json::to_vec(history).map_err(|e| AppError::Memory(format!("serialise history: {e}")))
}

/// Overwrite `path` with an encoded snapshot of `entries` edges.
pub fn write_snapshot(path: &Path, data: &[u8], entries: usize) -> Result<(), AppError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .map_err(|e| AppError::Memory(format!("cannot create {}: {e}", dir.display())))?;
    }
    fs::write(path, data)
        .map_err(|e| AppError::Memory(format!("cannot write {}: {e}", path.display())))?;

    debug!(path = %path.display(), entries, "history written");
    Ok(())
}
