//! Dialogue assembly — backward walks over a chat's reply edges.

use crate::chat::Line;

use super::history::ChatHistory;

/// Follow parent links from `seed`: `[seed, parent(seed), …]`.
///
/// Stops when a link is missing or `limit` lines have been collected. An
/// empty seed or a zero limit yields an empty walk. Cycles are harmless:
/// the limit bounds the walk.
pub fn walk(chat: &ChatHistory, seed: &str, limit: usize) -> Vec<Line> {
    if seed.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut lines = vec![seed.to_string()];
    let mut last = seed;
    while lines.len() < limit {
        match chat.get(last) {
            Some(entry) if !entry.parent_line.is_empty() => {
                lines.push(entry.parent_line.clone());
                last = &entry.parent_line;
            }
            _ => break,
        }
    }
    lines
}

/// Dialogue ending in `child`, oldest line first, at most `max(1, mem_lim)`
/// lines long.
///
/// A child without a parent is a standalone message and yields `[child]`.
pub fn build_dialogue(chat: &ChatHistory, child: &str, parent: &str, mem_lim: usize) -> Vec<Line> {
    let mut lines = vec![child.to_string()];
    if !parent.is_empty() {
        lines.extend(walk(chat, parent, mem_lim.saturating_sub(1)));
    }
    lines.reverse();
    lines
}
