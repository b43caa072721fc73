/// Input recall — the list behind Up/Down in the input box.
///
/// Live user entries and the persisted log from earlier sessions are merged
/// newest-first, adjacent repeats are collapsed, and the result is published
/// oldest-first. Only *adjacent* duplicates are dropped: "a, b, a" keeps both
/// "a"s because the user really did alternate.
use crate::history::HistoryStore;

/// Merge live user inputs (newest-first) with the persisted log
/// (newest-first) and return the deduplicated list oldest-first.
pub fn recall_list(live_newest_first: &[String], persisted_newest_first: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = live_newest_first
        .iter()
        .chain(persisted_newest_first.iter())
        .cloned()
        .collect();
    merged.dedup();
    merged.reverse();
    merged
}

/// Convenience wrapper over a live [`HistoryStore`].
pub fn recall_from_history(history: &HistoryStore, persisted_newest_first: &[String]) -> Vec<String> {
    recall_list(&history.user_texts_newest_first(), persisted_newest_first)
}

// ── Recall cursor ─────────────────────────────────────────────────────────────

/// Cursor over the published recall list. `None` = editing a fresh line.
#[derive(Debug, Default)]
pub struct InputRecall {
    items: Vec<String>,
    cursor: Option<usize>,
}

impl InputRecall {
    /// Publish a fresh list. Resets the cursor.
    pub fn publish(&mut self, items: Vec<String>) {
        self.items = items;
        self.cursor = None;
    }

    /// Step back to an older input.
    pub fn older(&mut self) -> Option<&str> {
        if self.items.is_empty() {
            return None;
        }
        let next = match self.cursor {
            None => self.items.len() - 1,
            Some(0) => 0,
            Some(i) => i - 1,
        };
        self.cursor = Some(next);
        self.items.get(next).map(String::as_str)
    }

    /// Step forward to a newer input. Returns `None` once past the newest
    /// item, meaning the caller should restore an empty line.
    pub fn newer(&mut self) -> Option<&str> {
        match self.cursor {
            None => None,
            Some(i) if i + 1 >= self.items.len() => {
                self.cursor = None;
                None
            }
            Some(i) => {
                self.cursor = Some(i + 1);
                self.items.get(i + 1).map(String::as_str)
            }
        }
    }

    pub fn reset(&mut self) {
        self.cursor = None;
    }

    /// True while Up/Down has moved off the fresh line.
    pub fn is_browsing(&self) -> bool {
        self.cursor.is_some()
    }
}
