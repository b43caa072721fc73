/// Conversation history for the current session.
///
/// Entries are immutable once appended. The store only grows, or is
/// cleared / replaced wholesale — there is no in-place edit. Ordering is
/// insertion order; ids are ordinals that restart after a clear.
use chrono::{DateTime, Utc};

// ── Entry types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    User,
    Assistant,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: u64,
    pub kind: EntryKind,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

// ── History store ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
    next_id: u64,
    /// Bumped on every mutation so observers can cheaply detect change
    revision: u64,
}

impl HistoryStore {
    /// Append a new entry and return its id.
    pub fn push(&mut self, kind: EntryKind, text: impl Into<String>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.revision += 1;
        self.entries.push(HistoryEntry {
            id,
            kind,
            text: text.into(),
            created_at: Utc::now(),
        });
        tracing::trace!(id, ?kind, "history: push");
        id
    }

    pub fn user(&mut self, text: impl Into<String>) -> u64 {
        self.push(EntryKind::User, text)
    }

    pub fn assistant(&mut self, text: impl Into<String>) -> u64 {
        self.push(EntryKind::Assistant, text)
    }

    pub fn info(&mut self, text: impl Into<String>) -> u64 {
        self.push(EntryKind::Info, text)
    }

    pub fn error(&mut self, text: impl Into<String>) -> u64 {
        self.push(EntryKind::Error, text)
    }

    /// Drop every entry. Ids start again from zero.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_id = 0;
        self.revision += 1;
    }

    /// Swap in a whole new set of entries (e.g. a reloaded transcript).
    /// Ids are reassigned in order so they stay ordinal.
    #[allow(dead_code)]
    pub fn replace(&mut self, entries: Vec<(EntryKind, String)>) {
        self.clear();
        for (kind, text) in entries {
            self.push(kind, text);
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    #[cfg(test)]
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Entries appended since the store held `len_before` entries. Used by
    /// the plain-stdout mode to print only what a step produced.
    pub fn since(&self, len_before: usize) -> &[HistoryEntry] {
        &self.entries[len_before.min(self.entries.len())..]
    }

    /// User-authored texts, newest first.
    pub fn user_texts_newest_first(&self) -> Vec<String> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.kind == EntryKind::User)
            .map(|e| e.text.clone())
            .collect()
    }

    /// Number of entries of a given kind (diagnostics and tests).
    pub fn count(&self, kind: EntryKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }
}
