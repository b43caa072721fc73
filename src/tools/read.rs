use std::path::Path;

use anyhow::{Context, Result};

use crate::budget::truncate_chars;

/// File content cut to fit a prompt budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFragment {
    pub content: String,
    /// True when the file was longer than the budget
    pub truncated: bool,
    /// Length of the whole file, in chars
    pub total_chars: usize,
}

/// Read `path` and keep at most `max_chars` characters.
/// Invalid UTF-8 is replaced rather than rejected — the model can still
/// make sense of a mostly-text file.
pub async fn read_fragment(path: &Path, max_chars: usize) -> Result<FileFragment> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read: cannot read {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(fragment_of(&text, max_chars))
}

pub fn fragment_of(text: &str, max_chars: usize) -> FileFragment {
    let (kept, truncated) = truncate_chars(text, max_chars);
    FileFragment {
        content: kept.to_string(),
        truncated,
        total_chars: if truncated { text.chars().count() } else { kept.chars().count() },
    }
}
