/// Prompts submitted in earlier sessions, one per line.
///
/// Stored at `~/.local/share/chatgate/inputs.log` (or `$XDG_DATA_HOME`).
/// Lines are appended oldest-to-newest; readers get them newest-first,
/// which is the order the recall deduplicator expects. Multi-line prompts
/// are flattened to a single line on write.
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

// ── Paths ─────────────────────────────────────────────────────────────────────

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            PathBuf::from(std::env::var("HOME").unwrap_or_default()).join(".local/share")
        })
        .join("chatgate")
}

pub fn default_path() -> PathBuf {
    data_dir().join("inputs.log")
}

// ── Log ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct InputLog {
    path: PathBuf,
}

impl InputLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every logged prompt, newest first. A missing file is an empty log.
    pub fn load_newest_first(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read input log at {}", self.path.display()))?;
        Ok(content
            .lines()
            .rev()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Append one prompt. Creates the parent directory on first use.
    pub fn append(&self, text: &str) -> Result<()> {
        let line = flatten(text);
        if line.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open input log at {}", self.path.display()))?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}

fn flatten(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
