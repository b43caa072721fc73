use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

/// Default max directory depth below the search root.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Directories never descended into.
pub static IGNORED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "target",
    ".next",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "venv",
    ".cache",
    "coverage",
];

/// Outcome of a file search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindResult {
    Found(PathBuf),
    NotFound,
    Cancelled,
}

/// Depth-first search under `root` for a file whose base name is `name`.
///
/// Entries are visited in the order the filesystem enumerates them and the
/// first hit wins, so with two `config.toml`s the one returned is whichever
/// the OS lists first — not the shallowest. Unreadable directories are
/// skipped. The walk yields to the runtime between directories and checks
/// `cancel` before every entry.
pub async fn find_file(
    root: &Path,
    name: &str,
    max_depth: usize,
    cancel: &CancellationToken,
) -> Result<FindResult> {
    let root_dir = tokio::fs::read_dir(root)
        .await
        .with_context(|| format!("find: cannot read {}", root.display()))?;

    // Stack of open directory iterators; the top is the directory being walked.
    let mut stack: Vec<(tokio::fs::ReadDir, usize)> = vec![(root_dir, 0)];

    while let Some((dir, depth)) = stack.last_mut() {
        if cancel.is_cancelled() {
            return Ok(FindResult::Cancelled);
        }
        let depth = *depth;
        let entry = match dir.next_entry().await {
            Ok(Some(e)) => e,
            Ok(None) | Err(_) => {
                stack.pop();
                continue;
            }
        };
        let Ok(file_type) = entry.file_type().await else { continue };
        let entry_name = entry.file_name();
        let entry_name = entry_name.to_string_lossy();

        if file_type.is_dir() {
            if depth >= max_depth || IGNORED_DIRS.iter().any(|d| *d == entry_name) {
                continue;
            }
            tokio::task::yield_now().await;
            match tokio::fs::read_dir(entry.path()).await {
                Ok(sub) => stack.push((sub, depth + 1)),
                Err(e) => tracing::debug!(path = %entry.path().display(), error = %e, "find: skipping unreadable dir"),
            }
        } else if file_type.is_file() && entry_name == name {
            return Ok(FindResult::Found(entry.path()));
        }
    }

    Ok(FindResult::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    #[tokio::test]
    async fn test_finds_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a/b/c/notes.md"));
        let res = find_file(dir.path(), "notes.md", DEFAULT_MAX_DEPTH, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(res, FindResult::Found(dir.path().join("a/b/c/notes.md")));
    }

    #[tokio::test]
    async fn test_ignored_dirs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("node_modules/pkg/index.js"));
        touch(&dir.path().join("target/debug/index.js"));
        let res = find_file(dir.path(), "index.js", DEFAULT_MAX_DEPTH, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(res, FindResult::NotFound);
    }

    #[tokio::test]
    async fn test_depth_bound() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("one/two/three/deep.txt"));
        let shallow = find_file(dir.path(), "deep.txt", 2, &CancellationToken::new()).await.unwrap();
        assert_eq!(shallow, FindResult::NotFound);
        let deep = find_file(dir.path(), "deep.txt", 3, &CancellationToken::new()).await.unwrap();
        assert!(matches!(deep, FindResult::Found(_)));
    }

    #[tokio::test]
    async fn test_directory_with_matching_name_is_not_a_hit() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("data.json")).unwrap();
        let res = find_file(dir.path(), "data.json", DEFAULT_MAX_DEPTH, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(res, FindResult::NotFound);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_search() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("main.rs"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let res = find_file(dir.path(), "main.rs", DEFAULT_MAX_DEPTH, &cancel).await.unwrap();
        assert_eq!(res, FindResult::Cancelled);
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = find_file(&dir.path().join("absent"), "x.rs", 4, &CancellationToken::new()).await;
        assert!(res.is_err());
    }
}
