/// Context enrichment — attach a referenced file to the prompt.
///
/// If the prompt mentions something that looks like a filename
/// (`word.word`), we look for it under the working directory and, when found,
/// wrap the prompt in a template carrying the file's content cut to the
/// token budget. Only the first filename-like token is considered.
///
/// This module does no gating: whether the read needs the user's approval
/// is decided by the session controller from the returned [`Enrichment`].
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::budget::TokenBudget;
use crate::tools::{self, FileFragment, FindResult};

/// Literal slot the file content replaces.
pub const CONTENT_PLACEHOLDER: &str = "{file_content}";

const FOUND_TEMPLATE: &str = "{request}\n\n\
The contents of that file are below.\n\n\
---\n{file_content}\n---\n\n\
Use the file contents to answer the request.";

const NOT_FOUND_TEMPLATE: &str = "{request}\n\n\
Note: the file `{file_name}` could not be found in the user's working directory, \
so its contents are not included. Tell the user it was not found and help as best you can.";

static FILE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w+\.\w+\b").expect("valid filename regex"));

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    /// Directory the search starts from (normally the process cwd)
    pub root: PathBuf,
    pub max_depth: usize,
    pub budget: TokenBudget,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            max_depth: tools::find::DEFAULT_MAX_DEPTH,
            budget: TokenBudget::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrichment {
    /// No filename in the prompt — send it as typed
    Passthrough,
    /// File found and read; `prompt` embeds its (possibly cut) content
    Resolved {
        file_name: String,
        path: PathBuf,
        prompt: String,
        fragment: FileFragment,
        /// Characters the content slot could hold
        budget: usize,
    },
    /// Filename mentioned but nothing matched on disk
    NotFound { file_name: String, prompt: String },
    /// The surrounding request was torn down mid-search
    Cancelled,
}

impl Enrichment {
    /// The text to dispatch, given the prompt as the user typed it.
    pub fn dispatch_text(&self, original: &str) -> String {
        match self {
            Enrichment::Resolved { prompt, .. } | Enrichment::NotFound { prompt, .. } => prompt.clone(),
            Enrichment::Passthrough | Enrichment::Cancelled => original.to_string(),
        }
    }

    pub fn needs_file_access(&self) -> bool {
        matches!(self, Enrichment::Resolved { .. })
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// First `word.word` token in the prompt, if any.
pub fn detect_file_name(prompt: &str) -> Option<&str> {
    FILE_NAME_RE.find(prompt).map(|m| m.as_str())
}

pub async fn enrich(prompt: &str, opts: &EnrichOptions, cancel: &CancellationToken) -> Enrichment {
    let Some(file_name) = detect_file_name(prompt) else {
        return Enrichment::Passthrough;
    };
    let request = restate(prompt, file_name);

    let found = match tools::find_file(&opts.root, file_name, opts.max_depth, cancel).await {
        Ok(FindResult::Found(path)) => path,
        Ok(FindResult::Cancelled) => return Enrichment::Cancelled,
        Ok(FindResult::NotFound) => return not_found(&request, file_name),
        Err(e) => {
            tracing::warn!(error = %e, "enrich: search root unreadable");
            return not_found(&request, file_name);
        }
    };

    let template = FOUND_TEMPLATE.replace("{request}", &request);
    let budget = opts
        .budget
        .available(template.chars().count(), CONTENT_PLACEHOLDER.chars().count());

    match tools::read_fragment(&found, budget).await {
        Ok(fragment) => {
            tracing::debug!(
                path = %found.display(),
                budget,
                truncated = fragment.truncated,
                "enrich: attached file"
            );
            Enrichment::Resolved {
                file_name: file_name.to_string(),
                prompt: fill_content(&template, &fragment.content),
                path: found,
                fragment,
                budget,
            }
        }
        Err(e) => {
            tracing::warn!(path = %found.display(), error = %e, "enrich: matched file unreadable");
            not_found(&request, file_name)
        }
    }
}

fn restate(prompt: &str, file_name: &str) -> String {
    format!("The user asked: \"{prompt}\" (they are referring to the file `{file_name}`).")
}

fn not_found(request: &str, file_name: &str) -> Enrichment {
    Enrichment::NotFound {
        file_name: file_name.to_string(),
        prompt: NOT_FOUND_TEMPLATE
            .replace("{file_name}", file_name)
            .replace("{request}", request),
    }
}

/// Replace the content slot. The slot sits after the restated request, so
/// the last occurrence is ours even if the user typed the placeholder text.
fn fill_content(template: &str, content: &str) -> String {
    match template.rfind(CONTENT_PLACEHOLDER) {
        Some(at) => {
            let mut out = String::with_capacity(template.len() + content.len());
            out.push_str(&template[..at]);
            out.push_str(content);
            out.push_str(&template[at + CONTENT_PLACEHOLDER.len()..]);
            out
        }
        None => template.to_string(),
    }
}

/// Display path relative to the search root, for history notices.
pub fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}
