use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::DEFAULT_REQUEST_TIMEOUT;
use crate::tools::find::DEFAULT_MAX_DEPTH;

// ── Profile ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// OpenAI-compatible endpoint URL (without the `/v1` suffix)
    pub endpoint: String,
    /// Model identifier. When unset, the first model the backend lists is used.
    #[serde(default)]
    pub model: Option<String>,
    /// Optional API key (sent as Bearer token)
    pub api_key: Option<String>,
    /// Start with autopilot on — file reads skip the approval prompt.
    #[serde(default)]
    pub autopilot: bool,
    /// Ceiling on a single completion request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// How deep below the working directory to look for referenced files.
    #[serde(default = "default_search_depth")]
    pub search_depth: usize,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_search_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: None,
            api_key: None,
            autopilot: false,
            request_timeout_secs: default_request_timeout_secs(),
            search_depth: default_search_depth(),
        }
    }
}

// ── Config file ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Which profile to use when none is specified
    #[serde(default = "default_profile_name")]
    pub default_profile: String,

    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

fn default_profile_name() -> String {
    "default".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            default_profile: default_profile_name(),
            profiles: HashMap::new(),
        }
    }
}

impl ConfigFile {
    /// Load from disk, or return a default config if the file doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))
    }

    /// Write a starter config file to disk (only if it doesn't exist).
    pub fn write_default_if_missing() -> Result<PathBuf> {
        let path = config_path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, DEFAULT_CONFIG_TOML)?;
        Ok(path)
    }

    /// Resolve the active profile given an optional override name.
    pub fn resolve_profile(&self, name: Option<&str>) -> Option<&Profile> {
        let key = name.unwrap_or(&self.default_profile);
        self.profiles.get(key)
    }
}

// ── Resolved runtime config (after merging file + CLI overrides) ──────────────

/// CLI-level overrides. `None` / `false` means "use the profile".
#[derive(Debug, Clone, Default)]
pub struct Overrides<'a> {
    pub profile: Option<&'a str>,
    pub endpoint: Option<&'a str>,
    pub model: Option<&'a str>,
    pub api_key: Option<&'a str>,
    pub autopilot: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub endpoint: String,
    /// Explicit model; None = pick from the backend's listing
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// Profile name that was resolved (for display)
    pub profile_name: String,
    pub autopilot: bool,
    pub request_timeout: Duration,
    pub search_depth: usize,
}

impl ResolvedConfig {
    /// Merge config file profile with CLI overrides.
    /// Priority: CLI args > env vars (handled by clap) > config file profile > built-in defaults
    pub fn resolve(file: &ConfigFile, overrides: &Overrides<'_>) -> Self {
        let profile_name = overrides
            .profile
            .unwrap_or(&file.default_profile)
            .to_string();

        let base = file
            .resolve_profile(overrides.profile)
            .cloned()
            .unwrap_or_default();

        Self {
            endpoint: overrides
                .endpoint
                .map(str::to_string)
                .unwrap_or(base.endpoint),
            model: overrides
                .model
                .map(str::to_string)
                .or(base.model)
                .filter(|m| !m.trim().is_empty()),
            api_key: overrides.api_key.map(str::to_string).or(base.api_key),
            profile_name,
            autopilot: overrides.autopilot || base.autopilot,
            request_timeout: Duration::from_secs(base.request_timeout_secs.max(1)),
            search_depth: base.search_depth,
        }
    }
}

// ── Paths ─────────────────────────────────────────────────────────────────────

pub fn config_path() -> PathBuf {
    dirs_config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chatgate")
        .join("config.toml")
}

fn dirs_config_dir() -> Option<PathBuf> {
    // XDG_CONFIG_HOME or ~/.config on Linux/macOS
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
}

// ── Default config template written on first run ──────────────────────────────

const DEFAULT_CONFIG_TOML: &str = r#"# chatgate configuration
# Run `chatgate --init` to regenerate this file.

default_profile = "local"

# ── Local Ollama (default) ────────────────────────────────────────────────────
[profiles.local]
endpoint = "http://localhost:11434"
# model = "qwen3:8b"          # omit to use the first model the server lists
# autopilot = false           # true = read referenced files without asking
# request_timeout_secs = 600
# search_depth = 16

# ── LM Studio ─────────────────────────────────────────────────────────────────
# [profiles.lmstudio]
# endpoint = "http://localhost:1234"

# ── Any OpenAI-compatible server with a key ──────────────────────────────────
# [profiles.remote]
# endpoint = "https://api.example.com"
# model    = "some-model"
# api_key  = "sk-..."
"#;
