//! Configuration loading and lightweight persisted state.
//!
//! The configuration root holds `init.gza` (the top-level script, consumed
//! by the scripting host) and a `plugins/` subtree, plus an optional
//! `grim.toml` with editor settings. TOML parsing is deliberately tolerant:
//! unknown fields are ignored and every field has a default, so a partial
//! file configures only what it names. None of the persisted state here
//! (session, glyph log, lockfile) is load-bearing for correctness.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub mod glyphs;
pub mod session;

pub use session::{SessionBuffer, SessionState};

pub const SETTINGS_FILE: &str = "grim.toml";
pub const INIT_SCRIPT: &str = "init.gza";
pub const PLUGINS_DIR: &str = "plugins";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Layout of a configuration root directory.
#[derive(Debug, Clone)]
pub struct ConfigRoot {
    root: PathBuf,
}

impl ConfigRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn init_script(&self) -> PathBuf {
        self.root.join(INIT_SCRIPT)
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join(PLUGINS_DIR)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    pub fn lockfile(&self) -> PathBuf {
        self.root.join("plugins.lock")
    }

    pub fn session_file(&self) -> PathBuf {
        self.root.join("session.json")
    }

    pub fn glyph_log(&self) -> PathBuf {
        self.root.join("glyphs.log")
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct EditorSettings {
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

fn default_history_cap() -> usize {
    1000
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct SandboxSettings {
    #[serde(default = "default_max_execution_ms")]
    pub max_execution_ms: u64,
    #[serde(default = "default_max_memory_bytes")]
    pub max_memory_bytes: usize,
    #[serde(default = "default_max_file_ops")]
    pub max_file_ops: u32,
    #[serde(default)]
    pub max_network_ops: u32,
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    #[serde(default)]
    pub blocked_paths: Vec<String>,
    #[serde(default)]
    pub enable_filesystem_access: bool,
    #[serde(default)]
    pub enable_network_access: bool,
    #[serde(default)]
    pub enable_syscalls: bool,
}

fn default_max_execution_ms() -> u64 {
    5_000
}
fn default_max_memory_bytes() -> usize {
    50 * 1024 * 1024
}
fn default_max_file_ops() -> u32 {
    100
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            max_execution_ms: default_max_execution_ms(),
            max_memory_bytes: default_max_memory_bytes(),
            max_file_ops: default_max_file_ops(),
            max_network_ops: 0,
            allowed_paths: Vec::new(),
            blocked_paths: Vec::new(),
            enable_filesystem_access: false,
            enable_network_access: false,
            enable_syscalls: false,
        }
    }
}

/// Static language-server registration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ServerSetting {
    pub name: String,
    pub command: Vec<String>,
    pub filetypes: Vec<String>,
    #[serde(default)]
    pub language_id: String,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    #[serde(default)]
    pub editor: EditorSettings,
    #[serde(default)]
    pub sandbox: SandboxSettings,
    #[serde(default)]
    pub servers: Vec<ServerSetting>,
}

impl Settings {
    /// Load settings from a file; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(target: "config.load", path = %path.display(), "settings_absent_using_defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let settings: Settings = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        info!(target: "config.load", path = %path.display(), servers = settings.servers.len(), "settings_loaded");
        Ok(settings)
    }
}
