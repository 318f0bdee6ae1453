//! Session persistence: open buffer identities and cursor positions.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBuffer {
    pub path: String,
    /// Primary cursor byte offset at save time.
    pub cursor: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub buffers: Vec<SessionBuffer>,
    /// Index into `buffers` of the focused buffer.
    #[serde(default)]
    pub active: usize,
}

impl SessionState {
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self).expect("session state serializes");
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(target: "config.session", path = %path.display(), buffers = self.buffers.len(), "session_saved");
        Ok(())
    }

    /// Load a session; absent file yields an empty session.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let state = SessionState {
            buffers: vec![
                SessionBuffer {
                    path: "/src/main.rs".to_string(),
                    cursor: 120,
                },
                SessionBuffer {
                    path: "/src/lib.rs".to_string(),
                    cursor: 0,
                },
            ],
            active: 1,
        };
        state.save(&path).unwrap();
        assert_eq!(SessionState::load(&path).unwrap(), state);
    }

    #[test]
    fn absent_session_is_empty() {
        let loaded = SessionState::load(Path::new("/no/session.json")).unwrap();
        assert!(loaded.buffers.is_empty());
    }
}
