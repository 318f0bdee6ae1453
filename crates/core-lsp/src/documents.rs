//! Client-side document synchronization bookkeeping.
//!
//! Tracks which uris have been opened with which server and allocates the
//! monotonically increasing version numbers `didChange`/`didSave` need.
//! The tracker owns no text; callers pass content when a notification
//! actually has to carry it.

use indexmap::IndexMap;
use tracing::trace;

use crate::client::Client;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TrackedDocument {
    language_id: String,
    version: i64,
}

/// Per-client open-document table.
#[derive(Debug, Default)]
pub struct DocumentTracker {
    open: IndexMap<String, TrackedDocument>,
}

impl DocumentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self, uri: &str) -> bool {
        self.open.contains_key(uri)
    }

    pub fn version(&self, uri: &str) -> Option<i64> {
        self.open.get(uri).map(|d| d.version)
    }

    /// Send `didOpen` unless the document is already open. Idempotent, so
    /// callers can invoke it before every request cheaply.
    pub fn ensure_open(
        &mut self,
        client: &mut Client,
        uri: &str,
        language_id: &str,
        text: &str,
    ) -> Result<()> {
        if self.open.contains_key(uri) {
            return Ok(());
        }
        client.open_document(uri, language_id, 1, text)?;
        self.open.insert(
            uri.to_string(),
            TrackedDocument {
                language_id: language_id.to_string(),
                version: 1,
            },
        );
        trace!(target: "lsp.documents", uri = %uri, "document_opened");
        Ok(())
    }

    /// Full-text change: bumps the version and sends the whole buffer as a
    /// single content change.
    pub fn change_full(&mut self, client: &mut Client, uri: &str, text: &str) -> Result<()> {
        let Some(doc) = self.open.get_mut(uri) else {
            return Ok(()); // never opened with this server; nothing to sync
        };
        doc.version += 1;
        let version = doc.version;
        client.change_document(uri, version, serde_json::json!([{ "text": text }]))
    }

    pub fn save(&mut self, client: &mut Client, uri: &str, text: Option<&str>) -> Result<()> {
        if !self.open.contains_key(uri) {
            return Ok(());
        }
        client.save_document(uri, text)
    }

    pub fn close(&mut self, client: &mut Client, uri: &str) -> Result<()> {
        if self.open.shift_remove(uri).is_none() {
            return Ok(());
        }
        trace!(target: "lsp.documents", uri = %uri, "document_closed");
        client.close_document(uri)
    }

    /// Forget everything (server crashed; a respawned server needs fresh
    /// `didOpen`s).
    pub fn reset(&mut self) {
        self.open.clear();
    }

    pub fn open_uris(&self) -> impl Iterator<Item = &str> {
        self.open.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_start_at_one_and_bump_on_change() {
        let mut tracker = DocumentTracker::new();
        assert!(!tracker.is_open("file:///a.rs"));
        assert_eq!(tracker.version("file:///a.rs"), None);
        // Version arithmetic is observable without a live client.
        tracker.open.insert(
            "file:///a.rs".to_string(),
            TrackedDocument {
                language_id: "rust".to_string(),
                version: 1,
            },
        );
        assert_eq!(tracker.version("file:///a.rs"), Some(1));
        tracker.open.get_mut("file:///a.rs").unwrap().version += 1;
        assert_eq!(tracker.version("file:///a.rs"), Some(2));
    }

    #[test]
    fn reset_forgets_open_documents() {
        let mut tracker = DocumentTracker::new();
        tracker.open.insert(
            "file:///a.rs".to_string(),
            TrackedDocument {
                language_id: "rust".to_string(),
                version: 3,
            },
        );
        tracker.reset();
        assert!(!tracker.is_open("file:///a.rs"));
        assert_eq!(tracker.open_uris().count(), 0);
    }
}
