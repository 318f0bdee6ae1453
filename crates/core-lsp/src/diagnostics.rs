//! Typed diagnostics parsed from `textDocument/publishDiagnostics`.
//!
//! Servers push full replacement sets per document; the store keeps the
//! latest set per uri so the editor can render markers and the plugin
//! layer can query counts.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

impl Severity {
    fn from_code(code: Option<u64>) -> Self {
        match code {
            Some(1) => Severity::Error,
            Some(2) => Severity::Warning,
            Some(3) => Severity::Information,
            Some(4) => Severity::Hint,
            // The protocol says clients should treat missing severity as an
            // error.
            _ => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub range: Range,
    pub severity: Severity,
    pub message: String,
    pub source: Option<String>,
    pub code: Option<String>,
}

/// Latest diagnostics per document uri, insertion-ordered for stable
/// iteration.
#[derive(Debug, Default)]
pub struct DiagnosticsStore {
    by_uri: IndexMap<String, Vec<Diagnostic>>,
}

impl DiagnosticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a `publishDiagnostics` params payload. Returns the uri when
    /// the payload was well-formed enough to apply.
    pub fn apply_publish(&mut self, params: &Value) -> Option<String> {
        let uri = params.get("uri")?.as_str()?.to_string();
        let raw = params.get("diagnostics")?.as_array()?;
        let mut parsed = Vec::with_capacity(raw.len());
        for item in raw {
            let Ok(range) = serde_json::from_value::<Range>(item.get("range")?.clone()) else {
                continue;
            };
            let message = item
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            parsed.push(Diagnostic {
                range,
                severity: Severity::from_code(
                    item.get("severity").and_then(Value::as_u64),
                ),
                message,
                source: item
                    .get("source")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                code: item.get("code").map(|c| match c {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                }),
            });
        }
        trace!(target: "lsp.diagnostics", uri = %uri, count = parsed.len(), "diagnostics_applied");
        self.by_uri.insert(uri.clone(), parsed);
        Some(uri)
    }

    pub fn for_uri(&self, uri: &str) -> &[Diagnostic] {
        self.by_uri.get(uri).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn clear_uri(&mut self, uri: &str) {
        self.by_uri.shift_remove(uri);
    }

    /// Total diagnostics at `severity` or worse, across all documents.
    pub fn count_at_least(&self, severity: Severity) -> usize {
        self.by_uri
            .values()
            .flatten()
            .filter(|d| d.severity <= severity)
            .count()
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.by_uri.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn publish(uri: &str, diags: Value) -> Value {
        json!({ "uri": uri, "diagnostics": diags })
    }

    #[test]
    fn apply_and_query() {
        let mut store = DiagnosticsStore::new();
        let params = publish(
            "file:///a.rs",
            json!([
                {
                    "range": { "start": { "line": 1, "character": 0 }, "end": { "line": 1, "character": 5 } },
                    "severity": 1,
                    "message": "mismatched types",
                    "source": "rustc",
                    "code": "E0308",
                },
                {
                    "range": { "start": { "line": 4, "character": 2 }, "end": { "line": 4, "character": 9 } },
                    "severity": 2,
                    "message": "unused variable",
                },
            ]),
        );
        assert_eq!(store.apply_publish(&params).as_deref(), Some("file:///a.rs"));
        let diags = store.for_uri("file:///a.rs");
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].severity, Severity::Error);
        assert_eq!(diags[0].code.as_deref(), Some("E0308"));
        assert_eq!(diags[1].severity, Severity::Warning);
        assert_eq!(store.count_at_least(Severity::Error), 1);
        assert_eq!(store.count_at_least(Severity::Warning), 2);
    }

    #[test]
    fn publish_replaces_previous_set() {
        let mut store = DiagnosticsStore::new();
        let full = publish(
            "file:///a.rs",
            json!([{ "range": { "start": { "line": 0, "character": 0 }, "end": { "line": 0, "character": 1 } }, "message": "x" }]),
        );
        store.apply_publish(&full);
        assert_eq!(store.for_uri("file:///a.rs").len(), 1);
        store.apply_publish(&publish("file:///a.rs", json!([])));
        assert!(store.for_uri("file:///a.rs").is_empty());
    }

    #[test]
    fn missing_severity_is_error() {
        let mut store = DiagnosticsStore::new();
        store.apply_publish(&publish(
            "file:///a.rs",
            json!([{ "range": { "start": { "line": 0, "character": 0 }, "end": { "line": 0, "character": 1 } }, "message": "boom" }]),
        ));
        assert_eq!(store.for_uri("file:///a.rs")[0].severity, Severity::Error);
    }

    #[test]
    fn malformed_payload_is_ignored() {
        let mut store = DiagnosticsStore::new();
        assert!(store.apply_publish(&json!({ "nope": true })).is_none());
        assert!(store.apply_publish(&json!({ "uri": "file:///x", "diagnostics": "?" })).is_none());
    }
}
