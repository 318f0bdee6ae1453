//! Per-invocation host context threaded through VM builtin calls.
//!
//! The context owns everything it needs (a cloned sandbox, an editor
//! snapshot, the action buffer), so builtins can downcast it through
//! `HostContext::as_any_mut` without lifetime entanglement. After the run
//! the host takes the buffer and counters back.

use std::any::Any;

use core_script::vm::HostContext;
use tracing::trace;

use crate::{HostError, SandboxConfig, glob};

/// Intents a plugin accumulates during execution. Drained by the host into
/// an [`ActionSink`] only after a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginAction {
    ShowMessage(String),
    RegisterCommand {
        name: String,
        handler: String,
        description: Option<String>,
    },
    RegisterKeymap {
        keys: String,
        handler: String,
        mode: Option<String>,
        description: Option<String>,
    },
    RegisterEventHandler {
        event: String,
        handler: String,
    },
    RegisterTheme {
        name: String,
        colors: String,
    },
    /// Deferred editor write: replace the text of a 0-based line.
    SetLine {
        index: usize,
        text: String,
    },
    /// Deferred editor write: move the primary cursor (0-based, bytes).
    SetCursor {
        line: usize,
        col: usize,
    },
}

/// Callback slots receiving drained actions.
pub trait ActionSink {
    fn show_message(&mut self, text: &str);
    fn register_command(&mut self, name: &str, handler: &str, description: Option<&str>);
    fn register_keymap(
        &mut self,
        keys: &str,
        handler: &str,
        mode: Option<&str>,
        description: Option<&str>,
    );
    fn register_event_handler(&mut self, event: &str, handler: &str);
    fn register_theme(&mut self, name: &str, colors: &str);
    /// Deferred editor writes (set line / set cursor).
    fn apply_edit(&mut self, action: &PluginAction);
}

/// Read seam into the editor, captured as a snapshot per invocation so
/// builtin reads stay consistent while the script runs.
pub trait EditorQuery {
    fn line_count(&self) -> usize;
    /// Line text without its trailing newline; `None` past the end.
    fn line_text(&self, index: usize) -> Option<String>;
    /// 0-based line and byte column of the primary cursor.
    fn cursor(&self) -> (usize, usize);
    /// Normalized selection byte bounds, if a selection exists.
    fn selection(&self) -> Option<(usize, usize)>;
}

/// Editor stand-in for hosts running without a buffer (tests, config-only).
pub struct NoEditor;

impl EditorQuery for NoEditor {
    fn line_count(&self) -> usize {
        0
    }
    fn line_text(&self, _index: usize) -> Option<String> {
        None
    }
    fn cursor(&self) -> (usize, usize) {
        (0, 0)
    }
    fn selection(&self) -> Option<(usize, usize)> {
        None
    }
}

/// Owned editor state visible to builtins during one run.
#[derive(Debug, Clone, Default)]
pub struct EditorSnapshot {
    pub lines: Vec<String>,
    pub cursor_line: usize,
    pub cursor_col: usize,
    pub selection: Option<(usize, usize)>,
}

impl EditorSnapshot {
    pub fn capture(editor: &dyn EditorQuery) -> Self {
        let count = editor.line_count();
        let lines = (0..count)
            .map(|i| editor.line_text(i).unwrap_or_default())
            .collect();
        let (cursor_line, cursor_col) = editor.cursor();
        Self {
            lines,
            cursor_line,
            cursor_col,
            selection: editor.selection(),
        }
    }
}

/// Mutable state for one VM invocation.
pub struct HostCallContext {
    pub(crate) sandbox: SandboxConfig,
    pub(crate) editor: EditorSnapshot,
    pub(crate) actions: Vec<PluginAction>,
    pub(crate) pending: Option<HostError>,
    pub(crate) violations: u64,
    pub(crate) file_ops_used: u32,
    pub(crate) network_ops_used: u32,
}

impl HostCallContext {
    pub fn new(sandbox: SandboxConfig, editor: EditorSnapshot) -> Self {
        Self {
            sandbox,
            editor,
            actions: Vec::new(),
            pending: None,
            violations: 0,
            file_ops_used: 0,
            network_ops_used: 0,
        }
    }

    pub fn actions(&self) -> &[PluginAction] {
        &self.actions
    }

    /// Schedule a pending host error; the VM aborts after the current
    /// builtin returns.
    pub(crate) fn fail(&mut self, err: HostError) {
        trace!(target: "host.context", error = %err, "pending_host_error");
        if self.pending.is_none() {
            self.pending = Some(err);
        }
    }

    pub(crate) fn violation(&mut self, err: HostError) {
        self.violations += 1;
        self.fail(err);
    }

    /// Filesystem policy: blocked globs first, then the allow list (when
    /// non-empty), then the per-run operation budget.
    pub(crate) fn authorize_file_access(&mut self, path: &str) -> bool {
        if !self.sandbox.enable_filesystem_access {
            self.violation(HostError::UnauthorizedFileAccess(path.to_string()));
            return false;
        }
        if glob::matches_any(&self.sandbox.blocked_paths, path) {
            self.violation(HostError::UnauthorizedFileAccess(path.to_string()));
            return false;
        }
        if !self.sandbox.allowed_paths.is_empty()
            && !glob::matches_any(&self.sandbox.allowed_paths, path)
        {
            self.violation(HostError::UnauthorizedFileAccess(path.to_string()));
            return false;
        }
        if self.file_ops_used >= self.sandbox.max_file_ops {
            self.violation(HostError::SandboxViolation(
                "file operation budget exhausted".to_string(),
            ));
            return false;
        }
        self.file_ops_used += 1;
        true
    }

    pub(crate) fn authorize_network_access(&mut self) -> bool {
        if !self.sandbox.enable_network_access {
            self.violation(HostError::UnauthorizedNetworkAccess);
            return false;
        }
        if self.network_ops_used >= self.sandbox.max_network_ops {
            self.violation(HostError::SandboxViolation(
                "network operation budget exhausted".to_string(),
            ));
            return false;
        }
        self.network_ops_used += 1;
        true
    }
}

impl HostContext for HostCallContext {
    fn has_fault(&self) -> bool {
        self.pending.is_some()
    }

    fn fault_message(&self) -> Option<String> {
        self.pending.as_ref().map(|e| e.to_string())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(sandbox: SandboxConfig) -> HostCallContext {
        HostCallContext::new(sandbox, EditorSnapshot::default())
    }

    #[test]
    fn network_denied_by_default() {
        let mut c = ctx(SandboxConfig::default());
        assert!(!c.authorize_network_access());
        assert_eq!(c.violations, 1);
        assert_eq!(c.pending, Some(HostError::UnauthorizedNetworkAccess));
    }

    #[test]
    fn blocked_glob_wins_over_allow() {
        let mut c = ctx(SandboxConfig {
            enable_filesystem_access: true,
            blocked_paths: vec!["/secret/*".to_string()],
            allowed_paths: vec!["/secret/ok".to_string()],
            ..SandboxConfig::default()
        });
        assert!(!c.authorize_file_access("/secret/ok"));
        assert_eq!(c.violations, 1);
    }

    #[test]
    fn allow_list_gates_when_present() {
        let mut c = ctx(SandboxConfig {
            enable_filesystem_access: true,
            allowed_paths: vec!["/data/*".to_string()],
            ..SandboxConfig::default()
        });
        assert!(c.authorize_file_access("/data/file"));
        assert!(!c.authorize_file_access("/home/file"));
    }

    #[test]
    fn file_op_budget_enforced() {
        let mut c = ctx(SandboxConfig {
            enable_filesystem_access: true,
            max_file_ops: 2,
            ..SandboxConfig::default()
        });
        assert!(c.authorize_file_access("/a"));
        assert!(c.authorize_file_access("/b"));
        assert!(!c.authorize_file_access("/c"));
        assert!(matches!(
            c.pending,
            Some(HostError::SandboxViolation(_))
        ));
    }

    #[test]
    fn first_pending_error_sticks() {
        let mut c = ctx(SandboxConfig::default());
        c.fail(HostError::UnauthorizedNetworkAccess);
        c.fail(HostError::ExecutionTimeout);
        assert_eq!(c.pending, Some(HostError::UnauthorizedNetworkAccess));
    }
}
