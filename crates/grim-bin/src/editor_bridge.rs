//! Bridges between the editor core and the plugin host: the read-only
//! query seam scripts see, and application of deferred plugin edits.

use core_host::{EditorQuery, PluginAction};
use core_state::EditorState;
use tracing::warn;

/// Owned capture of the queryable editor surface. Taken before each script
/// run so reads stay stable while the VM executes.
pub struct EditorStateQuery {
    lines: Vec<String>,
    cursor: (usize, usize),
    selection: Option<(usize, usize)>,
}

impl EditorStateQuery {
    pub fn capture(state: &EditorState) -> Self {
        let count = state.rope.line_count();
        let mut lines = Vec::with_capacity(count);
        for i in 0..count {
            lines.push(line_text(state, i));
        }
        Self {
            lines,
            cursor: state.line_col(state.cursor),
            selection: state.selection.map(|s| s.ordered()),
        }
    }
}

impl EditorQuery for EditorStateQuery {
    fn line_count(&self) -> usize {
        self.lines.len()
    }
    fn line_text(&self, index: usize) -> Option<String> {
        self.lines.get(index).cloned()
    }
    fn cursor(&self) -> (usize, usize) {
        self.cursor
    }
    fn selection(&self) -> Option<(usize, usize)> {
        self.selection
    }
}

/// Line content without its trailing newline, lossily decoded.
fn line_text(state: &EditorState, line: usize) -> String {
    let Ok((start, end)) = state.rope.line_range(line) else {
        return String::new();
    };
    let end = if end > start && state.rope.byte_at(end - 1) == Some(b'\n') {
        end - 1
    } else {
        end
    };
    let bytes: Vec<u8> = state
        .rope
        .segments(start..end)
        .flat_map(|s| s.iter().copied())
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Apply deferred plugin edits after a successful script run. Each edit is
/// its own undo group; a failing edit is logged and skipped rather than
/// aborting the batch.
pub fn apply_plugin_edits(state: &mut EditorState, edits: &[PluginAction]) {
    for edit in edits {
        match edit {
            PluginAction::SetLine { index, text } => {
                let Ok((start, end)) = state.rope.line_range(*index) else {
                    warn!(target: "grim.bridge", line = index, "set_line_out_of_range");
                    continue;
                };
                let keep_newline =
                    end > start && state.rope.byte_at(end - 1) == Some(b'\n');
                let content_end = if keep_newline { end - 1 } else { end };
                state.commit_snapshot();
                let pre = state.capture();
                let outcome = state
                    .rope
                    .delete(start, content_end - start)
                    .and_then(|()| state.rope.insert(start, text.as_bytes()));
                match outcome {
                    Ok(()) => {
                        state.shift_for_delete(start, content_end - start);
                        state.shift_for_insert(start, text.len());
                        state.clamp_cursors();
                        state.dirty = true;
                    }
                    Err(err) => {
                        state.rollback(&pre);
                        warn!(target: "grim.bridge", error = %err, "set_line_failed");
                    }
                }
            }
            PluginAction::SetCursor { line, col } => {
                let Ok((start, end)) = state.rope.line_range(*line) else {
                    continue;
                };
                let content_end = if end > start && state.rope.byte_at(end - 1) == Some(b'\n') {
                    end - 1
                } else {
                    end
                };
                let width = content_end - start;
                state.cursor = state.snap_to_boundary(start + (*col).min(width));
                state.goal_col = None;
            }
            other => {
                warn!(target: "grim.bridge", action = ?other, "non_edit_action_in_edit_queue");
            }
        }
    }
}
