//! Cursor movement. All motions clamp to buffer bounds and code-point
//! boundaries and never fail; vertical motions preserve a byte goal column.

use core_state::{EditorState, Mode};

use crate::text;
use crate::MotionKind;

use super::DispatchResult;

pub(crate) fn apply(state: &mut EditorState, kind: MotionKind) -> DispatchResult {
    let before = state.cursor;
    match kind {
        MotionKind::Left => {
            state.cursor = text::prev_boundary(&state.rope, state.cursor);
            state.goal_col = None;
        }
        MotionKind::Right => {
            state.cursor = text::next_boundary(&state.rope, state.cursor);
            state.goal_col = None;
        }
        MotionKind::Up => vertical(state, -1),
        MotionKind::Down => vertical(state, 1),
        MotionKind::WordForward => {
            state.cursor = word_forward(state);
            state.goal_col = None;
        }
        MotionKind::WordBackward => {
            state.cursor = word_backward(state);
            state.goal_col = None;
        }
        MotionKind::LineStart => {
            let (line, _) = state.line_col(state.cursor);
            let (start, _) = text::line_content_range(&state.rope, line);
            state.cursor = start;
            state.goal_col = None;
        }
        MotionKind::LineEnd => {
            let (line, _) = state.line_col(state.cursor);
            let (_, end) = text::line_content_range(&state.rope, line);
            state.cursor = end;
            state.goal_col = None;
        }
        MotionKind::FileStart => {
            state.cursor = 0;
            state.goal_col = None;
        }
        MotionKind::FileEnd => {
            state.cursor = state.rope.len();
            state.goal_col = None;
        }
    }
    // Visual mode: the selection head tracks the cursor.
    if state.mode == Mode::Visual
        && let Some(sel) = &mut state.selection
    {
        sel.head = state.cursor;
    }
    if state.cursor != before {
        DispatchResult::dirty()
    } else {
        DispatchResult::clean()
    }
}

fn vertical(state: &mut EditorState, delta: isize) {
    let (line, col) = state.line_col(state.cursor);
    let goal = state.goal_col.unwrap_or(col);
    let line_count = state.rope.line_count();
    let target = if delta < 0 {
        line.saturating_sub(delta.unsigned_abs())
    } else {
        (line + delta as usize).min(line_count.saturating_sub(1))
    };
    let (start, content_end) = text::line_content_range(&state.rope, target);
    let width = content_end - start;
    state.cursor = state.snap_to_boundary(start + goal.min(width));
    state.goal_col = Some(goal);
}

/// Vim-style `w`: leave the current word run, then stop at the start of the
/// next word-class run.
fn word_forward(state: &EditorState) -> usize {
    let rope = &state.rope;
    let len = rope.len();
    let mut i = state.cursor;
    if i >= len {
        return len;
    }
    let in_word = rope.byte_at(i).map(text::is_word_byte).unwrap_or(false);
    if in_word {
        while i < len && rope.byte_at(i).map(text::is_word_byte).unwrap_or(false) {
            i += 1;
        }
    } else {
        i += 1;
    }
    while i < len && !rope.byte_at(i).map(text::is_word_byte).unwrap_or(false) {
        i += 1;
    }
    i
}

/// Vim-style `b`: skip separators backwards, then rewind to the start of
/// that word run.
fn word_backward(state: &EditorState) -> usize {
    let rope = &state.rope;
    let mut i = state.cursor;
    while i > 0
        && !rope
            .byte_at(i - 1)
            .map(text::is_word_byte)
            .unwrap_or(false)
    {
        i -= 1;
    }
    while i > 0
        && rope
            .byte_at(i - 1)
            .map(text::is_word_byte)
            .unwrap_or(false)
    {
        i -= 1;
    }
    i
}
