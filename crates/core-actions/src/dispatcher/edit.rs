//! Text mutation: character/line deletes, joins, yank/paste, visual
//! operators, and fold bookkeeping.
//!
//! Every user-visible edit group records one history snapshot before the
//! first mutation. Operations that can fail take the snapshot first, so a
//! refused rope edit is undone by the unchanged rope, and compound edits
//! roll back explicitly.

use core_state::{EditorState, Mode};
use tracing::trace;

use crate::text;
use crate::Result;

use super::DispatchResult;

/// Visual-mode operators acting on the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operator {
    Delete,
    Yank,
    Change,
}

/// Normal mode rests the cursor on a real code point: not past the end of
/// the buffer, and not on a line's terminating newline (except on an empty
/// line, where the newline is the only cell).
pub(crate) fn normalize_normal_cursor(state: &mut EditorState) {
    let len = state.rope.len();
    if len == 0 {
        state.cursor = 0;
        return;
    }
    if state.cursor >= len {
        state.cursor = text::prev_boundary(&state.rope, len);
        return;
    }
    if state.rope.byte_at(state.cursor) == Some(b'\n') {
        let (_, col) = state.line_col(state.cursor);
        if col > 0 {
            state.cursor = text::prev_boundary(&state.rope, state.cursor);
        }
    }
}

fn line_bytes(state: &EditorState, start: usize, end: usize) -> Vec<u8> {
    state
        .rope
        .segments(start..end)
        .flat_map(|s| s.iter().copied())
        .collect()
}

/// Delete the code point under the cursor (`x`).
pub(crate) fn delete_char(state: &mut EditorState) -> Result<DispatchResult> {
    let end = text::next_boundary(&state.rope, state.cursor);
    if end == state.cursor {
        return Ok(DispatchResult::clean());
    }
    state.commit_snapshot();
    let pos = state.cursor;
    let len = end - pos;
    state.rope.delete(pos, len)?;
    state.shift_for_delete(pos, len);
    state.cursor = pos;
    if state.mode == Mode::Normal {
        normalize_normal_cursor(state);
    }
    state.dirty = true;
    Ok(DispatchResult::dirty())
}

/// Delete the whole current line including its newline (`dd`), recording it
/// linewise in the register.
pub(crate) fn delete_line(state: &mut EditorState) -> Result<DispatchResult> {
    let (line, _) = state.line_col(state.cursor);
    let (start, end) = state.rope.line_range(line)?;
    if start == end && state.rope.len() == 0 {
        return Ok(DispatchResult::clean());
    }
    state.register.set_linewise(line_bytes(state, start, end));
    state.commit_snapshot();
    state.rope.delete(start, end - start)?;
    state.shift_for_delete(start, end - start);
    state.cursor = state.snap_to_boundary(start);
    normalize_normal_cursor(state);
    state.dirty = true;
    Ok(DispatchResult::dirty())
}

/// Join the current line with the next by replacing the newline with a
/// single space (`J`).
pub(crate) fn join_lines(state: &mut EditorState) -> Result<DispatchResult> {
    let (line, _) = state.line_col(state.cursor);
    if line + 1 >= state.rope.line_count() {
        return Ok(DispatchResult::clean());
    }
    let (_, end) = state.rope.line_range(line)?;
    debug_assert!(end > 0 && state.rope.byte_at(end - 1) == Some(b'\n'));
    let newline_at = end - 1;
    state.commit_snapshot();
    let pre = state.capture();
    state.rope.delete(newline_at, 1)?;
    if let Err(err) = state.rope.insert(newline_at, b" ") {
        // Two-step edit: restore the pre-command state rather than leaving
        // the lines glued without their separator.
        state.rollback(&pre);
        return Err(err.into());
    }
    state.cursor = newline_at;
    state.dirty = true;
    Ok(DispatchResult::dirty())
}

/// Copy the current line including its newline into the register (`yy`).
pub(crate) fn yank_line(state: &mut EditorState) -> Result<DispatchResult> {
    let (line, _) = state.line_col(state.cursor);
    let (start, end) = state.rope.line_range(line)?;
    state.register.set_linewise(line_bytes(state, start, end));
    trace!(target: "actions.edit", bytes = end - start, "yank_line");
    Ok(DispatchResult::clean())
}

/// Paste the register (`p`/`P`). Linewise content lands on the line after
/// (or before) the cursor's line; charwise content lands after (or at) the
/// cursor byte.
pub(crate) fn paste(state: &mut EditorState, before: bool) -> Result<DispatchResult> {
    if state.register.is_empty() {
        return Ok(DispatchResult::clean());
    }
    let payload = state.register.bytes().to_vec();
    state.commit_snapshot();
    if state.register.is_linewise() {
        let (line, _) = state.line_col(state.cursor);
        let pos = if before {
            state.rope.line_range(line)?.0
        } else {
            let (_, end) = state.rope.line_range(line)?;
            // A last line without its own newline gains one so the paste
            // starts on a fresh line.
            if end == state.rope.len()
                && !state.rope.is_empty()
                && state.rope.byte_at(end - 1) != Some(b'\n')
            {
                state.rope.insert(end, b"\n")?;
                state.shift_for_insert(end, 1);
                end + 1
            } else {
                end
            }
        };
        state.rope.insert(pos, &payload)?;
        state.shift_for_insert(pos, payload.len());
        state.cursor = pos;
    } else {
        let pos = if before {
            state.cursor
        } else {
            text::next_boundary(&state.rope, state.cursor)
        };
        state.rope.insert(pos, &payload)?;
        state.shift_for_insert(pos, payload.len());
        state.cursor = pos + payload.len();
        if state.mode == Mode::Normal {
            normalize_normal_cursor(state);
        }
    }
    state.dirty = true;
    Ok(DispatchResult::dirty())
}

/// Apply a visual-mode operator to the selection, inclusive of the head
/// code point, then return to Normal mode.
pub(crate) fn operator(state: &mut EditorState, op: Operator) -> Result<DispatchResult> {
    let Some(sel) = state.selection else {
        return Ok(DispatchResult::clean());
    };
    let (start, end) = sel.ordered();
    let end = text::next_boundary(&state.rope, end);
    let payload = line_bytes(state, start, end);
    match op {
        Operator::Yank => {
            state.register.set_charwise(payload);
            state.cursor = start;
        }
        Operator::Delete | Operator::Change => {
            state.register.set_charwise(payload);
            state.commit_snapshot();
            state.rope.delete(start, end - start)?;
            state.shift_for_delete(start, end - start);
            state.cursor = start;
            state.dirty = true;
        }
    }
    state.selection = None;
    if matches!(op, Operator::Change) {
        state.mode = Mode::Insert;
        // The operator snapshot already covers the whole change; typed text
        // coalesces into it.
        state.insert_run_active = true;
    } else {
        state.mode = Mode::Normal;
        normalize_normal_cursor(state);
    }
    Ok(DispatchResult::dirty())
}

// ---------------------------------------------------------------- folds

fn line_indent(state: &EditorState, line: usize) -> Option<usize> {
    let (start, end) = text::line_content_range(&state.rope, line);
    if start == end {
        return None; // blank line: joins whichever fold surrounds it
    }
    Some(text::indent_width(&line_bytes(state, start, end)))
}

/// Maximal run of deeper-indented (or blank) lines below `line`.
fn fold_region(state: &EditorState, line: usize) -> Option<(usize, usize)> {
    let base = line_indent(state, line)?;
    let count = state.rope.line_count();
    let mut last = line;
    for next in line + 1..count {
        match line_indent(state, next) {
            Some(indent) if indent > base => last = next,
            None => {} // blank: keep scanning, folded only if a deeper line follows
            _ => break,
        }
    }
    (last > line).then_some((line, last))
}

pub(crate) fn toggle_fold(state: &mut EditorState) -> DispatchResult {
    let (line, _) = state.line_col(state.cursor);
    if state.folds.remove_at(line) {
        return DispatchResult::dirty();
    }
    match fold_region(state, line) {
        Some((first, last)) => {
            state.folds.insert(first, last);
            DispatchResult::dirty()
        }
        None => DispatchResult::clean(),
    }
}

pub(crate) fn fold_all(state: &mut EditorState) -> DispatchResult {
    state.folds.clear();
    let count = state.rope.line_count();
    let mut line = 0;
    let mut changed = false;
    while line < count {
        match fold_region(state, line) {
            Some((first, last)) => {
                state.folds.insert(first, last);
                changed = true;
                line = last + 1;
            }
            None => line += 1,
        }
    }
    if changed {
        DispatchResult::dirty()
    } else {
        DispatchResult::clean()
    }
}

pub(crate) fn unfold_all(state: &mut EditorState) -> DispatchResult {
    if state.folds.is_empty() {
        DispatchResult::clean()
    } else {
        state.folds.clear();
        DispatchResult::dirty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_rope::Rope;

    fn state(text: &str) -> EditorState {
        EditorState::new(Rope::from_str(text))
    }

    #[test]
    fn delete_char_at_end_clamps_cursor() {
        let mut st = state("abc");
        st.cursor = 2;
        delete_char(&mut st).unwrap();
        assert_eq!(st.rope.to_bytes(), b"ab");
        assert_eq!(st.cursor, 1);
    }

    #[test]
    fn delete_char_multibyte() {
        let mut st = state("aéb");
        st.cursor = 1;
        delete_char(&mut st).unwrap();
        assert_eq!(st.rope.to_bytes(), b"ab");
        assert_eq!(st.cursor, 1);
    }

    #[test]
    fn delete_line_sets_linewise_register() {
        let mut st = state("one\ntwo\n");
        st.cursor = 1;
        delete_line(&mut st).unwrap();
        assert_eq!(st.rope.to_bytes(), b"two\n");
        assert_eq!(st.register.bytes(), b"one\n");
        assert!(st.register.is_linewise());
        assert_eq!(st.cursor, 0);
    }

    #[test]
    fn delete_last_line_without_newline() {
        let mut st = state("one\ntwo");
        st.cursor = 5;
        delete_line(&mut st).unwrap();
        assert_eq!(st.rope.to_bytes(), b"one\n");
        assert_eq!(st.register.bytes(), b"two\n", "register gains newline");
    }

    #[test]
    fn join_replaces_newline_with_space() {
        let mut st = state("ab\ncd\n");
        join_lines(&mut st).unwrap();
        assert_eq!(st.rope.to_bytes(), b"ab cd\n");
        assert_eq!(st.cursor, 2);
    }

    #[test]
    fn join_on_last_line_is_noop() {
        let mut st = state("ab\ncd");
        st.cursor = 4;
        let r = join_lines(&mut st).unwrap();
        assert!(!r.dirty);
        assert_eq!(st.rope.to_bytes(), b"ab\ncd");
    }

    #[test]
    fn yank_then_paste_after_inserts_next_line() {
        let mut st = state("one\ntwo\n");
        st.cursor = 1;
        yank_line(&mut st).unwrap();
        paste(&mut st, false).unwrap();
        assert_eq!(st.rope.to_bytes(), b"one\none\ntwo\n");
        let (line, col) = st.line_col(st.cursor);
        assert_eq!((line, col), (1, 0));
        assert_eq!(st.register.bytes(), b"one\n");
        assert!(st.register.is_linewise());
    }

    #[test]
    fn linewise_paste_after_last_line_adds_newline() {
        let mut st = state("one");
        yank_line(&mut st).unwrap();
        paste(&mut st, false).unwrap();
        assert_eq!(st.rope.to_bytes(), b"one\none\n");
        let (line, col) = st.line_col(st.cursor);
        assert_eq!((line, col), (1, 0));
    }

    #[test]
    fn linewise_paste_before_lands_on_current_line() {
        let mut st = state("one\ntwo\n");
        st.cursor = 5; // on line 1
        yank_line(&mut st).unwrap();
        paste(&mut st, true).unwrap();
        assert_eq!(st.rope.to_bytes(), b"one\ntwo\ntwo\n");
        assert_eq!(st.cursor, 4);
    }

    #[test]
    fn charwise_paste_after_cursor_byte() {
        let mut st = state("abc");
        st.register.set_charwise(b"XY".to_vec());
        st.cursor = 0;
        paste(&mut st, false).unwrap();
        assert_eq!(st.rope.to_bytes(), b"aXYbc");
        assert_eq!(st.cursor, 3);
    }

    #[test]
    fn visual_operator_deletes_inclusive_range() {
        let mut st = state("hello world");
        st.mode = Mode::Visual;
        st.selection = Some(core_state::Selection::new(0, 4));
        operator(&mut st, Operator::Delete).unwrap();
        assert_eq!(st.rope.to_bytes(), b" world");
        assert_eq!(st.register.bytes(), b"hello");
        assert_eq!(st.mode, Mode::Normal);
        assert!(st.selection.is_none());
    }

    #[test]
    fn visual_change_enters_insert_with_active_run() {
        let mut st = state("hello");
        st.mode = Mode::Visual;
        st.selection = Some(core_state::Selection::new(0, 1));
        operator(&mut st, Operator::Change).unwrap();
        assert_eq!(st.rope.to_bytes(), b"llo");
        assert_eq!(st.mode, Mode::Insert);
        assert!(st.insert_run_active);
    }

    #[test]
    fn fold_toggle_on_indented_region() {
        let mut st = state("fn main() {\n    a\n    b\n}\n");
        let r = toggle_fold(&mut st);
        assert!(r.dirty);
        assert_eq!(st.folds.ranges(), &[(0, 2)]);
        let r = toggle_fold(&mut st);
        assert!(r.dirty);
        assert!(st.folds.is_empty());
    }

    #[test]
    fn fold_all_and_unfold_all() {
        let mut st = state("a {\n  x\n}\nb {\n  y\n}\n");
        let r = fold_all(&mut st);
        assert!(r.dirty);
        assert_eq!(st.folds.ranges(), &[(0, 1), (3, 4)]);
        let r = unfold_all(&mut st);
        assert!(r.dirty);
        assert!(st.folds.is_empty());
    }

    #[test]
    fn toggle_fold_without_region_is_clean() {
        let mut st = state("flat\nlines\n");
        let r = toggle_fold(&mut st);
        assert!(!r.dirty);
    }
}
