//! Multi-cursor management and identifier rename.

use core_state::EditorState;
use tracing::trace;

use crate::text;
use crate::Result;

use super::DispatchResult;

fn push_secondary(state: &mut EditorState, pos: usize) -> bool {
    if pos == state.cursor || state.secondary.contains(&pos) {
        return false;
    }
    state.secondary.push(pos);
    state.secondary.sort_unstable();
    true
}

fn cursor_lines(state: &EditorState) -> (usize, usize) {
    let (primary, _) = state.line_col(state.cursor);
    let mut min = primary;
    let mut max = primary;
    for &c in &state.secondary {
        let (line, _) = state.line_col(c);
        min = min.min(line);
        max = max.max(line);
    }
    (min, max)
}

/// Add a cursor on the line below the lowest cursor, at the primary's
/// column (clamped). Silent no-op at the last line.
pub(crate) fn add_below(state: &mut EditorState) -> DispatchResult {
    let (_, max_line) = cursor_lines(state);
    let target = max_line + 1;
    if target >= state.rope.line_count() {
        return DispatchResult::clean();
    }
    add_at_line(state, target)
}

/// Add a cursor on the line above the highest cursor.
pub(crate) fn add_above(state: &mut EditorState) -> DispatchResult {
    let (min_line, _) = cursor_lines(state);
    if min_line == 0 {
        return DispatchResult::clean();
    }
    add_at_line(state, min_line - 1)
}

fn add_at_line(state: &mut EditorState, line: usize) -> DispatchResult {
    let (_, col) = state.line_col(state.cursor);
    let (start, content_end) = text::line_content_range(&state.rope, line);
    let pos = state.snap_to_boundary(start + col.min(content_end - start));
    if push_secondary(state, pos) {
        trace!(target: "actions.cursors", line, pos, "cursor_added");
        DispatchResult::dirty()
    } else {
        DispatchResult::clean()
    }
}

/// Add a cursor at the next word-bounded occurrence of the identifier under
/// the primary cursor. All failure paths are silent.
pub(crate) fn add_next_match(state: &mut EditorState) -> DispatchResult {
    let bytes = state.rope.to_bytes();
    let Some((start, end)) = text::word_at(&bytes, state.cursor) else {
        return DispatchResult::clean();
    };
    let word = bytes[start..end].to_vec();
    let Some(hit) = text::find_word_forward(&bytes, &word, end) else {
        return DispatchResult::clean();
    };
    if push_secondary(state, hit) {
        DispatchResult::dirty()
    } else {
        DispatchResult::clean()
    }
}

pub(crate) fn remove_last(state: &mut EditorState) -> DispatchResult {
    if state.secondary.pop().is_some() {
        DispatchResult::dirty()
    } else {
        DispatchResult::clean()
    }
}

/// Toggle multi-cursor mode off: clears every secondary cursor.
pub(crate) fn toggle(state: &mut EditorState) -> DispatchResult {
    if state.secondary.is_empty() {
        DispatchResult::clean()
    } else {
        state.secondary.clear();
        DispatchResult::dirty()
    }
}

/// Begin a rename: seed the rename buffer with the identifier under the
/// cursor and mark the rename UI active. Cross-file rename goes through the
/// language server; this only drives the in-file path.
pub(crate) fn rename_start(state: &mut EditorState) -> DispatchResult {
    let bytes = state.rope.to_bytes();
    let Some((start, end)) = text::word_at(&bytes, state.cursor) else {
        return DispatchResult::clean();
    };
    state.rename_buffer = String::from_utf8_lossy(&bytes[start..end]).into_owned();
    state.rename_active = true;
    DispatchResult::dirty()
}

/// Replace every word-bounded occurrence of the identifier under the cursor
/// with the rename buffer, in reverse order so earlier offsets stay valid.
/// The primary cursor lands on the first occurrence.
pub(crate) fn rename_in_file(state: &mut EditorState) -> Result<DispatchResult> {
    let replacement = state.rename_buffer.as_bytes().to_vec();
    if replacement.is_empty() {
        return Ok(DispatchResult::clean());
    }
    let bytes = state.rope.to_bytes();
    let Some((start, end)) = text::word_at(&bytes, state.cursor) else {
        return Ok(DispatchResult::clean());
    };
    let word = bytes[start..end].to_vec();
    if word == replacement {
        state.rename_active = false;
        return Ok(DispatchResult::clean());
    }
    let occurrences = text::word_occurrences(&bytes, &word);
    debug_assert!(!occurrences.is_empty());

    state.commit_snapshot();
    let pre = state.capture();
    for &hit in occurrences.iter().rev() {
        let outcome = state
            .rope
            .delete(hit, word.len())
            .and_then(|()| state.rope.insert(hit, &replacement));
        if let Err(err) = outcome {
            state.rollback(&pre);
            return Err(err.into());
        }
    }
    state.cursor = occurrences[0];
    state.secondary.clear();
    state.rename_active = false;
    state.dirty = true;
    trace!(
        target: "actions.cursors",
        occurrences = occurrences.len(),
        "rename_in_file"
    );
    Ok(DispatchResult::dirty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_rope::Rope;

    fn state(text: &str) -> EditorState {
        EditorState::new(Rope::from_str(text))
    }

    #[test]
    fn add_below_stacks_lines() {
        let mut st = state("aa\nbb\ncc\n");
        st.cursor = 1;
        assert!(add_below(&mut st).dirty);
        assert_eq!(st.secondary.as_slice(), &[4]);
        assert!(add_below(&mut st).dirty);
        assert_eq!(st.secondary.as_slice(), &[4, 7]);
        let r = add_below(&mut st);
        assert!(!r.dirty, "no line below the last");
    }

    #[test]
    fn add_above_from_middle() {
        let mut st = state("aa\nbb\n");
        st.cursor = 4;
        assert!(add_above(&mut st).dirty);
        assert_eq!(st.secondary.as_slice(), &[1]);
        assert!(!add_above(&mut st).dirty);
    }

    #[test]
    fn add_next_match_appends_word_occurrence() {
        let mut st = state("count = count + 1");
        st.cursor = 0;
        assert!(add_next_match(&mut st).dirty);
        assert_eq!(st.secondary.as_slice(), &[8]);
        let r = add_next_match(&mut st);
        assert!(!r.dirty, "silent when no further occurrence");
    }

    #[test]
    fn add_next_match_off_word_is_silent() {
        let mut st = state("a + b");
        st.cursor = 1;
        assert!(!add_next_match(&mut st).dirty);
        assert!(st.secondary.is_empty());
    }

    #[test]
    fn remove_and_toggle() {
        let mut st = state("aa\nbb\ncc\n");
        add_below(&mut st);
        add_below(&mut st);
        assert!(remove_last(&mut st).dirty);
        assert_eq!(st.secondary.len(), 1);
        assert!(toggle(&mut st).dirty);
        assert!(st.secondary.is_empty());
        assert!(!toggle(&mut st).dirty);
    }

    #[test]
    fn rename_replaces_all_word_bounded() {
        let mut st = state("val x = val +值val");
        st.cursor = 0;
        st.rename_buffer = "value".to_string();
        rename_in_file(&mut st).unwrap();
        // "val" inside "值val"? 值 is non-word bytes, so that trailing val IS
        // word-bounded on the left; it is replaced too.
        assert_eq!(st.rope.to_bytes(), "value x = value +值value".as_bytes());
        assert_eq!(st.cursor, 0);
        assert!(!st.rename_active);
    }

    #[test]
    fn rename_undo_restores_original() {
        let mut st = state("a a a");
        st.cursor = 0;
        st.rename_buffer = "bbb".to_string();
        rename_in_file(&mut st).unwrap();
        assert_eq!(st.rope.to_bytes(), b"bbb bbb bbb");
        assert!(st.undo());
        assert_eq!(st.rope.to_bytes(), b"a a a");
    }

    #[test]
    fn rename_start_seeds_buffer() {
        let mut st = state("fn helper()");
        st.cursor = 4;
        assert!(rename_start(&mut st).dirty);
        assert!(st.rename_active);
        assert_eq!(st.rename_buffer, "helper");
    }
}
