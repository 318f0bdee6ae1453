//! Substring search (`/`, `n`, `N`) and bracket matching (`%`).
//!
//! Matching is plain byte equality against the current pattern, with
//! wrap-around. The buffer is materialized per search; patterns are short
//! and buffers modest, so the simple scan beats maintaining an index.

use core_state::EditorState;
use tracing::trace;

use crate::text;

use super::DispatchResult;

/// Search forward from `cursor + 1`, wrapping. Dirty result = found.
pub(crate) fn next(state: &mut EditorState) -> DispatchResult {
    let pattern = state.search.pattern.clone();
    if pattern.is_empty() {
        return DispatchResult::clean();
    }
    state.search.last_forward = true;
    let bytes = state.rope.to_bytes();
    let from = state.cursor.saturating_add(1).min(bytes.len());
    let hit = text::find_forward(&bytes, &pattern, from)
        .or_else(|| text::find_forward(&bytes, &pattern, 0));
    place(state, hit)
}

/// Search backward from `cursor - 1`, wrapping. Dirty result = found.
pub(crate) fn prev(state: &mut EditorState) -> DispatchResult {
    let pattern = state.search.pattern.clone();
    if pattern.is_empty() {
        return DispatchResult::clean();
    }
    state.search.last_forward = false;
    let bytes = state.rope.to_bytes();
    let hit = if state.cursor == 0 {
        text::find_backward(&bytes, &pattern, bytes.len())
    } else {
        text::find_backward(&bytes, &pattern, state.cursor - 1)
            .or_else(|| text::find_backward(&bytes, &pattern, bytes.len()))
    };
    place(state, hit)
}

fn place(state: &mut EditorState, hit: Option<usize>) -> DispatchResult {
    match hit {
        Some(pos) => {
            state.cursor = state.snap_to_boundary(pos);
            state.goal_col = None;
            trace!(target: "actions.search", pos, "search_hit");
            DispatchResult::dirty()
        }
        None => DispatchResult::clean(),
    }
}

/// Move to the partner of the bracket under the cursor, if any.
pub(crate) fn match_bracket(state: &mut EditorState) -> DispatchResult {
    let bytes = state.rope.to_bytes();
    match text::matching_bracket(&bytes, state.cursor) {
        Some(partner) => {
            state.cursor = partner;
            state.goal_col = None;
            DispatchResult::dirty()
        }
        None => DispatchResult::clean(),
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
    fn forward_search_with_wraparound() {
        let mut st = state("alpha beta alpha");
        st.search.pattern = b"alpha".to_vec();
        let r = next(&mut st);
        assert!(r.dirty);
        assert_eq!(st.cursor, 11);
        let r = next(&mut st);
        assert!(r.dirty);
        assert_eq!(st.cursor, 0, "wrapped to first occurrence");
    }

    #[test]
    fn backward_search_with_wraparound() {
        let mut st = state("alpha beta alpha");
        st.search.pattern = b"alpha".to_vec();
        st.cursor = 0;
        let r = prev(&mut st);
        assert!(r.dirty);
        assert_eq!(st.cursor, 11, "wrapped to last occurrence");
        let r = prev(&mut st);
        assert!(r.dirty);
        assert_eq!(st.cursor, 0);
    }

    #[test]
    fn missing_pattern_is_clean_and_stationary() {
        let mut st = state("text");
        st.search.pattern = b"nope".to_vec();
        st.cursor = 2;
        let r = next(&mut st);
        assert!(!r.dirty);
        assert_eq!(st.cursor, 2);
    }

    #[test]
    fn bracket_match_moves_cursor_both_ways() {
        let mut st = state("call(arg)");
        st.cursor = 4;
        assert!(match_bracket(&mut st).dirty);
        assert_eq!(st.cursor, 8);
        assert!(match_bracket(&mut st).dirty);
        assert_eq!(st.cursor, 4);
    }

    #[test]
    fn bracket_mismatch_is_clean() {
        let mut st = state("a(b");
        st.cursor = 1;
        assert!(!match_bracket(&mut st).dirty);
        assert_eq!(st.cursor, 1);
    }
}
