//! End-to-end editor scenarios driven through `handle_key`/`dispatch`.

use core_actions::{Command, Key, MotionKind, dispatch, handle_key};
use core_rope::Rope;
use core_state::{EditorState, Mode};

fn state(text: &str) -> EditorState {
    EditorState::new(Rope::from_str(text))
}

fn keys(st: &mut EditorState, input: &str) {
    for c in input.chars() {
        handle_key(st, Key::Char(c)).unwrap();
    }
}

#[test]
fn delete_under_cursor_scenario() {
    // Buffer "abc", cursor at 2, `x` → "ab", cursor at 1.
    let mut st = state("abc");
    st.cursor = 2;
    handle_key(&mut st, Key::Char('x')).unwrap();
    assert_eq!(st.rope.to_bytes(), b"ab");
    assert_eq!(st.cursor, 1);
}

#[test]
fn yank_line_paste_scenario() {
    // Buffer "one\ntwo\n", `yy` then `p` → "one\none\ntwo\n", cursor on
    // line 1 column 0, register linewise "one\n".
    let mut st = state("one\ntwo\n");
    st.cursor = 2; // anywhere on line 0
    keys(&mut st, "yyp");
    assert_eq!(st.rope.to_bytes(), b"one\none\ntwo\n");
    let (line, col) = st.line_col(st.cursor);
    assert_eq!((line, col), (1, 0));
    assert!(st.register.is_linewise());
    assert_eq!(st.register.bytes(), b"one\n");
    assert_eq!(st.rope.line_count(), 4);
}

#[test]
fn yank_paste_increases_line_count_by_one() {
    let mut st = state("alpha\nbeta\ngamma\n");
    let lines_before = st.rope.line_count();
    st.cursor = 7; // on "beta"
    keys(&mut st, "yyp");
    assert_eq!(st.rope.line_count(), lines_before + 1);
    let (line, _) = st.line_col(st.cursor);
    let (s, e) = st.rope.line_range(line).unwrap();
    let pasted: Vec<u8> = st.rope.segments(s..e).flat_map(|x| x.to_vec()).collect();
    assert_eq!(pasted, b"beta\n");
}

#[test]
fn undo_redo_round_trip_byte_exact() {
    let mut st = state("alpha\nbeta\n");
    let original = st.rope.to_bytes();
    st.cursor = 0;
    keys(&mut st, "dd");
    let edited = st.rope.to_bytes();
    assert_ne!(edited, original);
    handle_key(&mut st, Key::Char('u')).unwrap();
    assert_eq!(st.rope.to_bytes(), original);
    handle_key(&mut st, Key::Ctrl('r')).unwrap();
    assert_eq!(st.rope.to_bytes(), edited);
}

#[test]
fn cursor_stays_on_boundary_through_arbitrary_inputs() {
    let mut st = state("héllo wörld\nsécond линия\n");
    let script = "lljjwwbkl$0Gglhlhwbx";
    for c in script.chars() {
        let _ = handle_key(&mut st, Key::Char(c));
        assert!(
            st.rope.is_char_boundary(st.cursor),
            "cursor {} off boundary after '{}'",
            st.cursor,
            c
        );
        for &sec in &st.secondary {
            assert!(st.rope.is_char_boundary(sec));
        }
    }
}

#[test]
fn insert_run_undoes_as_one_group() {
    let mut st = state("");
    keys(&mut st, "i");
    keys(&mut st, "hello world");
    handle_key(&mut st, Key::Escape).unwrap();
    assert_eq!(st.rope.to_bytes(), b"hello world");
    assert!(st.undo());
    assert_eq!(st.rope.to_bytes(), b"");
    assert!(st.redo());
    assert_eq!(st.rope.to_bytes(), b"hello world");
}

#[test]
fn failed_compound_command_does_not_corrupt() {
    // Rename with an unchanged name is a no-op; buffer stays identical.
    let mut st = state("same same");
    st.cursor = 0;
    st.rename_buffer = "same".to_string();
    let r = dispatch(&mut st, Command::RenameInFile).unwrap();
    assert!(!r.dirty);
    assert_eq!(st.rope.to_bytes(), b"same same");
}

#[test]
fn multi_cursor_add_and_edit_shifts() {
    let mut st = state("aaa\nbbb\nccc\n");
    st.cursor = 0;
    keys(&mut st, "gj"); // add cursor below
    assert_eq!(st.secondary.as_slice(), &[4]);
    // Insert at primary shifts the secondary.
    keys(&mut st, "i");
    keys(&mut st, "XX");
    handle_key(&mut st, Key::Escape).unwrap();
    assert_eq!(st.rope.to_bytes(), b"XXaaa\nbbb\nccc\n");
    assert_eq!(st.secondary.as_slice(), &[6]);
}

#[test]
fn jump_to_definition_surfaces_request() {
    let mut st = state("fn target() {}\ntarget()\n");
    st.cursor = 16;
    let r = keys_result(&mut st, "gd");
    let req = r.request.expect("definition request");
    assert_eq!(
        req,
        core_actions::EditorRequest::Definition { offset: 16 }
    );
}

fn keys_result(st: &mut EditorState, input: &str) -> core_actions::DispatchResult {
    let mut last = core_actions::DispatchResult::clean();
    for c in input.chars() {
        last = handle_key(st, Key::Char(c)).unwrap();
    }
    last
}

#[test]
fn visual_yank_then_paste() {
    let mut st = state("abc def");
    keys(&mut st, "v");
    keys(&mut st, "ll"); // select "abc" head at 2
    keys(&mut st, "y");
    assert_eq!(st.register.bytes(), b"abc");
    assert!(!st.register.is_linewise());
    assert_eq!(st.mode, Mode::Normal);
    st.cursor = 6;
    keys(&mut st, "p");
    assert_eq!(st.rope.to_bytes(), b"abc defabc");
}

#[test]
fn selection_walk_without_provider_is_unsupported() {
    let mut st = state("fn main() {}");
    let err = dispatch(&mut st, Command::SelectionExpand).unwrap_err();
    assert_eq!(err, core_actions::ActionError::Unsupported);
    let err = dispatch(&mut st, Command::SelectionShrink).unwrap_err();
    assert_eq!(err, core_actions::ActionError::Unsupported);
}

/// Stand-in for an external syntax tree: expands to the enclosing
/// whitespace-delimited token, then to the whole buffer.
struct TokenTree;

impl core_actions::TreeWalkProvider for TokenTree {
    fn expand(&self, rope: &Rope, range: (usize, usize)) -> Option<(usize, usize)> {
        let bytes = rope.to_bytes();
        let (start, end) = range;
        let mut s = start.min(bytes.len());
        let mut e = end.min(bytes.len());
        if (s, e) != (0, bytes.len()) && (s > 0 || e < bytes.len()) {
            while s > 0 && bytes[s - 1] != b' ' {
                s -= 1;
            }
            while e < bytes.len() && bytes[e] != b' ' {
                e += 1;
            }
            if (s, e) == range {
                return Some((0, bytes.len()));
            }
            return Some((s, e));
        }
        None
    }

    fn shrink(&self, _rope: &Rope, range: (usize, usize)) -> Option<(usize, usize)> {
        let (start, end) = range;
        (end > start).then_some((start, start))
    }
}

#[test]
fn selection_walk_with_provider_expands_and_shrinks() {
    let mut st = state("alpha beta gamma");
    st.cursor = 7; // inside "beta"
    let provider = TokenTree;
    let r = core_actions::dispatch_with(&mut st, Command::SelectionExpand, Some(&provider))
        .unwrap();
    assert!(r.dirty);
    assert_eq!(st.selection.unwrap().ordered(), (6, 10));
    core_actions::dispatch_with(&mut st, Command::SelectionExpand, Some(&provider)).unwrap();
    assert_eq!(st.selection.unwrap().ordered(), (0, 16));
    core_actions::dispatch_with(&mut st, Command::SelectionShrink, Some(&provider)).unwrap();
    assert_eq!(st.selection.unwrap().ordered(), (0, 0));
}

#[test]
fn motion_with_command_enum_matches_key_path() {
    let mut st1 = state("one two three");
    let mut st2 = state("one two three");
    keys(&mut st1, "ww");
    dispatch(&mut st2, Command::Motion(MotionKind::WordForward)).unwrap();
    dispatch(&mut st2, Command::Motion(MotionKind::WordForward)).unwrap();
    assert_eq!(st1.cursor, st2.cursor);
}
