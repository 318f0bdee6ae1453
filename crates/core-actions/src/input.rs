//! Per-mode key translation.
//!
//! Normal mode composes multi-key commands through a single `pending_key`
//! slot (`g`, `d`, `y`, `z` open two-key sequences). A pending sequence that
//! does not complete is discarded when the next key arrives, and that key is
//! then handled on its own. Unrecognized keys fail with `UnhandledKey`
//! without mutating state.

use core_state::{EditorState, Mode};
use tracing::trace;

use crate::dispatcher::{DispatchResult, dispatch, edit};
use crate::{ActionError, Command, Key, MotionKind, Result};

/// Dispatch one key according to the current mode.
pub fn handle_key(state: &mut EditorState, key: Key) -> Result<DispatchResult> {
    match state.mode {
        Mode::Normal => normal_key(state, key),
        Mode::Insert => insert_key(state, key),
        Mode::Visual => visual_key(state, key),
        Mode::Command => command_key(state, key),
    }
}

fn normal_key(state: &mut EditorState, key: Key) -> Result<DispatchResult> {
    if let Some(leader) = state.pending_key.take() {
        if let Key::Char(c) = key
            && let Some(command) = two_key_command(leader, c)
        {
            return dispatch(state, command);
        }
        // Incomplete sequence: drop the pending leader, handle the key anew.
        trace!(target: "actions.input", leader = %leader, "pending_discarded");
    }
    let command = match key {
        Key::Char('h') => Command::Motion(MotionKind::Left),
        Key::Char('j') => Command::Motion(MotionKind::Down),
        Key::Char('k') => Command::Motion(MotionKind::Up),
        Key::Char('l') => Command::Motion(MotionKind::Right),
        Key::Char('w') => Command::Motion(MotionKind::WordForward),
        Key::Char('b') => Command::Motion(MotionKind::WordBackward),
        Key::Char('0') => Command::Motion(MotionKind::LineStart),
        Key::Char('$') => Command::Motion(MotionKind::LineEnd),
        Key::Char('G') => Command::Motion(MotionKind::FileEnd),
        Key::Char('x') => Command::DeleteChar,
        Key::Char('J') => Command::JoinLines,
        Key::Char('p') => Command::PasteAfter,
        Key::Char('P') => Command::PasteBefore,
        Key::Char('u') => Command::Undo,
        Key::Ctrl('r') => Command::Redo,
        Key::Char('n') => Command::SearchNext,
        Key::Char('N') => Command::SearchPrev,
        Key::Char('%') => Command::MatchBracket,
        Key::Char('i') => Command::EnterInsert,
        Key::Char('v') => Command::EnterVisual,
        Key::Char(':') => Command::EnterCommand,
        Key::Char('/') => {
            state.mode = Mode::Command;
            state.command_line.clear();
            state.command_line.push('/');
            return Ok(DispatchResult::dirty());
        }
        Key::Char(leader @ ('g' | 'd' | 'y' | 'z')) => {
            state.pending_key = Some(leader);
            return Ok(DispatchResult::clean());
        }
        Key::Escape => {
            state.reset_transient();
            return Ok(DispatchResult::clean());
        }
        _ => return Err(ActionError::UnhandledKey),
    };
    dispatch(state, command)
}

fn two_key_command(leader: char, key: char) -> Option<Command> {
    match (leader, key) {
        ('g', 'g') => Some(Command::Motion(MotionKind::FileStart)),
        ('g', 'd') => Some(Command::JumpToDefinition),
        ('g', 'r') => Some(Command::RenameStart),
        ('g', 'j') => Some(Command::CursorAddBelow),
        ('g', 'k') => Some(Command::CursorAddAbove),
        ('g', 'n') => Some(Command::CursorAddNextMatch),
        ('g', 'q') => Some(Command::CursorRemoveLast),
        ('g', 'c') => Some(Command::CursorsToggle),
        ('d', 'd') => Some(Command::DeleteLine),
        ('y', 'y') => Some(Command::YankLine),
        ('z', 'a') => Some(Command::ToggleFold),
        ('z', 'm') => Some(Command::FoldAll),
        ('z', 'r') => Some(Command::UnfoldAll),
        _ => None,
    }
}

fn insert_key(state: &mut EditorState, key: Key) -> Result<DispatchResult> {
    match key {
        Key::Escape => dispatch(state, Command::ReturnToNormal),
        Key::Enter => {
            state.begin_insert_run();
            insert_bytes(state, b"\n")?;
            // Newline is a coalescing boundary: the next insert starts a
            // fresh undo group.
            state.end_insert_run();
            Ok(DispatchResult::dirty())
        }
        Key::Backspace => {
            if state.cursor == 0 {
                return Ok(DispatchResult::clean());
            }
            state.begin_insert_run();
            let prev = crate::text::prev_boundary(&state.rope, state.cursor);
            let len = state.cursor - prev;
            state.rope.delete(prev, len)?;
            state.shift_for_delete(prev, len);
            state.cursor = prev;
            state.dirty = true;
            Ok(DispatchResult::dirty())
        }
        Key::Char(c) => {
            state.begin_insert_run();
            let mut buf = [0u8; 4];
            let encoded = c.encode_utf8(&mut buf).as_bytes().to_vec();
            insert_bytes(state, &encoded)?;
            Ok(DispatchResult::dirty())
        }
        Key::Ctrl(_) => Err(ActionError::UnhandledKey),
    }
}

fn insert_bytes(state: &mut EditorState, bytes: &[u8]) -> Result<()> {
    let pos = state.cursor;
    state.rope.insert(pos, bytes)?;
    state.shift_for_insert(pos, bytes.len());
    state.cursor = pos + bytes.len();
    state.dirty = true;
    Ok(())
}

fn visual_key(state: &mut EditorState, key: Key) -> Result<DispatchResult> {
    let command = match key {
        Key::Char('h') => Command::Motion(MotionKind::Left),
        Key::Char('j') => Command::Motion(MotionKind::Down),
        Key::Char('k') => Command::Motion(MotionKind::Up),
        Key::Char('l') => Command::Motion(MotionKind::Right),
        Key::Char('w') => Command::Motion(MotionKind::WordForward),
        Key::Char('b') => Command::Motion(MotionKind::WordBackward),
        Key::Char('0') => Command::Motion(MotionKind::LineStart),
        Key::Char('$') => Command::Motion(MotionKind::LineEnd),
        Key::Char('G') => Command::Motion(MotionKind::FileEnd),
        Key::Char('d') | Key::Char('x') => Command::OperatorDelete,
        Key::Char('y') => Command::OperatorYank,
        Key::Char('c') => Command::OperatorChange,
        Key::Char('v') | Key::Escape => Command::ReturnToNormal,
        _ => return Err(ActionError::UnhandledKey),
    };
    dispatch(state, command)
}

fn command_key(state: &mut EditorState, key: Key) -> Result<DispatchResult> {
    match key {
        Key::Char(c) => {
            state.command_line.push(c);
            Ok(DispatchResult::dirty())
        }
        Key::Backspace => {
            state.command_line.pop();
            if state.command_line.is_empty() {
                state.mode = Mode::Normal;
            }
            Ok(DispatchResult::dirty())
        }
        Key::Escape => {
            state.command_line.clear();
            state.mode = Mode::Normal;
            Ok(DispatchResult::dirty())
        }
        Key::Enter => {
            let line = std::mem::take(&mut state.command_line);
            state.mode = Mode::Normal;
            if let Some(pattern) = line.strip_prefix('/') {
                let pattern = pattern.as_bytes().to_vec();
                dispatch(state, Command::SetSearchPattern(pattern))?;
                dispatch(state, Command::SearchNext)
            } else if let Some(ex) = line.strip_prefix(':') {
                dispatch(state, Command::ExExecute(ex.to_string()))
            } else {
                Ok(DispatchResult::dirty())
            }
        }
        Key::Ctrl(_) => Err(ActionError::UnhandledKey),
    }
}

/// Post-edit Normal-mode cursor normalization, exposed for embedding loops
/// that mutate the rope outside the dispatcher (plugin edits).
pub fn normalize_cursor(state: &mut EditorState) {
    edit::normalize_normal_cursor(state);
}
