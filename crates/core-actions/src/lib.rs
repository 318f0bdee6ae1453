//! Modal key handling and command dispatch over editor state.
//!
//! The flow mirrors the input pipeline split used across this workspace:
//! [`handle_key`] translates a key per mode (driving the single-slot
//! pending-key machine for two-key sequences) into a [`Command`], and
//! [`dispatcher::dispatch`] applies commands to [`core_state::EditorState`].
//! Motions are infallible and clamp; edits can fail and leave the state
//! untouched (failed compound edits roll back to their pre-command
//! snapshot).

use thiserror::Error;

pub mod dispatcher;
pub mod input;
pub mod text;

pub use dispatcher::{DispatchResult, EditorRequest, TreeWalkProvider, dispatch, dispatch_with};
pub use input::handle_key;

/// A decoded key press. Printable input arrives as `Char`; control chords
/// used by the core set are decoded upstream into `Ctrl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Ctrl(char),
    Enter,
    Escape,
    Backspace,
}

/// Cursor motions. All clamp to buffer bounds and code-point boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionKind {
    Left,
    Right,
    Up,
    Down,
    WordForward,
    WordBackward,
    LineStart,
    LineEnd,
    FileStart,
    FileEnd,
}

/// Enumerated editor operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Motion(MotionKind),
    // Edits
    DeleteChar,
    DeleteLine,
    JoinLines,
    // Registers
    YankLine,
    PasteAfter,
    PasteBefore,
    // Folds
    ToggleFold,
    FoldAll,
    UnfoldAll,
    // Selection (external tree walk when available)
    SelectionExpand,
    SelectionShrink,
    // Multi-cursor
    CursorAddBelow,
    CursorAddAbove,
    CursorAddNextMatch,
    CursorRemoveLast,
    CursorsToggle,
    // Navigation / rename
    JumpToDefinition,
    RenameStart,
    RenameInFile,
    // Search
    SetSearchPattern(Vec<u8>),
    SearchNext,
    SearchPrev,
    MatchBracket,
    // History
    Undo,
    Redo,
    // Mode transitions
    EnterInsert,
    EnterVisual,
    EnterCommand,
    ReturnToNormal,
    // Visual-mode operators
    OperatorDelete,
    OperatorYank,
    OperatorChange,
    // Ex
    ExExecute(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// Key has no binding in the current mode; state is unchanged.
    #[error("unhandled key")]
    UnhandledKey,
    /// Operation needs a collaborator (tree walker) that is not available.
    #[error("unsupported operation")]
    Unsupported,
    #[error(transparent)]
    Rope(#[from] core_rope::RopeError),
}

pub type Result<T> = std::result::Result<T, ActionError>;
