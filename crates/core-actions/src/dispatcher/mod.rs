//! Dispatcher applying [`Command`]s to editor state.
//!
//! Decomposed into focused sub-modules:
//! * `motion`  - cursor movement semantics (infallible, clamping)
//! * `edit`    - text mutation, registers, folds
//! * `search`  - substring search and bracket matching
//! * `cursors` - multi-cursor management and rename
//!
//! Failure policy: motions never fail; edits that fail leave the state
//! untouched; compound edits (rename) roll back to their pre-command
//! snapshot on partial failure.

use core_rope::Rope;
use core_state::{EditorState, Mode, Selection};
use tracing::trace;

use crate::{ActionError, Command, Result};

pub(crate) mod cursors;
pub(crate) mod edit;
pub(crate) mod motion;
pub(crate) mod search;

/// Side requests the dispatcher cannot satisfy alone; the embedding loop
/// routes them (to the LSP subsystem, in practice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorRequest {
    /// Jump-to-definition for the symbol at `offset`.
    Definition { offset: usize },
}

/// Result of dispatching a single command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DispatchResult {
    /// State changed in a way a renderer would care about.
    pub dirty: bool,
    /// The editor should exit.
    pub quit: bool,
    pub request: Option<EditorRequest>,
}

impl DispatchResult {
    pub fn dirty() -> Self {
        Self {
            dirty: true,
            ..Self::default()
        }
    }
    pub fn clean() -> Self {
        Self::default()
    }
    pub fn quit() -> Self {
        Self {
            dirty: true,
            quit: true,
            ..Self::default()
        }
    }
    pub fn request(request: EditorRequest) -> Self {
        Self {
            dirty: false,
            quit: false,
            request: Some(request),
        }
    }
}

/// Structural selection seam. Backed by an external syntax tree when one is
/// wired in; expand/shrink are no-ops (`Unsupported`) without it.
pub trait TreeWalkProvider {
    fn expand(&self, rope: &Rope, range: (usize, usize)) -> Option<(usize, usize)>;
    fn shrink(&self, rope: &Rope, range: (usize, usize)) -> Option<(usize, usize)>;
}

pub fn dispatch(state: &mut EditorState, command: Command) -> Result<DispatchResult> {
    dispatch_with(state, command, None)
}

pub fn dispatch_with(
    state: &mut EditorState,
    command: Command,
    tree: Option<&dyn TreeWalkProvider>,
) -> Result<DispatchResult> {
    trace!(target: "actions.dispatch", command = ?command, cursor = state.cursor, "dispatch");
    match command {
        Command::Motion(kind) => Ok(motion::apply(state, kind)),

        Command::DeleteChar => edit::delete_char(state),
        Command::DeleteLine => edit::delete_line(state),
        Command::JoinLines => edit::join_lines(state),
        Command::YankLine => edit::yank_line(state),
        Command::PasteAfter => edit::paste(state, false),
        Command::PasteBefore => edit::paste(state, true),
        Command::OperatorDelete => edit::operator(state, edit::Operator::Delete),
        Command::OperatorYank => edit::operator(state, edit::Operator::Yank),
        Command::OperatorChange => edit::operator(state, edit::Operator::Change),

        Command::ToggleFold => Ok(edit::toggle_fold(state)),
        Command::FoldAll => Ok(edit::fold_all(state)),
        Command::UnfoldAll => Ok(edit::unfold_all(state)),

        Command::SelectionExpand => selection_walk(state, tree, true),
        Command::SelectionShrink => selection_walk(state, tree, false),

        Command::CursorAddBelow => Ok(cursors::add_below(state)),
        Command::CursorAddAbove => Ok(cursors::add_above(state)),
        Command::CursorAddNextMatch => Ok(cursors::add_next_match(state)),
        Command::CursorRemoveLast => Ok(cursors::remove_last(state)),
        Command::CursorsToggle => Ok(cursors::toggle(state)),

        Command::JumpToDefinition => Ok(DispatchResult::request(EditorRequest::Definition {
            offset: state.cursor,
        })),
        Command::RenameStart => Ok(cursors::rename_start(state)),
        Command::RenameInFile => cursors::rename_in_file(state),

        Command::SetSearchPattern(pattern) => {
            state.search.pattern = pattern;
            Ok(DispatchResult::clean())
        }
        Command::SearchNext => Ok(search::next(state)),
        Command::SearchPrev => Ok(search::prev(state)),
        Command::MatchBracket => Ok(search::match_bracket(state)),

        Command::Undo => Ok(if state.undo() {
            DispatchResult::dirty()
        } else {
            DispatchResult::clean()
        }),
        Command::Redo => Ok(if state.redo() {
            DispatchResult::dirty()
        } else {
            DispatchResult::clean()
        }),

        Command::EnterInsert => {
            state.mode = Mode::Insert;
            Ok(DispatchResult::dirty())
        }
        Command::EnterVisual => {
            state.mode = Mode::Visual;
            state.selection = Some(Selection::new(state.cursor, state.cursor));
            Ok(DispatchResult::dirty())
        }
        Command::EnterCommand => {
            state.mode = Mode::Command;
            state.command_line.clear();
            state.command_line.push(':');
            Ok(DispatchResult::dirty())
        }
        Command::ReturnToNormal => {
            if state.mode == Mode::Insert {
                state.end_insert_run();
                edit::normalize_normal_cursor(state);
            }
            state.reset_transient();
            state.mode = Mode::Normal;
            Ok(DispatchResult::dirty())
        }

        Command::ExExecute(line) => ex_execute(state, &line),
    }
}

fn selection_walk(
    state: &mut EditorState,
    tree: Option<&dyn TreeWalkProvider>,
    expand: bool,
) -> Result<DispatchResult> {
    let Some(provider) = tree else {
        return Err(ActionError::Unsupported);
    };
    let current = state
        .selection
        .map(|s| s.ordered())
        .unwrap_or((state.cursor, state.cursor));
    let walked = if expand {
        provider.expand(&state.rope, current)
    } else {
        provider.shrink(&state.rope, current)
    };
    match walked {
        Some((start, end)) => {
            state.selection = Some(Selection::new(start, end));
            state.cursor = state.snap_to_boundary(end);
            Ok(DispatchResult::dirty())
        }
        None => Ok(DispatchResult::clean()),
    }
}

fn ex_execute(state: &mut EditorState, line: &str) -> Result<DispatchResult> {
    match line.trim() {
        "" => Ok(DispatchResult::clean()),
        "q" | "quit" => Ok(DispatchResult::quit()),
        "nohl" => {
            state.search.pattern.clear();
            Ok(DispatchResult::dirty())
        }
        other => {
            trace!(target: "actions.dispatch", command = other, "unknown_ex_command");
            Err(ActionError::Unsupported)
        }
    }
}
