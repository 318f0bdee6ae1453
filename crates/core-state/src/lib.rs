//! Editor state: rope, mode, cursors, selection, registers, search, folds,
//! and undo integration.
//!
//! Cursor positions are absolute byte offsets into the rope. The state
//! offers boundary helpers but does not police UTF-8 discipline itself;
//! the action layer is responsible for only ever storing code-point
//! boundary offsets (the rope accepts arbitrary bytes).

use core_rope::{HistoryStore, Rope, Snapshot};
use smallvec::SmallVec;
use tracing::trace;

pub mod folds;

pub use folds::FoldSet;

/// Current editor mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Insert,
    Visual,
    Command,
}

/// Selection span as (anchor, head) byte offsets. Head tracks the cursor;
/// the normalized byte range is resolved per mode when an operator applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    /// Normalized `(start, end)` with `start <= end`.
    pub fn ordered(&self) -> (usize, usize) {
        if self.anchor <= self.head {
            (self.anchor, self.head)
        } else {
            (self.head, self.anchor)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.anchor == self.head
    }
}

/// Yank register: raw bytes plus the linewise flag. Linewise content always
/// ends with a newline when non-empty.
#[derive(Debug, Default, Clone)]
pub struct YankRegister {
    bytes: Vec<u8>,
    linewise: bool,
}

impl YankRegister {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_linewise(&self) -> bool {
        self.linewise
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn set_charwise(&mut self, bytes: Vec<u8>) {
        self.bytes = bytes;
        self.linewise = false;
    }

    /// Store linewise content, appending the terminating newline if the
    /// yanked line was the last one and lacked it.
    pub fn set_linewise(&mut self, mut bytes: Vec<u8>) {
        if !bytes.is_empty() && bytes.last() != Some(&b'\n') {
            bytes.push(b'\n');
        }
        self.bytes = bytes;
        self.linewise = true;
    }
}

/// Current search pattern and direction memory for `n`/`N`.
#[derive(Debug, Default, Clone)]
pub struct SearchState {
    pub pattern: Vec<u8>,
    pub last_forward: bool,
}

/// Top-level editor state for a single buffer.
pub struct EditorState {
    pub rope: Rope,
    pub mode: Mode,
    /// Primary cursor as an absolute byte offset in `[0, rope.len()]`.
    pub cursor: usize,
    /// Goal column in bytes from line start, preserved across vertical
    /// motions and cleared by horizontal ones.
    pub goal_col: Option<usize>,
    /// Ordered secondary cursors (multi-cursor). Never contains the primary.
    pub secondary: SmallVec<[usize; 4]>,
    pub selection: Option<Selection>,
    pub register: YankRegister,
    pub search: SearchState,
    /// Single pending-key slot for two-key sequences (`g`, `d`, `y`).
    pub pending_key: Option<char>,
    /// Ex command line under construction (without the leading ':').
    pub command_line: String,
    pub rename_buffer: String,
    pub rename_active: bool,
    pub folds: FoldSet,
    pub dirty: bool,
    /// True while an Insert-mode run is coalescing into one undo snapshot.
    /// The first mutation of a run records the snapshot; leaving Insert mode
    /// or inserting a newline ends the run.
    pub insert_run_active: bool,
    history: HistoryStore,
}

impl EditorState {
    pub fn new(rope: Rope) -> Self {
        Self::with_history_cap(rope, core_rope::DEFAULT_HISTORY_MAX)
    }

    pub fn with_history_cap(rope: Rope, cap: usize) -> Self {
        Self {
            rope,
            mode: Mode::Normal,
            cursor: 0,
            goal_col: None,
            secondary: SmallVec::new(),
            selection: None,
            register: YankRegister::default(),
            search: SearchState::default(),
            pending_key: None,
            command_line: String::new(),
            rename_buffer: String::new(),
            rename_active: false,
            folds: FoldSet::default(),
            dirty: false,
            insert_run_active: false,
            history: HistoryStore::new(cap),
        }
    }

    /// Record a snapshot once at the start of an Insert-mode run; no-op
    /// while the run stays active.
    pub fn begin_insert_run(&mut self) {
        if !self.insert_run_active {
            self.commit_snapshot();
            self.insert_run_active = true;
        }
    }

    pub fn end_insert_run(&mut self) {
        self.insert_run_active = false;
    }

    pub fn undo_depth(&self) -> usize {
        self.history.undo_depth()
    }
    pub fn redo_depth(&self) -> usize {
        self.history.redo_depth()
    }

    /// Record the current rope state as the start of a new edit group.
    pub fn commit_snapshot(&mut self) {
        self.history.record(self.rope.snapshot());
    }

    /// Capture without recording; used to roll back failed compound edits.
    pub fn capture(&self) -> Snapshot {
        self.rope.snapshot()
    }

    /// Reinstall a previously captured snapshot (failed-command rollback).
    pub fn rollback(&mut self, snapshot: &Snapshot) {
        self.rope.restore(snapshot);
        self.clamp_cursors();
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo(self.rope.snapshot()) {
            Some(prior) => {
                self.rope.restore(&prior);
                self.clamp_cursors();
                trace!(target: "state.undo", cursor = self.cursor, "undo_applied");
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo(self.rope.snapshot()) {
            Some(next) => {
                self.rope.restore(&next);
                self.clamp_cursors();
                trace!(target: "state.undo", cursor = self.cursor, "redo_applied");
                true
            }
            None => false,
        }
    }

    /// Line index and byte column of an absolute offset.
    pub fn line_col(&self, pos: usize) -> (usize, usize) {
        let line = self.rope.line_of(pos);
        let (start, _) = self
            .rope
            .line_range(line)
            .expect("line_of returns an existing line");
        (line, pos - start)
    }

    /// Snap `pos` back to the nearest code-point boundary at or before it.
    pub fn snap_to_boundary(&self, mut pos: usize) -> usize {
        pos = pos.min(self.rope.len());
        while pos > 0 && !self.rope.is_char_boundary(pos) {
            pos -= 1;
        }
        pos
    }

    /// Shift cursors for an insertion of `len` bytes at `pos`: offsets at or
    /// after the edit move right; the edit's own cursor handling is done by
    /// the action that performed it.
    pub fn shift_for_insert(&mut self, pos: usize, len: usize) {
        for c in self.secondary.iter_mut() {
            if *c >= pos {
                *c += len;
            }
        }
        if let Some(sel) = &mut self.selection {
            if sel.anchor >= pos {
                sel.anchor += len;
            }
            if sel.head >= pos {
                sel.head += len;
            }
        }
    }

    /// Shift cursors for a deletion of `[pos, pos+len)`: offsets past the
    /// range move left, offsets strictly inside collapse to `pos`.
    pub fn shift_for_delete(&mut self, pos: usize, len: usize) {
        let end = pos + len;
        let remap = |c: usize| {
            if c >= end {
                c - len
            } else if c > pos {
                pos
            } else {
                c
            }
        };
        for c in self.secondary.iter_mut() {
            *c = remap(*c);
        }
        if let Some(sel) = &mut self.selection {
            sel.anchor = remap(sel.anchor);
            sel.head = remap(sel.head);
        }
        self.secondary.dedup();
    }

    /// Clamp every cursor into bounds and onto code-point boundaries.
    pub fn clamp_cursors(&mut self) {
        self.cursor = self.snap_to_boundary(self.cursor);
        let len = self.rope.len();
        for c in self.secondary.iter_mut() {
            *c = (*c).min(len);
        }
        let snapped: SmallVec<[usize; 4]> = self
            .secondary
            .iter()
            .map(|c| self.snap_to_boundary(*c))
            .collect();
        self.secondary = snapped;
        self.secondary.dedup();
        if let Some(sel) = self.selection {
            self.selection = Some(Selection::new(
                self.snap_to_boundary(sel.anchor),
                self.snap_to_boundary(sel.head),
            ));
        }
    }

    /// Leave visual/command transient state behind when returning to Normal.
    pub fn reset_transient(&mut self) {
        self.selection = None;
        self.pending_key = None;
        self.command_line.clear();
    }
}
