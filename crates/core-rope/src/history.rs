//! Bounded undo/redo stacks of rope snapshots.
//!
//! The editor records a snapshot per user-visible edit group. Undo pops the
//! undo stack and parks the pre-undo state on the redo stack; redo mirrors
//! it. A new recording clears redo. Capacity overflow drops the oldest
//! snapshot from the bottom of the undo stack; because pieces are immutable
//! and stores never compact, that frees only a piece-list vector.

use tracing::trace;

use crate::Snapshot;

/// Default snapshot retention.
pub const DEFAULT_HISTORY_MAX: usize = 1000;

pub struct HistoryStore {
    undo: Vec<Snapshot>,
    redo: Vec<Snapshot>,
    cap: usize,
}

impl HistoryStore {
    pub fn new(cap: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            cap: cap.max(1),
        }
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Record the pre-edit state of a new edit group.
    pub fn record(&mut self, snapshot: Snapshot) {
        self.undo.push(snapshot);
        if self.undo.len() > self.cap {
            self.undo.remove(0);
            trace!(target: "rope.history", cap = self.cap, "undo_stack_trimmed");
        }
        self.redo.clear();
        trace!(
            target: "rope.history",
            undo_depth = self.undo.len(),
            "snapshot_recorded"
        );
    }

    /// Pop the most recent undo snapshot, parking `current` for redo.
    pub fn undo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let restored = self.undo.pop()?;
        self.redo.push(current);
        trace!(
            target: "rope.history",
            undo_depth = self.undo.len(),
            redo_depth = self.redo.len(),
            "undo_pop"
        );
        Some(restored)
    }

    /// Pop the most recent redo snapshot, parking `current` for undo.
    pub fn redo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let restored = self.redo.pop()?;
        self.undo.push(current);
        trace!(
            target: "rope.history",
            undo_depth = self.undo.len(),
            redo_depth = self.redo.len(),
            "redo_pop"
        );
        Some(restored)
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rope;

    #[test]
    fn undo_redo_round_trip_restores_bytes() {
        let mut rope = Rope::from_str("one");
        let mut history = HistoryStore::default();
        history.record(rope.snapshot());
        rope.insert(3, b" two").unwrap();

        let restored = history.undo(rope.snapshot()).unwrap();
        rope.restore(&restored);
        assert_eq!(rope.to_bytes(), b"one");

        let reapplied = history.redo(rope.snapshot()).unwrap();
        rope.restore(&reapplied);
        assert_eq!(rope.to_bytes(), b"one two");
    }

    #[test]
    fn record_clears_redo() {
        let mut rope = Rope::from_str("a");
        let mut history = HistoryStore::default();
        history.record(rope.snapshot());
        rope.insert(1, b"b").unwrap();
        let back = history.undo(rope.snapshot()).unwrap();
        rope.restore(&back);
        assert_eq!(history.redo_depth(), 1);

        history.record(rope.snapshot());
        assert_eq!(history.redo_depth(), 0);
    }

    #[test]
    fn capacity_drops_oldest() {
        let mut rope = Rope::new();
        let mut history = HistoryStore::new(3);
        for i in 0..5u8 {
            history.record(rope.snapshot());
            rope.insert(rope.len(), &[b'0' + i]).unwrap();
        }
        assert_eq!(history.undo_depth(), 3);
        // Oldest surviving snapshot is the state before inserting '2'.
        let mut current = rope.snapshot();
        while let Some(s) = history.undo(current.clone()) {
            current = s;
        }
        rope.restore(&current);
        assert_eq!(rope.to_bytes(), b"01");
    }

    #[test]
    fn undo_empty_returns_none() {
        let rope = Rope::new();
        let mut history = HistoryStore::default();
        assert!(history.undo(rope.snapshot()).is_none());
        assert!(history.redo(rope.snapshot()).is_none());
    }
}
