//! Indentation-based fold tracking.
//!
//! Folds are line ranges `[first, last]` kept sorted and non-overlapping.
//! Rendering is out of scope here; the set is pure state consulted by
//! whatever draws the buffer.

/// Sorted, non-overlapping set of folded line ranges (inclusive).
#[derive(Debug, Default, Clone)]
pub struct FoldSet {
    ranges: Vec<(usize, usize)>,
}

impl FoldSet {
    pub fn ranges(&self) -> &[(usize, usize)] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains(&self, line: usize) -> bool {
        self.ranges
            .iter()
            .any(|(first, last)| *first <= line && line <= *last)
    }

    /// Insert a fold, replacing any folds it overlaps.
    pub fn insert(&mut self, first: usize, last: usize) {
        debug_assert!(first <= last);
        self.ranges
            .retain(|(a, b)| *b < first || *a > last);
        let at = self
            .ranges
            .partition_point(|(a, _)| *a < first);
        self.ranges.insert(at, (first, last));
    }

    /// Remove the fold covering `line`; returns true if one was removed.
    pub fn remove_at(&mut self, line: usize) -> bool {
        let before = self.ranges.len();
        self.ranges
            .retain(|(first, last)| !(*first <= line && line <= *last));
        before != self.ranges.len()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}
