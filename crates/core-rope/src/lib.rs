//! Piece-table text storage.
//!
//! A [`Rope`] maps logical byte indices onto an ordered sequence of immutable
//! [`Piece`]s, each referencing a half-open slice of one of two backing
//! stores: `original` (frozen at construction) and `add` (append-only).
//! Edits never mutate pieces or move existing bytes; they rebuild the piece
//! list, which makes [`Rope::snapshot`] an O(1) reference-count bump and
//! restore an O(1) pointer swap. A cached line-start table is maintained
//! incrementally across edits.
//!
//! The rope is byte-oriented on purpose: it performs no UTF-8 validation so
//! binary buffers can pass through. Code-point boundary discipline is the
//! caller's job (see `is_char_boundary`).

use std::ops::Range;
use std::rc::Rc;

use thiserror::Error;

pub mod arena;
pub mod history;

pub use arena::Arena;
pub use history::{DEFAULT_HISTORY_MAX, HistoryStore};

/// Which backing store a piece points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreId {
    Original,
    Add,
}

/// Immutable descriptor of a byte run inside one store.
///
/// Pieces are values: a split produces two new pieces over disjoint adjacent
/// ranges of the same store; the original piece is discarded, never edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    store: StoreId,
    start: usize,
    len: usize,
}

impl Piece {
    fn new(store: StoreId, start: usize, len: usize) -> Self {
        Self { store, start, len }
    }

    pub fn store(&self) -> StoreId {
        self.store
    }
    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Rope operation failures. Failed operations leave the rope unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RopeError {
    /// Position or range escapes `[0, len]`.
    #[error("position {pos} out of bounds (len {len})")]
    BadPosition { pos: usize, len: usize },
    /// Backing allocation refused (store growth or piece-list rebuild).
    #[error("out of memory growing rope storage")]
    OutOfMemory,
}

pub type Result<T> = std::result::Result<T, RopeError>;

/// A saved piece list (plus line cache) from a [`Rope`].
///
/// Stores are shared with the originating rope, so snapshots stay valid for
/// its lifetime; dropping one frees only the piece-list vector.
#[derive(Clone)]
pub struct Snapshot {
    pieces: Rc<[Piece]>,
    offsets: Rc<[usize]>,
    line_starts: Rc<[usize]>,
    len: usize,
}

impl Snapshot {
    /// Byte length of the rope state this snapshot captures.
    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    /// Number of pieces captured; restore cost is proportional to this.
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }
}

/// Piece-table rope over two byte stores.
pub struct Rope {
    original: Vec<u8>,
    add: Vec<u8>,
    pieces: Rc<[Piece]>,
    /// Logical start offset of each piece; parallel to `pieces`. Kept so
    /// position lookup is a binary search instead of a linear walk.
    offsets: Rc<[usize]>,
    /// Byte offset of the first byte of each line. `line_starts[0] == 0`.
    line_starts: Rc<[usize]>,
    len: usize,
}

impl Rope {
    /// Empty rope with empty stores.
    pub fn new() -> Self {
        Self {
            original: Vec::new(),
            add: Vec::new(),
            pieces: Rc::from([]),
            offsets: Rc::from([]),
            line_starts: Rc::from([0usize]),
            len: 0,
        }
    }

    /// Rope seeded from `bytes`, which become the immutable original store.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        let line_starts = compute_line_starts(&bytes);
        let (pieces, offsets): (Rc<[Piece]>, Rc<[usize]>) = if len == 0 {
            (Rc::from([]), Rc::from([]))
        } else {
            (
                Rc::from([Piece::new(StoreId::Original, 0, len)]),
                Rc::from([0usize]),
            )
        };
        Self {
            original: bytes,
            add: Vec::new(),
            pieces,
            offsets,
            line_starts: Rc::from(line_starts),
            len,
        }
    }

    pub fn from_str(text: &str) -> Self {
        Self::from_bytes(text.as_bytes().to_vec())
    }

    /// Current logical byte length.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of pieces in canonical form (no zero-length entries).
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Insert `bytes` so they appear at logical position `pos`.
    ///
    /// Appends to the add store and splices the piece list; existing store
    /// bytes never move. Empty inserts succeed as no-ops. No UTF-8
    /// validation happens here.
    pub fn insert(&mut self, pos: usize, bytes: &[u8]) -> Result<()> {
        if pos > self.len {
            return Err(RopeError::BadPosition { pos, len: self.len });
        }
        if bytes.is_empty() {
            return Ok(());
        }
        self.add
            .try_reserve(bytes.len())
            .map_err(|_| RopeError::OutOfMemory)?;
        let add_start = self.add.len();
        self.add.extend_from_slice(bytes);

        let new_piece = Piece::new(StoreId::Add, add_start, bytes.len());
        let mut rebuilt = Vec::new();
        rebuilt
            .try_reserve(self.pieces.len() + 2)
            .map_err(|_| RopeError::OutOfMemory)?;

        match self.locate(pos) {
            Some((idx, piece_start)) => {
                rebuilt.extend_from_slice(&self.pieces[..idx]);
                let target = self.pieces[idx];
                let head_len = pos - piece_start;
                if head_len > 0 {
                    rebuilt.push(Piece::new(target.store, target.start, head_len));
                }
                rebuilt.push(new_piece);
                let tail_len = target.len - head_len;
                if tail_len > 0 {
                    rebuilt.push(Piece::new(target.store, target.start + head_len, tail_len));
                }
                rebuilt.extend_from_slice(&self.pieces[idx + 1..]);
            }
            None => {
                // pos == len: append without a tail piece.
                rebuilt.extend_from_slice(&self.pieces);
                rebuilt.push(new_piece);
            }
        }

        self.install_pieces(rebuilt);
        self.lines_after_insert(pos, bytes);
        self.len += bytes.len();
        debug_assert_eq!(self.len, self.pieces.iter().map(|p| p.len).sum::<usize>());
        Ok(())
    }

    /// Remove the logical range `[pos, pos + length)`.
    ///
    /// Surrounding pieces are split; wholly covered pieces are dropped.
    /// Stores never shrink. Empty deletes succeed as no-ops.
    pub fn delete(&mut self, pos: usize, length: usize) -> Result<()> {
        let end = pos
            .checked_add(length)
            .ok_or(RopeError::BadPosition { pos, len: self.len })?;
        if end > self.len {
            return Err(RopeError::BadPosition { pos: end, len: self.len });
        }
        if length == 0 {
            return Ok(());
        }

        let mut rebuilt = Vec::new();
        rebuilt
            .try_reserve(self.pieces.len() + 1)
            .map_err(|_| RopeError::OutOfMemory)?;

        let mut logical = 0usize;
        for piece in self.pieces.iter() {
            let piece_end = logical + piece.len;
            if piece_end <= pos || logical >= end {
                rebuilt.push(*piece);
            } else {
                // Piece overlaps the deleted range: keep any head/tail remnant.
                if logical < pos {
                    rebuilt.push(Piece::new(piece.store, piece.start, pos - logical));
                }
                if piece_end > end {
                    let cut = end - logical;
                    rebuilt.push(Piece::new(piece.store, piece.start + cut, piece.len - cut));
                }
            }
            logical = piece_end;
        }

        self.install_pieces(rebuilt);
        self.lines_after_delete(pos, length);
        self.len -= length;
        debug_assert_eq!(self.len, self.pieces.iter().map(|p| p.len).sum::<usize>());
        Ok(())
    }

    /// Contiguous view of `range`.
    ///
    /// Zero-copy when the range lies inside a single piece; otherwise the
    /// bytes are concatenated into `arena` and the returned slice lives with
    /// it. Borrowed views are invalidated by the next mutation.
    pub fn slice<'a>(&'a self, range: Range<usize>, arena: &'a Arena) -> Result<&'a [u8]> {
        if range.start > range.end || range.end > self.len {
            return Err(RopeError::BadPosition {
                pos: range.end,
                len: self.len,
            });
        }
        if range.is_empty() {
            return Ok(&[]);
        }
        let (idx, piece_start) = self
            .locate(range.start)
            .expect("non-empty in-bounds range has a containing piece");
        let piece = self.pieces[idx];
        if range.end <= piece_start + piece.len {
            let off = range.start - piece_start;
            let store = self.store_bytes(piece.store);
            return Ok(&store[piece.start + off..piece.start + off + range.len()]);
        }
        let mut buf = Vec::new();
        buf.try_reserve(range.len())
            .map_err(|_| RopeError::OutOfMemory)?;
        for segment in self.segments(range) {
            buf.extend_from_slice(segment);
        }
        Ok(arena.store(buf))
    }

    /// Lazy in-order zero-copy segments covering `range` (clamped to len).
    ///
    /// The iterator borrows the rope; any mutation invalidates it (enforced
    /// by the borrow checker). Restart by re-creating it.
    pub fn segments(&self, range: Range<usize>) -> Segments<'_> {
        let start = range.start.min(self.len);
        let end = range.end.min(self.len).max(start);
        let (idx, piece_start) = match self.locate(start) {
            Some(found) => found,
            None => (self.pieces.len(), start),
        };
        Segments {
            rope: self,
            piece_idx: idx,
            piece_start,
            cursor: start,
            end,
        }
    }

    /// Byte at `pos`, if in bounds.
    pub fn byte_at(&self, pos: usize) -> Option<u8> {
        let (idx, piece_start) = self.locate(pos)?;
        let piece = self.pieces[idx];
        let store = self.store_bytes(piece.store);
        Some(store[piece.start + (pos - piece_start)])
    }

    /// True when `pos` does not land inside a UTF-8 continuation sequence.
    /// Always true at 0 and at the end of the buffer.
    pub fn is_char_boundary(&self, pos: usize) -> bool {
        if pos == 0 || pos >= self.len {
            return true;
        }
        match self.byte_at(pos) {
            Some(b) => (b & 0xC0) != 0x80,
            None => true,
        }
    }

    /// Materialize the full contents. Test and persistence aid.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for piece in self.pieces.iter() {
            let store = self.store_bytes(piece.store);
            out.extend_from_slice(&store[piece.start..piece.start + piece.len]);
        }
        out
    }

    /// Number of lines: newline count + 1. An empty rope has one line.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte range of line `i` including its trailing newline when present.
    ///
    /// `i` may be `line_count()` (the synthetic end-of-buffer boundary),
    /// which yields `(len, len)`.
    pub fn line_range(&self, i: usize) -> Result<(usize, usize)> {
        let count = self.line_starts.len();
        if i > count {
            return Err(RopeError::BadPosition {
                pos: i,
                len: count,
            });
        }
        if i == count {
            return Ok((self.len, self.len));
        }
        let start = self.line_starts[i];
        let end = if i + 1 < count {
            self.line_starts[i + 1]
        } else {
            self.len
        };
        Ok((start, end))
    }

    /// Index of the line containing byte `pos` (clamped to the last line).
    pub fn line_of(&self, pos: usize) -> usize {
        let pos = pos.min(self.len);
        match self.line_starts.binary_search(&pos) {
            Ok(i) => i,
            Err(i) => i - 1,
        }
    }

    /// O(1) capture of the current piece list and line cache.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            pieces: Rc::clone(&self.pieces),
            offsets: Rc::clone(&self.offsets),
            line_starts: Rc::clone(&self.line_starts),
            len: self.len,
        }
    }

    /// Install a snapshot produced from this rope. Never fails for such a
    /// snapshot: stores are append-only, so every captured piece still
    /// references live bytes.
    pub fn restore(&mut self, snapshot: &Snapshot) {
        self.pieces = Rc::clone(&snapshot.pieces);
        self.offsets = Rc::clone(&snapshot.offsets);
        self.line_starts = Rc::clone(&snapshot.line_starts);
        self.len = snapshot.len;
    }

    fn store_bytes(&self, store: StoreId) -> &[u8] {
        match store {
            StoreId::Original => &self.original,
            StoreId::Add => &self.add,
        }
    }

    /// Find the piece containing logical position `pos` via binary search
    /// over the offset table. Returns `(piece_index, piece_logical_start)`;
    /// `None` when `pos == len` (no containing piece).
    fn locate(&self, pos: usize) -> Option<(usize, usize)> {
        if pos >= self.len {
            return None;
        }
        let idx = match self.offsets.binary_search(&pos) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        Some((idx, self.offsets[idx]))
    }

    fn install_pieces(&mut self, pieces: Vec<Piece>) {
        debug_assert!(pieces.iter().all(|p| p.len > 0), "zero-length piece kept");
        let mut offsets = Vec::with_capacity(pieces.len());
        let mut at = 0usize;
        for p in &pieces {
            offsets.push(at);
            at += p.len;
        }
        self.pieces = Rc::from(pieces);
        self.offsets = Rc::from(offsets);
    }

    fn lines_after_insert(&mut self, pos: usize, bytes: &[u8]) {
        let shift = bytes.len();
        let mut starts = Vec::with_capacity(self.line_starts.len() + 4);
        let split = self.line_starts.partition_point(|&s| s <= pos);
        starts.extend_from_slice(&self.line_starts[..split]);
        for (j, b) in bytes.iter().enumerate() {
            if *b == b'\n' {
                starts.push(pos + j + 1);
            }
        }
        starts.extend(self.line_starts[split..].iter().map(|s| s + shift));
        self.line_starts = Rc::from(starts);
    }

    fn lines_after_delete(&mut self, pos: usize, length: usize) {
        let end = pos + length;
        let mut starts = Vec::with_capacity(self.line_starts.len());
        for &s in self.line_starts.iter() {
            if s <= pos {
                starts.push(s);
            } else if s > end {
                starts.push(s - length);
            }
            // Starts in (pos, end] reference deleted newlines; dropped.
        }
        self.line_starts = Rc::from(starts);
    }
}

impl Default for Rope {
    fn default() -> Self {
        Self::new()
    }
}

fn compute_line_starts(bytes: &[u8]) -> Vec<usize> {
    let mut starts = vec![0usize];
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

/// Iterator over zero-copy byte segments of a rope range, in order.
pub struct Segments<'a> {
    rope: &'a Rope,
    piece_idx: usize,
    piece_start: usize,
    cursor: usize,
    end: usize,
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.cursor >= self.end || self.piece_idx >= self.rope.pieces.len() {
            return None;
        }
        let piece = self.rope.pieces[self.piece_idx];
        let from = self.cursor - self.piece_start;
        let take = (piece.len - from).min(self.end - self.cursor);
        let store = self.rope.store_bytes(piece.store);
        let seg = &store[piece.start + from..piece.start + from + take];
        self.cursor += take;
        self.piece_start += piece.len;
        self.piece_idx += 1;
        Some(seg)
    }
}
