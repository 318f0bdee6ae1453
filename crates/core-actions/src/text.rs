//! Byte-level text helpers shared by motions, search, rename, and
//! multi-cursor matching.
//!
//! The word-character class is `[A-Za-z0-9_]` throughout; Unicode
//! identifier handling is out of scope. Code-point stepping is done by
//! skipping UTF-8 continuation bytes (`0b10xxxxxx`), which also behaves
//! sanely on non-UTF-8 buffers (every byte is its own step).

use core_rope::Rope;

pub fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Next code-point boundary strictly after `pos`, clamped to `rope.len()`.
pub fn next_boundary(rope: &Rope, pos: usize) -> usize {
    let len = rope.len();
    if pos >= len {
        return len;
    }
    let mut next = pos + 1;
    while next < len && !rope.is_char_boundary(next) {
        next += 1;
    }
    next
}

/// Previous code-point boundary strictly before `pos`, clamped to 0.
pub fn prev_boundary(rope: &Rope, pos: usize) -> usize {
    if pos == 0 {
        return 0;
    }
    let mut prev = pos - 1;
    while prev > 0 && !rope.is_char_boundary(prev) {
        prev -= 1;
    }
    prev
}

/// Line byte range excluding the trailing newline.
pub fn line_content_range(rope: &Rope, line: usize) -> (usize, usize) {
    let (start, end) = rope
        .line_range(line)
        .unwrap_or((rope.len(), rope.len()));
    let content_end = if end > start && rope.byte_at(end - 1) == Some(b'\n') {
        end - 1
    } else {
        end
    };
    (start, content_end)
}

/// Identifier-class word containing `pos`, as a byte range.
pub fn word_at(bytes: &[u8], pos: usize) -> Option<(usize, usize)> {
    if pos >= bytes.len() || !is_word_byte(bytes[pos]) {
        return None;
    }
    let mut start = pos;
    while start > 0 && is_word_byte(bytes[start - 1]) {
        start -= 1;
    }
    let mut end = pos + 1;
    while end < bytes.len() && is_word_byte(bytes[end]) {
        end += 1;
    }
    Some((start, end))
}

/// First occurrence of `pattern` at or after `from` (no wrap-around).
pub fn find_forward(bytes: &[u8], pattern: &[u8], from: usize) -> Option<usize> {
    if pattern.is_empty() || from >= bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(pattern.len())
        .position(|w| w == pattern)
        .map(|i| from + i)
}

/// Last occurrence of `pattern` ending at or before `until + pattern.len()`.
pub fn find_backward(bytes: &[u8], pattern: &[u8], until: usize) -> Option<usize> {
    if pattern.is_empty() {
        return None;
    }
    let stop = until.min(bytes.len().saturating_sub(pattern.len()));
    bytes[..=stop]
        .windows(pattern.len())
        .rposition(|w| w == pattern)
}

/// Occurrence of `word` bounded by non-word bytes, at or after `from`.
pub fn find_word_forward(bytes: &[u8], word: &[u8], from: usize) -> Option<usize> {
    let mut at = from;
    while let Some(hit) = find_forward(bytes, word, at) {
        let left_ok = hit == 0 || !is_word_byte(bytes[hit - 1]);
        let right = hit + word.len();
        let right_ok = right >= bytes.len() || !is_word_byte(bytes[right]);
        if left_ok && right_ok {
            return Some(hit);
        }
        at = hit + 1;
    }
    None
}

/// All word-bounded occurrences of `word`, in order.
pub fn word_occurrences(bytes: &[u8], word: &[u8]) -> Vec<usize> {
    let mut hits = Vec::new();
    let mut at = 0;
    while let Some(hit) = find_word_forward(bytes, word, at) {
        hits.push(hit);
        at = hit + 1;
    }
    hits
}

const OPENERS: &[u8] = b"([{<";
const CLOSERS: &[u8] = b")]}>";

fn partner(b: u8) -> Option<(u8, bool)> {
    if let Some(i) = OPENERS.iter().position(|&o| o == b) {
        Some((CLOSERS[i], true))
    } else {
        CLOSERS
            .iter()
            .position(|&c| c == b)
            .map(|i| (OPENERS[i], false))
    }
}

/// Matching partner of the bracket at `pos` by depth counting.
///
/// Byte-oriented: strings and comments are not respected. `None` when `pos`
/// is not on a bracket or the partner is missing.
pub fn matching_bracket(bytes: &[u8], pos: usize) -> Option<usize> {
    let open = *bytes.get(pos)?;
    let (close, forward) = partner(open)?;
    let mut depth = 0usize;
    if forward {
        for (i, &b) in bytes.iter().enumerate().skip(pos) {
            if b == open {
                depth += 1;
            } else if b == close {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
        }
    } else {
        for i in (0..=pos).rev() {
            let b = bytes[i];
            if b == open {
                depth += 1;
            } else if b == close {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
        }
    }
    None
}

/// Leading indentation width in bytes (spaces and tabs).
pub fn indent_width(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .take_while(|&&b| b == b' ' || b == b'\t')
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_skip_continuation_bytes() {
        let rope = Rope::from_str("aé😀b");
        // a=1 byte, é=2 bytes, 😀=4 bytes
        assert_eq!(next_boundary(&rope, 0), 1);
        assert_eq!(next_boundary(&rope, 1), 3);
        assert_eq!(next_boundary(&rope, 3), 7);
        assert_eq!(prev_boundary(&rope, 7), 3);
        assert_eq!(prev_boundary(&rope, 3), 1);
        assert_eq!(prev_boundary(&rope, 0), 0);
    }

    #[test]
    fn word_at_extends_both_directions() {
        let bytes = b"let foo_bar = 1";
        assert_eq!(word_at(bytes, 6), Some((4, 11)));
        assert_eq!(word_at(bytes, 3), None, "space is not a word byte");
    }

    #[test]
    fn word_bounded_search_skips_substrings() {
        let bytes = b"scanner scan rescan scan";
        assert_eq!(find_word_forward(bytes, b"scan", 0), Some(8));
        assert_eq!(word_occurrences(bytes, b"scan"), vec![8, 20]);
    }

    #[test]
    fn bracket_matching_by_depth() {
        let bytes = b"f(a[1], g(2))";
        assert_eq!(matching_bracket(bytes, 1), Some(12));
        assert_eq!(matching_bracket(bytes, 12), Some(1));
        assert_eq!(matching_bracket(bytes, 3), Some(5));
        assert_eq!(matching_bracket(bytes, 0), None, "not a bracket");
        assert_eq!(matching_bracket(b"(((", 0), None, "unbalanced");
    }

    #[test]
    fn angle_brackets_match() {
        let bytes = b"Vec<Box<T>>";
        assert_eq!(matching_bracket(bytes, 3), Some(10));
        assert_eq!(matching_bracket(bytes, 7), Some(9));
    }

    #[test]
    fn backward_search_finds_last_before_limit() {
        let bytes = b"ab ab ab";
        assert_eq!(find_backward(bytes, b"ab", 4), Some(3));
        assert_eq!(find_backward(bytes, b"ab", 7), Some(6));
    }
}
