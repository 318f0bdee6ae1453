//! Append-only glyph-frequency log.
//!
//! Each line is `U+XXXX<TAB>count`, one batch per flush; loading sums the
//! batches. The file informs input heuristics only; a corrupt or missing
//! log costs nothing, so unparsable lines are skipped rather than erroring.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use tracing::debug;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GlyphFrequency {
    counts: BTreeMap<char, u64>,
}

impl GlyphFrequency {
    pub fn record(&mut self, glyph: char) {
        *self.counts.entry(glyph).or_default() += 1;
    }

    pub fn count(&self, glyph: char) -> u64 {
        self.counts.get(&glyph).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Append the current counts as one batch and clear them.
    pub fn flush_append(&mut self, path: &Path) -> std::io::Result<()> {
        if self.counts.is_empty() {
            return Ok(());
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        for (glyph, count) in &self.counts {
            writeln!(file, "U+{:04X}\t{count}", *glyph as u32)?;
        }
        debug!(target: "config.glyphs", path = %path.display(), entries = self.counts.len(), "glyphs_flushed");
        self.counts.clear();
        Ok(())
    }

    /// Sum all batches from the log; missing file yields empty counts.
    pub fn load(path: &Path) -> Self {
        let mut out = Self::default();
        let Ok(text) = std::fs::read_to_string(path) else {
            return out;
        };
        for line in text.lines() {
            let Some((code, count)) = line.split_once('\t') else {
                continue;
            };
            let Some(hex) = code.strip_prefix("U+") else {
                continue;
            };
            let (Ok(cp), Ok(n)) = (u32::from_str_radix(hex, 16), count.parse::<u64>()) else {
                continue;
            };
            if let Some(glyph) = char::from_u32(cp) {
                *out.counts.entry(glyph).or_default() += n;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_batches_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glyphs.log");
        let mut freq = GlyphFrequency::default();
        freq.record('a');
        freq.record('a');
        freq.record('é');
        freq.flush_append(&path).unwrap();
        assert!(freq.is_empty());
        freq.record('a');
        freq.flush_append(&path).unwrap();

        let loaded = GlyphFrequency::load(&path);
        assert_eq!(loaded.count('a'), 3);
        assert_eq!(loaded.count('é'), 1);
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glyphs.log");
        std::fs::write(&path, "garbage\nU+0041\t2\nU+ZZZZ\t9\n").unwrap();
        let loaded = GlyphFrequency::load(&path);
        assert_eq!(loaded.count('A'), 2);
    }
}
