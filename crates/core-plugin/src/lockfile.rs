//! Deterministic plugin lockfile.
//!
//! Text format, one plugin per line sorted by name:
//! `name<TAB>version<TAB>entry-hash`. The hash covers the entry script
//! bytes, so the lockfile answers "did anything change since last run"
//! without being load-bearing for correctness.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::manager::PluginManager;

pub fn entry_hash(bytes: &[u8]) -> u64 {
    let mut h = DefaultHasher::new();
    h.write(bytes);
    h.finish()
}

/// Render lockfile contents for the current plugin set.
pub fn render(manager: &PluginManager) -> String {
    let mut lines: Vec<String> = manager
        .plugins()
        .map(|(name, record)| {
            let hash = std::fs::read(&record.entry_path)
                .map(|b| entry_hash(&b))
                .unwrap_or(0);
            format!("{name}\t{}\t{hash:016x}", record.manifest.version)
        })
        .collect();
    lines.sort();
    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Write atomically (temp file + rename) so readers never observe a torn
/// lockfile.
pub fn write(manager: &PluginManager, path: &Path) -> std::io::Result<()> {
    let contents = render(manager);
    let tmp = path.with_extension("lock.tmp");
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(contents.as_bytes())?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    info!(target: "plugin.lockfile", path = %path.display(), "lockfile_written");
    Ok(())
}
