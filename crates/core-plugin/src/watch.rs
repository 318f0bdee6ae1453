//! Hot-reload file watching.
//!
//! A `notify` watcher runs on its own thread (inside the backend) and
//! forwards modify/create events for plugin files into the main event
//! channel. The event loop routes them back to
//! `PluginManager::plugin_for_path` + `reload`.

use std::path::PathBuf;

use core_events::{Event, send_event};
use crossbeam_channel::Sender;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

/// Start watching `paths`, forwarding changes into `tx`. The returned
/// watcher must be kept alive for the subscription to persist.
pub fn spawn_watcher(
    paths: &[PathBuf],
    tx: Sender<Event>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                if event.kind.is_modify() || event.kind.is_create() {
                    for path in event.paths {
                        debug!(target: "plugin.watch", path = %path.display(), "plugin_file_changed");
                        if !send_event(&tx, Event::PluginFileChanged(path)) {
                            return;
                        }
                    }
                }
            }
            Err(err) => warn!(target: "plugin.watch", error = %err, "watch_error"),
        }
    })?;
    for path in paths {
        watcher.watch(path, RecursiveMode::NonRecursive)?;
    }
    Ok(watcher)
}
