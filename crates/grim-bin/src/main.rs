//! Grim entrypoint: configuration bring-up, plugin loading, language-server
//! registration, and the cooperative event loop.
//!
//! Rendering and raw input decoding are external collaborators; the loop
//! here serves the bounded event channel (front-end input, plugin file
//! changes, ticks) and drives the editor core, the plugin hosts, and LSP
//! polling on a single thread.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use core_actions::{EditorRequest, Key, handle_key};
use core_config::{ConfigRoot, SessionState, Settings, glyphs::GlyphFrequency};
use core_events::{Event, EventSourceRegistry, InputEvent, TickEventSource, event_channel};
use core_host::{PluginAction, SandboxConfig, ScriptHost};
use core_lsp::server::{ServerManager, ServerRegistration};
use core_plugin::{PluginManager, RegistrationRegistry};
use core_rope::Rope;
use core_state::EditorState;
use crossbeam_channel::RecvTimeoutError;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

mod editor_bridge;

use editor_bridge::{EditorStateQuery, apply_plugin_edits};

const LOOP_TICK: Duration = Duration::from_millis(50);

fn config_root() -> ConfigRoot {
    if let Ok(dir) = std::env::var("GRIM_CONFIG_DIR") {
        return ConfigRoot::new(dir);
    }
    if let Ok(home) = std::env::var("HOME") {
        return ConfigRoot::new(Path::new(&home).join(".config").join("grim"));
    }
    ConfigRoot::new("grim-config")
}

fn init_tracing(root: &ConfigRoot) -> Option<WorkerGuard> {
    let log_dir = root.root().join("logs");
    if std::fs::create_dir_all(&log_dir).is_err() {
        return None;
    }
    let appender = tracing_appender::rolling::never(log_dir, "grim.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
    {
        Ok(()) => Some(guard),
        Err(_) => None, // another subscriber (tests) already claimed it
    }
}

fn sandbox_from_settings(settings: &core_config::SandboxSettings) -> SandboxConfig {
    SandboxConfig {
        max_execution_ms: settings.max_execution_ms,
        max_memory_bytes: settings.max_memory_bytes,
        max_file_ops: settings.max_file_ops,
        max_network_ops: settings.max_network_ops,
        blocked_paths: settings.blocked_paths.clone(),
        allowed_paths: settings.allowed_paths.clone(),
        enable_filesystem_access: settings.enable_filesystem_access,
        enable_network_access: settings.enable_network_access,
        enable_syscalls: settings.enable_syscalls,
    }
}

fn key_from_input(input: InputEvent) -> Key {
    match input {
        InputEvent::Key(c) => Key::Char(c),
        InputEvent::Ctrl(c) => Key::Ctrl(c),
        InputEvent::Enter => Key::Enter,
        InputEvent::Escape => Key::Escape,
        InputEvent::Backspace => Key::Backspace,
    }
}

struct App {
    state: EditorState,
    buffer_path: Option<PathBuf>,
    registry: RegistrationRegistry,
    plugins: PluginManager,
    servers: ServerManager,
    glyphs: GlyphFrequency,
}

impl App {
    fn handle_input(&mut self, input: InputEvent) -> bool {
        if let InputEvent::Key(c) = input {
            self.glyphs.record(c);
        }
        let key = key_from_input(input);
        match handle_key(&mut self.state, key) {
            Ok(result) => {
                if let Some(request) = result.request {
                    self.forward_request(request);
                }
                result.quit
            }
            Err(err) => {
                info!(target: "grim.loop", error = %err, "key_rejected");
                false
            }
        }
    }

    fn forward_request(&mut self, request: EditorRequest) {
        match request {
            EditorRequest::Definition { offset } => {
                let Some(path) = self.buffer_path.clone() else {
                    return;
                };
                let uri = format!("file://{}", path.display());
                let (line, col) = self.state.line_col(offset);
                match self.servers.server_for_file(&path) {
                    Ok(Some(server)) => {
                        let sent = server.client.definition(
                            &uri,
                            line as u32,
                            col as u32,
                            None,
                            Some(Duration::from_secs(5)),
                        );
                        if let Err(err) = sent {
                            info!(target: "grim.lsp", error = %err, "definition_request_failed");
                        }
                    }
                    Ok(None) => {}
                    Err(err) => warn!(target: "grim.lsp", error = %err, "server_unavailable"),
                }
            }
        }
    }

    fn handle_plugin_change(&mut self, path: &Path) {
        let Some(name) = self.plugins.plugin_for_path(path).map(str::to_string) else {
            return;
        };
        let query = EditorStateQuery::capture(&self.state);
        if let Err(err) = self.plugins.reload(&name, &query, &mut self.registry) {
            warn!(target: "grim.plugins", plugin = %name, error = %err, "reload_failed");
        }
        self.apply_pending_edits();
    }

    fn apply_pending_edits(&mut self) {
        let edits: Vec<PluginAction> = self.registry.take_pending_edits();
        if !edits.is_empty() {
            apply_plugin_edits(&mut self.state, &edits);
        }
    }
}

fn main() -> Result<()> {
    let root = config_root();
    std::fs::create_dir_all(root.root())
        .with_context(|| format!("creating config root {}", root.root().display()))?;
    let _log_guard = init_tracing(&root);
    info!(target: "grim.startup", root = %root.root().display(), "starting");

    let settings = Settings::load_from(&root.settings_file())?;
    let sandbox = sandbox_from_settings(&settings.sandbox);

    // Session restore decides the initial buffer.
    let session = SessionState::load(&root.session_file()).unwrap_or_default();
    let (rope, buffer_path) = match session.buffers.get(session.active) {
        Some(buffer) => match std::fs::read(&buffer.path) {
            Ok(bytes) => (Rope::from_bytes(bytes), Some(PathBuf::from(&buffer.path))),
            Err(_) => (Rope::new(), None),
        },
        None => (Rope::new(), None),
    };
    let mut state = EditorState::with_history_cap(rope, settings.editor.history_cap);
    if let Some(buffer) = session.buffers.get(session.active) {
        state.cursor = state.snap_to_boundary(buffer.cursor);
    }

    // Configuration script host (separate from per-plugin hosts).
    let mut config_host = ScriptHost::new(sandbox.clone());
    let mut registry = RegistrationRegistry::new();
    if root.init_script().is_file() {
        match config_host.load_config(root.root()) {
            Ok(()) => {
                registry.begin_plugin("init");
                let query = EditorStateQuery::capture(&state);
                if let Err(err) = config_host.call_setup(&query, &mut registry) {
                    warn!(target: "grim.startup", error = %err, "init_script_failed");
                }
            }
            Err(err) => warn!(target: "grim.startup", error = %err, "config_not_loaded"),
        }
    }

    // Plugins.
    let mut plugins = PluginManager::new(vec![root.plugins_dir()], sandbox);
    if let Err(err) = plugins.discover() {
        warn!(target: "grim.startup", error = %err, "plugin_discovery_failed");
    }
    {
        let query = EditorStateQuery::capture(&state);
        match plugins.load_all(&query, &mut registry) {
            Ok(count) => info!(target: "grim.startup", loaded = count, "plugins_loaded"),
            Err(err) => warn!(target: "grim.startup", error = %err, "plugin_set_rejected"),
        }
    }
    if let Err(err) = core_plugin::lockfile::write(&plugins, &root.lockfile()) {
        warn!(target: "grim.startup", error = %err, "lockfile_write_failed");
    }

    // Language servers from static registrations; spawned lazily per file.
    let workspace_uri = format!(
        "file://{}",
        std::env::current_dir().unwrap_or_default().display()
    );
    let mut servers = ServerManager::new(workspace_uri);
    for s in &settings.servers {
        servers.register(ServerRegistration {
            name: s.name.clone(),
            argv: s.command.clone(),
            filetypes: s.filetypes.clone(),
            language_id: s.language_id.clone(),
        });
    }

    // Event channel: tick source plus the plugin watcher.
    let (tx, rx) = event_channel();
    let mut sources = EventSourceRegistry::new();
    sources.register(TickEventSource::new(LOOP_TICK));
    let _source_handles = sources.spawn_all(&tx);
    let _watcher = match core_plugin::watch::spawn_watcher(&plugins.watch_paths(), tx.clone()) {
        Ok(w) => Some(w),
        Err(err) => {
            warn!(target: "grim.startup", error = %err, "watcher_unavailable");
            None
        }
    };

    let mut app = App {
        state,
        buffer_path,
        registry,
        plugins,
        servers,
        glyphs: GlyphFrequency::load(&root.glyph_log()),
    };
    app.apply_pending_edits();

    // Cooperative loop: serve one event (or time out), then poll every
    // language server. LSP reads happen nowhere else.
    info!(target: "grim.loop", "event_loop_started");
    loop {
        match rx.recv_timeout(LOOP_TICK) {
            Ok(Event::Input(input)) => {
                if app.handle_input(input) {
                    break;
                }
                app.apply_pending_edits();
            }
            Ok(Event::PluginFileChanged(path)) => app.handle_plugin_change(&path),
            Ok(Event::LspActivity { .. }) | Ok(Event::Tick) => {}
            Ok(Event::Shutdown) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        app.servers.poll_all();
    }

    // Teardown: servers down, session and glyph log persisted.
    app.servers.shutdown_all();
    let session = SessionState {
        buffers: app
            .buffer_path
            .iter()
            .map(|p| core_config::SessionBuffer {
                path: p.display().to_string(),
                cursor: app.state.cursor,
            })
            .collect(),
        active: 0,
    };
    if let Err(err) = session.save(&root.session_file()) {
        warn!(target: "grim.shutdown", error = %err, "session_save_failed");
    }
    if let Err(err) = app.glyphs.flush_append(&root.glyph_log()) {
        warn!(target: "grim.shutdown", error = %err, "glyph_log_failed");
    }
    info!(target: "grim.shutdown", "bye");
    Ok(())
}
