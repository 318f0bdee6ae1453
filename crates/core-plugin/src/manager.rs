//! Plugin manager: discovery, ordered loading, handler invocation, reload.
//!
//! Isolation model: every plugin gets its own [`ScriptHost`] (and therefore
//! its own VM, globals, and memory budget). Plugins cannot observe each
//! other's VM state; anything crossing the boundary goes through the action
//! queue as plain data.

use std::path::{Path, PathBuf};

use core_host::{ActionSink, CompiledPlugin, EditorQuery, SandboxConfig, ScriptHost};
use indexmap::IndexMap;
use tracing::{info, warn};

use crate::registry::RegistrationRegistry;
use crate::resolve::{dependents_of, resolve_order};
use crate::{MANIFEST_FILE, PluginError, PluginManifest, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginState {
    Discovered,
    Loaded,
    Disabled(String),
}

pub struct PluginRecord {
    pub manifest: PluginManifest,
    pub root: PathBuf,
    pub entry_path: PathBuf,
    pub manifest_path: Option<PathBuf>,
    pub state: PluginState,
    host: Option<ScriptHost>,
    compiled: Option<CompiledPlugin>,
}

pub struct PluginManager {
    search_dirs: Vec<PathBuf>,
    sandbox: SandboxConfig,
    plugins: IndexMap<String, PluginRecord>,
    load_order: Vec<String>,
}

impl PluginManager {
    pub fn new(search_dirs: Vec<PathBuf>, sandbox: SandboxConfig) -> Self {
        Self {
            search_dirs,
            sandbox,
            plugins: IndexMap::new(),
            load_order: Vec::new(),
        }
    }

    pub fn plugins(&self) -> impl Iterator<Item = (&String, &PluginRecord)> {
        self.plugins.iter()
    }

    pub fn record(&self, name: &str) -> Option<&PluginRecord> {
        self.plugins.get(name)
    }

    pub fn load_order(&self) -> &[String] {
        &self.load_order
    }

    /// Scan the search directories for plugins: a `*.gza` file, or a
    /// directory containing `plugin.toml`. Duplicate names are rejected.
    pub fn discover(&mut self) -> Result<()> {
        self.plugins.clear();
        self.load_order.clear();
        for dir in self.search_dirs.clone() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue; // absent plugin dirs are not an error
            };
            let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
            paths.sort();
            for path in paths {
                if let Some(record) = self.inspect(&path)? {
                    if self.plugins.contains_key(&record.manifest.name) {
                        return Err(PluginError::InvalidManifest(format!(
                            "duplicate plugin name '{}'",
                            record.manifest.name
                        )));
                    }
                    info!(
                        target: "plugin.discover",
                        name = %record.manifest.name,
                        path = %path.display(),
                        "plugin_discovered"
                    );
                    self.plugins
                        .insert(record.manifest.name.clone(), record);
                }
            }
        }
        Ok(())
    }

    fn inspect(&self, path: &Path) -> Result<Option<PluginRecord>> {
        if path.is_file() {
            if path.extension().and_then(|e| e.to_str()) != Some("gza") {
                return Ok(None);
            }
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("plugin")
                .to_string();
            let manifest =
                PluginManifest::for_single_file(&name, &path.to_string_lossy());
            return Ok(Some(PluginRecord {
                manifest,
                root: path.parent().unwrap_or(Path::new(".")).to_path_buf(),
                entry_path: path.to_path_buf(),
                manifest_path: None,
                state: PluginState::Discovered,
                host: None,
                compiled: None,
            }));
        }
        let manifest_path = path.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&manifest_path)
            .map_err(|e| PluginError::InvalidManifest(format!("{}: {e}", manifest_path.display())))?;
        let manifest = PluginManifest::parse(&text)?;
        let entry_path = path.join(&manifest.entry);
        Ok(Some(PluginRecord {
            manifest,
            root: path.to_path_buf(),
            entry_path,
            manifest_path: Some(manifest_path),
            state: PluginState::Discovered,
            host: None,
            compiled: None,
        }))
    }

    /// Resolve the dependency order and run every startup-enabled plugin's
    /// setup in sequence. Individual failures disable the plugin (and its
    /// requiring dependents) and surface a message through the registry;
    /// set-level failures (cycles, conflicts, missing requirements) abort.
    /// Returns the number of successfully loaded plugins.
    pub fn load_all(
        &mut self,
        editor: &dyn EditorQuery,
        registry: &mut RegistrationRegistry,
    ) -> Result<usize> {
        let manifests: Vec<PluginManifest> =
            self.plugins.values().map(|r| r.manifest.clone()).collect();
        self.load_order = resolve_order(&manifests)?;

        let mut loaded = 0usize;
        for name in self.load_order.clone() {
            let record = &self.plugins[&name];
            if matches!(record.state, PluginState::Disabled(_)) {
                continue;
            }
            if !record.manifest.execution.enable_on_startup
                || record.manifest.execution.lazy_load
            {
                continue;
            }
            match self.load_one(&name, editor, registry) {
                Ok(()) => loaded += 1,
                Err(err) => {
                    warn!(target: "plugin.load", plugin = %name, error = %err, "plugin_disabled");
                    registry.begin_plugin(&name);
                    registry.show_message(&format!("plugin '{name}' disabled: {err}"));
                    self.disable_with_dependents(&manifests, &name, &err.to_string(), registry);
                }
            }
        }
        Ok(loaded)
    }

    fn load_one(
        &mut self,
        name: &str,
        editor: &dyn EditorQuery,
        registry: &mut RegistrationRegistry,
    ) -> Result<()> {
        let record = self.plugins.get_mut(name).expect("known plugin");
        let source = std::fs::read_to_string(&record.entry_path).map_err(|e| {
            PluginError::InvalidManifest(format!("{}: {e}", record.entry_path.display()))
        })?;
        let mut host = ScriptHost::new(self.sandbox.clone());
        let mut compiled = host
            .compile_plugin_script(&source)
            .map_err(|e| PluginError::InvalidManifest(e.to_string()))?;
        registry.begin_plugin(name);
        host.execute_setup(&mut compiled, editor, registry)
            .map_err(|e| PluginError::InvalidManifest(e.to_string()))?;
        let record = self.plugins.get_mut(name).expect("known plugin");
        record.host = Some(host);
        record.compiled = Some(compiled);
        record.state = PluginState::Loaded;
        info!(target: "plugin.load", plugin = %name, "plugin_loaded");
        Ok(())
    }

    fn disable_with_dependents(
        &mut self,
        manifests: &[PluginManifest],
        name: &str,
        reason: &str,
        registry: &mut RegistrationRegistry,
    ) {
        if let Some(record) = self.plugins.get_mut(name) {
            record.state = PluginState::Disabled(reason.to_string());
            record.host = None;
            record.compiled = None;
        }
        registry.remove_plugin(name);
        for dependent in dependents_of(manifests, name, true) {
            if let Some(record) = self.plugins.get_mut(&dependent)
                && !matches!(record.state, PluginState::Disabled(_))
            {
                record.state = PluginState::Disabled(format!(
                    "required dependency '{name}' failed"
                ));
                record.host = None;
                record.compiled = None;
                registry.remove_plugin(&dependent);
            }
        }
    }

    /// Invoke a named handler function inside a loaded plugin's VM.
    pub fn call_handler(
        &mut self,
        plugin: &str,
        function: &str,
        editor: &dyn EditorQuery,
        registry: &mut RegistrationRegistry,
    ) -> Result<()> {
        let record = self
            .plugins
            .get_mut(plugin)
            .ok_or_else(|| PluginError::NotLoaded(plugin.to_string()))?;
        let host = record
            .host
            .as_mut()
            .ok_or_else(|| PluginError::NotLoaded(plugin.to_string()))?;
        registry.begin_plugin(plugin);
        host.call_void(function, editor, registry)
            .map_err(|e| PluginError::InvalidManifest(e.to_string()))
    }

    /// Re-run a plugin's lifecycle after its files changed: teardown (when
    /// the script defines one), recompile, setup, and then reload downstream
    /// plugins whose ordering depends on it.
    pub fn reload(
        &mut self,
        name: &str,
        editor: &dyn EditorQuery,
        registry: &mut RegistrationRegistry,
    ) -> Result<()> {
        if !self.plugins.contains_key(name) {
            return Err(PluginError::NotLoaded(name.to_string()));
        }
        let manifests: Vec<PluginManifest> =
            self.plugins.values().map(|r| r.manifest.clone()).collect();
        let mut queue = vec![name.to_string()];
        for downstream in dependents_of(&manifests, name, false) {
            // Preserve resolved order among downstream reloads.
            queue.push(downstream);
        }
        queue.sort_by_key(|n| {
            self.load_order
                .iter()
                .position(|o| o == n)
                .unwrap_or(usize::MAX)
        });

        for target in queue {
            self.reload_one(&target, editor, registry)?;
        }
        Ok(())
    }

    fn reload_one(
        &mut self,
        name: &str,
        editor: &dyn EditorQuery,
        registry: &mut RegistrationRegistry,
    ) -> Result<()> {
        // Teardown when the old instance defined one.
        if let Some(record) = self.plugins.get_mut(name)
            && let Some(host) = record.host.as_mut()
        {
            registry.begin_plugin(name);
            if let Err(err) = host.call_void("teardown", editor, registry) {
                // Absent teardown is fine; anything else is logged and the
                // reload proceeds.
                tracing::debug!(target: "plugin.reload", plugin = %name, error = %err, "teardown_skipped");
            }
        }
        registry.remove_plugin(name);

        // Re-read the manifest for directory plugins; entry or metadata may
        // have changed on disk.
        if let Some(record) = self.plugins.get_mut(name)
            && let Some(manifest_path) = record.manifest_path.clone()
        {
            let text = std::fs::read_to_string(&manifest_path).map_err(|e| {
                PluginError::InvalidManifest(format!("{}: {e}", manifest_path.display()))
            })?;
            let manifest = PluginManifest::parse(&text)?;
            record.entry_path = record.root.join(&manifest.entry);
            record.manifest = manifest;
        }

        info!(target: "plugin.reload", plugin = %name, "plugin_reload");
        self.load_one(name, editor, registry)
    }

    /// Plugin owning `path`, for routing watcher events.
    pub fn plugin_for_path(&self, path: &Path) -> Option<&str> {
        self.plugins
            .iter()
            .find(|(_, r)| {
                r.entry_path == path
                    || r.manifest_path.as_deref() == Some(path)
                    || path.starts_with(&r.root) && r.manifest_path.is_some()
            })
            .map(|(name, _)| name.as_str())
    }

    /// Files the hot-reload watcher should observe.
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for record in self.plugins.values() {
            paths.push(record.entry_path.clone());
            if let Some(m) = &record.manifest_path {
                paths.push(m.clone());
            }
        }
        paths
    }
}
