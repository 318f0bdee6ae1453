//! Plugin discovery, manifests, dependency resolution, and lifecycle.
//!
//! A plugin is either a single `.gza` file (manifest synthesized from the
//! file name) or a directory with a `plugin.toml` manifest naming an entry
//! script. Load order is a topological sort of the `requires` +
//! `load-after` graph with ties broken by descending priority, then name.
//! Plugin failures disable the offending plugin and anything that requires
//! it; the editor keeps running.

use serde::Deserialize;
use thiserror::Error;

pub mod lockfile;
pub mod manager;
pub mod registry;
pub mod resolve;
pub mod watch;

pub use manager::{PluginManager, PluginState};
pub use registry::RegistrationRegistry;

/// Manifest file name inside plugin directories.
pub const MANIFEST_FILE: &str = "plugin.toml";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    /// Manifest missing, unparsable, type-invalid, or duplicate name.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("plugin '{plugin}' requires missing dependency '{dependency}'")]
    MissingDependency { plugin: String, dependency: String },
    #[error("plugins '{0}' and '{1}' conflict")]
    ConflictingPlugins(String, String),
    #[error("dependency cycle among: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),
    #[error("plugin '{0}' is not loaded")]
    NotLoaded(String),
}

pub type Result<T> = std::result::Result<T, PluginError>;

/// Execution options section. Unknown fields are tolerated throughout the
/// manifest so newer plugins load on older hosts.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ExecutionOptions {
    #[serde(default = "default_true")]
    pub enable_on_startup: bool,
    #[serde(default)]
    pub lazy_load: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub load_after: Vec<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct DependencySpec {
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    /// Entry script path, relative to the plugin directory.
    pub entry: String,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub min_host_version: Option<String>,
    #[serde(default)]
    pub execution: ExecutionOptions,
    #[serde(default)]
    pub dependencies: DependencySpec,
}

impl PluginManifest {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PluginError::InvalidManifest(e.to_string()))
    }

    /// Manifest for a bare `.gza` file plugin.
    pub fn for_single_file(name: &str, entry: &str) -> Self {
        Self {
            name: name.to_string(),
            version: "0.0.0".to_string(),
            author: String::new(),
            description: String::new(),
            entry: entry.to_string(),
            license: None,
            homepage: None,
            min_host_version: None,
            execution: ExecutionOptions::default(),
            dependencies: DependencySpec::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_manifest_parses() {
        let text = r#"
name = "hello"
version = "1.2.0"
author = "someone"
description = "greets"
entry = "hello.gza"
license = "MIT"

[execution]
enable-on-startup = true
priority = 50
load-after = ["base"]

[dependencies]
requires = ["base"]
conflicts = ["legacy-hello"]
"#;
        let m = PluginManifest::parse(text).unwrap();
        assert_eq!(m.name, "hello");
        assert_eq!(m.execution.priority, 50);
        assert_eq!(m.execution.load_after, vec!["base"]);
        assert_eq!(m.dependencies.requires, vec!["base"]);
        assert_eq!(m.dependencies.conflicts, vec!["legacy-hello"]);
        assert!(m.execution.enable_on_startup);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let text = r#"
name = "x"
version = "0.1.0"
entry = "x.gza"
future-field = "whatever"

[execution]
new-knob = 3
"#;
        assert!(PluginManifest::parse(text).is_ok());
    }

    #[test]
    fn wrong_types_are_invalid_manifest() {
        let text = r#"
name = "x"
version = "0.1.0"
entry = "x.gza"

[execution]
priority = "high"
"#;
        assert!(matches!(
            PluginManifest::parse(text),
            Err(PluginError::InvalidManifest(_))
        ));
    }

    #[test]
    fn missing_required_field_is_invalid() {
        assert!(matches!(
            PluginManifest::parse("name = \"x\"\n"),
            Err(PluginError::InvalidManifest(_))
        ));
    }
}
