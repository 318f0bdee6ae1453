//! Dependency graph validation and load-order resolution.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::{PluginError, PluginManifest, Result};

/// Validate the manifest set and produce the load order.
///
/// Edges run from a dependency to its dependent (`requires` and
/// `load-after` alike). A `load-after` naming an absent plugin is an
/// ordering hint with nothing to order against and is ignored; a `requires`
/// naming an absent plugin is an error. Ties in the topological sort break
/// by descending priority, then lexicographic name, so resolution is fully
/// deterministic.
pub fn resolve_order(manifests: &[PluginManifest]) -> Result<Vec<String>> {
    let mut by_name: BTreeMap<&str, &PluginManifest> = BTreeMap::new();
    for m in manifests {
        if by_name.insert(m.name.as_str(), m).is_some() {
            return Err(PluginError::InvalidManifest(format!(
                "duplicate plugin name '{}'",
                m.name
            )));
        }
    }

    for m in manifests {
        for required in &m.dependencies.requires {
            if !by_name.contains_key(required.as_str()) {
                return Err(PluginError::MissingDependency {
                    plugin: m.name.clone(),
                    dependency: required.clone(),
                });
            }
        }
        for conflict in &m.dependencies.conflicts {
            if by_name.contains_key(conflict.as_str()) {
                return Err(PluginError::ConflictingPlugins(
                    m.name.clone(),
                    conflict.clone(),
                ));
            }
        }
    }

    // Kahn's algorithm over dependency → dependent edges.
    let mut incoming: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut outgoing: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for m in manifests {
        incoming.entry(m.name.as_str()).or_default();
        outgoing.entry(m.name.as_str()).or_default();
    }
    for m in manifests {
        for before in m
            .dependencies
            .requires
            .iter()
            .chain(m.execution.load_after.iter())
        {
            if let Some(before) = by_name.get(before.as_str()) {
                incoming
                    .entry(m.name.as_str())
                    .or_default()
                    .insert(before.name.as_str());
                outgoing
                    .entry(before.name.as_str())
                    .or_default()
                    .insert(m.name.as_str());
            }
        }
    }

    let mut order = Vec::with_capacity(manifests.len());
    let mut ready: Vec<&str> = incoming
        .iter()
        .filter(|(_, deps)| deps.is_empty())
        .map(|(name, _)| *name)
        .collect();
    while !ready.is_empty() {
        // Highest priority first; names ascending within equal priority.
        ready.sort_by(|a, b| {
            let pa = by_name[a].execution.priority;
            let pb = by_name[b].execution.priority;
            pb.cmp(&pa).then_with(|| a.cmp(b))
        });
        let next = ready.remove(0);
        order.push(next.to_string());
        let dependents = outgoing.remove(next).unwrap_or_default();
        for dependent in dependents {
            let deps = incoming.get_mut(dependent).expect("known node");
            deps.remove(next);
            if deps.is_empty() {
                ready.push(dependent);
            }
        }
        incoming.remove(next);
    }

    if order.len() != manifests.len() {
        let mut stuck: Vec<String> = incoming.keys().map(|s| s.to_string()).collect();
        stuck.sort();
        return Err(PluginError::DependencyCycle(stuck));
    }
    debug!(target: "plugin.resolve", order = ?order, "load_order_resolved");
    Ok(order)
}

/// Plugins that (transitively) require `root`; used to cascade disables and
/// hot reloads.
pub fn dependents_of(manifests: &[PluginManifest], root: &str, requires_only: bool) -> Vec<String> {
    let mut out = Vec::new();
    let mut frontier = vec![root.to_string()];
    while let Some(current) = frontier.pop() {
        for m in manifests {
            let direct = m.dependencies.requires.contains(&current)
                || (!requires_only && m.execution.load_after.contains(&current));
            if direct && !out.contains(&m.name) && m.name != root {
                out.push(m.name.clone());
                frontier.push(m.name.clone());
            }
        }
    }
    out
}
