//! Registration registry: the durable result of plugin setup.
//!
//! Implements the host's `ActionSink`, attributing each drained action to
//! the plugin currently loading. Ordered maps keep iteration deterministic
//! (registration order), which the load sequence already made stable.

use core_host::{ActionSink, PluginAction};
use indexmap::IndexMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRegistration {
    pub plugin: String,
    pub handler: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeymapRegistration {
    pub plugin: String,
    pub keys: String,
    pub handler: String,
    pub mode: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHandlerRegistration {
    pub plugin: String,
    pub handler: String,
}

#[derive(Debug, Default)]
pub struct RegistrationRegistry {
    current_plugin: String,
    pub commands: IndexMap<String, CommandRegistration>,
    pub keymaps: Vec<KeymapRegistration>,
    /// Event name → handlers in registration order.
    pub event_handlers: IndexMap<String, Vec<EventHandlerRegistration>>,
    /// Theme name → colors payload.
    pub themes: IndexMap<String, String>,
    /// User-visible messages (plugin chatter and error surfacing share this
    /// channel).
    pub messages: Vec<String>,
    /// Deferred editor edits to apply after the plugin pass.
    pub pending_edits: Vec<PluginAction>,
}

impl RegistrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attribution for subsequently drained actions.
    pub fn begin_plugin(&mut self, name: &str) {
        self.current_plugin = name.to_string();
    }

    /// Drop every registration owned by `plugin` (teardown before reload).
    pub fn remove_plugin(&mut self, plugin: &str) {
        self.commands.retain(|_, r| r.plugin != plugin);
        self.keymaps.retain(|k| k.plugin != plugin);
        for handlers in self.event_handlers.values_mut() {
            handlers.retain(|h| h.plugin != plugin);
        }
        self.event_handlers.retain(|_, handlers| !handlers.is_empty());
    }

    pub fn handlers_for(&self, event: &str) -> &[EventHandlerRegistration] {
        self.event_handlers
            .get(event)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn take_pending_edits(&mut self) -> Vec<PluginAction> {
        std::mem::take(&mut self.pending_edits)
    }
}

impl ActionSink for RegistrationRegistry {
    fn show_message(&mut self, text: &str) {
        info!(target: "plugin.message", plugin = %self.current_plugin, "{text}");
        self.messages.push(text.to_string());
    }

    fn register_command(&mut self, name: &str, handler: &str, description: Option<&str>) {
        self.commands.insert(
            name.to_string(),
            CommandRegistration {
                plugin: self.current_plugin.clone(),
                handler: handler.to_string(),
                description: description.map(str::to_string),
            },
        );
    }

    fn register_keymap(
        &mut self,
        keys: &str,
        handler: &str,
        mode: Option<&str>,
        description: Option<&str>,
    ) {
        self.keymaps.push(KeymapRegistration {
            plugin: self.current_plugin.clone(),
            keys: keys.to_string(),
            handler: handler.to_string(),
            mode: mode.map(str::to_string),
            description: description.map(str::to_string),
        });
    }

    fn register_event_handler(&mut self, event: &str, handler: &str) {
        self.event_handlers
            .entry(event.to_string())
            .or_default()
            .push(EventHandlerRegistration {
                plugin: self.current_plugin.clone(),
                handler: handler.to_string(),
            });
    }

    fn register_theme(&mut self, name: &str, colors: &str) {
        self.themes.insert(name.to_string(), colors.to_string());
    }

    fn apply_edit(&mut self, action: &PluginAction) {
        self.pending_edits.push(action.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribution_and_teardown() {
        let mut reg = RegistrationRegistry::new();
        reg.begin_plugin("one");
        reg.register_command("a", "ha", None);
        reg.register_event_handler("buffer-saved", "on_save");
        reg.begin_plugin("two");
        reg.register_command("b", "hb", None);
        reg.register_event_handler("buffer-saved", "also_on_save");

        assert_eq!(reg.commands.len(), 2);
        assert_eq!(reg.handlers_for("buffer-saved").len(), 2);

        reg.remove_plugin("one");
        assert_eq!(reg.commands.len(), 1);
        assert_eq!(reg.handlers_for("buffer-saved").len(), 1);
        assert_eq!(reg.handlers_for("buffer-saved")[0].plugin, "two");
    }

    #[test]
    fn later_command_registration_wins() {
        let mut reg = RegistrationRegistry::new();
        reg.begin_plugin("one");
        reg.register_command("open", "first", None);
        reg.begin_plugin("two");
        reg.register_command("open", "second", None);
        assert_eq!(reg.commands["open"].handler, "second");
    }
}
