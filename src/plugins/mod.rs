// ABOUTME: Built-in plugins and the helper that activates them for a broker/room
// ABOUTME: Plugin names come from the [plugins] enabled list in config

pub mod echo;
pub mod settings;

use anyhow::Result;
use halyard_core::{InstanceRegistry, Plugin};
use std::sync::Arc;

/// Look up a built-in plugin by name
pub fn builtin(name: &str) -> Option<Plugin> {
    match name {
        echo::NAME => Some(echo::plugin()),
        settings::NAME => Some(settings::plugin()),
        _ => None,
    }
}

/// Register one instance of each enabled plugin for `broker` in `room_id`.
/// Unknown names are a configuration error.
pub fn register_enabled(
    registry: &mut InstanceRegistry,
    enabled: &[String],
    broker: &str,
    room_id: &str,
) -> Result<()> {
    for name in enabled {
        let Some(plugin) = builtin(name) else {
            anyhow::bail!(
                "Unknown plugin '{}' in plugins.enabled (available: {}, {})",
                name,
                echo::NAME,
                settings::NAME
            );
        };
        let instance = registry.register(Arc::new(plugin), broker, room_id);
        tracing::info!(plugin = %name, instance = %instance.id, room_id, "Plugin enabled");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names() {
        assert_eq!(builtin("echo").unwrap().name, "echo");
        assert_eq!(builtin("settings").unwrap().name, "settings");
        assert!(builtin("nope").is_none());
    }

    #[test]
    fn test_register_enabled() {
        let mut registry = InstanceRegistry::new();
        let enabled = vec!["echo".to_string(), "settings".to_string()];
        register_enabled(&mut registry, &enabled, "console", "console").unwrap();

        let matched = registry.matching("console", "console");
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].plugin.name, "echo");
        assert_eq!(matched[1].plugin.name, "settings");
    }

    #[test]
    fn test_register_unknown_plugin_fails() {
        let mut registry = InstanceRegistry::new();
        let err = register_enabled(&mut registry, &["weather".to_string()], "console", "console")
            .unwrap_err();
        assert!(err.to_string().contains("weather"));
        assert!(registry.is_empty());
    }
}
