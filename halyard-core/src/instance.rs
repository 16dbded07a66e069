// ABOUTME: Plugin and plugin-instance metadata
// ABOUTME: Instances bind a plugin to a broker/room; events hold only a Weak handle

use crate::event::Event;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Code invoked for each event routed to a plugin instance
#[async_trait]
pub trait PluginHandler: Send + Sync {
    async fn handle(&self, evt: Event) -> Result<()>;
}

/// A setting declared by a plugin.
///
/// When `room` is set the setting only applies to that room id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    #[serde(default)]
    pub default: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

impl Setting {
    pub fn new(key: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            default: default.into(),
            room: None,
        }
    }

    pub fn in_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    /// Whether this setting applies to `room_id`
    pub fn applies_to(&self, room_id: &str) -> bool {
        self.room.as_deref().map_or(true, |r| r.is_empty() || r == room_id)
    }
}

pub struct Plugin {
    pub name: String,
    /// Declared settings, in declaration order
    pub settings: Vec<Setting>,
    handler: Arc<dyn PluginHandler>,
}

impl Plugin {
    pub fn new(name: impl Into<String>, handler: Arc<dyn PluginHandler>) -> Self {
        Self {
            name: name.into(),
            settings: Vec::new(),
            handler,
        }
    }

    pub fn with_setting(mut self, setting: Setting) -> Self {
        self.settings.push(setting);
        self
    }

    pub fn handler(&self) -> &Arc<dyn PluginHandler> {
        &self.handler
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .finish()
    }
}

/// A plugin activated for one broker/room pair
#[derive(Debug)]
pub struct Instance {
    pub id: String,
    pub plugin: Arc<Plugin>,
    pub broker: String,
    pub room_id: String,
}

/// Owns every instance. Events never keep instances alive.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: Vec<Arc<Instance>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        plugin: Arc<Plugin>,
        broker: impl Into<String>,
        room_id: impl Into<String>,
    ) -> Arc<Instance> {
        let instance = Arc::new(Instance {
            id: uuid::Uuid::new_v4().to_string(),
            plugin,
            broker: broker.into(),
            room_id: room_id.into(),
        });
        tracing::debug!(
            plugin = %instance.plugin.name,
            broker = %instance.broker,
            room_id = %instance.room_id,
            "Registered plugin instance"
        );
        self.instances.push(Arc::clone(&instance));
        instance
    }

    /// Instances bound to `broker` and `room_id`, in registration order
    pub fn matching(&self, broker: &str, room_id: &str) -> Vec<Arc<Instance>> {
        self.instances
            .iter()
            .filter(|i| i.broker == broker && i.room_id == room_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
