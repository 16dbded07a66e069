// ABOUTME: Root library module exposing the console broker, dispatcher, and plugins
// ABOUTME: Re-exports the platform-agnostic routing core from halyard-core

pub mod dispatch;
pub mod platform;
pub mod plugins;

// Re-export platform-agnostic modules from halyard-core
pub use halyard_core::argv;
pub use halyard_core::config;
pub use halyard_core::paths;
pub use halyard_core::prefs;
pub use halyard_core::table;

pub use halyard_core::{
    Broker, Event, Instance, InstanceRegistry, MemoryPrefs, Original, Plugin, PluginHandler,
    PrefQuery, Preference, PreferenceStore, Prefs, RouteError, Setting, SqlitePrefs,
    REPLY_VIA_DM,
};
