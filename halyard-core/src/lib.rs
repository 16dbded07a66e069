// ABOUTME: Platform-agnostic event routing core for chat bots
// ABOUTME: Event envelope, reply router, broker contract, and preference lookups

pub mod argv;
pub mod broker;
pub mod config;
pub mod error;
pub mod event;
pub mod instance;
pub mod paths;
pub mod prefs;
pub mod table;

pub use broker::Broker;
pub use error::RouteError;
pub use event::{Event, Original, ReplyFn, REPLY_VIA_DM};
pub use instance::{Instance, InstanceRegistry, Plugin, PluginHandler, Setting};
pub use prefs::{MemoryPrefs, PrefQuery, Preference, PreferenceStore, Prefs, SqlitePrefs};
