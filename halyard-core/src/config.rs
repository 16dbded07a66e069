// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Console identity, queue sizing, preference storage, and enabled plugins
use crate::paths;
use crate::prefs::Preference;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub prefs: PrefsConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
}

/// Identity and queue sizing for the console broker.
///
/// The user and room are fixed for the life of the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_user")]
    pub user: String,
    /// Room name; also used as the broker name
    #[serde(default = "default_room")]
    pub room: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_command_marker")]
    pub command_marker: char,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            room: default_room(),
            queue_capacity: default_queue_capacity(),
            command_marker: default_command_marker(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrefsConfig {
    /// SQLite database path. Without one, preferences live in memory
    /// unless `persist` is set, which selects the default data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub persist: bool,
    /// Rows written to the store at startup
    #[serde(default)]
    pub seed: Vec<Preference>,
}

impl PrefsConfig {
    /// Where the SQLite database lives, or None for an in-memory store
    pub fn database_path(&self) -> Option<PathBuf> {
        match (&self.path, self.persist) {
            (Some(path), _) => Some(PathBuf::from(path)),
            (None, true) => Some(paths::data_dir().join("prefs.db")),
            (None, false) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    #[serde(default = "default_enabled_plugins")]
    pub enabled: Vec<String>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_plugins(),
        }
    }
}

fn default_user() -> String {
    match std::env::var("USER") {
        Ok(user) if !user.is_empty() => user,
        _ => "testuser".to_string(),
    }
}

fn default_room() -> String {
    "console".to_string()
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_command_marker() -> char {
    '/'
}

fn default_enabled_plugins() -> Vec<String> {
    vec!["echo".to_string(), "settings".to_string()]
}

/// Expand a leading ~ to the home directory
fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs
                .home_dir()
                .join(stripped)
                .to_string_lossy()
                .to_string();
        }
        tracing::warn!(
            path = %path,
            "Failed to expand tilde in path: could not determine home directory"
        );
    }
    path.to_string()
}

impl Config {
    /// Find the config file, checking in order:
    /// 1. HALYARD_CONFIG_PATH env var (if set)
    /// 2. ./config.toml
    /// 3. ~/.config/halyard/config.toml
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("HALYARD_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration from the first config file found, then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config = match Self::find_config_file() {
            Some(path) => Self::from_file(&path)?,
            None => {
                tracing::info!("No config file found, using environment variables and defaults");
                Config::default()
            }
        };
        config.finish()
    }

    /// Load from an explicit path (e.g. `--config`), then apply environment
    /// overrides and validate.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        Self::from_file(path)?.finish()
    }

    fn from_file(path: &std::path::Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn finish(mut self) -> Result<Self> {
        self.apply_env()?;
        if let Some(path) = self.prefs.path.take() {
            self.prefs.path = Some(expand_tilde(&path));
        }
        self.validate()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("HALYARD_USER") {
            self.console.user = val;
        }
        if let Ok(val) = std::env::var("HALYARD_ROOM") {
            self.console.room = val;
        }
        if let Ok(val) = std::env::var("HALYARD_QUEUE_CAPACITY") {
            self.console.queue_capacity = val.parse().with_context(|| {
                format!("HALYARD_QUEUE_CAPACITY must be a valid number, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("HALYARD_PREFS_PATH") {
            self.prefs.path = Some(val);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.console.user.trim().is_empty() {
            anyhow::bail!("console.user must not be empty (set in config.toml or HALYARD_USER)");
        }
        if self.console.room.trim().is_empty() {
            anyhow::bail!("console.room must not be empty (set in config.toml or HALYARD_ROOM)");
        }
        if self.console.queue_capacity == 0 {
            anyhow::bail!("console.queue_capacity must be at least 1");
        }
        if self.console.command_marker.is_whitespace() {
            anyhow::bail!("console.command_marker must not be whitespace");
        }
        for pref in &self.prefs.seed {
            if pref.key.trim().is_empty() {
                anyhow::bail!("prefs.seed entries require a key");
            }
        }
        Ok(())
    }
}
