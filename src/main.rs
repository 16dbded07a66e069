// ABOUTME: Main entry point for the halyard console bot
// ABOUTME: Initializes logging, config, preference store, plugins, and the console pumps

use anyhow::{Context, Result};
use clap::Parser;
use halyard::config::{Config, PrefsConfig};
use halyard::dispatch::Dispatcher;
use halyard::platform::ConsoleBroker;
use halyard::{plugins, Broker, InstanceRegistry, MemoryPrefs, PreferenceStore, SqlitePrefs};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "halyard", version, about = "Chat bot event routing over a console")]
struct Cli {
    /// Config file (overrides the HALYARD_CONFIG_PATH search)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Console user name (overrides config value)
    #[arg(long)]
    user: Option<String>,

    /// Console room name (overrides config value)
    #[arg(long)]
    room: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries chat output, so logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }

    tracing::info!("Starting halyard");

    dotenvy::dotenv().ok();
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(user) = cli.user {
        config.console.user = user;
    }
    if let Some(room) = cli.room {
        config.console.room = room;
    }
    config.validate()?;

    tracing::info!(
        user = %config.console.user,
        room = %config.console.room,
        queue_capacity = config.console.queue_capacity,
        plugins = config.plugins.enabled.len(),
        "Configuration loaded"
    );

    let prefs = open_prefs(&config.prefs)?;
    let broker = ConsoleBroker::new(config.console.clone(), Some(prefs));

    let mut registry = InstanceRegistry::new();
    plugins::register_enabled(
        &mut registry,
        &config.plugins.enabled,
        broker.name(),
        &config.console.room,
    )?;
    let dispatcher = Dispatcher::new(Arc::new(registry));

    let (tx, rx) = mpsc::channel(config.console.queue_capacity);
    broker.spawn_stdio();
    let stream = tokio::spawn(Arc::clone(&broker).stream(tx));

    tracing::info!("Console ready");

    tokio::select! {
        res = dispatcher.run(rx) => res?,
        res = stream => res.context("Console stream task panicked")??,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }

    Ok(())
}

/// Open the configured preference store and write the seed rows into it
fn open_prefs(config: &PrefsConfig) -> Result<Arc<dyn PreferenceStore>> {
    match config.database_path() {
        Some(path) => {
            let store = SqlitePrefs::open(&path)
                .with_context(|| format!("Failed to open preference store {}", path.display()))?;
            for pref in &config.seed {
                store.set(pref)?;
            }
            tracing::info!(path = %path.display(), seeded = config.seed.len(), "Preference store opened");
            Ok(Arc::new(store))
        }
        None => {
            let store = MemoryPrefs::new();
            for pref in &config.seed {
                store.set(pref.clone())?;
            }
            tracing::info!(seeded = config.seed.len(), "Using in-memory preference store");
            Ok(Arc::new(store))
        }
    }
}
