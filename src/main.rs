//! Wordchain - word-chain game bot for Discord
//!
//! Players take turns posting words that start with the end of the previous
//! word. Words are checked against a dictionary, scored with karma and
//! persisted in SQLite.

mod chain;
mod common;
mod config;
mod discord;
mod import;
mod store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use chain::cache::WordCache;
use chain::{Alphabets, GameEngine, GlobalLists, Language, RoleSync, WiktionaryLookup};
use common::error::{ConfigError, Result};
use common::logging::LogControl;
use config::{env::get_config_path, load_and_validate, Config};
use discord::DiscordBotBuilder;
use store::Store;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Parser)]
#[command(name = "wordchain", version, about)]
struct Cli {
    /// Config file, overrides WORDCHAIN_CONFIG.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Run the bot (default).
    Run,
    /// Add the words of a word list file to the word cache.
    Import {
        /// Language code of the list, e.g. "en".
        #[arg(short, long)]
        language: String,
        /// Words per database batch.
        #[arg(long, default_value_t = import::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logs = LogControl::init();

    let cli = Cli::parse();
    info!("Wordchain v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = cli.config.unwrap_or_else(get_config_path);
    let config = load_config(&config_path)?;
    let store = open_store(&config).await?;
    let global = Arc::new(GlobalLists::new(config.lists.as_ref()));

    match cli.command.unwrap_or(CliCommand::Run) {
        CliCommand::Run => run(config, store, global, logs).await,
        CliCommand::Import {
            language,
            batch_size,
            file,
        } => {
            let language = Language::from_code(&language).ok_or_else(|| ConfigError::InvalidValue {
                field: "language".to_string(),
                message: format!("unknown language code '{}'", language),
            })?;
            let cache = WordCache::new(store, global);
            let report = import::import_file(&cache, &Alphabets::new(), language, &file, batch_size).await?;
            info!(
                read = report.read,
                accepted = report.accepted,
                added = report.added,
                "Import complete"
            );
            Ok(())
        }
    }
}

fn load_config(path: &str) -> Result<Config> {
    info!("Loading configuration from {}...", path);
    let config = load_and_validate(path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Please ensure {} exists and is properly formatted.", path);
        e
    })?;
    info!("Configuration loaded successfully");
    Ok(config)
}

async fn open_store(config: &Config) -> Result<Store> {
    let max_connections = config.database.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS);
    Ok(Store::connect(&config.database.url, max_connections).await?)
}

async fn run(config: Config, store: Store, global: Arc<GlobalLists>, logs: LogControl) -> anyhow::Result<()> {
    let settings = config.game_settings();
    info!("  Single player: {}", settings.single_player);
    info!("  Default languages: {}", settings.default_languages.join(", "));
    info!("  Dictionary endpoint: {}", config.lookup_endpoint());

    let lookup = WiktionaryLookup::new(config.lookup_endpoint(), config.lookup_user_agent(), settings.lookup_timeout)?;

    let (roles_tx, roles_rx) = mpsc::unbounded_channel::<RoleSync>();
    let engine = GameEngine::start(settings, store, Arc::new(lookup), global, Some(roles_tx)).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let discord_bot = DiscordBotBuilder::new(&config, engine.clone(), logs, roles_rx, shutdown_rx)
        .build()
        .await?;

    info!("Starting Discord bot...");
    let mut discord_task = tokio::spawn(discord_bot.run());

    let shutdown = tokio::select! {
        biased;
        _ = shutdown_signal() => {
            info!("Shutdown signal received - stopping...");
            true
        }
        _ = &mut discord_task => false,
    };

    if shutdown {
        // Fire-and-forget: if the receiver is gone the bot already stopped.
        let _ = shutdown_tx.send(true);
        match tokio::time::timeout(Duration::from_secs(5), discord_task).await {
            Ok(Ok(())) => info!("Discord bot stopped gracefully"),
            Ok(Err(e)) => warn!("Discord task panicked: {}", e),
            Err(_) => warn!("Discord shutdown timed out"),
        }
    }

    if let Err(e) = engine.force_flush().await {
        error!("Final maintenance flush failed: {:#}", e);
    }

    info!("Exiting...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
