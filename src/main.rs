//! Live Config CLI
//!
//! Loads a layered configuration and prints it, optionally watching the
//! contributing files and reprinting on every change.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use live_config::cli::{Cli, Command};
use live_config::config::{ConfigCache, ConfigLoader, FsConfigCache, LoadOptions};
use live_config::events::{EventRegistry, SystemEvent};
use live_config::format::{OutputFormat, format_snapshot_files, format_value};
use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Environment variable overriding the log filter (e.g. `live_config=trace`).
const LOG_FILTER_ENV: &str = "LIVE_CONFIG_LOG";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let format = OutputFormat::from(cli.format);
    let command = cli.command.clone().unwrap_or(Command::Show);
    let hot_reload = command == Command::Watch && !cli.no_hot_reload;

    let cache: Arc<dyn ConfigCache> = Arc::new(FsConfigCache::new());
    let defaults = match &cli.defaults {
        Some(path) => cache
            .load(Path::new(path), LoadOptions::default())
            .await
            .with_context(|| format!("Failed to load defaults from {}", path))?,
        None => Value::Object(Map::new()),
    };

    let events = Arc::new(EventRegistry::new());
    let loader = Arc::new(
        ConfigLoader::builder()
            .hot_reload(hot_reload)
            .defaults(defaults)
            .events(Arc::clone(&events))
            .build(cache),
    );
    loader
        .init(&cli.config)
        .await
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;

    match command {
        Command::Show => println!("{}", format_value(&loader.get(), format)?),
        Command::Get { path } => {
            let value = loader
                .value_at(&path)
                .ok_or_else(|| anyhow!("No configuration value at '{}'", path))?;
            println!("{}", format_value(&value, format)?);
        }
        Command::Files => println!("{}", format_snapshot_files(&loader.snapshot(), format)?),
        Command::Watch => run_watch(loader, &events, format, hot_reload).await?,
    }

    Ok(())
}

/// Print the configuration, then reprint after every published change.
async fn run_watch(
    loader: Arc<ConfigLoader>,
    events: &EventRegistry,
    format: OutputFormat,
    hot_reload: bool,
) -> Result<()> {
    println!("{}", format_value(&loader.get(), format)?);

    if !hot_reload {
        warn!("Hot reload disabled; watching for Ctrl-C only");
    }

    let (changed_tx, mut changed_rx) = mpsc::unbounded_channel();
    let subscription = events.subscribe(SystemEvent::ConfigChanged, move |_| {
        let _ = changed_tx.send(());
    });
    let listener = loader.spawn_change_listener();
    info!(
        files = loader.contributing_files().len(),
        "Watching configuration for changes"
    );

    loop {
        tokio::select! {
            Some(()) = changed_rx.recv() => {
                println!("{}", format_value(&loader.get(), format)?);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping watch");
                break;
            }
        }
    }

    listener.abort();
    events.unsubscribe(subscription);
    Ok(())
}

/// Initialize logging based on the --log option.
fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = || EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(level));

    match cli.log.as_str() {
        "0" | "off" => {
            // No logging
        }
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter())
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            // Log to file (append mode)
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)?;
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter())
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}
