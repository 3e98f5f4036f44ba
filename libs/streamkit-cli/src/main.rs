//! StreamKit CLI
//!
//! Command-line host for the StreamKit sensor-streaming runtime: loads
//! `RuntimeConfig`, initializes a `Context`, drives its plugins with a
//! periodic `update()` tick, and shuts down cleanly on Ctrl-C.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use streamkit_core::{Context, RuntimeConfig};

#[derive(Parser)]
#[command(name = "streamkit")]
#[command(author, version, about = "StreamKit sensor-streaming runtime host", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the runtime host: load plugins and drive them until Ctrl-C.
    Run {
        /// Path to a RuntimeConfig TOML file (defaults are used if absent).
        #[arg(short, long, value_name = "FILE", default_value = "streamkit.toml")]
        config: PathBuf,

        /// Override the configured plugin directory.
        #[arg(long = "plugin-dir", value_name = "DIR")]
        plugin_dir: Option<PathBuf>,

        /// Milliseconds between Context::update ticks.
        #[arg(long, default_value = "10")]
        update_interval_ms: u64,
    },

    /// Print the resolved RuntimeConfig (after merging the file with defaults).
    Config {
        #[arg(short, long, value_name = "FILE", default_value = "streamkit.toml")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run { config, plugin_dir, update_interval_ms } => {
            run(config, plugin_dir, update_interval_ms).await
        }
        Commands::Config { config } => show_config(config),
    }
}

async fn run(config_path: PathBuf, plugin_dir_override: Option<PathBuf>, update_interval_ms: u64) -> Result<()> {
    let mut config = RuntimeConfig::load_or_default(&config_path)?;
    if let Some(dir) = plugin_dir_override {
        config.plugin_directory = dir;
    }
    init_tracing(&config);

    let context = Context::new();
    context.initialize(&config)?;
    tracing::info!(plugin_directory = %config.plugin_directory.display(), "runtime initialized");

    let mut ticker = tokio::time::interval(Duration::from_millis(update_interval_ms));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                context.update()?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received ctrl-c, shutting down");
                break;
            }
        }
    }

    context.terminate();
    Ok(())
}

fn show_config(config_path: PathBuf) -> Result<()> {
    let config = RuntimeConfig::load_or_default(&config_path)?;
    println!("severity_level = {:?}", config.severity_level);
    println!("plugin_directory = {}", config.plugin_directory.display());
    println!("frame_bin_slot_count = {}", config.frame_bin_slot_count);
    Ok(())
}

fn init_tracing(config: &RuntimeConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.severity_level.as_filter_str().parse().unwrap()),
        )
        .init();
}
