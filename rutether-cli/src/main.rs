//! Rutether CLI
//!
//! A command-line interface for the rutether reconciler.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rutether_engine::{Config, Reconciler};

/// Rutether - keeps tethered clients routed through the active VPN
#[derive(Parser)]
#[command(name = "rutether")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "rutether.toml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace); overrides the
    /// configured level
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reconciler until interrupted
    Run,

    /// Validate the configuration file and exit
    Check,

    /// Generate a sample configuration file
    GenConfig {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "rutether.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => run(cli.config, cli.log_level).await,
        Commands::Check => check(cli.config, cli.log_level),
        Commands::GenConfig { output } => generate_config(output, cli.log_level),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(config_path: PathBuf, log_level: Option<String>) -> Result<()> {
    let config = load_config(&config_path)?;
    init_logging(log_level.as_deref().unwrap_or(&config.common.log_level));

    info!("Starting rutether reconciler...");
    info!("Configuration loaded from {:?}", config_path);

    let mut engine = Reconciler::new(config).context("Failed to create reconciler")?;

    // Create shutdown handle before moving the engine into its task
    let shutdown_tx = engine.create_shutdown_handle();

    let engine_handle = tokio::spawn(async move {
        if let Err(e) = engine.run().await {
            error!("Reconciler error: {}", e);
        }
    });

    // Wait for shutdown signal
    wait_for_shutdown().await;

    info!("Shutting down...");

    // Signal graceful shutdown; the engine flushes applied rules before
    // it finishes
    let _ = shutdown_tx.send(());

    // Wait for the engine to finish (with timeout)
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), engine_handle).await;

    Ok(())
}

fn check(config_path: PathBuf, log_level: Option<String>) -> Result<()> {
    init_logging(log_level.as_deref().unwrap_or("info"));

    let _ = load_config(&config_path)?;
    println!("Configuration is valid");
    Ok(())
}

fn generate_config(output: PathBuf, log_level: Option<String>) -> Result<()> {
    init_logging(log_level.as_deref().unwrap_or("info"));

    let sample = Config::sample();

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write configuration to {:?}", output))?;

    info!("Generated sample configuration at {:?}", output);
    println!("Sample configuration written to {:?}", output);
    println!("\nAdjust the detection lists if your device uses uncommon interface names.");

    Ok(())
}

fn load_config(path: &PathBuf) -> Result<Config> {
    Config::load(path).with_context(|| format!("Failed to load configuration from {:?}", path))
}

async fn wait_for_shutdown() {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("Failed to register SIGTERM handler");
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("Failed to register SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }
}
