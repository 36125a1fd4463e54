//! # Dispatch Configuration Validator
//!
//! Command-line tool for validating dispatch configuration before starting the daemon.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dispatch_core::config::ConfigManager;
use std::path::PathBuf;
use std::process;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate dispatch configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment overlay to apply (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: $DISPATCH_CONFIG_DIR or ./config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration, printing a summary
    Validate,

    /// Print the effective configuration as JSON with secrets masked
    Show,

    /// List environment overlays present in the configuration directory
    Environments,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let result = match cli.command.as_ref().unwrap_or(&Commands::Validate) {
        Commands::Validate => validate(&cli),
        Commands::Show => show(&cli),
        Commands::Environments => list_environments(&cli),
    };

    if let Err(e) = result {
        eprintln!("❌ {e:#}");
        process::exit(1);
    }
}

fn load(cli: &Cli) -> Result<std::sync::Arc<ConfigManager>> {
    ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
        .with_context(|| format!("failed to load configuration for '{}'", cli.environment))
}

fn validate(cli: &Cli) -> Result<()> {
    let manager = load(cli)?;
    let config = manager.config();

    println!("🔧 Dispatch configuration");
    println!("Environment: {}", manager.environment());
    println!("Directory:   {}", manager.config_directory().display());
    println!();
    println!(
        "Database:        max_connections={} busy_timeout_ms={}",
        config.database.max_connections, config.database.busy_timeout_ms
    );
    println!(
        "Offline queue:   enabled={} ttl={}s max_items={} max_retries={}",
        config.offline_queue.enabled,
        config.offline_queue.ttl_seconds,
        config.offline_queue.max_items,
        config.offline_queue.max_retries
    );
    println!(
        "Drainer:         tick={}ms recover_on_startup={} prune_every={}s",
        config.drainer.tick_interval_ms,
        config.drainer.recover_on_startup,
        config.drainer.prune_interval_seconds
    );
    println!(
        "Breakers:        enabled={} failure_threshold={} timeout={}s overrides={}",
        config.circuit_breakers.enabled,
        config.circuit_breakers.default_config.failure_threshold,
        config.circuit_breakers.default_config.timeout_seconds,
        config.circuit_breakers.component_configs.len()
    );
    println!("Retention:       queue_days={}", config.retention.queue_days);
    println!("Providers:       {:?}", config.providers);
    println!("Fallbacks:       {:?}", config.fallback_providers);

    if config.providers.is_empty() && config.circuit_breakers.enabled {
        println!();
        println!("⚠️  No providers configured: the drainer will treat every tick as unavailable");
    }

    println!();
    println!("✅ Configuration is valid");
    Ok(())
}

fn show(cli: &Cli) -> Result<()> {
    let manager = load(cli)?;
    let rendered = serde_json::to_string_pretty(&manager.debug_config())
        .context("failed to render configuration")?;
    println!("{rendered}");
    Ok(())
}

fn list_environments(cli: &Cli) -> Result<()> {
    let directory = cli
        .config_dir
        .clone()
        .or_else(|| std::env::var_os("DISPATCH_CONFIG_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("config"));

    let entries = std::fs::read_dir(&directory)
        .with_context(|| format!("cannot read {}", directory.display()))?;

    let mut environments: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|name| {
            name.strip_prefix("dispatch.")
                .and_then(|rest| rest.strip_suffix(".toml"))
                .map(str::to_string)
        })
        .collect();
    environments.sort();

    println!("📋 Environment overlays in {}:", directory.display());
    if environments.is_empty() {
        println!("  (none)");
    }
    for environment in environments {
        println!("  • {environment}");
    }
    Ok(())
}
