//! # Storyforge Configuration Validator
//!
//! Loads the layered configuration the way the orchestrator would, validates it,
//! and prints the resolved provider selection.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use storyforge_core::config::{ConfigManager, ProviderConfig, StoryforgeConfig};
use storyforge_core::providers::ProviderRegistry;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate Storyforge configuration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format (table, json)
    #[arg(long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the whole configuration
    All,

    /// Show the provider backend chosen for each capability
    Providers,

    /// Print the resolved configuration with secrets masked
    Show,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = load(&cli).and_then(|manager| match &cli.command {
        Some(Commands::All) | None => validate_all(&manager),
        Some(Commands::Providers) => show_providers(&manager, &cli.format),
        Some(Commands::Show) => show_config(&manager),
    });

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            println!("❌ {e}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> anyhow::Result<std::sync::Arc<ConfigManager>> {
    println!("🔧 Validating Storyforge Configuration");
    println!("Environment: {}", cli.environment);
    if let Some(dir) = &cli.config_dir {
        println!("Config Directory: {}", dir.display());
    }
    println!();

    let manager =
        ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)?;
    println!("✅ Configuration loaded");
    Ok(manager)
}

fn validate_all(manager: &ConfigManager) -> anyhow::Result<()> {
    let config = manager.config();
    config.validate()?;
    println!("✅ Configuration is consistent");

    print_orchestration(config);
    ProviderRegistry::from_config(&config.providers)?;
    println!("✅ Provider backends resolved");
    print_providers_table(config);

    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}

fn print_orchestration(config: &StoryforgeConfig) {
    let o = &config.orchestration;
    println!("🎼 Orchestration");
    println!("   workers: {}", o.max_concurrent_tasks);
    println!("   queue capacity: {}", o.queue_capacity);
    println!(
        "   cancel dependents on failure: {}",
        o.cancel_dependents_on_failure
    );
    match o.processing_timeout_seconds {
        Some(secs) => println!(
            "   stuck-task sweeper: {secs}s timeout, every {}s",
            o.sweep_interval_seconds
        ),
        None => println!("   stuck-task sweeper: disabled"),
    }
    println!("📁 Storage: {} -> {}", config.storage.root.display(), config.storage.public_prefix);
    println!("🎬 Assembly: {}", config.assembly.ffmpeg_path);
}

fn provider_rows(config: &StoryforgeConfig) -> Vec<(&'static str, &ProviderConfig)> {
    vec![
        ("storyboard", &config.providers.storyboard),
        ("image", &config.providers.image),
        ("speech", &config.providers.speech),
        ("animation", &config.providers.animation),
    ]
}

fn print_providers_table(config: &StoryforgeConfig) {
    println!("🔌 Providers");
    for (capability, provider) in provider_rows(config) {
        println!(
            "   {:<11} {:<18} {:<40} {}",
            capability,
            provider.backend,
            provider.effective_base_url().unwrap_or_default(),
            provider.effective_model().unwrap_or_else(|| "-".to_string()),
        );
    }
}

fn show_providers(manager: &ConfigManager, format: &str) -> anyhow::Result<()> {
    let config = manager.config();
    match format {
        "json" => {
            let rows: serde_json::Map<String, serde_json::Value> = provider_rows(config)
                .into_iter()
                .map(|(capability, provider)| {
                    (
                        capability.to_string(),
                        serde_json::json!({
                            "backend": provider.backend,
                            "base_url": provider.effective_base_url(),
                            "model": provider.effective_model(),
                            "api_key_set": provider.resolved_api_key().is_some(),
                            "timeout_seconds": provider.timeout_seconds,
                        }),
                    )
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        _ => print_providers_table(config),
    }
    Ok(())
}

fn show_config(manager: &ConfigManager) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
    Ok(())
}
