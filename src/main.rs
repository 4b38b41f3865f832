use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gemflow::config::{default_config_path, ResolvedConfig};
use gemflow::flow::FlowOutcome;
use gemflow::flows::AssetKind;
use gemflow::run::RunOrchestrator;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "gemflow")]
#[command(about = "Automated Mini App gem purchases with balance reconciliation")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the purchase flow for one asset and reconcile its balance
    Buy {
        #[arg(value_enum)]
        asset: AssetKind,
    },
    /// Open the Mini App directly and dump token, balances, and inventory
    Probe,
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = ResolvedConfig::load_or_default(&config_path)?;

    match cli.command {
        Command::Buy { asset } => {
            let report = RunOrchestrator::new(config).run_purchase(asset).await?;
            match &report.flow {
                FlowOutcome::Completed => {
                    println!("Purchase flow completed for {}.", report.asset.label());
                }
                FlowOutcome::Aborted { step } => {
                    println!(
                        "Purchase flow for {} did not complete (stopped at: {step}).",
                        report.asset.label()
                    );
                }
            }
        }
        Command::Probe => {
            RunOrchestrator::new(config).run_probe().await?;
        }
        Command::Config => {
            println!("Config file: {}", config_path.display());
            println!("Data directory: {}", config.data_dir.display());
            println!("Telegram URL: {}", config.telegram_url);
            println!("API base: {}", config.api_base);
        }
    }

    Ok(())
}
