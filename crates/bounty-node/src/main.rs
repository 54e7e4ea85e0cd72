use anyhow::{Context, Result};
use bounty_ledger::{AuditLedger, JsonlAuditLedger, MemoryAuditLedger};
use bounty_node::config::NodeConfig;
use bounty_node::simulate::{self, SimulationParams};
use bounty_node::{inspect_ledger, logging};
use bounty_types::RewardAmount;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "bountyd")]
#[command(about = "Bounty lifecycle engine: claims, reviews and staged payouts", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "BOUNTY_CONFIG")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        #[arg(short, long, default_value = "./bounty-config.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Load, validate and print the effective configuration
    CheckConfig,

    /// Verify and replay an audit ledger file
    Replay {
        /// Ledger file; defaults to the configured path
        #[arg(short, long)]
        ledger: Option<PathBuf>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run concurrent agents through the full pipeline and cross-check the
    /// ledger
    Simulate {
        #[arg(long, default_value = "10")]
        agents: usize,

        #[arg(long, default_value = "5")]
        bounties: usize,

        /// Reward per bounty in RTC
        #[arg(long, default_value = "50")]
        reward: u64,

        /// Every n-th submission is scored below the threshold (0 = never)
        #[arg(long, default_value = "5")]
        reject_every: usize,

        /// Write the simulated ledger to this (new) file instead of memory
        #[arg(long)]
        ledger: Option<PathBuf>,
    },
}

/// Precedence: file (or defaults) < environment; CLI flags are applied
/// per command
fn load_config(path: Option<&PathBuf>) -> Result<NodeConfig> {
    let mut config = NodeConfig::load(path.map(PathBuf::as_path))?;
    config.apply_env_overrides();
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    if let Err(e) = logging::init_logging(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Init { output, force } => {
            if output.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    output.display()
                );
            }
            NodeConfig::default().save_to_file(&output)?;
            info!(path = %output.display(), "⚙️ Configuration written");
        }

        Commands::CheckConfig => {
            config.validate()?;
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", rendered);
            info!("✅ Configuration is valid");
        }

        Commands::Replay { ledger, json } => {
            let path = ledger.unwrap_or_else(|| config.ledger.path.clone());
            let summary = inspect_ledger(&path).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", summary);
            }
        }

        Commands::Simulate {
            agents,
            bounties,
            reward,
            reject_every,
            ledger,
        } => {
            config.validate()?;
            let audit: Arc<dyn AuditLedger> = match &ledger {
                Some(path) => {
                    if path.exists() {
                        anyhow::bail!(
                            "{} already exists; simulations need a fresh ledger",
                            path.display()
                        );
                    }
                    Arc::new(JsonlAuditLedger::open(path).await?)
                }
                None => Arc::new(MemoryAuditLedger::new()),
            };
            let params = SimulationParams {
                agents,
                bounties,
                reward: RewardAmount::from_rtc(reward),
                reject_every,
            };
            let report = simulate::run(config.engine.clone(), params, audit).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
