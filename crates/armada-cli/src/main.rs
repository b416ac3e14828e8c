//! Operator CLI for Armada
//!
//! Inspect and maintain the versioned contract registry, and run dry-run
//! deployment campaigns and upgrade cycles against a simulated chain.

use anyhow::{Context, Result};
use armada_core::ArmadaConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod handlers;

use handlers::{campaign, registry};

#[derive(Parser)]
#[command(name = "armada")]
#[command(about = "Armada - Versioned contract deployment and upgrades", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = ".armada/config.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the TEMP and DEPLOYED versions and any interrupted promotion
    Status,

    /// List every version row
    Versions,

    /// List contracts recorded under a version
    Contracts {
        /// Version to list (default: latest)
        #[arg(long)]
        version: Option<String>,
    },

    /// Show one contract record
    Show {
        /// Contract name
        name: String,

        /// Version to read (default: latest)
        #[arg(long)]
        version: Option<String>,
    },

    /// Resolve the working version, opening a TEMP version if needed
    Configure {
        /// Explicit version (default: campaign.version from config)
        #[arg(long)]
        version: Option<String>,
    },

    /// Promote a TEMP version to DEPLOYED
    Finalize {
        /// Version to promote (default: current TEMP)
        #[arg(long)]
        version: Option<String>,
    },

    /// Delete every contract and version row of an abandoned version
    Clear {
        /// Version to delete
        #[arg(long)]
        version: String,
    },

    /// Finish a promotion interrupted by a crash
    Recover,

    /// Deploy the protocol (requires campaign.mock_chain)
    Deploy(campaign::DeployArgs),

    /// Upgrade protocol proxies (requires campaign.mock_chain)
    Upgrade(campaign::UpgradeArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ArmadaConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    // Initialize unified logging system
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        config.log_level.clone()
    };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let registry = registry::connect(&config)?;

    let outcome = match cli.command {
        Commands::Status => registry::status(&registry).await,
        Commands::Versions => registry::versions(&registry).await,
        Commands::Contracts { version } => registry::contracts(&registry, version).await,
        Commands::Show { name, version } => registry::show(&registry, &name, version).await,
        Commands::Configure { version } => {
            let version = version.or_else(|| config.campaign.version.clone());
            registry::configure(&registry, version).await
        }
        Commands::Finalize { version } => registry::finalize(&registry, version).await,
        Commands::Clear { version } => registry::clear(&registry, version).await,
        Commands::Recover => registry::recover(&registry).await,
        Commands::Deploy(args) => campaign::deploy(&registry, &config, args).await,
        Commands::Upgrade(args) => campaign::upgrade(&registry, &config, args).await,
    };

    let closed = registry.close().await;
    finish(outcome, closed)
}

/// The command's own error wins over a failed close.
fn finish(outcome: Result<()>, closed: armada_core::Result<()>) -> Result<()> {
    match outcome {
        Ok(()) => Ok(closed?),
        Err(err) => {
            if let Err(close_err) = closed {
                tracing::warn!(error = %close_err, "registry close failed after command error");
            }
            Err(err)
        }
    }
}
