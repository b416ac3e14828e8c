//! Deployment and upgrade commands.
//!
//! The chain-interaction layer is not part of Armada. With the `simulation`
//! feature and `campaign.mock_chain = true` these commands run against the
//! simulated chain. Its state is saved next to a redb registry, so a later
//! command sees the contracts an earlier one deployed.

use anyhow::{bail, Result};
use armada_campaign::protocol::{self, ProtocolParams};
use armada_campaign::UpgradeTarget;
use armada_core::{ArmadaConfig, ChainEffects, Version};
use armada_registry::VersionRegistry;
use clap::Args;
use std::sync::Arc;

/// Arguments of `armada deploy`.
#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    /// Governor account (repeatable)
    #[arg(long = "governor", required = true)]
    pub governors: Vec<String>,

    /// Admin account (repeatable)
    #[arg(long = "admin")]
    pub admins: Vec<String>,

    /// Fee and royalty receiver
    #[arg(long)]
    pub vault: String,

    /// Existing payment token; skips deploying one
    #[arg(long)]
    pub payment_token: Option<String>,

    /// Explicit version (default: campaign.version from config)
    #[arg(long)]
    pub version: Option<String>,
}

/// Arguments of `armada upgrade`.
#[derive(Debug, Clone, Args)]
pub struct UpgradeArgs {
    /// Contracts to upgrade (default: every upgradeable contract)
    pub contracts: Vec<String>,

    /// Explicit version (default: campaign.upgrade_version from config)
    #[arg(long)]
    pub version: Option<String>,

    /// Publish a new build of every target artifact on the simulated chain first
    #[arg(long)]
    pub rebuild: bool,
}

fn require_mock_chain(config: &ArmadaConfig) -> Result<()> {
    if !config.campaign.mock_chain {
        bail!("no chain backend configured; set campaign.mock_chain = true for a dry run");
    }
    Ok(())
}

#[cfg(feature = "simulation")]
mod session {
    use super::require_mock_chain;
    use anyhow::Result;
    use armada_core::{ArmadaConfig, ChainEffects, RegistryBackend, RegistryConfig};
    use armada_testkit::SimulatedChain;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tracing::warn;

    /// Simulated chain state lives next to a redb registry. A memory registry
    /// forgets everything on exit, and so does its chain.
    pub fn chain_state_file(config: &RegistryConfig) -> Option<PathBuf> {
        match config.backend {
            RegistryBackend::Redb => {
                Some(config.path.join(format!("{}.chain.json", config.database)))
            }
            RegistryBackend::Memory => None,
        }
    }

    /// Chain one command runs against.
    pub struct ChainSession {
        chain: Arc<SimulatedChain>,
        state_file: Option<PathBuf>,
    }

    impl ChainSession {
        pub fn open(config: &ArmadaConfig) -> Result<Self> {
            require_mock_chain(config)?;
            warn!("using the simulated chain, nothing is sent to a real network");
            let state_file = chain_state_file(&config.registry);
            let chain = match &state_file {
                Some(path) => SimulatedChain::open(path)?,
                None => SimulatedChain::new(),
            };
            Ok(Self {
                chain: Arc::new(chain),
                state_file,
            })
        }

        pub fn chain(&self) -> Arc<dyn ChainEffects> {
            self.chain.clone()
        }

        pub fn rebuild(&self, artifact: &str) {
            self.chain.rebuild_artifact(artifact);
        }

        /// Save the chain whatever the command's outcome; contracts deployed
        /// before a failure are recorded under TEMP and must stay on chain.
        pub fn settle<T>(&self, outcome: armada_core::Result<T>) -> Result<T> {
            let saved = match &self.state_file {
                Some(path) => self.chain.save(path),
                None => Ok(()),
            };
            match (outcome, saved) {
                (Ok(value), saved) => {
                    saved?;
                    Ok(value)
                }
                (Err(err), Err(save_err)) => {
                    warn!(error = %save_err, "simulated chain state not saved");
                    Err(err.into())
                }
                (Err(err), Ok(())) => Err(err.into()),
            }
        }
    }
}

#[cfg(not(feature = "simulation"))]
mod session {
    use super::require_mock_chain;
    use anyhow::{bail, Result};
    use armada_core::{ArmadaConfig, ChainEffects};
    use std::sync::Arc;

    /// No chain is available in this build.
    pub enum ChainSession {}

    impl ChainSession {
        pub fn open(config: &ArmadaConfig) -> Result<Self> {
            require_mock_chain(config)?;
            bail!("this build has no simulated chain; rebuild with --features simulation")
        }

        pub fn chain(&self) -> Arc<dyn ChainEffects> {
            match *self {}
        }

        pub fn rebuild(&self, _artifact: &str) {
            match *self {}
        }

        pub fn settle<T>(&self, _outcome: armada_core::Result<T>) -> Result<T> {
            match *self {}
        }
    }
}

use session::ChainSession;

/// Run the protocol campaign.
pub async fn deploy(
    registry: &VersionRegistry,
    config: &ArmadaConfig,
    args: DeployArgs,
) -> Result<()> {
    let session = ChainSession::open(config)?;
    let params = ProtocolParams {
        governors: args.governors,
        admins: args.admins,
        vault: args.vault,
        payment_token: args.payment_token,
        ..ProtocolParams::default()
    };
    let missions = protocol::protocol_missions(&params)?;
    let version = args
        .version
        .or_else(|| config.campaign.version.clone())
        .map(Version::new);

    let chain: Arc<dyn ChainEffects> = session.chain();
    let mut campaign = armada_campaign::DeployCampaign::new(
        registry.clone(),
        chain,
        protocol::ProtocolState::new(&params),
    )
    .with_version(version);
    let report = session.settle(campaign.execute(&missions).await)?;

    println!("Deployed version {}", report.version);
    for outcome in &report.outcomes {
        let action = if outcome.deployed { "deployed" } else { "skipped" };
        println!("  {:<18} {action}", outcome.contract);
    }
    Ok(())
}

/// Run one upgrade cycle.
pub async fn upgrade(
    registry: &VersionRegistry,
    config: &ArmadaConfig,
    args: UpgradeArgs,
) -> Result<()> {
    let session = ChainSession::open(config)?;
    let targets: Vec<UpgradeTarget> = if args.contracts.is_empty() {
        protocol::upgrade_targets()
    } else {
        args.contracts
            .into_iter()
            .map(UpgradeTarget::rebuilt)
            .collect()
    };
    if args.rebuild {
        for target in &targets {
            session.rebuild(&target.artifact);
        }
    }
    let version = args
        .version
        .or_else(|| config.campaign.upgrade_version.clone())
        .map(Version::new);

    let outcome = protocol::upgrade_coordinator(registry.clone(), session.chain())
        .with_version(version)
        .execute(&targets)
        .await;
    let report = session.settle(outcome)?;

    println!("Upgraded to version {}", report.version);
    for name in &report.upgraded {
        println!("  {name:<18} upgraded");
    }
    for name in &report.already_current {
        println!("  {name:<18} already current");
    }
    for name in &report.carried_forward {
        println!("  {name:<18} carried forward");
    }
    Ok(())
}
