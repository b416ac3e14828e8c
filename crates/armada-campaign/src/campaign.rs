//! Deployment campaign
//!
//! Runs missions strictly in the order given; that order is the dependency
//! order. There is no rollback across missions: when mission `k` fails,
//! missions before it stay recorded under the run's TEMP version and are
//! skipped on the next run, which resumes at `k`.

use crate::mission::{Mission, MissionContext, MissionOutcome};
use armada_core::{ChainEffects, Result, Version};
use armada_registry::VersionRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Result of a successful campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    /// Version the run deployed under, now DEPLOYED
    pub version: Version,
    /// One outcome per mission, in execution order
    pub outcomes: Vec<MissionOutcome>,
}

impl CampaignReport {
    /// Contracts deployed by this run (as opposed to skipped).
    pub fn deployed(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.deployed)
            .map(|o| o.contract.as_str())
    }
}

/// Sequential mission runner owning the typed campaign state `S`.
pub struct DeployCampaign<S> {
    registry: VersionRegistry,
    chain: Arc<dyn ChainEffects>,
    state: S,
    version: Option<Version>,
}

impl<S: Send + Sync> DeployCampaign<S> {
    /// Campaign over `registry` and `chain`, starting from `state`.
    pub fn new(registry: VersionRegistry, chain: Arc<dyn ChainEffects>, state: S) -> Self {
        Self {
            registry,
            chain,
            state,
            version: None,
        }
    }

    /// Deploy under an explicit version instead of the resolved one.
    pub fn with_version(mut self, version: Option<Version>) -> Self {
        self.version = version;
        self
    }

    /// Current state.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Hand the state back.
    pub fn into_state(self) -> S {
        self.state
    }

    /// Configure the version, run every mission in order, then promote the
    /// version to DEPLOYED. The first failing mission aborts the run and
    /// leaves the version as TEMP.
    pub async fn execute(&mut self, missions: &[Mission<S>]) -> Result<CampaignReport> {
        let version = self
            .registry
            .configure_versioning(self.version.as_ref())
            .await?;
        info!(%version, missions = missions.len(), "campaign started");

        let ctx = MissionContext {
            registry: &self.registry,
            chain: self.chain.as_ref(),
            version: &version,
        };
        let mut outcomes = Vec::with_capacity(missions.len());
        for (index, mission) in missions.iter().enumerate() {
            match mission.execute(&ctx, &mut self.state).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    error!(
                        contract = mission.contract(),
                        index,
                        %version,
                        error = %err,
                        "mission failed, campaign aborted"
                    );
                    return Err(err);
                }
            }
        }

        self.registry
            .finalize_deployed_version(Some(&version))
            .await?;
        let report = CampaignReport { version, outcomes };
        info!(
            version = %report.version,
            deployed = report.deployed().count(),
            "campaign complete"
        );
        Ok(report)
    }
}
