//! Upgrade coordinator
//!
//! Swaps the implementation behind already deployed proxies. Per target:
//!
//! 1. look up the proxy in the DEPLOYED version
//! 2. snapshot its storage layout
//! 3. upgrade, unless the proxy already runs the target artifact's code
//!    through the implementation recorded under DEPLOYED
//! 4. snapshot again and require both snapshots to be equal
//! 5. record the contract under the new version
//!
//! Targets run one at a time; the first mismatch aborts the run and leaves
//! earlier targets recorded under the TEMP version. After every target
//! succeeds, contracts that were not upgraded are carried into the new
//! version and the version is promoted.
//!
//! A later run resumes that TEMP version only while every contract recorded
//! under it keeps the address it has under DEPLOYED. A TEMP version holding
//! anything else, such as fresh deployments from a failed campaign, is
//! discarded in favour of a new version.

use armada_core::{
    ArmadaError, ChainEffects, ContractData, ContractRecord, DeployedContract, Result, Version,
};
use armada_registry::VersionRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One contract to upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeTarget {
    /// Registry name of the deployed contract
    pub contract: String,
    /// Artifact the new implementation is built from
    pub artifact: String,
}

impl UpgradeTarget {
    /// Upgrade `contract` to the artifact `artifact`.
    pub fn new(contract: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            artifact: artifact.into(),
        }
    }

    /// Upgrade `contract` to the current build of its own artifact.
    pub fn rebuilt(contract: impl Into<String>) -> Self {
        let contract = contract.into();
        Self {
            artifact: contract.clone(),
            contract,
        }
    }
}

/// Result of a successful upgrade cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeReport {
    /// Version the cycle recorded under, now DEPLOYED
    pub version: Version,
    /// Contracts whose proxy was pointed at a new implementation
    pub upgraded: Vec<String>,
    /// Targets that already ran the target code; no upgrade call was made
    pub already_current: Vec<String>,
    /// Contracts copied unchanged from the previous DEPLOYED version
    pub carried_forward: Vec<String>,
}

/// Storage-preserving proxy upgrades.
pub struct UpgradeCoordinator {
    registry: VersionRegistry,
    chain: Arc<dyn ChainEffects>,
    protected: BTreeSet<String>,
    version: Option<Version>,
}

impl std::fmt::Debug for UpgradeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradeCoordinator")
            .field("protected", &self.protected)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

enum TargetResult {
    Upgraded,
    AlreadyCurrent,
    AlreadyRecorded,
}

impl UpgradeCoordinator {
    /// Coordinator over `registry` and `chain` with nothing protected.
    pub fn new(registry: VersionRegistry, chain: Arc<dyn ChainEffects>) -> Self {
        Self {
            registry,
            chain,
            protected: BTreeSet::new(),
            version: None,
        }
    }

    /// Contracts whose logic must never change.
    pub fn with_protected<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.protected = names.into_iter().map(Into::into).collect();
        self
    }

    /// Record the cycle under an explicit version.
    pub fn with_version(mut self, version: Option<Version>) -> Self {
        self.version = version;
        self
    }

    fn check_targets(&self, targets: &[UpgradeTarget]) -> Result<()> {
        if targets.is_empty() {
            return Err(ArmadaError::invalid("no upgrade targets given"));
        }
        if let Some(target) = targets.iter().find(|t| self.protected.contains(&t.contract)) {
            return Err(ArmadaError::invalid(format!(
                "{} is protected and cannot be upgraded",
                target.contract
            )));
        }
        let mut seen = HashSet::new();
        if let Some(target) = targets.iter().find(|t| !seen.insert(t.contract.as_str())) {
            return Err(ArmadaError::invalid(format!(
                "{} is listed more than once",
                target.contract
            )));
        }
        Ok(())
    }

    /// Whether every record under `temp` is a proxy recorded at the same
    /// address under `deployed`.
    async fn is_upgrade_cycle(&self, temp: &Version, deployed: &Version) -> Result<bool> {
        for record in self.registry.get_contracts(temp).await? {
            let previous = self.registry.get_contract(&record.name, Some(deployed)).await?;
            if previous.map_or(true, |previous| previous.address != record.address) {
                debug!(contract = %record.name, %temp, "TEMP record is not an upgrade");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Explicit version, else a TEMP version left by an interrupted cycle,
    /// else a freshly minted one.
    async fn resolve_version(&self, deployed: &Version) -> Result<Version> {
        let temp = self.registry.get_temp_version().await?;
        let resumable = match &temp {
            Some(temp) => self.is_upgrade_cycle(temp, deployed).await?,
            None => false,
        };
        let version = match (&self.version, &temp) {
            (Some(version), _) => version.clone(),
            (None, Some(temp)) if resumable => {
                info!(version = %temp, "resuming upgrade cycle");
                temp.clone()
            }
            (None, Some(temp)) => {
                warn!(stale = %temp, "TEMP version was not opened by an upgrade cycle");
                self.registry.mint_version().await?
            }
            (None, None) => self.registry.mint_version().await?,
        };
        if &version == deployed {
            return Err(ArmadaError::invalid(format!(
                "upgrade version {version} is already DEPLOYED"
            )));
        }
        if !resumable && temp.as_ref() == Some(&version) {
            return Err(ArmadaError::invalid(format!(
                "TEMP version {version} holds contracts that are not upgrades of \
                 DEPLOYED {deployed}; clear it or pick another version"
            )));
        }
        Ok(version)
    }

    /// Run one upgrade cycle over `targets`.
    pub async fn execute(&self, targets: &[UpgradeTarget]) -> Result<UpgradeReport> {
        self.check_targets(targets)?;
        self.registry.recover_interrupted_transition().await?;
        let deployed = self.registry.get_deployed_version().await?.ok_or_else(|| {
            ArmadaError::not_found("no DEPLOYED version to upgrade from")
        })?;
        let version = self.resolve_version(&deployed).await?;
        let version = self.registry.configure_versioning(Some(&version)).await?;
        info!(from = %deployed, to = %version, targets = targets.len(), "upgrade cycle started");

        let mut report = UpgradeReport {
            version: version.clone(),
            upgraded: Vec::new(),
            already_current: Vec::new(),
            carried_forward: Vec::new(),
        };
        for target in targets {
            match self.upgrade_one(target, &deployed, &version).await {
                Ok(TargetResult::Upgraded) => report.upgraded.push(target.contract.clone()),
                Ok(TargetResult::AlreadyCurrent | TargetResult::AlreadyRecorded) => {
                    report.already_current.push(target.contract.clone());
                }
                Err(err) => {
                    error!(contract = %target.contract, %version, error = %err, "upgrade aborted");
                    return Err(err);
                }
            }
        }

        let upgraded: HashSet<&str> = targets.iter().map(|t| t.contract.as_str()).collect();
        report.carried_forward = self.carry_forward(&deployed, &version, &upgraded).await?;

        self.registry.finalize_deployed_version(Some(&version)).await?;
        info!(
            %version,
            upgraded = report.upgraded.len(),
            already_current = report.already_current.len(),
            carried_forward = report.carried_forward.len(),
            "upgrade cycle complete"
        );
        Ok(report)
    }

    async fn upgrade_one(
        &self,
        target: &UpgradeTarget,
        deployed: &Version,
        version: &Version,
    ) -> Result<TargetResult> {
        if self
            .registry
            .get_contract(&target.contract, Some(version))
            .await?
            .is_some()
        {
            debug!(contract = %target.contract, %version, "already recorded under this version");
            return Ok(TargetResult::AlreadyRecorded);
        }

        let record = self
            .registry
            .get_contract(&target.contract, Some(deployed))
            .await?
            .ok_or_else(|| {
                ArmadaError::not_found(format!(
                    "{} has no record in DEPLOYED version {deployed}",
                    target.contract
                ))
            })?;
        let proxy = DeployedContract::from(&record);
        let before = self.chain.read_storage_layout(&proxy).await?;
        let artifact = self.chain.get_artifact(&target.artifact).await?;

        let current_impl = self.chain.get_proxy_impl_address(&proxy.address).await?;
        let current_code = self.chain.get_bytecode_from_chain(&current_impl).await?;
        let result = if current_code == artifact.deployed_bytecode {
            if record.implementation.as_deref() != Some(current_impl.as_str()) {
                return Err(ArmadaError::consistency(format!(
                    "{} already runs {} through implementation {current_impl}, but DEPLOYED \
                     {deployed} records {}; that upgrade was never verified",
                    target.contract,
                    target.artifact,
                    record.implementation.as_deref().unwrap_or("no implementation"),
                )));
            }
            warn!(
                contract = %target.contract,
                implementation = %current_impl,
                "proxy already runs the target implementation, upgrade call skipped"
            );
            TargetResult::AlreadyCurrent
        } else {
            let upgraded = self
                .chain
                .upgrade_proxy_implementation(&proxy.address, &target.artifact)
                .await?;
            if upgraded.address != proxy.address {
                return Err(ArmadaError::consistency(format!(
                    "upgrade of {} moved the proxy from {} to {}",
                    target.contract, proxy.address, upgraded.address
                )));
            }
            TargetResult::Upgraded
        };

        let after = self.chain.read_storage_layout(&proxy).await?;
        let mismatches = before.diff(&after);
        if let Some(first) = mismatches.first() {
            return Err(ArmadaError::consistency(format!(
                "storage of {} changed during upgrade: {} slot(s) differ, \
                 first #{} `{}` was {} and is {}",
                target.contract,
                mismatches.len(),
                first.index,
                first.label.as_deref().unwrap_or_default(),
                display_slot(first.before.as_ref()),
                display_slot(first.after.as_ref()),
            )));
        }

        let implementation = self.chain.get_proxy_impl_address(&proxy.address).await?;
        let data = ContractData {
            address: proxy.address.clone(),
            abi: artifact.abi_json()?,
            bytecode: artifact.bytecode,
            implementation: Some(implementation),
        };
        self.registry
            .write_contract(&target.contract, data, Some(version))
            .await?;
        info!(
            contract = %target.contract,
            artifact = %target.artifact,
            %version,
            "contract upgraded"
        );
        Ok(result)
    }

    async fn carry_forward(
        &self,
        deployed: &Version,
        version: &Version,
        upgraded: &HashSet<&str>,
    ) -> Result<Vec<String>> {
        let mut carried = Vec::new();
        let mut seen = HashSet::new();
        for record in self.registry.get_contracts(deployed).await? {
            if upgraded.contains(record.name.as_str()) || !seen.insert(record.name.clone()) {
                continue;
            }
            if self
                .registry
                .get_contract(&record.name, Some(version))
                .await?
                .is_some()
            {
                continue;
            }
            self.carry(&record, version).await?;
            carried.push(record.name);
        }
        Ok(carried)
    }

    async fn carry(&self, record: &ContractRecord, version: &Version) -> Result<()> {
        self.registry
            .write_contract(&record.name, record.data(), Some(version))
            .await?;
        debug!(contract = %record.name, %version, "carried forward");
        Ok(())
    }
}

fn display_slot(value: Option<&serde_json::Value>) -> String {
    value.map_or_else(|| "<absent>".to_string(), ToString::to_string)
}
