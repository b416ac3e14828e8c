//! Missions
//!
//! A mission deploys one contract. It is described by data (contract name,
//! state slot, proxy kind, argument builder) plus optional hooks, and every
//! mission runs through the same [`Mission::execute`]:
//!
//! 1. decide whether a deploy is needed (default: no registry record of the
//!    contract under the run's version)
//! 2. if needed: pre-deploy hook, deploy, record, fill the state slot;
//!    otherwise fill the state slot from the existing record
//! 3. if the post-deploy hook says so, run it against the live contract
//!
//! Step 1 makes re-running a failed campaign skip everything that already
//! completed.

use crate::state::InstanceSlot;
use armada_core::{
    ChainEffects, ContractData, ContractRecord, DeployArgs, DeployedContract, ProxyKind, Result,
    Version,
};
use armada_registry::VersionRegistry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Collaborators and version shared by every mission of a run.
pub struct MissionContext<'a> {
    /// Versioned contract registry
    pub registry: &'a VersionRegistry,
    /// Chain-interaction layer
    pub chain: &'a dyn ChainEffects,
    /// Version every registry read and write of the run uses
    pub version: &'a Version,
}

/// Replaces the default "no record under this version" deploy decision.
#[async_trait]
pub trait DeployPredicate<S: Send + Sync>: Send + Sync {
    /// Whether the contract must be deployed. `existing` is the registry
    /// record under the run's version, if any.
    async fn needs_deploy(
        &self,
        ctx: &MissionContext<'_>,
        state: &S,
        existing: Option<&ContractRecord>,
    ) -> Result<bool>;
}

/// Runs right before a deploy.
#[async_trait]
pub trait PreDeployHook<S: Send + Sync>: Send + Sync {
    /// Prepare the deploy.
    async fn pre_deploy(&self, ctx: &MissionContext<'_>, state: &S) -> Result<()>;
}

/// Runs after the deploy decision, whether or not a deploy happened.
#[async_trait]
pub trait PostDeployHook<S: Send + Sync>: Send + Sync {
    /// Whether the hook still has work to do. Defaults to always.
    async fn needs_post_deploy(
        &self,
        _ctx: &MissionContext<'_>,
        _state: &S,
        _contract: &DeployedContract,
    ) -> Result<bool> {
        Ok(true)
    }

    /// One-time calls against the deployed contract, typically role grants.
    async fn post_deploy(
        &self,
        ctx: &MissionContext<'_>,
        state: &S,
        contract: &DeployedContract,
    ) -> Result<()>;
}

type ArgsBuilder<S> = Box<dyn Fn(&S) -> Result<DeployArgs> + Send + Sync>;

/// What one mission did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionOutcome {
    /// Contract name
    pub contract: String,
    /// Whether a deploy happened
    pub deployed: bool,
    /// Whether the post-deploy hook ran
    pub post_deployed: bool,
}

/// Descriptor for deploying one contract.
pub struct Mission<S: Send + Sync> {
    contract: String,
    slot: InstanceSlot<S>,
    proxy: Option<ProxyKind>,
    args: ArgsBuilder<S>,
    needs_deploy: Option<Box<dyn DeployPredicate<S>>>,
    pre_deploy: Option<Box<dyn PreDeployHook<S>>>,
    post_deploy: Option<Box<dyn PostDeployHook<S>>>,
}

impl<S: Send + Sync> std::fmt::Debug for Mission<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mission")
            .field("contract", &self.contract)
            .field("proxy", &self.proxy)
            .field("custom_needs_deploy", &self.needs_deploy.is_some())
            .field("pre_deploy", &self.pre_deploy.is_some())
            .field("post_deploy", &self.post_deploy.is_some())
            .finish()
    }
}

impl<S: Send + Sync> Mission<S> {
    /// Plain contract `contract` without constructor arguments, stored in
    /// `slot`.
    pub fn new(contract: impl Into<String>, slot: InstanceSlot<S>) -> Self {
        Self {
            contract: contract.into(),
            slot,
            proxy: None,
            args: Box::new(|_: &S| Ok(Vec::new())),
            needs_deploy: None,
            pre_deploy: None,
            post_deploy: None,
        }
    }

    /// Deploy behind a proxy of `kind`.
    pub fn proxy(mut self, kind: ProxyKind) -> Self {
        self.proxy = Some(kind);
        self
    }

    /// Build deploy arguments from the state at deploy time.
    pub fn args(
        mut self,
        build: impl Fn(&S) -> Result<DeployArgs> + Send + Sync + 'static,
    ) -> Self {
        self.args = Box::new(build);
        self
    }

    /// Replace the default deploy decision.
    pub fn needs_deploy_when(mut self, predicate: impl DeployPredicate<S> + 'static) -> Self {
        self.needs_deploy = Some(Box::new(predicate));
        self
    }

    /// Run `hook` before deploying.
    pub fn pre_deploy(mut self, hook: impl PreDeployHook<S> + 'static) -> Self {
        self.pre_deploy = Some(Box::new(hook));
        self
    }

    /// Run `hook` after the deploy decision.
    pub fn post_deploy(mut self, hook: impl PostDeployHook<S> + 'static) -> Self {
        self.post_deploy = Some(Box::new(hook));
        self
    }

    /// Contract name, also the registry key.
    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Proxy kind, if the contract is deployed behind a proxy.
    pub fn proxy_kind(&self) -> Option<ProxyKind> {
        self.proxy
    }

    async fn existing_record(&self, ctx: &MissionContext<'_>) -> Result<Option<ContractRecord>> {
        ctx.registry
            .get_contract(&self.contract, Some(ctx.version))
            .await
    }

    async fn decide(
        &self,
        ctx: &MissionContext<'_>,
        state: &S,
        existing: Option<&ContractRecord>,
    ) -> Result<bool> {
        match &self.needs_deploy {
            Some(predicate) => predicate.needs_deploy(ctx, state, existing).await,
            None => Ok(existing.is_none()),
        }
    }

    /// Whether executing the mission now would deploy.
    pub async fn needs_deploy(&self, ctx: &MissionContext<'_>, state: &S) -> Result<bool> {
        let existing = self.existing_record(ctx).await?;
        self.decide(ctx, state, existing.as_ref()).await
    }

    /// Deploy unconditionally, record the contract, and fill the state slot.
    pub async fn deploy(
        &self,
        ctx: &MissionContext<'_>,
        state: &mut S,
    ) -> Result<DeployedContract> {
        let args = (self.args)(state)?;
        info!(
            contract = %self.contract,
            version = %ctx.version,
            proxy = ?self.proxy,
            "deploying contract"
        );

        let deployed = match self.proxy {
            Some(kind) => ctx.chain.deploy_proxy(&self.contract, &args, kind).await?,
            None => ctx.chain.deploy_contract(&self.contract, &args).await?,
        };
        let implementation = match self.proxy {
            Some(_) => Some(ctx.chain.get_proxy_impl_address(&deployed.address).await?),
            None => None,
        };
        let artifact = ctx.chain.get_artifact(&self.contract).await?;

        let data = ContractData {
            address: deployed.address.clone(),
            abi: artifact.abi_json()?,
            bytecode: artifact.bytecode,
            implementation: implementation.clone(),
        };
        let record = ctx
            .registry
            .write_contract(&self.contract, data, Some(ctx.version))
            .await?;
        info!(contract = %self.contract, address = %record.address, "contract deployed");

        let handle = DeployedContract {
            name: self.contract.clone(),
            address: deployed.address,
            implementation,
        };
        *(self.slot)(state) = Some(handle.clone());
        Ok(handle)
    }

    /// Deploy if needed, then run the post-deploy hook if needed.
    pub async fn execute(&self, ctx: &MissionContext<'_>, state: &mut S) -> Result<MissionOutcome> {
        let existing = self.existing_record(ctx).await?;
        let deployed = if self.decide(ctx, state, existing.as_ref()).await? {
            if let Some(hook) = &self.pre_deploy {
                hook.pre_deploy(ctx, state).await?;
            }
            self.deploy(ctx, state).await?;
            true
        } else {
            warn!(contract = %self.contract, version = %ctx.version, "already deployed, skipping");
            if let Some(record) = &existing {
                let mut handle = DeployedContract::from(record);
                handle.name = self.contract.clone();
                *(self.slot)(state) = Some(handle);
            }
            false
        };

        let post_deployed = match &self.post_deploy {
            Some(hook) => self.run_post_deploy(hook.as_ref(), ctx, state).await?,
            None => false,
        };

        Ok(MissionOutcome {
            contract: self.contract.clone(),
            deployed,
            post_deployed,
        })
    }

    async fn run_post_deploy(
        &self,
        hook: &dyn PostDeployHook<S>,
        ctx: &MissionContext<'_>,
        state: &mut S,
    ) -> Result<bool> {
        let Some(contract) = (self.slot)(state).clone() else {
            debug!(contract = %self.contract, "no handle in state, post-deploy skipped");
            return Ok(false);
        };
        if !hook.needs_post_deploy(ctx, state, &contract).await? {
            debug!(contract = %self.contract, "post-deploy already done");
            return Ok(false);
        }
        hook.post_deploy(ctx, state, &contract).await?;
        info!(contract = %self.contract, "post-deploy complete");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_core::ArmadaError;
    use armada_testkit::{memory_registry, SimulatedChain};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct State {
        token: Option<DeployedContract>,
        vault: Option<DeployedContract>,
    }

    struct CountingHook(Arc<AtomicUsize>);

    #[async_trait]
    impl PostDeployHook<State> for CountingHook {
        async fn post_deploy(
            &self,
            _ctx: &MissionContext<'_>,
            _state: &State,
            _contract: &DeployedContract,
        ) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Never;

    #[async_trait]
    impl DeployPredicate<State> for Never {
        async fn needs_deploy(
            &self,
            _ctx: &MissionContext<'_>,
            _state: &State,
            _existing: Option<&ContractRecord>,
        ) -> Result<bool> {
            Ok(false)
        }
    }

    fn vault_mission() -> Mission<State> {
        Mission::new("Vault", |s: &mut State| &mut s.vault)
            .proxy(ProxyKind::Uups)
            .args(|s: &State| {
                let token = crate::state::require(&s.token, "Token")?;
                Ok(vec![json!(token.address)])
            })
    }

    #[tokio::test]
    async fn test_execute_twice_deploys_once() {
        let (registry, _store) = memory_registry();
        let chain = SimulatedChain::new();
        let version = registry.configure_versioning(None).await.unwrap();
        let ctx = MissionContext {
            registry: &registry,
            chain: &chain,
            version: &version,
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let mission = Mission::new("Token", |s: &mut State| &mut s.token)
            .post_deploy(CountingHook(calls.clone()));

        let mut state = State::default();
        let first = mission.execute(&ctx, &mut state).await.unwrap();
        let mut fresh = State::default();
        let second = mission.execute(&ctx, &mut fresh).await.unwrap();

        assert!(first.deployed);
        assert!(!second.deployed);
        assert_eq!(chain.deploy_count("Token"), 1);
        assert_eq!(fresh.token, state.token);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_proxy_record_carries_implementation() {
        let (registry, _store) = memory_registry();
        let chain = SimulatedChain::new();
        let version = registry.configure_versioning(None).await.unwrap();
        let ctx = MissionContext {
            registry: &registry,
            chain: &chain,
            version: &version,
        };
        let mut state = State {
            token: Some(DeployedContract::new("Token", "0xtoken")),
            vault: None,
        };

        let vault = vault_mission().deploy(&ctx, &mut state).await.unwrap();
        let record = registry
            .get_contract("Vault", Some(&version))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(record.address, vault.address);
        assert!(record.implementation.is_some());
        assert_eq!(record.implementation, vault.implementation);
        assert_eq!(
            record.bytecode,
            SimulatedChain::default_artifact("Vault").bytecode
        );
        assert_eq!(state.vault, Some(vault));
    }

    #[tokio::test]
    async fn test_missing_dependency_fails_before_chain_call() {
        let (registry, _store) = memory_registry();
        let chain = SimulatedChain::new();
        let version = registry.configure_versioning(None).await.unwrap();
        let ctx = MissionContext {
            registry: &registry,
            chain: &chain,
            version: &version,
        };

        let err = vault_mission()
            .execute(&ctx, &mut State::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ArmadaError::NotFound { .. }));
        assert!(chain.deploys().is_empty());
    }

    #[tokio::test]
    async fn test_custom_predicate_skips_without_record() {
        let (registry, _store) = memory_registry();
        let chain = SimulatedChain::new();
        let version = registry.configure_versioning(None).await.unwrap();
        let ctx = MissionContext {
            registry: &registry,
            chain: &chain,
            version: &version,
        };
        let mission = Mission::new("Token", |s: &mut State| &mut s.token).needs_deploy_when(Never);

        let mut state = State::default();
        assert!(!mission.needs_deploy(&ctx, &state).await.unwrap());
        let outcome = mission.execute(&ctx, &mut state).await.unwrap();

        assert!(!outcome.deployed);
        assert_eq!(state.token, None);
        assert_eq!(chain.deploy_count("Token"), 0);
    }
}
