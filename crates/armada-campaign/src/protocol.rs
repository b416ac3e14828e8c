//! Naming protocol mission set
//!
//! Nine contracts deployed in dependency order. Everything except the access
//! controller and the payment token sits behind a UUPS proxy and can be
//! upgraded later; those two are protected.

use crate::mission::{DeployPredicate, Mission, MissionContext, PostDeployHook};
use crate::state::require;
use crate::upgrade::{UpgradeCoordinator, UpgradeTarget};
use armada_core::{
    ArmadaError, ChainEffects, ContractRecord, DeployedContract, ProxyKind, Result,
};
use armada_registry::VersionRegistry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Contract names, also the registry keys.
pub mod names {
    /// Role registry
    pub const ACCESS_CONTROLLER: &str = "AccessController";
    /// Token registration fees are paid in
    pub const PAYMENT_TOKEN: &str = "PaymentToken";
    /// Domain records
    pub const REGISTRY: &str = "Registry";
    /// Domain ownership NFT
    pub const DOMAIN_TOKEN: &str = "DomainToken";
    /// Domain to address resolution
    pub const ADDRESS_RESOLVER: &str = "AddressResolver";
    /// Length-based price curve
    pub const CURVE_PRICER: &str = "CurvePricer";
    /// Registration fee custody
    pub const TREASURY: &str = "Treasury";
    /// Top-level domain registration
    pub const ROOT_REGISTRAR: &str = "RootRegistrar";
    /// Subdomain registration
    pub const SUB_REGISTRAR: &str = "SubRegistrar";
}

/// Contracts whose logic must never change.
pub const PROTECTED: [&str; 2] = [names::ACCESS_CONTROLLER, names::PAYMENT_TOKEN];

/// Proxied contracts, in deployment order.
pub const UPGRADEABLE: [&str; 7] = [
    names::REGISTRY,
    names::DOMAIN_TOKEN,
    names::ADDRESS_RESOLVER,
    names::CURVE_PRICER,
    names::TREASURY,
    names::ROOT_REGISTRAR,
    names::SUB_REGISTRAR,
];

/// Role registrars need on the access controller.
pub const REGISTRAR_ROLE: &str = "REGISTRAR_ROLE";

/// Price curve settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveParams {
    /// Price of the shortest names
    pub max_price: u64,
    /// Price floor for long names
    pub min_price: u64,
    /// Names up to this length cost `max_price`
    pub base_length: u32,
    /// Longest allowed name
    pub max_length: u32,
    /// Registration fee in basis points
    pub fee_bps: u32,
}

impl Default for CurveParams {
    fn default() -> Self {
        Self {
            max_price: 25_000,
            min_price: 2_000,
            base_length: 4,
            max_length: 50,
            fee_bps: 500,
        }
    }
}

/// Deployment parameters of the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParams {
    /// Accounts granted the governor role
    pub governors: Vec<String>,
    /// Accounts granted the admin role
    pub admins: Vec<String>,
    /// Receives fees and royalties
    pub vault: String,
    /// Domain token name
    pub domain_token_name: String,
    /// Domain token symbol
    pub domain_token_symbol: String,
    /// Royalty in basis points
    pub royalty_bps: u32,
    /// Price curve
    pub curve: CurveParams,
    /// Existing payment token; when set, no payment token is deployed
    pub payment_token: Option<String>,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            governors: Vec::new(),
            admins: Vec::new(),
            vault: String::new(),
            domain_token_name: "Armada Name".to_string(),
            domain_token_symbol: "ANS".to_string(),
            royalty_bps: 200,
            curve: CurveParams::default(),
            payment_token: None,
        }
    }
}

impl ProtocolParams {
    /// Reject parameters no deployment could work with.
    pub fn validate(&self) -> Result<()> {
        if self.governors.is_empty() {
            return Err(ArmadaError::invalid("at least one governor is required"));
        }
        if self.vault.is_empty() {
            return Err(ArmadaError::invalid("vault address is required"));
        }
        if self.curve.min_price > self.curve.max_price {
            return Err(ArmadaError::invalid("curve min price exceeds max price"));
        }
        if self.curve.base_length > self.curve.max_length {
            return Err(ArmadaError::invalid("curve base length exceeds max length"));
        }
        Ok(())
    }
}

/// Every protocol instance a campaign produces.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolState {
    pub access_controller: Option<DeployedContract>,
    pub payment_token: Option<DeployedContract>,
    pub registry: Option<DeployedContract>,
    pub domain_token: Option<DeployedContract>,
    pub address_resolver: Option<DeployedContract>,
    pub curve_pricer: Option<DeployedContract>,
    pub treasury: Option<DeployedContract>,
    pub root_registrar: Option<DeployedContract>,
    pub sub_registrar: Option<DeployedContract>,
}

impl ProtocolState {
    /// Initial state; an external payment token is present from the start.
    pub fn new(params: &ProtocolParams) -> Self {
        Self {
            payment_token: params
                .payment_token
                .as_ref()
                .map(|address| DeployedContract::new(names::PAYMENT_TOKEN, address.clone())),
            ..Self::default()
        }
    }
}

fn address(slot: &Option<DeployedContract>, instance: &str) -> Result<Value> {
    Ok(json!(require(slot, instance)?.address))
}

/// Deploys the payment token only when no external one is configured.
struct PaymentTokenPredicate;

#[async_trait]
impl DeployPredicate<ProtocolState> for PaymentTokenPredicate {
    async fn needs_deploy(
        &self,
        _ctx: &MissionContext<'_>,
        state: &ProtocolState,
        existing: Option<&ContractRecord>,
    ) -> Result<bool> {
        Ok(existing.is_none() && state.payment_token.is_none())
    }
}

/// Grants [`REGISTRAR_ROLE`] to the mission's contract.
struct GrantRegistrarRole;

#[async_trait]
impl PostDeployHook<ProtocolState> for GrantRegistrarRole {
    async fn needs_post_deploy(
        &self,
        ctx: &MissionContext<'_>,
        state: &ProtocolState,
        contract: &DeployedContract,
    ) -> Result<bool> {
        let access = require(&state.access_controller, names::ACCESS_CONTROLLER)?;
        let granted = ctx
            .chain
            .call(access, "hasRole", &vec![json!(REGISTRAR_ROLE), json!(contract.address)])
            .await?;
        Ok(granted != Value::Bool(true))
    }

    async fn post_deploy(
        &self,
        ctx: &MissionContext<'_>,
        state: &ProtocolState,
        contract: &DeployedContract,
    ) -> Result<()> {
        let access = require(&state.access_controller, names::ACCESS_CONTROLLER)?;
        ctx.chain
            .send_transaction(
                access,
                "grantRole",
                &vec![json!(REGISTRAR_ROLE), json!(contract.address)],
            )
            .await
    }
}

/// Points the registry at the address resolver.
struct SetAddressResolver;

#[async_trait]
impl PostDeployHook<ProtocolState> for SetAddressResolver {
    async fn needs_post_deploy(
        &self,
        ctx: &MissionContext<'_>,
        state: &ProtocolState,
        contract: &DeployedContract,
    ) -> Result<bool> {
        let registry = require(&state.registry, names::REGISTRY)?;
        let current = ctx.chain.call(registry, "addressResolver", &vec![]).await?;
        Ok(current != json!(contract.address))
    }

    async fn post_deploy(
        &self,
        ctx: &MissionContext<'_>,
        state: &ProtocolState,
        contract: &DeployedContract,
    ) -> Result<()> {
        let registry = require(&state.registry, names::REGISTRY)?;
        ctx.chain
            .send_transaction(registry, "setAddressResolver", &vec![json!(contract.address)])
            .await
    }
}

/// Missions deploying the whole protocol, in dependency order.
pub fn protocol_missions(params: &ProtocolParams) -> Result<Vec<Mission<ProtocolState>>> {
    params.validate()?;
    let roles = params.clone();
    let token = params.clone();
    let curve = params.curve.clone();
    let vault = params.vault.clone();

    Ok(vec![
        Mission::new(names::ACCESS_CONTROLLER, |s: &mut ProtocolState| {
            &mut s.access_controller
        })
        .args(move |_| Ok(vec![json!(roles.governors), json!(roles.admins)])),
        Mission::new(names::PAYMENT_TOKEN, |s: &mut ProtocolState| &mut s.payment_token)
            .args(|_| Ok(vec![json!("Armada Payment Token"), json!("APT")]))
            .needs_deploy_when(PaymentTokenPredicate),
        Mission::new(names::REGISTRY, |s: &mut ProtocolState| &mut s.registry)
            .proxy(ProxyKind::Uups)
            .args(|s: &ProtocolState| {
                Ok(vec![address(&s.access_controller, names::ACCESS_CONTROLLER)?])
            }),
        Mission::new(names::DOMAIN_TOKEN, |s: &mut ProtocolState| &mut s.domain_token)
            .proxy(ProxyKind::Uups)
            .args(move |s: &ProtocolState| {
                Ok(vec![
                    address(&s.access_controller, names::ACCESS_CONTROLLER)?,
                    json!(token.domain_token_name),
                    json!(token.domain_token_symbol),
                    json!(token.vault),
                    json!(token.royalty_bps),
                    address(&s.registry, names::REGISTRY)?,
                ])
            }),
        Mission::new(names::ADDRESS_RESOLVER, |s: &mut ProtocolState| {
            &mut s.address_resolver
        })
        .proxy(ProxyKind::Uups)
        .args(|s: &ProtocolState| {
            Ok(vec![
                address(&s.access_controller, names::ACCESS_CONTROLLER)?,
                address(&s.registry, names::REGISTRY)?,
            ])
        })
        .post_deploy(SetAddressResolver),
        Mission::new(names::CURVE_PRICER, |s: &mut ProtocolState| &mut s.curve_pricer)
            .proxy(ProxyKind::Uups)
            .args(move |s: &ProtocolState| {
                Ok(vec![
                    address(&s.access_controller, names::ACCESS_CONTROLLER)?,
                    address(&s.registry, names::REGISTRY)?,
                    serde_json::to_value(&curve)?,
                ])
            }),
        Mission::new(names::TREASURY, |s: &mut ProtocolState| &mut s.treasury)
            .proxy(ProxyKind::Uups)
            .args(move |s: &ProtocolState| {
                Ok(vec![
                    address(&s.access_controller, names::ACCESS_CONTROLLER)?,
                    address(&s.registry, names::REGISTRY)?,
                    address(&s.payment_token, names::PAYMENT_TOKEN)?,
                    json!(vault),
                ])
            }),
        Mission::new(names::ROOT_REGISTRAR, |s: &mut ProtocolState| {
            &mut s.root_registrar
        })
        .proxy(ProxyKind::Uups)
        .args(|s: &ProtocolState| {
            Ok(vec![
                address(&s.access_controller, names::ACCESS_CONTROLLER)?,
                address(&s.registry, names::REGISTRY)?,
                address(&s.curve_pricer, names::CURVE_PRICER)?,
                address(&s.treasury, names::TREASURY)?,
                address(&s.domain_token, names::DOMAIN_TOKEN)?,
            ])
        })
        .post_deploy(GrantRegistrarRole),
        Mission::new(names::SUB_REGISTRAR, |s: &mut ProtocolState| &mut s.sub_registrar)
            .proxy(ProxyKind::Uups)
            .args(|s: &ProtocolState| {
                Ok(vec![
                    address(&s.access_controller, names::ACCESS_CONTROLLER)?,
                    address(&s.registry, names::REGISTRY)?,
                    address(&s.root_registrar, names::ROOT_REGISTRAR)?,
                ])
            })
            .post_deploy(GrantRegistrarRole),
    ])
}

/// Every upgradeable contract rebuilt from its own artifact.
pub fn upgrade_targets() -> Vec<UpgradeTarget> {
    UPGRADEABLE.iter().map(|name| UpgradeTarget::rebuilt(*name)).collect()
}

/// Coordinator refusing to touch [`PROTECTED`] contracts.
pub fn upgrade_coordinator(
    registry: VersionRegistry,
    chain: Arc<dyn ChainEffects>,
) -> UpgradeCoordinator {
    UpgradeCoordinator::new(registry, chain).with_protected(PROTECTED)
}
