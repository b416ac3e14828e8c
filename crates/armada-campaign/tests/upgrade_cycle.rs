//! Upgrade cycles over a deployed protocol

use armada_campaign::protocol::{
    names, protocol_missions, upgrade_coordinator, upgrade_targets, ProtocolParams, ProtocolState,
    PROTECTED, UPGRADEABLE,
};
use armada_campaign::{DeployCampaign, UpgradeTarget};
use armada_core::{
    ArmadaError, Artifact, ChainEffects, DeployerEffects, StorageLayoutEffects, Version,
    VersionKind,
};
use armada_registry::{MemoryRegistryStore, VersionRegistry};
use armada_testkit::{registry_with_clock, FixedClock, SimulatedChain};
use serde_json::json;
use std::sync::Arc;

struct Deployed {
    registry: VersionRegistry,
    chain: Arc<SimulatedChain>,
    clock: Arc<FixedClock>,
    state: ProtocolState,
    version: Version,
}

impl Deployed {
    fn dyn_chain(&self) -> Arc<dyn ChainEffects> {
        self.chain.clone()
    }
}

fn params() -> ProtocolParams {
    ProtocolParams {
        governors: vec!["0x00000000000000000000000000000000000000a1".to_string()],
        vault: "0x00000000000000000000000000000000000000f0".to_string(),
        ..ProtocolParams::default()
    }
}

async fn deployed_protocol() -> Deployed {
    let clock = Arc::new(FixedClock::default());
    let registry = registry_with_clock(Arc::new(MemoryRegistryStore::new()), clock.clone());
    let chain = Arc::new(SimulatedChain::new());
    let params = params();

    let mut campaign =
        DeployCampaign::new(registry.clone(), chain.clone(), ProtocolState::new(&params));
    let report = campaign
        .execute(&protocol_missions(&params).unwrap())
        .await
        .unwrap();
    Deployed {
        registry,
        chain,
        clock,
        state: campaign.into_state(),
        version: report.version,
    }
}

/// Recompile `name`: new creation and runtime code under the same name.
fn rebuild(chain: &SimulatedChain, name: &str) -> Artifact {
    let artifact = Artifact {
        abi: json!([{ "type": "function", "name": "version", "contract": name }]),
        bytecode: format!("0x60806040:{name}:v2"),
        deployed_bytecode: format!("0x6080:{name}:v2"),
    };
    chain.register_artifact(name, artifact.clone());
    artifact
}

#[tokio::test]
async fn test_upgrade_all_proxies_and_carry_protected_forward() {
    let deployed = deployed_protocol().await;
    for name in UPGRADEABLE {
        rebuild(&deployed.chain, name);
    }
    deployed.clock.advance(60_000);

    let report = upgrade_coordinator(deployed.registry.clone(), deployed.dyn_chain())
        .execute(&upgrade_targets())
        .await
        .unwrap();

    assert_ne!(report.version, deployed.version);
    assert_eq!(report.upgraded, UPGRADEABLE);
    assert!(report.already_current.is_empty());
    assert_eq!(report.carried_forward, PROTECTED);
    assert_eq!(deployed.chain.upgrades().len(), UPGRADEABLE.len());

    let registry = &deployed.registry;
    assert_eq!(
        registry.get_deployed_version().await.unwrap(),
        Some(report.version.clone())
    );
    let rows = registry.list_versions().await.unwrap();
    let archived: Vec<_> = rows
        .iter()
        .filter(|row| row.kind == VersionKind::Archived)
        .map(|row| row.version.clone())
        .collect();
    assert_eq!(archived, vec![deployed.version.clone()]);
    assert_eq!(registry.get_contracts(&report.version).await.unwrap().len(), 9);

    let old = registry
        .get_contract(names::TREASURY, Some(&deployed.version))
        .await
        .unwrap()
        .unwrap();
    let new = registry
        .get_contract(names::TREASURY, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(new.address, old.address);
    assert_ne!(new.implementation, old.implementation);
    assert_eq!(
        new.implementation.as_deref(),
        Some(
            deployed
                .chain
                .get_proxy_impl_address(&new.address)
                .await
                .unwrap()
                .as_str()
        )
    );
    assert_eq!(new.bytecode, format!("0x60806040:{}:v2", names::TREASURY));

    let access_old = registry
        .get_contract(names::ACCESS_CONTROLLER, Some(&deployed.version))
        .await
        .unwrap()
        .unwrap();
    let access_new = registry
        .get_contract(names::ACCESS_CONTROLLER, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(access_new.data(), access_old.data());
}

#[tokio::test]
async fn test_storage_mismatch_aborts_before_recording() {
    let deployed = deployed_protocol().await;
    rebuild(&deployed.chain, names::REGISTRY);
    rebuild(&deployed.chain, names::TREASURY);
    deployed
        .chain
        .corrupt_on_upgrade(names::TREASURY, "arg3", json!("0xdead"));
    let version = Version::new("upgrade-1");

    let err = upgrade_coordinator(deployed.registry.clone(), deployed.dyn_chain())
        .with_version(Some(version.clone()))
        .execute(&[
            UpgradeTarget::rebuilt(names::REGISTRY),
            UpgradeTarget::rebuilt(names::TREASURY),
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, ArmadaError::Consistency { .. }));
    assert!(err.to_string().contains("arg3"));

    let registry = &deployed.registry;
    assert_eq!(registry.get_temp_version().await.unwrap(), Some(version.clone()));
    assert_eq!(
        registry.get_deployed_version().await.unwrap(),
        Some(deployed.version.clone())
    );
    assert!(registry
        .get_contract(names::REGISTRY, Some(&version))
        .await
        .unwrap()
        .is_some());
    assert!(registry
        .get_contract(names::TREASURY, Some(&version))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_rerun_after_storage_mismatch_still_fails() {
    let deployed = deployed_protocol().await;
    rebuild(&deployed.chain, names::REGISTRY);
    rebuild(&deployed.chain, names::TREASURY);
    deployed
        .chain
        .corrupt_on_upgrade(names::TREASURY, "arg3", json!("0xdead"));
    let targets = [
        UpgradeTarget::rebuilt(names::REGISTRY),
        UpgradeTarget::rebuilt(names::TREASURY),
    ];

    for version in [Some(Version::new("u1")), Some(Version::new("u1")), None] {
        let err = upgrade_coordinator(deployed.registry.clone(), deployed.dyn_chain())
            .with_version(version)
            .execute(&targets)
            .await
            .unwrap_err();
        assert!(matches!(err, ArmadaError::Consistency { .. }), "{err}");
    }

    // The corrupted proxy was upgraded once and never recorded.
    assert_eq!(deployed.chain.upgrades().len(), 2);
    let registry = &deployed.registry;
    assert_eq!(
        registry.get_deployed_version().await.unwrap(),
        Some(deployed.version.clone())
    );
    assert_eq!(registry.get_temp_version().await.unwrap(), Some(Version::new("u1")));
    assert!(registry
        .get_contract(names::TREASURY, Some(&Version::new("u1")))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_failed_campaign_temp_is_not_promoted_by_upgrade() {
    let deployed = deployed_protocol().await;
    let params = params();
    let campaign_version = Version::new("v2");
    deployed.chain.fail_deploy(names::TREASURY);
    let mut campaign = DeployCampaign::new(
        deployed.registry.clone(),
        deployed.chain.clone(),
        ProtocolState::new(&params),
    )
    .with_version(Some(campaign_version.clone()));
    assert!(campaign
        .execute(&protocol_missions(&params).unwrap())
        .await
        .is_err());
    let registry = &deployed.registry;
    assert_eq!(
        registry.get_temp_version().await.unwrap(),
        Some(campaign_version.clone())
    );

    rebuild(&deployed.chain, names::REGISTRY);
    deployed.clock.advance(1_000);
    let targets = [UpgradeTarget::rebuilt(names::REGISTRY)];

    let explicit = upgrade_coordinator(registry.clone(), deployed.dyn_chain())
        .with_version(Some(campaign_version.clone()))
        .execute(&targets)
        .await
        .unwrap_err();
    assert!(matches!(explicit, ArmadaError::Invalid { .. }));
    assert!(deployed.chain.upgrades().is_empty());

    let report = upgrade_coordinator(registry.clone(), deployed.dyn_chain())
        .execute(&targets)
        .await
        .unwrap();
    assert_ne!(report.version, campaign_version);
    assert_eq!(report.upgraded, vec![names::REGISTRY]);
    assert_eq!(deployed.chain.upgrades().len(), 1);

    assert!(registry.get_contracts(&campaign_version).await.unwrap().is_empty());
    assert!(registry
        .list_versions()
        .await
        .unwrap()
        .iter()
        .all(|row| row.version != campaign_version));
    for name in UPGRADEABLE.iter().chain(PROTECTED.iter()) {
        let old = registry
            .get_contract(name, Some(&deployed.version))
            .await
            .unwrap()
            .unwrap();
        let new = registry.get_contract(name, None).await.unwrap().unwrap();
        assert_eq!(new.address, old.address, "{name} moved");
    }
}

#[tokio::test]
async fn test_rerun_over_upgraded_proxies_skips_upgrade_calls() {
    let deployed = deployed_protocol().await;
    rebuild(&deployed.chain, names::REGISTRY);
    rebuild(&deployed.chain, names::CURVE_PRICER);
    let targets = [
        UpgradeTarget::rebuilt(names::REGISTRY),
        UpgradeTarget::rebuilt(names::CURVE_PRICER),
    ];

    let first = upgrade_coordinator(deployed.registry.clone(), deployed.dyn_chain())
        .with_version(Some(Version::new("u1")))
        .execute(&targets)
        .await
        .unwrap();
    assert_eq!(first.upgraded.len(), 2);
    assert_eq!(deployed.chain.upgrades().len(), 2);

    let second = upgrade_coordinator(deployed.registry.clone(), deployed.dyn_chain())
        .with_version(Some(Version::new("u2")))
        .execute(&targets)
        .await
        .unwrap();
    assert!(second.upgraded.is_empty());
    assert_eq!(second.already_current, vec![names::REGISTRY, names::CURVE_PRICER]);
    assert_eq!(deployed.chain.upgrades().len(), 2);

    let registry = &deployed.registry;
    assert_eq!(
        registry.get_deployed_version().await.unwrap(),
        Some(Version::new("u2"))
    );
    let u1 = registry
        .get_contract(names::REGISTRY, Some(&Version::new("u1")))
        .await
        .unwrap()
        .unwrap();
    let u2 = registry
        .get_contract(names::REGISTRY, Some(&Version::new("u2")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(u1.implementation, u2.implementation);
}

#[tokio::test]
async fn test_interrupted_cycle_resumes_its_temp_version() {
    let deployed = deployed_protocol().await;
    rebuild(&deployed.chain, names::REGISTRY);
    rebuild(&deployed.chain, names::TREASURY);
    deployed.clock.advance(1_000);

    let err = upgrade_coordinator(deployed.registry.clone(), deployed.dyn_chain())
        .execute(&[
            UpgradeTarget::rebuilt(names::REGISTRY),
            UpgradeTarget::rebuilt("Unknown"),
        ])
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    let temp = deployed.registry.get_temp_version().await.unwrap().unwrap();

    deployed.clock.advance(1_000);
    let report = upgrade_coordinator(deployed.registry.clone(), deployed.dyn_chain())
        .execute(&[
            UpgradeTarget::rebuilt(names::REGISTRY),
            UpgradeTarget::rebuilt(names::TREASURY),
        ])
        .await
        .unwrap();

    assert_eq!(report.version, temp);
    assert_eq!(report.already_current, vec![names::REGISTRY]);
    assert_eq!(report.upgraded, vec![names::TREASURY]);
    let upgraded: Vec<String> = deployed
        .chain
        .upgrades()
        .into_iter()
        .map(|(_, artifact)| artifact)
        .collect();
    assert_eq!(upgraded, vec![names::REGISTRY, names::TREASURY]);
}

#[tokio::test]
async fn test_upgrade_to_new_artifact_name_preserves_storage() {
    let deployed = deployed_protocol().await;
    let resolver = deployed.state.address_resolver.clone().unwrap();
    let before = deployed.chain.read_storage_layout(&resolver).await.unwrap();

    let report = upgrade_coordinator(deployed.registry.clone(), deployed.dyn_chain())
        .with_version(Some(Version::new("v2")))
        .execute(&[UpgradeTarget::new(names::ADDRESS_RESOLVER, "AddressResolverV2")])
        .await
        .unwrap();

    assert_eq!(report.upgraded, vec![names::ADDRESS_RESOLVER]);
    let after = deployed.chain.read_storage_layout(&resolver).await.unwrap();
    assert!(before.diff(&after).is_empty());
    let record = deployed
        .registry
        .get_contract(names::ADDRESS_RESOLVER, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        record.bytecode,
        SimulatedChain::default_artifact("AddressResolverV2").bytecode
    );
}

#[tokio::test]
async fn test_protected_contract_is_rejected_before_any_call() {
    let deployed = deployed_protocol().await;
    let versions_before = deployed.registry.list_versions().await.unwrap();

    let err = upgrade_coordinator(deployed.registry.clone(), deployed.dyn_chain())
        .execute(&[
            UpgradeTarget::rebuilt(names::REGISTRY),
            UpgradeTarget::rebuilt(names::ACCESS_CONTROLLER),
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, ArmadaError::Invalid { .. }));
    assert!(deployed.chain.upgrades().is_empty());
    assert_eq!(deployed.registry.list_versions().await.unwrap(), versions_before);
}

#[tokio::test]
async fn test_upgrade_version_must_differ_from_deployed() {
    let deployed = deployed_protocol().await;
    rebuild(&deployed.chain, names::REGISTRY);

    let explicit = upgrade_coordinator(deployed.registry.clone(), deployed.dyn_chain())
        .with_version(Some(deployed.version.clone()))
        .execute(&[UpgradeTarget::rebuilt(names::REGISTRY)])
        .await
        .unwrap_err();
    assert!(matches!(explicit, ArmadaError::Invalid { .. }));

    // The clock has not moved since the campaign minted its version.
    let minted = upgrade_coordinator(deployed.registry.clone(), deployed.dyn_chain())
        .execute(&[UpgradeTarget::rebuilt(names::REGISTRY)])
        .await
        .unwrap_err();
    assert!(matches!(minted, ArmadaError::Invalid { .. }));
    assert!(deployed.chain.upgrades().is_empty());
}

#[tokio::test]
async fn test_upgrade_without_deployed_version_is_not_found() {
    let clock = Arc::new(FixedClock::default());
    let registry = registry_with_clock(Arc::new(MemoryRegistryStore::new()), clock);
    let chain: Arc<dyn ChainEffects> = Arc::new(SimulatedChain::new());

    let err = upgrade_coordinator(registry, chain)
        .execute(&upgrade_targets())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
