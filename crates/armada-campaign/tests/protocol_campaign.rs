//! Protocol deployment campaigns over the simulated chain

use armada_campaign::protocol::{
    names, protocol_missions, ProtocolParams, ProtocolState, REGISTRAR_ROLE,
};
use armada_campaign::DeployCampaign;
use armada_core::{ArmadaError, ChainEffects, ContractCallEffects, StorageLayoutEffects, Version};
use armada_testkit::{memory_registry, time::TEST_TIMESTAMP_MS, SimulatedChain};
use serde_json::json;
use std::sync::Arc;

const GOVERNOR: &str = "0x00000000000000000000000000000000000000a1";
const VAULT: &str = "0x00000000000000000000000000000000000000f0";

fn params() -> ProtocolParams {
    ProtocolParams {
        governors: vec![GOVERNOR.to_string()],
        admins: vec![GOVERNOR.to_string()],
        vault: VAULT.to_string(),
        ..ProtocolParams::default()
    }
}

fn all_contracts() -> Vec<&'static str> {
    vec![
        names::ACCESS_CONTROLLER,
        names::PAYMENT_TOKEN,
        names::REGISTRY,
        names::DOMAIN_TOKEN,
        names::ADDRESS_RESOLVER,
        names::CURVE_PRICER,
        names::TREASURY,
        names::ROOT_REGISTRAR,
        names::SUB_REGISTRAR,
    ]
}

#[tokio::test]
async fn test_full_deploy_then_rerun_deploys_each_contract_once() {
    let (registry, _store) = memory_registry();
    let chain = Arc::new(SimulatedChain::new());
    let dyn_chain: Arc<dyn ChainEffects> = chain.clone();
    let missions = protocol_missions(&params()).unwrap();

    let mut first = DeployCampaign::new(
        registry.clone(),
        dyn_chain.clone(),
        ProtocolState::new(&params()),
    );
    let report = first.execute(&missions).await.unwrap();
    let expected = Version::from_timestamp_ms(TEST_TIMESTAMP_MS);
    assert_eq!(report.version, expected);
    assert_eq!(report.deployed().collect::<Vec<_>>(), all_contracts());
    assert_eq!(
        registry.get_deployed_version().await.unwrap(),
        Some(expected.clone())
    );
    assert_eq!(registry.get_temp_version().await.unwrap(), None);
    assert_eq!(registry.get_contracts(&expected).await.unwrap().len(), 9);

    let state = first.into_state();
    let access = state.access_controller.clone().unwrap();
    for registrar in [&state.root_registrar, &state.sub_registrar] {
        let registrar = registrar.as_ref().unwrap();
        assert!(chain.has_role(&access.address, REGISTRAR_ROLE, &registrar.address));
    }
    let resolver = chain
        .call(state.registry.as_ref().unwrap(), "addressResolver", &vec![])
        .await
        .unwrap();
    assert_eq!(resolver, json!(state.address_resolver.as_ref().unwrap().address));

    let mut second =
        DeployCampaign::new(registry.clone(), dyn_chain, ProtocolState::new(&params()));
    let rerun = second.execute(&missions).await.unwrap();
    assert_eq!(rerun.version, expected);
    assert_eq!(rerun.deployed().count(), 0);
    assert!(rerun.outcomes.iter().all(|o| !o.post_deployed));
    for name in all_contracts() {
        assert_eq!(chain.deploy_count(name), 1, "{name} deployed more than once");
    }
    assert_eq!(second.state(), &state);
    assert_eq!(registry.list_versions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_campaign_resumes_at_failed_mission() {
    let (registry, _store) = memory_registry();
    let chain = Arc::new(SimulatedChain::new());
    let dyn_chain: Arc<dyn ChainEffects> = chain.clone();
    let missions = protocol_missions(&params()).unwrap();

    chain.fail_deploy(names::TREASURY);
    let mut first = DeployCampaign::new(
        registry.clone(),
        dyn_chain.clone(),
        ProtocolState::new(&params()),
    );
    let err = first.execute(&missions).await.unwrap_err();
    assert!(matches!(err, ArmadaError::Chain { .. }));

    let temp = registry.get_temp_version().await.unwrap().unwrap();
    assert_eq!(registry.get_deployed_version().await.unwrap(), None);
    assert!(registry
        .get_contract(names::CURVE_PRICER, Some(&temp))
        .await
        .unwrap()
        .is_some());
    assert!(registry
        .get_contract(names::TREASURY, Some(&temp))
        .await
        .unwrap()
        .is_none());

    chain.allow_deploy(names::TREASURY);
    let mut second =
        DeployCampaign::new(registry.clone(), dyn_chain, ProtocolState::new(&params()));
    let report = second.execute(&missions).await.unwrap();

    assert_eq!(report.version, temp);
    assert_eq!(
        report.deployed().collect::<Vec<_>>(),
        vec![names::TREASURY, names::ROOT_REGISTRAR, names::SUB_REGISTRAR]
    );
    for name in all_contracts() {
        assert_eq!(chain.deploy_count(name), 1, "{name} deployed more than once");
    }
    assert_eq!(registry.get_deployed_version().await.unwrap(), Some(temp));

    // The resumed run read earlier instances back from the registry.
    let state = second.into_state();
    let treasury = chain
        .read_storage_layout(state.treasury.as_ref().unwrap())
        .await
        .unwrap();
    assert_eq!(
        treasury.get("arg0"),
        Some(&json!(state.access_controller.unwrap().address))
    );
}

#[tokio::test]
async fn test_external_payment_token_is_not_deployed() {
    let (registry, _store) = memory_registry();
    let chain = Arc::new(SimulatedChain::new());
    let mut params = params();
    params.payment_token = Some("0x00000000000000000000000000000000000000cc".to_string());
    let missions = protocol_missions(&params).unwrap();

    let mut campaign =
        DeployCampaign::new(registry.clone(), chain.clone(), ProtocolState::new(&params));
    let report = campaign.execute(&missions).await.unwrap();

    assert_eq!(chain.deploy_count(names::PAYMENT_TOKEN), 0);
    assert!(!report.deployed().any(|name| name == names::PAYMENT_TOKEN));
    let treasury = chain
        .read_storage_layout(campaign.state().treasury.as_ref().unwrap())
        .await
        .unwrap();
    assert_eq!(
        treasury.get("arg2"),
        Some(&json!("0x00000000000000000000000000000000000000cc"))
    );
}

#[tokio::test]
async fn test_explicit_version_is_deployed() {
    let (registry, _store) = memory_registry();
    let chain = Arc::new(SimulatedChain::new());
    let missions = protocol_missions(&params()).unwrap();

    let mut campaign = DeployCampaign::new(registry.clone(), chain, ProtocolState::new(&params()))
        .with_version(Some(Version::new("2024.1")));
    let report = campaign.execute(&missions).await.unwrap();

    assert_eq!(report.version, Version::new("2024.1"));
    assert_eq!(
        registry.get_deployed_version().await.unwrap(),
        Some(Version::new("2024.1"))
    );
    let record = registry
        .get_contract(names::REGISTRY, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.version, Version::new("2024.1"));
    assert!(record.implementation.is_some());
}
