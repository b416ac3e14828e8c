//! Chain-interaction effect traits
//!
//! # Effect Classification
//!
//! - **Category**: External collaborator
//! - **Implementation**: provided by the embedding application; simulated in
//!   `armada-testkit`
//! - **Usage**: mission deployment, post-deploy hooks, upgrade verification
//!
//! Sending transactions and waiting for confirmations (including any retry of
//! the confirmation wait) happens behind these traits.

use crate::errors::Result;
use crate::records::ContractRecord;
use crate::snapshot::StorageSnapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Constructor or initializer arguments, JSON-encoded.
pub type DeployArgs = Vec<Value>;

/// Proxy pattern used when deploying an upgradeable contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    /// Upgrade logic lives in the implementation
    Uups,
    /// Upgrade logic lives in the proxy admin
    Transparent,
}

/// Compiled contract artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Contract ABI
    pub abi: Value,
    /// Creation bytecode
    pub bytecode: String,
    /// Runtime bytecode as it appears on chain
    pub deployed_bytecode: String,
}

impl Artifact {
    /// ABI serialized the way the registry stores it.
    pub fn abi_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.abi)?)
    }
}

/// Live handle to a deployed contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedContract {
    /// Artifact name the contract was deployed from
    pub name: String,
    /// Address callers use (the proxy address for proxies)
    pub address: String,
    /// Implementation address behind a proxy
    pub implementation: Option<String>,
}

impl DeployedContract {
    /// Handle for a plain (non-proxy) contract.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            implementation: None,
        }
    }

    /// Attach an implementation address.
    pub fn with_implementation(mut self, implementation: impl Into<String>) -> Self {
        self.implementation = Some(implementation.into());
        self
    }
}

impl From<&ContractRecord> for DeployedContract {
    fn from(record: &ContractRecord) -> Self {
        Self {
            name: record.name.clone(),
            address: record.address.clone(),
            implementation: record.implementation.clone(),
        }
    }
}

/// Deploying contracts and reading artifacts.
#[async_trait]
pub trait DeployerEffects: Send + Sync {
    /// Deploy a plain contract and wait for confirmation.
    async fn deploy_contract(&self, name: &str, args: &DeployArgs) -> Result<DeployedContract>;

    /// Deploy an implementation behind a new proxy and wait for confirmation.
    async fn deploy_proxy(
        &self,
        name: &str,
        args: &DeployArgs,
        kind: ProxyKind,
    ) -> Result<DeployedContract>;

    /// Current implementation address of a proxy.
    async fn get_proxy_impl_address(&self, proxy_address: &str) -> Result<String>;

    /// Runtime bytecode stored at an address.
    async fn get_bytecode_from_chain(&self, address: &str) -> Result<String>;

    /// Compiled artifact by contract name.
    async fn get_artifact(&self, name: &str) -> Result<Artifact>;

    /// Point a proxy at a freshly deployed implementation built from
    /// `artifact_name`; the proxy address does not change.
    async fn upgrade_proxy_implementation(
        &self,
        proxy_address: &str,
        artifact_name: &str,
    ) -> Result<DeployedContract>;
}

/// Read-only introspection of contract storage.
#[async_trait]
pub trait StorageLayoutEffects: Send + Sync {
    /// Read every variable declared in the contract's storage layout.
    async fn read_storage_layout(&self, contract: &DeployedContract) -> Result<StorageSnapshot>;
}

/// Calling methods on deployed contracts.
#[async_trait]
pub trait ContractCallEffects: Send + Sync {
    /// Read-only call.
    async fn call(&self, contract: &DeployedContract, method: &str, args: &DeployArgs)
        -> Result<Value>;

    /// State-changing transaction; returns once confirmed.
    async fn send_transaction(
        &self,
        contract: &DeployedContract,
        method: &str,
        args: &DeployArgs,
    ) -> Result<()>;
}
