//! Simulated chain
//!
//! In-memory stand-in for the chain-interaction layer. Accounts hold runtime
//! code, an optional implementation pointer (for proxies), ordered storage
//! slots, and granted roles. Every call is recorded so tests can assert how
//! often deploys and upgrades actually happened.
//!
//! Storage model:
//! - deploying writes one slot per argument (`arg0`, `arg1`, ...) followed by
//!   `initialized = true`
//! - `send_transaction(c, "setFoo", [x])` stores `x` under slot `foo` and
//!   `call(c, "foo", [])` reads it back; `grantRole` records a role and
//!   `hasRole` checks it; any other method stores its arguments under its
//!   own name
//! - upgrades keep the proxy's storage unless a corruption was scheduled
//!
//! The whole state can be written to a JSON file and reopened, so separate
//! CLI runs see the same accounts.

use armada_core::{
    Artifact, ArmadaError, ContractCallEffects, DeployArgs, DeployedContract, DeployerEffects,
    ProxyKind, Result, StorageLayoutEffects, StorageSnapshot,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::Path;

const PROXY_RUNTIME: &str = "0xproxy";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Account {
    code: String,
    implementation: Option<String>,
    storage: Vec<(String, Value)>,
    roles: BTreeSet<(String, String)>,
}

impl Account {
    fn set_slot(&mut self, label: &str, value: Value) {
        match self.storage.iter_mut().find(|(name, _)| name == label) {
            Some((_, slot)) => *slot = value,
            None => self.storage.push((label.to_string(), value)),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct ChainState {
    next_address: u64,
    artifacts: HashMap<String, Artifact>,
    builds: HashMap<String, u32>,
    accounts: HashMap<String, Account>,
    deploys: Vec<String>,
    upgrades: Vec<(String, String)>,
    transactions: Vec<(String, String)>,
    failing_deploys: HashSet<String>,
    corruptions: HashMap<String, (String, Value)>,
}

impl ChainState {
    fn allocate(&mut self) -> String {
        self.next_address += 1;
        format!("0x{:040x}", self.next_address)
    }

    fn artifact(&mut self, name: &str) -> Artifact {
        self.artifacts
            .entry(name.to_string())
            .or_insert_with(|| SimulatedChain::default_artifact(name))
            .clone()
    }

    fn account(&self, address: &str) -> Result<&Account> {
        self.accounts
            .get(address)
            .ok_or_else(|| ArmadaError::chain(format!("no contract at {address}")))
    }

    fn account_mut(&mut self, address: &str) -> Result<&mut Account> {
        self.accounts
            .get_mut(address)
            .ok_or_else(|| ArmadaError::chain(format!("no contract at {address}")))
    }

    fn create(&mut self, name: &str, args: &DeployArgs) -> Result<String> {
        if self.failing_deploys.contains(name) {
            return Err(ArmadaError::chain(format!(
                "deployment of {name} reverted"
            )));
        }
        let artifact = self.artifact(name);
        let address = self.allocate();
        let mut storage: Vec<(String, Value)> = args
            .iter()
            .enumerate()
            .map(|(i, arg)| (format!("arg{i}"), arg.clone()))
            .collect();
        storage.push(("initialized".to_string(), Value::Bool(true)));
        self.accounts.insert(
            address.clone(),
            Account {
                code: artifact.deployed_bytecode,
                implementation: None,
                storage,
                roles: BTreeSet::new(),
            },
        );
        self.deploys.push(name.to_string());
        Ok(address)
    }

    fn create_implementation(&mut self, name: &str) -> String {
        let artifact = self.artifact(name);
        let address = self.allocate();
        self.accounts.insert(
            address.clone(),
            Account {
                code: artifact.deployed_bytecode,
                implementation: None,
                storage: Vec::new(),
                roles: BTreeSet::new(),
            },
        );
        address
    }
}

/// In-memory chain implementing every chain effect trait.
#[derive(Debug, Default)]
pub struct SimulatedChain {
    state: Mutex<ChainState>,
}

impl SimulatedChain {
    /// Empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifact generated for names that were never registered.
    pub fn default_artifact(name: &str) -> Artifact {
        Artifact {
            abi: json!([{ "type": "constructor", "contract": name }]),
            bytecode: format!("0x60806040:{name}"),
            deployed_bytecode: format!("0x6080:{name}"),
        }
    }

    /// Reopen a chain saved with [`save`](Self::save), or start an empty
    /// one when `path` does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let state: ChainState = serde_json::from_str(&fs::read_to_string(path)?)?;
        tracing::debug!(
            path = %path.display(),
            accounts = state.accounts.len(),
            "simulated chain reopened"
        );
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Write the whole chain state to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&*self.state.lock())?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Register an explicit artifact.
    pub fn register_artifact(&self, name: &str, artifact: Artifact) {
        self.state.lock().artifacts.insert(name.to_string(), artifact);
    }

    /// Publish a new build of `name` with fresh creation and runtime code.
    pub fn rebuild_artifact(&self, name: &str) -> Artifact {
        let mut state = self.state.lock();
        let abi = state.artifact(name).abi;
        let build = state.builds.entry(name.to_string()).or_insert(1);
        *build += 1;
        let artifact = Artifact {
            abi,
            bytecode: format!("0x60806040:{name}:build{build}"),
            deployed_bytecode: format!("0x6080:{name}:build{build}"),
        };
        state.artifacts.insert(name.to_string(), artifact.clone());
        artifact
    }

    /// Make every deploy of `name` revert until [`allow_deploy`](Self::allow_deploy).
    pub fn fail_deploy(&self, name: &str) {
        self.state.lock().failing_deploys.insert(name.to_string());
    }

    /// Undo [`fail_deploy`](Self::fail_deploy).
    pub fn allow_deploy(&self, name: &str) {
        self.state.lock().failing_deploys.remove(name);
    }

    /// Overwrite `label` with `value` in the proxy's storage the next time it
    /// is upgraded to `artifact_name`.
    pub fn corrupt_on_upgrade(&self, artifact_name: &str, label: &str, value: Value) {
        self.state
            .lock()
            .corruptions
            .insert(artifact_name.to_string(), (label.to_string(), value));
    }

    /// Successful deploys of `name` (plain contracts and proxies).
    pub fn deploy_count(&self, name: &str) -> usize {
        self.state.lock().deploys.iter().filter(|n| *n == name).count()
    }

    /// Every successful deploy, in order.
    pub fn deploys(&self) -> Vec<String> {
        self.state.lock().deploys.clone()
    }

    /// Upgrade calls as `(proxy address, artifact name)`.
    pub fn upgrades(&self) -> Vec<(String, String)> {
        self.state.lock().upgrades.clone()
    }

    /// Transactions as `(address, method)`.
    pub fn transactions(&self) -> Vec<(String, String)> {
        self.state.lock().transactions.clone()
    }

    /// Whether `account` holds `role` on the contract at `address`.
    pub fn has_role(&self, address: &str, role: &str, account: &str) -> bool {
        self.state
            .lock()
            .accounts
            .get(address)
            .is_some_and(|a| a.roles.contains(&(role.to_string(), account.to_string())))
    }

    /// Write a storage slot directly, as if some other party transacted.
    pub fn set_storage(&self, address: &str, label: &str, value: Value) -> Result<()> {
        self.state.lock().account_mut(address)?.set_slot(label, value);
        Ok(())
    }
}

fn arg_str(args: &DeployArgs, index: usize, method: &str) -> Result<String> {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ArmadaError::chain(format!("{method}: argument {index} must be a string")))
}

/// `setFooBar` -> `fooBar`.
fn setter_slot(method: &str) -> Option<String> {
    let rest = method.strip_prefix("set")?;
    let mut chars = rest.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    Some(first.to_ascii_lowercase().to_string() + chars.as_str())
}

#[async_trait]
impl DeployerEffects for SimulatedChain {
    async fn deploy_contract(&self, name: &str, args: &DeployArgs) -> Result<DeployedContract> {
        let address = self.state.lock().create(name, args)?;
        tracing::debug!(contract = name, %address, "simulated deploy");
        Ok(DeployedContract::new(name, address))
    }

    async fn deploy_proxy(
        &self,
        name: &str,
        args: &DeployArgs,
        kind: ProxyKind,
    ) -> Result<DeployedContract> {
        let mut state = self.state.lock();
        let proxy = state.create(name, args)?;
        let implementation = state.create_implementation(name);
        let account = state.account_mut(&proxy)?;
        account.code = PROXY_RUNTIME.to_string();
        account.implementation = Some(implementation.clone());
        tracing::debug!(contract = name, %proxy, ?kind, "simulated proxy deploy");
        Ok(DeployedContract::new(name, proxy).with_implementation(implementation))
    }

    async fn get_proxy_impl_address(&self, proxy_address: &str) -> Result<String> {
        self.state
            .lock()
            .account(proxy_address)?
            .implementation
            .clone()
            .ok_or_else(|| ArmadaError::chain(format!("{proxy_address} is not a proxy")))
    }

    async fn get_bytecode_from_chain(&self, address: &str) -> Result<String> {
        Ok(self.state.lock().account(address)?.code.clone())
    }

    async fn get_artifact(&self, name: &str) -> Result<Artifact> {
        Ok(self.state.lock().artifact(name))
    }

    async fn upgrade_proxy_implementation(
        &self,
        proxy_address: &str,
        artifact_name: &str,
    ) -> Result<DeployedContract> {
        let mut state = self.state.lock();
        if state.account(proxy_address)?.implementation.is_none() {
            return Err(ArmadaError::chain(format!("{proxy_address} is not a proxy")));
        }
        let implementation = state.create_implementation(artifact_name);
        let corruption = state.corruptions.remove(artifact_name);
        let account = state.account_mut(proxy_address)?;
        account.implementation = Some(implementation.clone());
        if let Some((label, value)) = corruption {
            account.set_slot(&label, value);
        }
        state
            .upgrades
            .push((proxy_address.to_string(), artifact_name.to_string()));
        Ok(DeployedContract::new(artifact_name, proxy_address).with_implementation(implementation))
    }
}

#[async_trait]
impl StorageLayoutEffects for SimulatedChain {
    async fn read_storage_layout(&self, contract: &DeployedContract) -> Result<StorageSnapshot> {
        Ok(self
            .state
            .lock()
            .account(&contract.address)?
            .storage
            .iter()
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ContractCallEffects for SimulatedChain {
    async fn call(
        &self,
        contract: &DeployedContract,
        method: &str,
        args: &DeployArgs,
    ) -> Result<Value> {
        let state = self.state.lock();
        let account = state.account(&contract.address)?;
        if method == "hasRole" {
            let role = arg_str(args, 0, method)?;
            let grantee = arg_str(args, 1, method)?;
            return Ok(Value::Bool(account.roles.contains(&(role, grantee))));
        }
        Ok(account
            .storage
            .iter()
            .find(|(label, _)| label == method)
            .map_or(Value::Null, |(_, value)| value.clone()))
    }

    async fn send_transaction(
        &self,
        contract: &DeployedContract,
        method: &str,
        args: &DeployArgs,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let account = state.account_mut(&contract.address)?;
        if method == "grantRole" {
            let role = arg_str(args, 0, method)?;
            let grantee = arg_str(args, 1, method)?;
            account.roles.insert((role, grantee));
        } else if let Some(slot) = setter_slot(method) {
            let value = match args.as_slice() {
                [single] => single.clone(),
                _ => Value::Array(args.clone()),
            };
            account.set_slot(&slot, value);
        } else {
            account.set_slot(method, Value::Array(args.clone()));
        }
        state
            .transactions
            .push((contract.address.clone(), method.to_string()));
        Ok(())
    }
}
