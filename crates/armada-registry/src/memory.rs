//! In-memory registry store
//!
//! Backs dry runs and tests. Version writes passed in one call are applied to
//! a copy and swapped in, which makes the store transactional.

use crate::store::{upsert_by_kind, RegistryStore, VersionWrite};
use armada_core::{
    ArmadaError, ContractRecord, Result, TransitionMarker, Version, VersionKind, VersionRecord,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default, Clone)]
struct Documents {
    contracts: Vec<ContractRecord>,
    versions: Vec<VersionRecord>,
    marker: Option<TransitionMarker>,
}

/// Process-local registry store.
#[derive(Debug)]
pub struct MemoryRegistryStore {
    docs: RwLock<Documents>,
    closed: AtomicBool,
}

impl Default for MemoryRegistryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistryStore {
    /// Create an empty transactional store.
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Documents::default()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ArmadaError::connection("memory registry store is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn is_transactional(&self) -> bool {
        true
    }

    async fn insert_contract(&self, record: &ContractRecord) -> Result<()> {
        self.ensure_open()?;
        self.docs.write().contracts.push(record.clone());
        Ok(())
    }

    async fn find_contract(&self, name: &str, version: &Version) -> Result<Option<ContractRecord>> {
        self.ensure_open()?;
        Ok(self
            .docs
            .read()
            .contracts
            .iter()
            .find(|c| c.name == name && &c.version == version)
            .cloned())
    }

    async fn find_contracts(&self, version: &Version) -> Result<Vec<ContractRecord>> {
        self.ensure_open()?;
        Ok(self
            .docs
            .read()
            .contracts
            .iter()
            .filter(|c| &c.version == version)
            .cloned()
            .collect())
    }

    async fn delete_contracts(&self, version: &Version) -> Result<usize> {
        self.ensure_open()?;
        let mut docs = self.docs.write();
        let before = docs.contracts.len();
        docs.contracts.retain(|c| &c.version != version);
        Ok(before - docs.contracts.len())
    }

    async fn find_versions(&self, kind: Option<VersionKind>) -> Result<Vec<VersionRecord>> {
        self.ensure_open()?;
        Ok(self
            .docs
            .read()
            .versions
            .iter()
            .filter(|row| kind.map_or(true, |k| row.kind == k))
            .cloned()
            .collect())
    }

    async fn upsert_version_by_kind(&self, record: &VersionRecord) -> Result<()> {
        self.ensure_open()?;
        upsert_by_kind(&mut self.docs.write().versions, record);
        Ok(())
    }

    async fn delete_versions(&self, version: &Version) -> Result<usize> {
        self.ensure_open()?;
        let mut docs = self.docs.write();
        let before = docs.versions.len();
        docs.versions.retain(|row| &row.version != version);
        Ok(before - docs.versions.len())
    }

    async fn apply_version_writes(&self, writes: &[VersionWrite]) -> Result<()> {
        self.ensure_open()?;
        let mut docs = self.docs.write();
        let mut staged = docs.versions.clone();
        for write in writes {
            write.apply(&mut staged)?;
        }
        docs.versions = staged;
        Ok(())
    }

    async fn read_marker(&self) -> Result<Option<TransitionMarker>> {
        self.ensure_open()?;
        Ok(self.docs.read().marker.clone())
    }

    async fn write_marker(&self, marker: &TransitionMarker) -> Result<()> {
        self.ensure_open()?;
        self.docs.write().marker = Some(marker.clone());
        Ok(())
    }

    async fn clear_marker(&self) -> Result<()> {
        self.ensure_open()?;
        self.docs.write().marker = None;
        Ok(())
    }

    async fn drop_all(&self) -> Result<()> {
        self.ensure_open()?;
        *self.docs.write() = Documents::default();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
