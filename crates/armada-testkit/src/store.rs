//! Fault-injecting registry store
//!
//! Wraps [`MemoryRegistryStore`] and fails a chosen version write, so
//! interrupted promotions can be reproduced. In non-transactional mode each
//! write is applied on its own, the way a document store without multi-row
//! transactions behaves.

use armada_core::{
    ArmadaError, ContractRecord, Result, TransitionMarker, Version, VersionKind, VersionRecord,
};
use armada_registry::{MemoryRegistryStore, RegistryStore, VersionWrite};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::slice;

#[derive(Debug, Default)]
struct WriteFaults {
    applied: usize,
    fail_at: Option<usize>,
}

impl WriteFaults {
    fn injected(index: usize) -> ArmadaError {
        ArmadaError::storage(format!("injected failure on version write #{index}"))
    }

    /// Fail if one of the next `count` writes is the targeted one.
    fn check_batch(&mut self, count: usize) -> Result<()> {
        match self.fail_at {
            Some(index) if (self.applied..self.applied + count).contains(&index) => {
                self.fail_at = None;
                Err(Self::injected(index))
            }
            _ => Ok(()),
        }
    }
}

/// Memory store with write fault injection.
#[derive(Debug)]
pub struct FaultyRegistryStore {
    inner: MemoryRegistryStore,
    faults: Mutex<WriteFaults>,
    transactional: bool,
}

impl Default for FaultyRegistryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultyRegistryStore {
    /// Transactional store: a failed batch applies nothing.
    pub fn new() -> Self {
        Self {
            inner: MemoryRegistryStore::new(),
            faults: Mutex::new(WriteFaults::default()),
            transactional: true,
        }
    }

    /// Store that applies version writes one at a time.
    pub fn non_transactional() -> Self {
        Self {
            transactional: false,
            ..Self::new()
        }
    }

    /// Make the version write with zero-based index `nth`, counted from the
    /// store's creation, fail once.
    pub fn fail_version_write(&self, nth: usize) {
        self.faults.lock().fail_at = Some(nth);
    }

    /// Version writes applied so far.
    pub fn version_writes_applied(&self) -> usize {
        self.faults.lock().applied
    }
}

#[async_trait]
impl RegistryStore for FaultyRegistryStore {
    fn backend_name(&self) -> &'static str {
        "faulty-memory"
    }

    fn is_transactional(&self) -> bool {
        self.transactional
    }

    async fn insert_contract(&self, record: &ContractRecord) -> Result<()> {
        self.inner.insert_contract(record).await
    }

    async fn find_contract(&self, name: &str, version: &Version) -> Result<Option<ContractRecord>> {
        self.inner.find_contract(name, version).await
    }

    async fn find_contracts(&self, version: &Version) -> Result<Vec<ContractRecord>> {
        self.inner.find_contracts(version).await
    }

    async fn delete_contracts(&self, version: &Version) -> Result<usize> {
        self.inner.delete_contracts(version).await
    }

    async fn find_versions(&self, kind: Option<VersionKind>) -> Result<Vec<VersionRecord>> {
        self.inner.find_versions(kind).await
    }

    async fn upsert_version_by_kind(&self, record: &VersionRecord) -> Result<()> {
        self.inner.upsert_version_by_kind(record).await
    }

    async fn delete_versions(&self, version: &Version) -> Result<usize> {
        self.inner.delete_versions(version).await
    }

    async fn apply_version_writes(&self, writes: &[VersionWrite]) -> Result<()> {
        if self.transactional {
            self.faults.lock().check_batch(writes.len())?;
            self.inner.apply_version_writes(writes).await?;
            self.faults.lock().applied += writes.len();
            return Ok(());
        }

        for write in writes {
            self.faults.lock().check_batch(1)?;
            self.inner.apply_version_writes(slice::from_ref(write)).await?;
            self.faults.lock().applied += 1;
        }
        Ok(())
    }

    async fn read_marker(&self) -> Result<Option<TransitionMarker>> {
        self.inner.read_marker().await
    }

    async fn write_marker(&self, marker: &TransitionMarker) -> Result<()> {
        self.inner.write_marker(marker).await
    }

    async fn clear_marker(&self) -> Result<()> {
        self.inner.clear_marker().await
    }

    async fn drop_all(&self) -> Result<()> {
        self.inner.drop_all().await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn promote(version: &str) -> Vec<VersionWrite> {
        vec![
            VersionWrite::Insert(VersionRecord::new(
                VersionKind::Deployed,
                Version::new(version),
                None,
            )),
            VersionWrite::Delete {
                kind: VersionKind::Temp,
                version: Version::new(version),
            },
        ]
    }

    #[tokio::test]
    async fn test_transactional_failure_applies_nothing() {
        let store = FaultyRegistryStore::new();
        store.fail_version_write(1);

        assert!(store.apply_version_writes(&promote("1")).await.is_err());
        assert!(store.find_versions(None).await.unwrap().is_empty());
        assert_eq!(store.version_writes_applied(), 0);

        store.apply_version_writes(&promote("1")).await.unwrap();
        assert_eq!(store.version_writes_applied(), 2);
    }

    #[tokio::test]
    async fn test_non_transactional_failure_keeps_earlier_writes() {
        let store = FaultyRegistryStore::non_transactional();
        store.fail_version_write(1);

        let err = store.apply_version_writes(&promote("1")).await.unwrap_err();
        assert!(matches!(err, ArmadaError::Storage { .. }));
        assert_eq!(store.find_versions(None).await.unwrap().len(), 1);
        assert_eq!(store.version_writes_applied(), 1);
    }
}
