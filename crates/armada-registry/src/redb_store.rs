//! redb registry store
//!
//! Each collection is a redb table with JSON-serialized values:
//! - `contracts`: keyed by `(version, sequence)`, so one version's rows are a
//!   contiguous range in write order
//! - `versions`: keyed by position; rewritten wholesale inside the write
//!   transaction that changes it
//! - `transitions`: a single `current` entry
//!
//! Every version write batch runs in one redb write transaction, so the store
//! is transactional.

use crate::store::{upsert_by_kind, RegistryStore, VersionWrite};
use armada_core::{
    ArmadaError, ContractRecord, RegistryConfig, Result, TransitionMarker, Version, VersionKind,
    VersionRecord,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CONTRACTS: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("contracts");
const VERSIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("versions");
const TRANSITIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("transitions");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const MARKER_KEY: &str = "current";
const CONTRACT_SEQ_KEY: &str = "contract_seq";

fn storage_err(err: impl Into<redb::Error>) -> ArmadaError {
    ArmadaError::storage(err.into().to_string())
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Registry store persisted in an embedded redb file.
pub struct RedbRegistryStore {
    db: RwLock<Option<Arc<Database>>>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbRegistryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbRegistryStore")
            .field("path", &self.path)
            .field("open", &self.db.read().is_some())
            .finish()
    }
}

impl RedbRegistryStore {
    /// Open (creating if needed) the database named by `config`.
    pub fn open(config: &RegistryConfig) -> Result<Self> {
        Self::open_path(&config.database_file())
    }

    /// Open (creating if needed) the database file at `path`.
    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ArmadaError::connection(format!(
                    "Failed to create registry directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let db = Database::create(path).map_err(|e| {
            ArmadaError::connection(format!(
                "Failed to open registry database {}: {e}",
                path.display()
            ))
        })?;

        let txn = db.begin_write().map_err(storage_err)?;
        {
            txn.open_table(CONTRACTS).map_err(storage_err)?;
            txn.open_table(VERSIONS).map_err(storage_err)?;
            txn.open_table(TRANSITIONS).map_err(storage_err)?;
            txn.open_table(META).map_err(storage_err)?;
        }
        txn.commit().map_err(storage_err)?;

        tracing::debug!(path = %path.display(), "opened redb registry store");
        Ok(Self {
            db: RwLock::new(Some(Arc::new(db))),
            path: path.to_path_buf(),
        })
    }

    /// Database file backing the store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn database(&self) -> Result<Arc<Database>> {
        self.db
            .read()
            .clone()
            .ok_or_else(|| ArmadaError::connection("redb registry store is closed"))
    }

    fn read_versions(txn: &WriteTransaction) -> Result<Vec<VersionRecord>> {
        let table = txn.open_table(VERSIONS).map_err(storage_err)?;
        let mut rows = Vec::new();
        for entry in table.iter().map_err(storage_err)? {
            let (_, value) = entry.map_err(storage_err)?;
            rows.push(decode(value.value())?);
        }
        Ok(rows)
    }

    fn write_versions(txn: &WriteTransaction, rows: &[VersionRecord]) -> Result<()> {
        let mut table = txn.open_table(VERSIONS).map_err(storage_err)?;
        let keys = table
            .iter()
            .map_err(storage_err)?
            .map(|entry| entry.map(|(key, _)| key.value()).map_err(storage_err))
            .collect::<Result<Vec<u64>>>()?;
        for key in keys {
            table.remove(key).map_err(storage_err)?;
        }
        for (position, row) in (0u64..).zip(rows) {
            let bytes = serde_json::to_vec(row)?;
            table
                .insert(position, bytes.as_slice())
                .map_err(storage_err)?;
        }
        Ok(())
    }

    /// Run `f` over the version rows inside one write transaction.
    fn modify_versions<T>(
        &self,
        f: impl FnOnce(&mut Vec<VersionRecord>) -> Result<T>,
    ) -> Result<T> {
        let db = self.database()?;
        let txn = db.begin_write().map_err(storage_err)?;
        let mut rows = Self::read_versions(&txn)?;
        // Dropping an uncommitted transaction aborts it.
        let out = f(&mut rows)?;
        Self::write_versions(&txn, &rows)?;
        txn.commit().map_err(storage_err)?;
        Ok(out)
    }

    fn contract_keys(txn: &WriteTransaction, version: &Version) -> Result<Vec<u64>> {
        let table = txn.open_table(CONTRACTS).map_err(storage_err)?;
        let range = table
            .range((version.as_str(), 0u64)..=(version.as_str(), u64::MAX))
            .map_err(storage_err)?;
        range
            .map(|entry| entry.map(|(key, _)| key.value().1).map_err(storage_err))
            .collect()
    }
}

#[async_trait]
impl RegistryStore for RedbRegistryStore {
    fn backend_name(&self) -> &'static str {
        "redb"
    }

    fn is_transactional(&self) -> bool {
        true
    }

    async fn insert_contract(&self, record: &ContractRecord) -> Result<()> {
        let db = self.database()?;
        let bytes = serde_json::to_vec(record)?;
        let txn = db.begin_write().map_err(storage_err)?;
        {
            let mut meta = txn.open_table(META).map_err(storage_err)?;
            let seq = meta
                .get(CONTRACT_SEQ_KEY)
                .map_err(storage_err)?
                .map_or(0, |guard| guard.value());
            meta.insert(CONTRACT_SEQ_KEY, seq + 1).map_err(storage_err)?;

            let mut contracts = txn.open_table(CONTRACTS).map_err(storage_err)?;
            contracts
                .insert((record.version.as_str(), seq), bytes.as_slice())
                .map_err(storage_err)?;
        }
        txn.commit().map_err(storage_err)?;
        Ok(())
    }

    async fn find_contract(&self, name: &str, version: &Version) -> Result<Option<ContractRecord>> {
        Ok(self
            .find_contracts(version)
            .await?
            .into_iter()
            .find(|record| record.name == name))
    }

    async fn find_contracts(&self, version: &Version) -> Result<Vec<ContractRecord>> {
        let db = self.database()?;
        let txn = db.begin_read().map_err(storage_err)?;
        let table = txn.open_table(CONTRACTS).map_err(storage_err)?;
        let mut records = Vec::new();
        for entry in table
            .range((version.as_str(), 0u64)..=(version.as_str(), u64::MAX))
            .map_err(storage_err)?
        {
            let (_, value) = entry.map_err(storage_err)?;
            records.push(decode(value.value())?);
        }
        Ok(records)
    }

    async fn delete_contracts(&self, version: &Version) -> Result<usize> {
        let db = self.database()?;
        let txn = db.begin_write().map_err(storage_err)?;
        let keys = Self::contract_keys(&txn, version)?;
        {
            let mut table = txn.open_table(CONTRACTS).map_err(storage_err)?;
            for seq in &keys {
                table
                    .remove((version.as_str(), *seq))
                    .map_err(storage_err)?;
            }
        }
        txn.commit().map_err(storage_err)?;
        Ok(keys.len())
    }

    async fn find_versions(&self, kind: Option<VersionKind>) -> Result<Vec<VersionRecord>> {
        let db = self.database()?;
        let txn = db.begin_read().map_err(storage_err)?;
        let table = txn.open_table(VERSIONS).map_err(storage_err)?;
        let mut rows = Vec::new();
        for entry in table.iter().map_err(storage_err)? {
            let (_, value) = entry.map_err(storage_err)?;
            let row: VersionRecord = decode(value.value())?;
            if kind.map_or(true, |k| row.kind == k) {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    async fn upsert_version_by_kind(&self, record: &VersionRecord) -> Result<()> {
        self.modify_versions(|rows| {
            upsert_by_kind(rows, record);
            Ok(())
        })
    }

    async fn delete_versions(&self, version: &Version) -> Result<usize> {
        self.modify_versions(|rows| {
            let before = rows.len();
            rows.retain(|row| &row.version != version);
            Ok(before - rows.len())
        })
    }

    async fn apply_version_writes(&self, writes: &[VersionWrite]) -> Result<()> {
        self.modify_versions(|rows| {
            for write in writes {
                write.apply(rows)?;
            }
            Ok(())
        })
    }

    async fn read_marker(&self) -> Result<Option<TransitionMarker>> {
        let db = self.database()?;
        let txn = db.begin_read().map_err(storage_err)?;
        let table = txn.open_table(TRANSITIONS).map_err(storage_err)?;
        let marker = table.get(MARKER_KEY).map_err(storage_err)?;
        marker.map(|guard| decode(guard.value())).transpose()
    }

    async fn write_marker(&self, marker: &TransitionMarker) -> Result<()> {
        let db = self.database()?;
        let bytes = serde_json::to_vec(marker)?;
        let txn = db.begin_write().map_err(storage_err)?;
        {
            let mut table = txn.open_table(TRANSITIONS).map_err(storage_err)?;
            table
                .insert(MARKER_KEY, bytes.as_slice())
                .map_err(storage_err)?;
        }
        txn.commit().map_err(storage_err)?;
        Ok(())
    }

    async fn clear_marker(&self) -> Result<()> {
        let db = self.database()?;
        let txn = db.begin_write().map_err(storage_err)?;
        {
            let mut table = txn.open_table(TRANSITIONS).map_err(storage_err)?;
            table.remove(MARKER_KEY).map_err(storage_err)?;
        }
        txn.commit().map_err(storage_err)?;
        Ok(())
    }

    async fn drop_all(&self) -> Result<()> {
        let db = self.database()?;
        let txn = db.begin_write().map_err(storage_err)?;
        txn.delete_table(CONTRACTS).map_err(storage_err)?;
        txn.delete_table(VERSIONS).map_err(storage_err)?;
        txn.delete_table(TRANSITIONS).map_err(storage_err)?;
        txn.delete_table(META).map_err(storage_err)?;
        {
            txn.open_table(CONTRACTS).map_err(storage_err)?;
            txn.open_table(VERSIONS).map_err(storage_err)?;
            txn.open_table(TRANSITIONS).map_err(storage_err)?;
            txn.open_table(META).map_err(storage_err)?;
        }
        txn.commit().map_err(storage_err)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.db.write().take().is_some() {
            tracing::debug!(path = %self.path.display(), "closed redb registry store");
        }
        Ok(())
    }
}
