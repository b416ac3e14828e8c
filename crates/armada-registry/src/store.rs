//! Document store trait
//!
//! The registry only needs a handful of document operations over three
//! collections. Backends implement them; lifecycle rules live in
//! [`VersionRegistry`](crate::VersionRegistry).

use armada_core::{
    ArmadaError, ContractRecord, Result, TransitionMarker, Version, VersionKind, VersionRecord,
};
use async_trait::async_trait;

/// One write against the `versions` collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionWrite {
    /// Change the kind of rows of kind `from` (restricted to `version` when
    /// given) to `to`.
    Retag {
        /// Restrict to rows of this version
        version: Option<Version>,
        /// Kind matched
        from: VersionKind,
        /// Kind written
        to: VersionKind,
        /// Zero matched rows is a consistency failure
        require_match: bool,
    },
    /// Insert a row.
    Insert(VersionRecord),
    /// Delete rows of `kind` tagged `version`.
    Delete {
        /// Kind matched
        kind: VersionKind,
        /// Version matched
        version: Version,
    },
}

impl VersionWrite {
    /// Apply the write to an ordered set of rows, returning matched rows.
    pub fn apply(&self, rows: &mut Vec<VersionRecord>) -> Result<usize> {
        match self {
            VersionWrite::Retag {
                version,
                from,
                to,
                require_match,
            } => {
                let mut matched = 0;
                for row in rows.iter_mut().filter(|row| {
                    row.kind == *from && version.as_ref().map_or(true, |v| &row.version == v)
                }) {
                    row.kind = *to;
                    matched += 1;
                }
                if matched == 0 && *require_match {
                    return Err(ArmadaError::consistency(format!(
                        "update {from} -> {to} for version {} matched no rows",
                        version.as_ref().map_or("<any>", |v| v.as_str())
                    )));
                }
                Ok(matched)
            }
            VersionWrite::Insert(record) => {
                rows.push(record.clone());
                Ok(1)
            }
            VersionWrite::Delete { kind, version } => {
                let before = rows.len();
                rows.retain(|row| !(row.kind == *kind && &row.version == version));
                Ok(before - rows.len())
            }
        }
    }
}

/// Replace the first row of the record's kind, or append it.
pub(crate) fn upsert_by_kind(rows: &mut Vec<VersionRecord>, record: &VersionRecord) {
    match rows.iter_mut().find(|row| row.kind == record.kind) {
        Some(row) => *row = record.clone(),
        None => rows.push(record.clone()),
    }
}

/// Persistence operations needed by the registry.
///
/// Contract reads return the earliest written row when several share a
/// (name, version) pair; nothing at this level enforces uniqueness.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Whether [`apply_version_writes`](Self::apply_version_writes) is atomic
    /// across all writes passed in one call.
    fn is_transactional(&self) -> bool;

    /// Append a contract row.
    async fn insert_contract(&self, record: &ContractRecord) -> Result<()>;

    /// Earliest contract row for (name, version).
    async fn find_contract(&self, name: &str, version: &Version) -> Result<Option<ContractRecord>>;

    /// Every contract row tagged `version`, in write order.
    async fn find_contracts(&self, version: &Version) -> Result<Vec<ContractRecord>>;

    /// Delete every contract row tagged `version`.
    async fn delete_contracts(&self, version: &Version) -> Result<usize>;

    /// Version rows, optionally restricted to one kind, in write order.
    async fn find_versions(&self, kind: Option<VersionKind>) -> Result<Vec<VersionRecord>>;

    /// Replace the row of the record's kind, or insert it.
    async fn upsert_version_by_kind(&self, record: &VersionRecord) -> Result<()>;

    /// Delete every version row tagged `version`.
    async fn delete_versions(&self, version: &Version) -> Result<usize>;

    /// Apply writes in order. Transactional stores apply all or none.
    async fn apply_version_writes(&self, writes: &[VersionWrite]) -> Result<()>;

    /// The pending transition marker, if any.
    async fn read_marker(&self) -> Result<Option<TransitionMarker>>;

    /// Store the transition marker, replacing any previous one.
    async fn write_marker(&self, marker: &TransitionMarker) -> Result<()>;

    /// Remove the transition marker.
    async fn clear_marker(&self) -> Result<()>;

    /// Delete every document in every collection.
    async fn drop_all(&self) -> Result<()>;

    /// Release the connection; later calls fail with a connection error.
    async fn close(&self) -> Result<()>;
}
