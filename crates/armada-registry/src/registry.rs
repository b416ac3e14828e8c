//! Version lifecycle over a [`RegistryStore`]
//!
//! The registry is constructed once at process start and shared by reference.
//! Version state machine:
//!
//! ```text
//!   configure_versioning ──► TEMP ──finalize──► DEPLOYED ──next finalize──► ARCHIVED
//!            │                 │
//!            └─ stale TEMP ◄───┘ cleared when a different explicit version is configured
//! ```
//!
//! A promotion touches several version rows. Transactional stores apply them
//! in one transaction; other stores bracket them with a durable
//! [`TransitionMarker`] which [`VersionRegistry::recover_interrupted_transition`]
//! uses to finish an interrupted promotion.

use crate::memory::MemoryRegistryStore;
use crate::redb_store::RedbRegistryStore;
use crate::store::{RegistryStore, VersionWrite};
use armada_core::{
    ArmadaError, ContractData, ContractRecord, PhysicalTimeEffects, RegistryBackend,
    RegistryConfig, Result, TransitionMarker, Version, VersionKind, VersionRecord,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Open the store selected by `config`.
pub fn open_store(config: &RegistryConfig) -> Result<Arc<dyn RegistryStore>> {
    let store: Arc<dyn RegistryStore> = match config.backend {
        RegistryBackend::Memory => Arc::new(MemoryRegistryStore::new()),
        RegistryBackend::Redb => Arc::new(RedbRegistryStore::open(config)?),
    };
    info!(backend = store.backend_name(), database = %config.database, "registry store connected");
    Ok(store)
}

/// Versioned contract registry.
#[derive(Clone)]
pub struct VersionRegistry {
    store: Arc<dyn RegistryStore>,
    clock: Arc<dyn PhysicalTimeEffects>,
    config: RegistryConfig,
}

impl std::fmt::Debug for VersionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionRegistry")
            .field("backend", &self.store.backend_name())
            .field("config", &self.config)
            .finish()
    }
}

impl VersionRegistry {
    /// Wrap an already opened store.
    pub fn new(
        store: Arc<dyn RegistryStore>,
        clock: Arc<dyn PhysicalTimeEffects>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Open the configured store and wrap it.
    pub fn connect(config: &RegistryConfig, clock: Arc<dyn PhysicalTimeEffects>) -> Result<Self> {
        Ok(Self::new(open_store(config)?, clock, config.clone()))
    }

    /// Keep this registry when `config` selects the same connection,
    /// otherwise close it and connect anew.
    pub async fn reconfigure(self, config: &RegistryConfig) -> Result<Self> {
        if self.config.same_connection(config) {
            return Ok(Self {
                config: config.clone(),
                ..self
            });
        }
        info!(
            from = %self.config.database,
            to = %config.database,
            "registry connection settings changed, reconnecting"
        );
        self.store.close().await?;
        Self::connect(config, self.clock)
    }

    /// Close the underlying store.
    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn RegistryStore> {
        &self.store
    }

    /// Settings the registry was connected with.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Contracts
    // ------------------------------------------------------------------

    /// Record for `name` under `version`, or under the latest version when
    /// omitted. `None` when absent.
    pub async fn get_contract(
        &self,
        name: &str,
        version: Option<&Version>,
    ) -> Result<Option<ContractRecord>> {
        let version = match version {
            Some(version) => version.clone(),
            None => match self.get_latest_version().await? {
                Some(version) => version,
                None => return Ok(None),
            },
        };
        let record = self.store.find_contract(name, &version).await?;
        debug!(contract = name, %version, found = record.is_some(), "registry lookup");
        Ok(record)
    }

    /// Every record tagged `version`.
    pub async fn get_contracts(&self, version: &Version) -> Result<Vec<ContractRecord>> {
        self.store.find_contracts(version).await
    }

    /// Append a record for `name` under `version`, or under the latest
    /// version when omitted.
    pub async fn write_contract(
        &self,
        name: &str,
        data: ContractData,
        version: Option<&Version>,
    ) -> Result<ContractRecord> {
        let version = match version {
            Some(version) => version.clone(),
            None => self.get_check_latest_version().await?,
        };
        let record = ContractRecord::from_data(name, data, version);
        self.store.insert_contract(&record).await?;
        debug!(
            contract = name,
            version = %record.version,
            address = %record.address,
            "contract recorded"
        );
        Ok(record)
    }

    // ------------------------------------------------------------------
    // Versions
    // ------------------------------------------------------------------

    async fn version_of_kind(&self, kind: VersionKind) -> Result<Option<VersionRecord>> {
        let rows = self.store.find_versions(Some(kind)).await?;
        if rows.len() > 1 {
            warn!(%kind, count = rows.len(), "more than one version row of a single-row kind");
        }
        Ok(rows.into_iter().next())
    }

    /// Current TEMP version.
    pub async fn get_temp_version(&self) -> Result<Option<Version>> {
        Ok(self
            .version_of_kind(VersionKind::Temp)
            .await?
            .map(|row| row.version))
    }

    /// Current DEPLOYED version.
    pub async fn get_deployed_version(&self) -> Result<Option<Version>> {
        Ok(self
            .version_of_kind(VersionKind::Deployed)
            .await?
            .map(|row| row.version))
    }

    /// TEMP if present, else DEPLOYED, else `None`.
    pub async fn get_latest_version(&self) -> Result<Option<Version>> {
        match self.get_temp_version().await? {
            Some(version) => Ok(Some(version)),
            None => self.get_deployed_version().await,
        }
    }

    /// Latest version, or a not-found error.
    pub async fn get_check_latest_version(&self) -> Result<Version> {
        self.get_latest_version()
            .await?
            .ok_or_else(|| ArmadaError::not_found("no TEMP or DEPLOYED version in the registry"))
    }

    /// Every version row in write order.
    pub async fn list_versions(&self) -> Result<Vec<VersionRecord>> {
        self.store.find_versions(None).await
    }

    /// Fresh version identifier from the registry clock. Nothing is written.
    pub async fn mint_version(&self) -> Result<Version> {
        Ok(Version::from_timestamp_ms(self.clock.physical_time_ms().await?))
    }

    fn row(&self, kind: VersionKind, version: Version) -> VersionRecord {
        VersionRecord::new(kind, version, self.config.contracts_version.clone())
    }

    /// Resolve the version a campaign or upgrade run works under.
    ///
    /// - explicit version equal to DEPLOYED: DEPLOYED, nothing written
    /// - explicit version otherwise: a different TEMP version is cleared, then
    ///   the explicit version becomes TEMP
    /// - no explicit version: TEMP if present, else DEPLOYED, else a version
    ///   minted from the clock becomes TEMP
    pub async fn configure_versioning(&self, explicit: Option<&Version>) -> Result<Version> {
        if let Some(target) = self.recover_interrupted_transition().await? {
            warn!(version = %target, "finished an interrupted promotion before configuring");
        }

        let deployed = self.get_deployed_version().await?;
        let temp = self.get_temp_version().await?;

        if let Some(explicit) = explicit {
            if deployed.as_ref() == Some(explicit) {
                info!(version = %explicit, "requested version is already DEPLOYED");
                return Ok(explicit.clone());
            }
            if let Some(stale) = temp.as_ref().filter(|temp| *temp != explicit) {
                warn!(stale = %stale, version = %explicit, "discarding abandoned TEMP version");
                self.clear_db_for_version(stale).await?;
            }
            self.store
                .upsert_version_by_kind(&self.row(VersionKind::Temp, explicit.clone()))
                .await?;
            info!(version = %explicit, "TEMP version configured");
            return Ok(explicit.clone());
        }

        match (temp, deployed) {
            (Some(temp), _) => {
                info!(version = %temp, "resuming TEMP version");
                Ok(temp)
            }
            (None, Some(deployed)) => {
                info!(version = %deployed, "using DEPLOYED version");
                Ok(deployed)
            }
            (None, None) => {
                let minted = self.mint_version().await?;
                self.store
                    .upsert_version_by_kind(&self.row(VersionKind::Temp, minted.clone()))
                    .await?;
                info!(version = %minted, "minted new TEMP version");
                Ok(minted)
            }
        }
    }

    fn promotion_writes(
        &self,
        target: &Version,
        deployed: Option<&Version>,
        resuming: bool,
    ) -> Vec<VersionWrite> {
        let mut writes = Vec::with_capacity(4);
        if deployed != Some(target) {
            if let Some(previous) = deployed {
                writes.push(VersionWrite::Retag {
                    version: Some(previous.clone()),
                    from: VersionKind::Deployed,
                    to: VersionKind::Archived,
                    require_match: true,
                });
            }
            writes.push(VersionWrite::Insert(
                self.row(VersionKind::Deployed, target.clone()),
            ));
        }
        if deployed != Some(target) || resuming {
            writes.push(VersionWrite::Delete {
                kind: VersionKind::Temp,
                version: target.clone(),
            });
        }
        writes.push(VersionWrite::Retag {
            version: None,
            from: VersionKind::Temp,
            to: VersionKind::Archived,
            require_match: false,
        });
        writes
    }

    async fn apply_transition(
        &self,
        marker: &TransitionMarker,
        writes: &[VersionWrite],
    ) -> Result<()> {
        if self.store.is_transactional() {
            return self.store.apply_version_writes(writes).await;
        }

        self.store.write_marker(marker).await?;
        for (applied, write) in writes.iter().enumerate() {
            if let Err(err) = self
                .store
                .apply_version_writes(std::slice::from_ref(write))
                .await
            {
                if applied == 0 {
                    return Err(err);
                }
                return Err(ArmadaError::partial_write(
                    applied,
                    writes.len(),
                    err.to_string(),
                ));
            }
        }
        self.store.clear_marker().await
    }

    /// Promote `version` (or the current TEMP version) to DEPLOYED.
    ///
    /// The previous DEPLOYED row becomes ARCHIVED, the TEMP row of the target
    /// is removed, and any other TEMP row becomes ARCHIVED. No-op when there
    /// is nothing to promote.
    pub async fn finalize_deployed_version(&self, version: Option<&Version>) -> Result<()> {
        let target = match version {
            Some(version) => version.clone(),
            None => match self.get_temp_version().await? {
                Some(temp) => temp,
                None => {
                    debug!("no TEMP version to finalize");
                    return Ok(());
                }
            },
        };
        let deployed = self.get_deployed_version().await?;
        let writes = self.promotion_writes(&target, deployed.as_ref(), false);
        let marker = TransitionMarker {
            target_version: target.clone(),
            previous_deployed: deployed.clone(),
            started_at_ms: self.clock.physical_time_ms().await?,
        };

        self.apply_transition(&marker, &writes).await?;
        info!(
            version = %target,
            archived = ?deployed.filter(|d| d != &target),
            "version promoted to DEPLOYED"
        );
        Ok(())
    }

    /// Marker of a promotion that started but did not finish.
    pub async fn pending_transition(&self) -> Result<Option<TransitionMarker>> {
        self.store.read_marker().await
    }

    /// Finish a promotion interrupted by a crash, returning its target.
    ///
    /// Every promotion write is idempotent given the current DEPLOYED row, so
    /// re-deriving the writes from the current state converges on the same
    /// rows an uninterrupted promotion would have produced.
    pub async fn recover_interrupted_transition(&self) -> Result<Option<Version>> {
        let Some(marker) = self.store.read_marker().await? else {
            return Ok(None);
        };
        let deployed = self.get_deployed_version().await?;
        let writes = self.promotion_writes(&marker.target_version, deployed.as_ref(), true);
        warn!(
            version = %marker.target_version,
            started_at_ms = marker.started_at_ms,
            "resuming interrupted promotion"
        );
        self.apply_transition(&marker, &writes).await?;
        if self.store.is_transactional() {
            self.store.clear_marker().await?;
        }
        Ok(Some(marker.target_version))
    }

    /// Delete every contract row and version row tagged `version`.
    pub async fn clear_db_for_version(&self, version: &Version) -> Result<()> {
        let contracts = self.store.delete_contracts(version).await?;
        let versions = self.store.delete_versions(version).await?;
        info!(%version, contracts, versions, "cleared version from registry");
        Ok(())
    }

    /// Delete everything. Development and test resets only.
    pub async fn drop_database(&self) -> Result<()> {
        warn!(backend = self.store.backend_name(), "dropping every registry document");
        self.store.drop_all().await
    }
}
