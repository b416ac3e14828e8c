//! Configuration for Armada runs
//!
//! Configuration is read from TOML, then overridden from `ARMADA_*`
//! environment variables, then validated. It is loaded once at process start
//! and passed down explicitly.

use crate::errors::{ArmadaError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "ARMADA_";

/// Which store implementation backs the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    /// Process-local store, discarded on exit
    Memory,
    /// Embedded redb database file
    #[default]
    Redb,
}

/// Connection settings of the versioned contract registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Store implementation
    pub backend: RegistryBackend,
    /// Directory holding the database file
    pub path: PathBuf,
    /// Database name; the file is `<path>/<database>.redb`
    pub database: String,
    /// Version of the contract sources, stamped on new version rows
    pub contracts_version: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: RegistryBackend::Redb,
            path: PathBuf::from(".armada"),
            database: "armada-registry".to_string(),
            contracts_version: None,
        }
    }
}

impl RegistryConfig {
    /// In-memory registry, mostly for tests and dry runs.
    pub fn memory() -> Self {
        Self {
            backend: RegistryBackend::Memory,
            ..Self::default()
        }
    }

    /// redb registry stored under `path`.
    pub fn redb(path: impl Into<PathBuf>, database: impl Into<String>) -> Self {
        Self {
            backend: RegistryBackend::Redb,
            path: path.into(),
            database: database.into(),
            contracts_version: None,
        }
    }

    /// Database file for the redb backend.
    pub fn database_file(&self) -> PathBuf {
        self.path.join(format!("{}.redb", self.database))
    }

    /// Whether two configurations resolve to the same store connection.
    ///
    /// Only the fields that select the store participate; the contracts
    /// version can change without reconnecting.
    pub fn same_connection(&self, other: &RegistryConfig) -> bool {
        self.backend == other.backend
            && self.database == other.database
            && (self.backend == RegistryBackend::Memory || self.path == other.path)
    }
}

/// Settings of a campaign or upgrade run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// Explicit version for the deployment campaign
    pub version: Option<String>,
    /// Explicit version for the next upgrade cycle
    pub upgrade_version: Option<String>,
    /// Run against a simulated chain
    pub mock_chain: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmadaConfig {
    /// Registry connection
    pub registry: RegistryConfig,
    /// Campaign settings
    pub campaign: CampaignConfig,
    /// Default tracing filter
    pub log_level: String,
}

impl Default for ArmadaConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            campaign: CampaignConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl ArmadaConfig {
    /// Candidate configuration files, most specific first.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".armada").join("config.toml")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".armada").join("config.toml"));
        }
        paths
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load from `path` (defaults when the file is absent), apply environment
    /// overrides, and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path).map_err(|e| {
                ArmadaError::config(format!("Failed to read {}: {e}", path.display()))
            })?;
            Self::from_toml(&text)?
        } else {
            tracing::debug!(path = %path.display(), "config file absent, using defaults");
            Self::default()
        };
        config.merge_with_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `ARMADA_*` variables from the process environment.
    pub fn merge_with_env(&mut self) {
        self.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok());
    }

    /// Apply overrides from a lookup keyed by the un-prefixed variable name.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("REGISTRY_PATH") {
            self.registry.path = PathBuf::from(path);
        }
        if let Some(database) = lookup("REGISTRY_DATABASE") {
            self.registry.database = database;
        }
        if let Some(backend) = lookup("REGISTRY_BACKEND") {
            match backend.to_ascii_lowercase().as_str() {
                "memory" => self.registry.backend = RegistryBackend::Memory,
                "redb" => self.registry.backend = RegistryBackend::Redb,
                other => tracing::warn!(backend = other, "ignoring unknown registry backend"),
            }
        }
        if let Some(version) = lookup("CONTRACTS_VERSION") {
            self.registry.contracts_version = Some(version);
        }
        if let Some(version) = lookup("VERSION") {
            self.campaign.version = Some(version);
        }
        if let Some(version) = lookup("UPGRADE_VERSION") {
            self.campaign.upgrade_version = Some(version);
        }
        if let Some(mock) = lookup("MOCK_CHAIN") {
            self.campaign.mock_chain = matches!(mock.as_str(), "1" | "true" | "TRUE" | "yes");
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Reject configurations that cannot produce a usable run.
    pub fn validate(&self) -> Result<()> {
        if self.registry.database.trim().is_empty() {
            return Err(ArmadaError::config("registry.database cannot be empty"));
        }
        for (field, value) in [
            ("campaign.version", &self.campaign.version),
            ("campaign.upgrade_version", &self.campaign.upgrade_version),
        ] {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(ArmadaError::config(format!("{field} cannot be empty")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_partial_toml() {
        let config = ArmadaConfig::from_toml(
            r#"
            log_level = "debug"

            [registry]
            path = "/var/lib/armada"
            contracts_version = "1.2.0"

            [campaign]
            version = "100"
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.registry.backend, RegistryBackend::Redb);
        assert_eq!(config.registry.database, "armada-registry");
        assert_eq!(
            config.registry.database_file(),
            PathBuf::from("/var/lib/armada/armada-registry.redb")
        );
        assert_eq!(config.campaign.version.as_deref(), Some("100"));
        assert!(!config.campaign.mock_chain);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("REGISTRY_BACKEND", "memory"),
            ("VERSION", "200"),
            ("MOCK_CHAIN", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = ArmadaConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.registry.backend, RegistryBackend::Memory);
        assert_eq!(config.campaign.version.as_deref(), Some("200"));
        assert!(config.campaign.mock_chain);
    }

    #[test]
    fn test_validation_rejects_empty_values() {
        let mut config = ArmadaConfig::default();
        config.registry.database = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = ArmadaConfig::default();
        config.campaign.version = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_same_connection_ignores_contracts_version() {
        let a = RegistryConfig::redb("/tmp/a", "reg");
        let mut b = a.clone();
        b.contracts_version = Some("2.0.0".to_string());
        assert!(a.same_connection(&b));

        let c = RegistryConfig::redb("/tmp/c", "reg");
        assert!(!a.same_connection(&c));

        let mut m1 = RegistryConfig::memory();
        let m2 = RegistryConfig::memory();
        m1.path = PathBuf::from("/elsewhere");
        assert!(m1.same_connection(&m2));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ArmadaConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.registry.database, ArmadaConfig::default().registry.database);
    }
}
