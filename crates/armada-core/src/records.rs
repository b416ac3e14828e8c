//! Registry record types
//!
//! Shapes of the documents persisted by the versioned contract registry.
//! Contract rows are append-only; version rows move through the
//! TEMP → DEPLOYED → ARCHIVED lifecycle and are never deleted except when an
//! abandoned TEMP version is cleared.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version tag shared by contract rows and version rows.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    /// Wrap an existing version string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Mint a version from a unix timestamp in milliseconds.
    pub fn from_timestamp_ms(ts_ms: u64) -> Self {
        Self(ts_ms.to_string())
    }

    /// Borrow the version string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Version {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Version {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle state of a version row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VersionKind {
    /// In-progress candidate; at most one exists
    Temp,
    /// Currently live; at most one exists
    Deployed,
    /// Historical, retained forever
    Archived,
}

impl VersionKind {
    /// Persisted name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            VersionKind::Temp => "TEMP",
            VersionKind::Deployed => "DEPLOYED",
            VersionKind::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for VersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the `versions` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    /// Lifecycle state
    #[serde(rename = "type")]
    pub kind: VersionKind,
    /// Version tag
    pub version: Version,
    /// Version of the contract sources deployed under this tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contracts_version: Option<String>,
}

impl VersionRecord {
    /// Create a version row.
    pub fn new(kind: VersionKind, version: Version, contracts_version: Option<String>) -> Self {
        Self {
            kind,
            version,
            contracts_version,
        }
    }
}

/// Payload written for a contract, before it is tagged with a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractData {
    /// Deployed (proxy) address
    pub address: String,
    /// Serialized JSON ABI
    pub abi: String,
    /// Creation bytecode from the artifact
    pub bytecode: String,
    /// Implementation address behind a proxy
    pub implementation: Option<String>,
}

/// One row of the `contracts` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    /// Contract name the row is keyed by
    pub name: String,
    /// Deployed (proxy) address
    pub address: String,
    /// Serialized JSON ABI
    pub abi: String,
    /// Creation bytecode from the artifact
    pub bytecode: String,
    /// Implementation address behind a proxy
    pub implementation: Option<String>,
    /// Version the row belongs to
    pub version: Version,
}

impl ContractRecord {
    /// Tag a contract payload with its name and version.
    pub fn from_data(name: impl Into<String>, data: ContractData, version: Version) -> Self {
        Self {
            name: name.into(),
            address: data.address,
            abi: data.abi,
            bytecode: data.bytecode,
            implementation: data.implementation,
            version,
        }
    }

    /// Strip the name and version back off.
    pub fn data(&self) -> ContractData {
        ContractData {
            address: self.address.clone(),
            abi: self.abi.clone(),
            bytecode: self.bytecode.clone(),
            implementation: self.implementation.clone(),
        }
    }

    /// Same contract re-tagged under another version.
    pub fn with_version(&self, version: Version) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }
}

/// Durable record of a promotion that has started but not finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionMarker {
    /// Version being promoted to DEPLOYED
    pub target_version: Version,
    /// DEPLOYED version at the time the promotion started
    pub previous_deployed: Option<Version>,
    /// Start time in unix milliseconds
    pub started_at_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_record_document_shape() {
        let record = VersionRecord::new(
            VersionKind::Temp,
            Version::new("1700000000000"),
            Some("0.4.2".to_string()),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "TEMP",
                "version": "1700000000000",
                "contractsVersion": "0.4.2"
            })
        );

        let bare: VersionRecord =
            serde_json::from_str(r#"{"type":"ARCHIVED","version":"1"}"#).unwrap();
        assert_eq!(bare.kind, VersionKind::Archived);
        assert_eq!(bare.contracts_version, None);
    }

    #[test]
    fn test_contract_record_keeps_null_implementation() {
        let record = ContractRecord::from_data(
            "AccessController",
            ContractData {
                address: "0x01".to_string(),
                abi: "[]".to_string(),
                bytecode: "0x6080".to_string(),
                implementation: None,
            },
            Version::new("7"),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["implementation"], serde_json::Value::Null);
        assert_eq!(json["version"], "7");
        assert_eq!(record.with_version(Version::new("8")).data(), record.data());
    }
}
