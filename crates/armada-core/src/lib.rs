//! # Armada Core - Foundation
//!
//! **Purpose**: Define the shared vocabulary of the deployment system.
//!
//! Every other Armada crate depends on this one and nothing here depends on
//! them.
//! - YES registry records and the version lifecycle
//! - YES storage snapshots used for upgrade verification
//! - YES effect traits for the chain and clock collaborators
//! - YES configuration and the unified error type
//! - NO persistence (that's `armada-registry`)
//! - NO mission sequencing or upgrades (that's `armada-campaign`)
//! - NO simulated chain (that's `armada-testkit`)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Configuration loading and validation
pub mod config;

/// Collaborator effect traits and production handlers
pub mod effects;

/// Unified error type
pub mod errors;

/// Registry record types
pub mod records;

/// Storage snapshots for upgrade verification
pub mod snapshot;

pub use config::{ArmadaConfig, CampaignConfig, RegistryBackend, RegistryConfig};
pub use effects::{
    Artifact, ChainEffects, ContractCallEffects, DeployArgs, DeployedContract, DeployerEffects,
    PhysicalTimeEffects, ProxyKind, StorageLayoutEffects, SystemClock,
};
pub use errors::{ArmadaError, Result};
pub use records::{
    ContractData, ContractRecord, TransitionMarker, Version, VersionKind, VersionRecord,
};
pub use snapshot::{SlotMismatch, StorageSnapshot};
