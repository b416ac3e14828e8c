//! # Armada Registry - Versioned Contract Registry
//!
//! **Purpose**: Persist what was deployed, under which version, and move
//! versions through their lifecycle.
//!
//! - `contracts`: append-only rows keyed by (name, version)
//! - `versions`: at most one TEMP row and at most one DEPLOYED row; ARCHIVED
//!   rows accumulate forever
//! - `transitions`: at most one marker for an interrupted promotion
//!
//! [`VersionRegistry`] implements the lifecycle on top of any
//! [`RegistryStore`]. Two stores ship with the crate: [`MemoryRegistryStore`]
//! and the embedded [`RedbRegistryStore`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// In-memory document store
pub mod memory;

/// redb-backed document store
pub mod redb_store;

/// Version lifecycle operations
pub mod registry;

/// Document store trait and version write plans
pub mod store;

pub use memory::MemoryRegistryStore;
pub use redb_store::RedbRegistryStore;
pub use registry::{open_store, VersionRegistry};
pub use store::{RegistryStore, VersionWrite};
