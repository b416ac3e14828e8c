//! Collaborator effect traits
//!
//! The chain-interaction layer and the wall clock are external collaborators.
//! Armada only depends on the traits below; production handlers live next to
//! them when they are trivial (the system clock) and elsewhere otherwise. The
//! simulated chain used by tests lives in `armada-testkit`.

pub mod chain;
pub mod time;

pub use chain::{
    Artifact, ContractCallEffects, DeployArgs, DeployedContract, DeployerEffects, ProxyKind,
    StorageLayoutEffects,
};
pub use time::{PhysicalTimeEffects, SystemClock};

/// Every chain capability a campaign or upgrade run needs.
pub trait ChainEffects: DeployerEffects + StorageLayoutEffects + ContractCallEffects {}

/// Automatic implementation for types that satisfy the required bounds
impl<T> ChainEffects for T where T: DeployerEffects + StorageLayoutEffects + ContractCallEffects {}
