//! # Armada Campaign - Deployment Orchestration
//!
//! **Purpose**: Deploy an ordered set of interdependent contracts exactly once
//! per version, and later swap proxy implementations while proving storage
//! was left alone.
//!
//! - [`Mission`]: data-driven descriptor for one contract, executed by one
//!   generic runner
//! - [`DeployCampaign`]: runs missions strictly in order over a typed state
//!   struct, then promotes the run's version
//! - [`UpgradeCoordinator`]: snapshot, upgrade, re-snapshot, compare, record
//! - [`protocol`]: the mission set of the naming protocol

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Campaign orchestrator
pub mod campaign;

/// Mission descriptors and runner
pub mod mission;

/// Protocol mission set
pub mod protocol;

/// Typed campaign state helpers
pub mod state;

/// Upgrade coordinator
pub mod upgrade;

pub use campaign::{CampaignReport, DeployCampaign};
pub use mission::{
    DeployPredicate, Mission, MissionContext, MissionOutcome, PostDeployHook, PreDeployHook,
};
pub use state::{require, InstanceSlot};
pub use upgrade::{UpgradeCoordinator, UpgradeReport, UpgradeTarget};
