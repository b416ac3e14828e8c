//! Armada Testing Infrastructure
//!
//! Simulated collaborators and fixtures shared by the test suites of every
//! Armada crate.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! armada-testkit = { path = "../armada-testkit" }
//! ```
//!
//! ```rust,no_run
//! use armada_testkit::*;
//!
//! # async fn example() {
//! let (registry, _store) = memory_registry();
//! let chain = SimulatedChain::new();
//! # }
//! ```

pub mod chain;
pub mod fixtures;
pub mod store;
pub mod time;

pub use chain::SimulatedChain;
pub use fixtures::*;
pub use store::FaultyRegistryStore;
pub use time::FixedClock;
