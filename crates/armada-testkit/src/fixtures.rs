//! Registry fixtures

use crate::store::FaultyRegistryStore;
use crate::time::FixedClock;
use armada_core::RegistryConfig;
use armada_registry::{MemoryRegistryStore, RegistryStore, VersionRegistry};
use std::sync::Arc;

/// Registry over a fresh in-memory store and a [`FixedClock`].
///
/// The store is returned alongside so tests can inspect it.
pub fn memory_registry() -> (VersionRegistry, Arc<MemoryRegistryStore>) {
    let store = Arc::new(MemoryRegistryStore::new());
    let registry = registry_with_clock(store.clone(), Arc::new(FixedClock::default()));
    (registry, store)
}

/// Registry over a fault-injecting store and a [`FixedClock`].
pub fn faulty_registry(transactional: bool) -> (VersionRegistry, Arc<FaultyRegistryStore>) {
    let store = Arc::new(if transactional {
        FaultyRegistryStore::new()
    } else {
        FaultyRegistryStore::non_transactional()
    });
    let registry = registry_with_clock(store.clone(), Arc::new(FixedClock::default()));
    (registry, store)
}

/// Registry over `store` driven by `clock`.
pub fn registry_with_clock(
    store: Arc<dyn RegistryStore>,
    clock: Arc<FixedClock>,
) -> VersionRegistry {
    VersionRegistry::new(store, clock, RegistryConfig::memory())
}
