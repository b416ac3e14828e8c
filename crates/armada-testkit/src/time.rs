//! Deterministic clock

use armada_core::{PhysicalTimeEffects, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// Deterministic timestamp for reproducible tests (2023-11-14 in milliseconds).
pub const TEST_TIMESTAMP_MS: u64 = 1_700_000_000_000;

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now_ms: AtomicU64,
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::new(TEST_TIMESTAMP_MS)
    }
}

impl FixedClock {
    /// Clock frozen at `now_ms`.
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Current reading without going through the effect trait.
    pub fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PhysicalTimeEffects for FixedClock {
    async fn physical_time_ms(&self) -> Result<u64> {
        Ok(self.now_ms())
    }
}
