//! Wall-clock effect
//!
//! Versions minted without an explicit tag are derived from the current time,
//! so the clock is injected rather than read directly. Tests use
//! `armada_testkit::FixedClock`.

use crate::errors::Result;
use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Physical (wall-clock) time.
#[async_trait]
pub trait PhysicalTimeEffects: Send + Sync {
    /// Current unix time in milliseconds.
    async fn physical_time_ms(&self) -> Result<u64>;
}

/// Real time handler for production use
///
/// Stateless; delegates to the operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock handler
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PhysicalTimeEffects for SystemClock {
    async fn physical_time_ms(&self) -> Result<u64> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Ok(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
    }
}
