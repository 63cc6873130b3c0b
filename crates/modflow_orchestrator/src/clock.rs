//! Wall-clock seam for record timestamps.
//!
//! Deadlines use `tokio::time::Instant` directly, which follows the paused
//! clock in tests. Timestamps that end up on a [`crate::JobRecord`] come
//! from an injected [`Clock`].

use chrono::{DateTime, Utc};

/// Source of record timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
