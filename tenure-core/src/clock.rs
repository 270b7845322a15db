//! Time sources and lease arithmetic.
//!
//! Lease decisions compare two readings of a [`Clock`]; the default
//! [`SystemClock`] is monotonic so wall-clock adjustments cannot shorten or
//! stretch a lease.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::types::LockItem;

pub trait Clock: Send + Sync {
    /// Current reading in milliseconds.
    fn now_millis(&self) -> u64;

    /// Blocks the caller for `duration` as measured by this clock.
    fn sleep(&self, duration: Duration);
}

/// Monotonic clock anchored to the Unix epoch once, at construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    anchor: Instant,
    anchor_epoch_ms: u64,
}

impl SystemClock {
    pub fn new() -> Self {
        let anchor_epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            anchor: Instant::now(),
            anchor_epoch_ms,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.anchor_epoch_ms + self.anchor.elapsed().as_millis() as u64
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that only moves when told to. Clones share the same time, so a
/// single instance can drive several clients in a test.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration.as_millis() as u64);
    }
}

/// Pure lease arithmetic. No I/O.
pub struct LeaseClock;

impl LeaseClock {
    /// A lease is expired once a full lease duration has passed since the
    /// last write.
    pub fn is_expired(item: &LockItem, now: u64) -> bool {
        now.saturating_sub(item.last_updated_ms) >= item.lease_duration_ms
    }

    /// Milliseconds left before the lease runs out, zero if already expired.
    pub fn remaining(item: &LockItem, now: u64) -> u64 {
        item.last_updated_ms.saturating_add(item.lease_duration_ms).saturating_sub(now)
    }
}
