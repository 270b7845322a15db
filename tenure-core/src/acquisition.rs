//! The acquire protocol: read, judge the lease, conditionally write, and
//! poll until the wait budget runs out.

use std::time::Duration;

use tracing::{debug, info};

use crate::clock::{Clock, LeaseClock};
use crate::error::{LockError, Result, StoreError};
use crate::infrastructure::{Expectation, LockStore};
use crate::types::{AcquireOptions, LockItem};

/// Result of one read-evaluate-write round.
enum Attempt {
    Acquired(LockItem),
    /// Someone holds a live lease.
    Held { owner: String },
    /// Our conditional write lost against a concurrent writer.
    Raced,
}

pub struct AcquisitionEngine<'a> {
    pub store: &'a dyn LockStore,
    pub clock: &'a dyn Clock,
    pub table: &'a str,
    pub owner_name: &'a str,
    pub lease_duration_ms: u64,
    pub sequence_id_tracking: bool,
}

impl AcquisitionEngine<'_> {
    /// Acquire the lock named by `options.key`, waiting at most
    /// `additional_time_to_wait_ms` beyond the first attempt.
    ///
    /// Registration with the heartbeat scheduler is the caller's job.
    pub fn acquire(&self, options: &AcquireOptions) -> Result<LockItem> {
        options.validate()?;
        let deadline = self
            .clock
            .now_millis()
            .saturating_add(options.additional_time_to_wait_ms);

        loop {
            let (reason, raced) = match self.attempt(options)? {
                Attempt::Acquired(item) => return Ok(item),
                Attempt::Raced => ("lost a concurrent acquisition race".to_string(), true),
                Attempt::Held { owner } => (format!("held by '{}'", owner), false),
            };

            let now = self.clock.now_millis();
            if now >= deadline {
                debug!(key = %options.key, %reason, "acquisition budget exhausted");
                let reason = if options.additional_time_to_wait_ms == 0 {
                    reason
                } else {
                    format!(
                        "{} after waiting {} ms",
                        reason, options.additional_time_to_wait_ms
                    )
                };
                return Err(LockError::LockNotGranted {
                    key: options.key.clone(),
                    reason,
                });
            }

            // A lost race means the item changed under us; judge the new one
            // right away.
            if raced {
                continue;
            }

            let pause = options.refresh_period_ms.min(deadline - now);
            debug!(key = %options.key, %reason, pause_ms = pause, "lock busy, polling");
            self.clock.sleep(Duration::from_millis(pause));
        }
    }

    fn attempt(&self, options: &AcquireOptions) -> Result<Attempt> {
        let now = self.clock.now_millis();
        let existing = self.store.get(self.table, &options.key)?;

        let Some(current) = existing else {
            let item = self.new_item(options, None, now);
            return self.write(item, Expectation::Absent);
        };

        if !current.is_released {
            if options.acquire_only_if_absent {
                return Err(LockError::LockNotGranted {
                    key: options.key.clone(),
                    reason: format!("lock already exists, owned by '{}'", current.owner_name),
                });
            }
            if !LeaseClock::is_expired(&current, now) {
                return Ok(Attempt::Held {
                    owner: current.owner_name,
                });
            }
            debug!(
                key = %options.key,
                owner = %current.owner_name,
                version = %current.record_version_number,
                "existing lease expired, taking over"
            );
        }

        let item = self.new_item(options, Some(&current), now);
        self.write(item, Expectation::Version(&current.record_version_number))
    }

    fn new_item(&self, options: &AcquireOptions, previous: Option<&LockItem>, now: u64) -> LockItem {
        let data = match previous {
            Some(previous) if !options.replace_data => {
                previous.data.clone().or_else(|| options.data.clone())
            }
            _ => options.data.clone(),
        };

        let sequence_number = match previous {
            Some(previous) if self.sequence_id_tracking => previous.sequence_number + 1,
            _ => 0,
        };

        LockItem::acquired(
            options.key.clone(),
            self.owner_name,
            self.lease_duration_ms,
            data,
            sequence_number,
            now,
        )
    }

    fn write(&self, item: LockItem, expected: Expectation<'_>) -> Result<Attempt> {
        match self.store.put_if(self.table, &item, expected) {
            Ok(()) => {
                info!(
                    key = %item.key,
                    owner = %item.owner_name,
                    version = %item.record_version_number,
                    sequence = item.sequence_number,
                    "lock acquired"
                );
                Ok(Attempt::Acquired(item))
            }
            Err(StoreError::VersionMismatch) | Err(StoreError::NotFound) => {
                debug!(key = %item.key, "conditional put lost a race");
                Ok(Attempt::Raced)
            }
            Err(err) => Err(err.into()),
        }
    }
}
