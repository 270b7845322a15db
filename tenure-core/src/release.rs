use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{LockError, Result, StoreError};
use crate::handle::LockHandle;
use crate::heartbeat::HeartbeatScheduler;
use crate::infrastructure::{Expectation, LockStore};
use crate::types::{LockStatus, ReleaseOptions};

pub struct ReleaseEngine<'a> {
    pub store: &'a dyn LockStore,
    pub clock: &'a dyn Clock,
    pub table: &'a str,
    pub scheduler: &'a HeartbeatScheduler,
}

impl ReleaseEngine<'_> {
    /// Give up a held lock, either deleting the item or leaving a released
    /// tombstone that keeps the sequence number.
    ///
    /// Returns `Ok(false)` when there was nothing to release: the handle was
    /// already lost or released, or the conditional write found another
    /// writer's version in place.
    pub fn release(&self, handle: &LockHandle, options: &ReleaseOptions) -> Result<bool> {
        // Out of the tracked set before touching the store, so no renewal
        // can start on a version we are about to retire.
        self.scheduler.unregister(handle);

        let mut state = handle.state();
        if state.status != LockStatus::Held {
            return Ok(false);
        }

        let version = state.item.record_version_number.clone();
        let outcome = if options.delete_lock {
            self.store
                .delete_if(self.table, handle.key(), &version)
                .map(|()| None)
        } else {
            let mut tombstone = state.item.rewritten(self.clock.now_millis());
            tombstone.is_released = true;
            if let Some(data) = &options.data {
                tombstone.data = Some(data.clone());
            }
            self.store
                .put_if(self.table, &tombstone, Expectation::Version(&version))
                .map(|()| Some(tombstone))
        };

        match outcome {
            Ok(tombstone) => {
                if let Some(tombstone) = tombstone {
                    state.item = tombstone;
                }
                state.status = LockStatus::Released;
                info!(key = %handle.key(), deleted = options.delete_lock, "lock released");
                Ok(true)
            }
            Err(StoreError::VersionMismatch) | Err(StoreError::NotFound) => {
                state.status = LockStatus::Lost;
                debug!(key = %handle.key(), "lock already superseded, release is a no-op");
                Ok(false)
            }
            Err(StoreError::Unavailable(msg)) if options.best_effort => {
                state.status = LockStatus::Released;
                warn!(key = %handle.key(), error = %msg, "best-effort release could not reach the store");
                Ok(true)
            }
            // Still held but no longer heartbeated: retry the release or let
            // the lease run out.
            Err(StoreError::Unavailable(msg)) => Err(LockError::StoreUnavailable(msg)),
        }
    }
}
