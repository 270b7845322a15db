//! High-level client that wraps the lock protocol + pluggable storage.
//! The HTTP service in `tenure-cli` delegates to this.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{info, warn};

use crate::acquisition::AcquisitionEngine;
use crate::clock::{Clock, LeaseClock, SystemClock};
use crate::error::{LockError, Result};
use crate::handle::LockHandle;
use crate::heartbeat::{self, HeartbeatScheduler, HeartbeatWorker, LeaseRenewer, Renewal, TickReport};
use crate::infrastructure::LockStore;
use crate::infrastructure_in_memory::InMemoryLockStore;
use crate::release::ReleaseEngine;
use crate::types::*;

/// The main entry point. Acquires, renews and releases locks in one table
/// on behalf of one owner.
///
/// Every lock returned by [`LockClient::acquire`] is already tracked for
/// heartbeating. With `create_heartbeat_background_thread` set, a single
/// thread renews all of them every `heartbeat_period_ms`; otherwise callers
/// renew with [`LockClient::send_heartbeat`] or
/// [`LockClient::run_heartbeat_tick`].
pub struct LockClient {
    store: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
    options: LockClientOptions,
    scheduler: Arc<HeartbeatScheduler>,
    worker: Mutex<Option<HeartbeatWorker>>,
}

impl LockClient {
    /// Create a client over `store` using the monotonic system clock.
    pub fn new(store: Arc<dyn LockStore>, options: LockClientOptions) -> Result<Self> {
        Self::with_clock(store, Arc::new(SystemClock::new()), options)
    }

    /// Create a client with an explicit time source.
    pub fn with_clock(
        store: Arc<dyn LockStore>,
        clock: Arc<dyn Clock>,
        options: LockClientOptions,
    ) -> Result<Self> {
        options.validate()?;

        let scheduler = Arc::new(HeartbeatScheduler::new());
        let worker = if options.create_heartbeat_background_thread {
            let worker = heartbeat::spawn_for(
                store.clone(),
                clock.clone(),
                options.table_name.clone(),
                scheduler.clone(),
                Duration::from_millis(options.heartbeat_period_ms),
            )
            .map_err(|e| {
                LockError::InvalidConfiguration(format!("cannot start heartbeat thread: {}", e))
            })?;
            Some(worker)
        } else {
            None
        };

        info!(
            table = %options.table_name,
            owner = %options.owner_name,
            lease_ms = options.lease_duration_ms,
            heartbeat_ms = options.heartbeat_period_ms,
            background = options.create_heartbeat_background_thread,
            "lock client started"
        );

        Ok(Self {
            store,
            clock,
            options,
            scheduler,
            worker: Mutex::new(worker),
        })
    }

    /// Create a client over a fresh in-memory store.
    pub fn in_memory(options: LockClientOptions) -> Result<Self> {
        Self::new(Arc::new(InMemoryLockStore::new()), options)
    }

    /// Create a client backed by SQLite at the given path.
    #[cfg(feature = "sqlite")]
    pub fn with_sqlite(path: &str, options: LockClientOptions) -> Result<Self> {
        let store = crate::infrastructure_sqlite::SqliteLockStore::open(path).map_err(|e| {
            LockError::StoreUnavailable(format!("failed to open SQLite database at '{}': {}", path, e))
        })?;
        Self::new(Arc::new(store), options)
    }

    pub fn options(&self) -> &LockClientOptions {
        &self.options
    }

    /// Acquire a lock, polling for up to the options' wait budget.
    pub fn acquire(&self, options: &AcquireOptions) -> Result<LockHandle> {
        let item = self.acquisition().acquire(options)?;
        let handle = LockHandle::new(item);
        self.scheduler.register(handle.clone());
        Ok(handle)
    }

    /// Like [`LockClient::acquire`], but contention yields `None`.
    pub fn try_acquire(&self, options: &AcquireOptions) -> Result<Option<LockHandle>> {
        match self.acquire(options) {
            Ok(handle) => Ok(Some(handle)),
            Err(LockError::LockNotGranted { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Release a held lock. `Ok(false)` means it was already gone.
    pub fn release(&self, handle: &LockHandle, options: &ReleaseOptions) -> Result<bool> {
        self.release_engine().release(handle, options)
    }

    /// Renew one lock now. A lock found taken over (or not renewed for a
    /// full lease) fails with [`LockError::LockLost`] and stops being tracked.
    pub fn send_heartbeat(&self, handle: &LockHandle, options: &HeartbeatOptions) -> Result<()> {
        match self.renewer().renew(handle, options) {
            Renewal::Renewed => Ok(()),
            Renewal::Lost | Renewal::Released => {
                self.scheduler.unregister(handle);
                Err(LockError::LockLost {
                    key: handle.key().clone(),
                })
            }
            Renewal::Unavailable(msg) => Err(LockError::StoreUnavailable(msg)),
        }
    }

    /// Ownership check by this client's clock: fails with
    /// [`LockError::LockLost`] once the handle is lost, released, or its lease
    /// has run out. A failing handle stops being tracked.
    pub fn ensure_held(&self, handle: &LockHandle) -> Result<()> {
        let result = handle.ensure_held_at(self.clock.now_millis());
        if result.is_err() {
            self.scheduler.unregister(handle);
        }
        result
    }

    /// Run one heartbeat pass over every tracked lock on the calling thread.
    pub fn run_heartbeat_tick(&self) -> TickReport {
        self.scheduler.tick(&self.renewer())
    }

    /// Read the stored item for `key`, if any.
    pub fn get_lock(&self, key: &LockKey) -> Result<Option<LockItem>> {
        Ok(self.store.get(&self.options.table_name, key)?)
    }

    /// Who holds `key`, judged by this process's clock.
    pub fn get_lock_owner_info(&self, key: &LockKey) -> Result<Option<LockOwnerInfo>> {
        let now = self.clock.now_millis();
        Ok(self.get_lock(key)?.map(|item| LockOwnerInfo {
            is_expired: LeaseClock::is_expired(&item, now),
            owner_name: item.owner_name,
            is_released: item.is_released,
            sequence_number: item.sequence_number,
        }))
    }

    /// Locks this client currently tracks as held.
    pub fn held_locks(&self) -> Vec<LockHandle> {
        self.scheduler.snapshot()
    }

    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Stop heartbeating. Held locks are left to expire unless
    /// `release_locks_on_close` is set. Safe to call more than once.
    pub fn close(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.shutdown();
        }

        if self.options.release_locks_on_close {
            for handle in self.scheduler.snapshot() {
                if let Err(e) = self.release(&handle, &ReleaseOptions::default()) {
                    warn!(key = %handle.key(), error = %e, "failed to release lock on close");
                }
            }
        }
    }

    fn acquisition(&self) -> AcquisitionEngine<'_> {
        AcquisitionEngine {
            store: self.store.as_ref(),
            clock: self.clock.as_ref(),
            table: &self.options.table_name,
            owner_name: &self.options.owner_name,
            lease_duration_ms: self.options.lease_duration_ms,
            sequence_id_tracking: self.options.sequence_id_tracking,
        }
    }

    fn renewer(&self) -> LeaseRenewer<'_> {
        LeaseRenewer {
            store: self.store.as_ref(),
            clock: self.clock.as_ref(),
            table: &self.options.table_name,
        }
    }

    fn release_engine(&self) -> ReleaseEngine<'_> {
        ReleaseEngine {
            store: self.store.as_ref(),
            clock: self.clock.as_ref(),
            table: &self.options.table_name,
            scheduler: &self.scheduler,
        }
    }
}

impl Drop for LockClient {
    fn drop(&mut self) {
        self.close();
    }
}

// ─── Parsing Helpers ────────────────────────────────────────────────────────

/// Parses `partition` or `partition#sort` into a key.
pub fn parse_lock_key(s: &str) -> LockKey {
    match s.split_once('#') {
        Some((partition, sort)) => LockKey::with_sort_key(partition, sort),
        None => LockKey::new(s),
    }
}
