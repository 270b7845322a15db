use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::clock::LeaseClock;
use crate::error::{LockError, Result};
use crate::types::{LockItem, LockKey, LockStatus};

/// A held lock. Clones share state: when the heartbeat thread finds the lock
/// taken over, every clone observes it as lost.
#[derive(Debug, Clone)]
pub struct LockHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    key: LockKey,
    state: Mutex<HandleState>,
}

#[derive(Debug)]
pub(crate) struct HandleState {
    /// The record as this process last wrote it.
    pub item: LockItem,
    pub status: LockStatus,
}

impl LockHandle {
    pub(crate) fn new(item: LockItem) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                key: item.key.clone(),
                state: Mutex::new(HandleState {
                    item,
                    status: LockStatus::Held,
                }),
            }),
        }
    }

    /// Renewal and release both hold this guard across their store write, so
    /// the two never interleave on one lock.
    pub(crate) fn state(&self) -> MutexGuard<'_, HandleState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn same_lock(&self, other: &LockHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn key(&self) -> &LockKey {
        &self.inner.key
    }

    /// Snapshot of the record last written by this process.
    pub fn item(&self) -> LockItem {
        self.state().item.clone()
    }

    pub fn status(&self) -> LockStatus {
        self.state().status
    }

    pub fn is_lost(&self) -> bool {
        self.status() == LockStatus::Lost
    }

    pub fn is_released(&self) -> bool {
        self.status() == LockStatus::Released
    }

    pub fn record_version_number(&self) -> String {
        self.state().item.record_version_number.clone()
    }

    /// Fencing token handed out with this acquisition.
    pub fn sequence_number(&self) -> u64 {
        self.state().item.sequence_number
    }

    pub fn data(&self) -> Option<Vec<u8>> {
        self.state().item.data.clone()
    }

    /// Time left on the lease as of `now`, going by the last successful write.
    pub fn remaining_lease(&self, now: u64) -> u64 {
        LeaseClock::remaining(&self.state().item, now)
    }

    /// Like [`LockHandle::ensure_held`], but also treats a lease that has run
    /// out by `now` as lost, since another process may already hold the key.
    pub fn ensure_held_at(&self, now: u64) -> Result<()> {
        {
            let mut state = self.state();
            if state.status == LockStatus::Held && LeaseClock::is_expired(&state.item, now) {
                state.status = LockStatus::Lost;
            }
        }
        self.ensure_held()
    }

    /// Superseded by a newer acquisition of the same key.
    pub(crate) fn mark_lost(&self) {
        let mut state = self.state();
        if state.status == LockStatus::Held {
            state.status = LockStatus::Lost;
        }
    }

    /// Fails with [`LockError::LockLost`] unless the lock is still held.
    /// Only the local status is checked; see [`LockHandle::ensure_held_at`].
    pub fn ensure_held(&self) -> Result<()> {
        match self.status() {
            LockStatus::Held => Ok(()),
            LockStatus::Lost | LockStatus::Released => Err(LockError::LockLost {
                key: self.key().clone(),
            }),
        }
    }
}
