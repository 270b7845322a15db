//! Lease renewal: the tracked set of held locks, the per-tick renewal pass
//! and the single background thread that drives it.

use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::{Clock, LeaseClock};
use crate::error::StoreError;
use crate::handle::LockHandle;
use crate::infrastructure::{Expectation, LockStore};
use crate::types::{HeartbeatOptions, LockKey, LockStatus};

/// Outcome of renewing one lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Renewal {
    Renewed,
    /// Taken over, deleted, or not renewed for a full lease.
    Lost,
    /// Released locally before the renewal got to it.
    Released,
    Unavailable(String),
}

/// Writes a fresh version and timestamp for a held lock, conditioned on the
/// version this process last wrote.
pub struct LeaseRenewer<'a> {
    pub store: &'a dyn LockStore,
    pub clock: &'a dyn Clock,
    pub table: &'a str,
}

impl LeaseRenewer<'_> {
    pub fn renew(&self, handle: &LockHandle, options: &HeartbeatOptions) -> Renewal {
        let mut state = handle.state();
        match state.status {
            LockStatus::Held => {}
            LockStatus::Lost => return Renewal::Lost,
            LockStatus::Released => return Renewal::Released,
        }

        let now = self.clock.now_millis();
        if LeaseClock::is_expired(&state.item, now) {
            // Past this point another process may legitimately hold the key.
            state.status = LockStatus::Lost;
            return Renewal::Lost;
        }

        let mut next = state.item.rewritten(now);
        if options.delete_data {
            next.data = None;
        } else if let Some(data) = &options.data {
            next.data = Some(data.clone());
        }

        let expected = Expectation::Version(&state.item.record_version_number);
        match self.store.put_if(self.table, &next, expected) {
            Ok(()) => {
                debug!(key = %next.key, version = %next.record_version_number, "lease renewed");
                state.item = next;
                Renewal::Renewed
            }
            Err(StoreError::VersionMismatch) | Err(StoreError::NotFound) => {
                state.status = LockStatus::Lost;
                Renewal::Lost
            }
            Err(StoreError::Unavailable(msg)) => Renewal::Unavailable(msg),
        }
    }
}

/// Summary of one heartbeat pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub renewed: usize,
    pub failed: usize,
    pub lost: Vec<LockKey>,
}

/// The set of locks this client holds. Shared by callers (register on
/// acquire, unregister on release) and the heartbeat thread. The mutex is
/// only held while the map itself changes, never across store calls.
#[derive(Default)]
pub struct HeartbeatScheduler {
    tracked: Mutex<HashMap<LockKey, LockHandle>>,
}

impl HeartbeatScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn tracked(&self) -> MutexGuard<'_, HashMap<LockKey, LockHandle>> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `handle`. A different handle already tracked under the same key
    /// belongs to an older acquisition and is marked lost.
    pub fn register(&self, handle: LockHandle) {
        let displaced = self.tracked().insert(handle.key().clone(), handle.clone());
        if let Some(old) = displaced.filter(|old| !old.same_lock(&handle)) {
            old.mark_lost();
        }
    }

    /// Removes `handle` if it is the one tracked under its key. A newer
    /// handle for the same key is left alone.
    pub fn unregister(&self, handle: &LockHandle) -> bool {
        let mut tracked = self.tracked();
        match tracked.get(handle.key()) {
            Some(current) if current.same_lock(handle) => {
                tracked.remove(handle.key());
                true
            }
            _ => false,
        }
    }

    pub fn snapshot(&self) -> Vec<LockHandle> {
        self.tracked().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tracked().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Renew every tracked lock once. Each lock is independent: a failure on
    /// one never stops the others. Lost locks leave the tracked set;
    /// transient failures are retried on the next tick only.
    pub fn tick(&self, renewer: &LeaseRenewer<'_>) -> TickReport {
        let mut report = TickReport::default();

        for handle in self.snapshot() {
            match renewer.renew(&handle, &HeartbeatOptions::default()) {
                Renewal::Renewed => report.renewed += 1,
                Renewal::Lost => {
                    warn!(key = %handle.key(), "lock lost, no longer heartbeating it");
                    self.unregister(&handle);
                    report.lost.push(handle.key().clone());
                }
                Renewal::Released => {
                    self.unregister(&handle);
                }
                Renewal::Unavailable(msg) => {
                    warn!(key = %handle.key(), error = %msg, "heartbeat failed, retrying next tick");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

/// The background thread. Dropping the stop sender or sending on it ends the
/// loop after the in-flight tick.
pub(crate) struct HeartbeatWorker {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

impl HeartbeatWorker {
    pub(crate) fn spawn<F>(period: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop, stop_rx) = mpsc::channel::<()>();
        let thread = std::thread::Builder::new()
            .name("tenure-heartbeat".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => tick(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        Ok(Self { stop, thread })
    }

    pub(crate) fn shutdown(self) {
        let _ = self.stop.send(());
        if self.thread.join().is_err() {
            warn!("heartbeat thread panicked");
        }
    }
}

/// Keeps the pieces a background tick needs alive for the thread's lifetime.
pub(crate) fn spawn_for(
    store: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
    table: String,
    scheduler: Arc<HeartbeatScheduler>,
    period: Duration,
) -> std::io::Result<HeartbeatWorker> {
    HeartbeatWorker::spawn(period, move || {
        let renewer = LeaseRenewer {
            store: store.as_ref(),
            clock: clock.as_ref(),
            table: &table,
        };
        let report = scheduler.tick(&renewer);
        if report.renewed + report.failed + report.lost.len() > 0 {
            debug!(
                renewed = report.renewed,
                failed = report.failed,
                lost = report.lost.len(),
                "heartbeat tick"
            );
        }
    })
}
