#[cfg(test)]
mod tests {
    use crate::clock::ManualClock;
    use crate::error::LockError;
    use crate::handle::LockHandle;
    use crate::heartbeat::{HeartbeatScheduler, LeaseRenewer, Renewal};
    use crate::infrastructure::LockStore;
    use crate::infrastructure_in_memory::InMemoryLockStore;
    use crate::types::*;
    use crate::LockClient;
    use std::sync::Arc;
    use std::time::Duration;

    const TABLE: &str = "locks";

    fn manual_client(store: &Arc<InMemoryLockStore>, clock: &ManualClock, owner: &str) -> LockClient {
        let options = LockClientOptions {
            lease_duration_ms: 3000,
            heartbeat_period_ms: 1000,
            create_heartbeat_background_thread: false,
            ..LockClientOptions::new(TABLE, owner)
        };
        LockClient::with_clock(store.clone(), Arc::new(clock.clone()), options).unwrap()
    }

    fn take_over(store: &InMemoryLockStore, handle: &LockHandle, now: u64) {
        let foreign = LockItem::acquired(handle.key().clone(), "intruder", 3000, None, 0, now);
        store.overwrite(TABLE, foreign);
    }

    #[test]
    fn test_renewal_refreshes_version_and_keeps_data() {
        let store = InMemoryLockStore::new();
        let clock = ManualClock::new(0);
        let handle = LockHandle::new(LockItem::acquired(
            LockKey::new("a"),
            "me",
            3000,
            Some(b"payload".to_vec()),
            0,
            0,
        ));
        store.overwrite(TABLE, handle.item());
        let renewer = LeaseRenewer {
            store: &store,
            clock: &clock,
            table: TABLE,
        };

        let before = handle.item();
        clock.advance(1000);
        assert_eq!(renewer.renew(&handle, &HeartbeatOptions::default()), Renewal::Renewed);

        let after = handle.item();
        assert_ne!(after.record_version_number, before.record_version_number);
        assert_eq!(after.last_updated_ms, 1000);
        assert_eq!(after.data, Some(b"payload".to_vec()));
        assert_eq!(store.get(TABLE, &LockKey::new("a")).unwrap(), Some(after));
    }

    #[test]
    fn test_takeover_marks_only_that_lock_lost() {
        let store = Arc::new(InMemoryLockStore::new());
        let clock = ManualClock::new(0);
        let client = manual_client(&store, &clock, "me");

        let a = client.acquire(&AcquireOptions::new("a")).unwrap();
        let b = client.acquire(&AcquireOptions::new("b")).unwrap();
        let c = client.acquire(&AcquireOptions::new("c")).unwrap();
        take_over(&store, &b, 0);

        clock.advance(1000);
        let report = client.run_heartbeat_tick();

        assert_eq!(report.renewed, 2);
        assert_eq!(report.lost, vec![LockKey::new("b")]);
        assert!(b.is_lost());
        assert!(matches!(b.ensure_held(), Err(LockError::LockLost { .. })));
        assert!(a.ensure_held().is_ok());
        assert!(c.ensure_held().is_ok());
        assert_eq!(client.held_locks().len(), 2);

        // The intruder's item is untouched.
        let stored = store.get(TABLE, &LockKey::new("b")).unwrap().unwrap();
        assert_eq!(stored.owner_name, "intruder");
    }

    #[test]
    fn test_transient_failure_retried_then_presumed_lost() {
        let store = Arc::new(InMemoryLockStore::new());
        let clock = ManualClock::new(0);
        let client = manual_client(&store, &clock, "me");
        let handle = client.acquire(&AcquireOptions::new("a")).unwrap();

        store.set_unavailable(true);
        clock.advance(1000);
        let report = client.run_heartbeat_tick();
        assert_eq!(report.failed, 1);
        assert!(report.lost.is_empty());
        assert_eq!(client.held_locks().len(), 1);

        clock.advance(1000);
        assert_eq!(client.run_heartbeat_tick().failed, 1);

        // A full lease without a successful renewal.
        store.set_unavailable(false);
        clock.advance(1000);
        let report = client.run_heartbeat_tick();
        assert_eq!(report.lost, vec![LockKey::new("a")]);
        assert!(handle.is_lost());
        assert!(client.held_locks().is_empty());
    }

    #[test]
    fn test_recovers_after_transient_failure() {
        let store = Arc::new(InMemoryLockStore::new());
        let clock = ManualClock::new(0);
        let client = manual_client(&store, &clock, "me");
        let handle = client.acquire(&AcquireOptions::new("a")).unwrap();

        store.set_unavailable(true);
        clock.advance(1000);
        assert_eq!(client.run_heartbeat_tick().failed, 1);

        store.set_unavailable(false);
        clock.advance(1000);
        assert_eq!(client.run_heartbeat_tick().renewed, 1);
        assert_eq!(handle.item().last_updated_ms, 2000);
    }

    #[test]
    fn test_manual_heartbeat_replaces_or_clears_data() {
        let store = Arc::new(InMemoryLockStore::new());
        let clock = ManualClock::new(0);
        let client = manual_client(&store, &clock, "me");
        let handle = client.acquire(&AcquireOptions::new("a").data("v1")).unwrap();

        let replace = HeartbeatOptions {
            data: Some(b"v2".to_vec()),
            delete_data: false,
        };
        client.send_heartbeat(&handle, &replace).unwrap();
        assert_eq!(handle.data(), Some(b"v2".to_vec()));
        assert_eq!(
            store.get(TABLE, &LockKey::new("a")).unwrap().unwrap().data,
            Some(b"v2".to_vec())
        );

        let clear = HeartbeatOptions {
            data: None,
            delete_data: true,
        };
        client.send_heartbeat(&handle, &clear).unwrap();
        assert_eq!(handle.data(), None);
    }

    #[test]
    fn test_manual_heartbeat_after_takeover_is_lock_lost() {
        let store = Arc::new(InMemoryLockStore::new());
        let clock = ManualClock::new(0);
        let client = manual_client(&store, &clock, "me");
        let handle = client.acquire(&AcquireOptions::new("a")).unwrap();
        take_over(&store, &handle, 0);

        let result = client.send_heartbeat(&handle, &HeartbeatOptions::default());
        assert!(matches!(result, Err(LockError::LockLost { .. })));
        assert!(client.held_locks().is_empty());
    }

    #[test]
    fn test_manual_heartbeat_past_lease_is_lock_lost() {
        let store = Arc::new(InMemoryLockStore::new());
        let clock = ManualClock::new(0);
        let client = manual_client(&store, &clock, "me");
        let handle = client.acquire(&AcquireOptions::new("a")).unwrap();

        clock.advance(3000);
        let result = client.send_heartbeat(&handle, &HeartbeatOptions::default());
        assert!(matches!(result, Err(LockError::LockLost { .. })));
    }

    #[test]
    fn test_unregister_leaves_newer_handle_alone() {
        let scheduler = HeartbeatScheduler::new();
        let old = LockHandle::new(LockItem::acquired(LockKey::new("a"), "me", 3000, None, 0, 0));
        let new = LockHandle::new(LockItem::acquired(LockKey::new("a"), "me", 3000, None, 1, 10));

        scheduler.register(old.clone());
        scheduler.register(new.clone());
        assert!(!scheduler.unregister(&old));
        assert_eq!(scheduler.len(), 1);
        assert!(scheduler.unregister(&new));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_background_thread_keeps_lease_alive() {
        let store = Arc::new(InMemoryLockStore::new());
        let holder = LockClient::new(
            store.clone(),
            LockClientOptions {
                lease_duration_ms: 600,
                heartbeat_period_ms: 100,
                ..LockClientOptions::new(TABLE, "holder")
            },
        )
        .unwrap();
        let contender = LockClient::new(
            store.clone(),
            LockClientOptions {
                lease_duration_ms: 600,
                heartbeat_period_ms: 100,
                create_heartbeat_background_thread: false,
                ..LockClientOptions::new(TABLE, "contender")
            },
        )
        .unwrap();

        let handle = holder.acquire(&AcquireOptions::new("a")).unwrap();
        let first_version = handle.record_version_number();

        // Well past the lease; only heartbeats keep it alive.
        std::thread::sleep(Duration::from_millis(1500));

        assert!(handle.ensure_held().is_ok());
        assert_ne!(handle.record_version_number(), first_version);
        assert!(matches!(
            contender.acquire(&AcquireOptions::new("a")),
            Err(LockError::LockNotGranted { .. })
        ));

        // Once heartbeating stops, the lease runs out.
        holder.close();
        std::thread::sleep(Duration::from_millis(900));
        assert!(contender.acquire(&AcquireOptions::new("a")).is_ok());
    }
}
