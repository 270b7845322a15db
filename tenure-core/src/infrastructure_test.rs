#[cfg(test)]
mod tests {
    use crate::error::StoreError;
    use crate::infrastructure::{Expectation, LockStore};
    use crate::infrastructure_in_memory::InMemoryLockStore;
    use crate::types::{LockItem, LockKey};

    const TABLE: &str = "locks";

    fn item(key: LockKey, owner: &str) -> LockItem {
        LockItem::acquired(key, owner, 5000, Some(b"payload".to_vec()), 0, 1000)
    }

    fn exercise_conditional_writes(store: &dyn LockStore) {
        let key = LockKey::new("resource");
        assert_eq!(store.get(TABLE, &key), Ok(None));

        // Create only if absent
        let first = item(key.clone(), "a");
        store.put_if(TABLE, &first, Expectation::Absent).unwrap();
        assert_eq!(
            store.put_if(TABLE, &item(key.clone(), "b"), Expectation::Absent),
            Err(StoreError::VersionMismatch)
        );
        assert_eq!(store.get(TABLE, &key).unwrap(), Some(first.clone()));

        // Replace only on a matching version
        let second = first.rewritten(2000);
        assert_eq!(
            store.put_if(TABLE, &second, Expectation::Version("stale")),
            Err(StoreError::VersionMismatch)
        );
        store
            .put_if(TABLE, &second, Expectation::Version(&first.record_version_number))
            .unwrap();
        assert_eq!(store.get(TABLE, &key).unwrap(), Some(second.clone()));

        // Delete only on a matching version
        assert_eq!(
            store.delete_if(TABLE, &key, &first.record_version_number),
            Err(StoreError::VersionMismatch)
        );
        store
            .delete_if(TABLE, &key, &second.record_version_number)
            .unwrap();
        assert_eq!(store.get(TABLE, &key), Ok(None));
        assert_eq!(
            store.delete_if(TABLE, &key, &second.record_version_number),
            Err(StoreError::NotFound)
        );
        assert_eq!(
            store.put_if(TABLE, &second, Expectation::Version(&second.record_version_number)),
            Err(StoreError::VersionMismatch)
        );
    }

    fn exercise_key_isolation(store: &dyn LockStore) {
        let plain = LockKey::new("shared");
        let sorted = LockKey::with_sort_key("shared", "shard-1");

        store.put_if(TABLE, &item(plain.clone(), "a"), Expectation::Absent).unwrap();
        store.put_if(TABLE, &item(sorted.clone(), "b"), Expectation::Absent).unwrap();
        store.put_if("other", &item(plain.clone(), "c"), Expectation::Absent).unwrap();

        assert_eq!(store.get(TABLE, &plain).unwrap().unwrap().owner_name, "a");
        assert_eq!(store.get(TABLE, &sorted).unwrap().unwrap().owner_name, "b");
        assert_eq!(store.get(TABLE, &sorted).unwrap().unwrap().key, sorted);
        assert_eq!(store.get("other", &plain).unwrap().unwrap().owner_name, "c");
    }

    #[test]
    fn test_in_memory_conditional_writes() {
        exercise_conditional_writes(&InMemoryLockStore::new());
    }

    #[test]
    fn test_in_memory_key_isolation() {
        exercise_key_isolation(&InMemoryLockStore::new());
    }

    #[test]
    fn test_in_memory_unavailable() {
        let store = InMemoryLockStore::new();
        let key = LockKey::new("k");
        store.set_unavailable(true);

        assert!(matches!(store.get(TABLE, &key), Err(StoreError::Unavailable(_))));
        assert!(matches!(
            store.put_if(TABLE, &item(key.clone(), "a"), Expectation::Absent),
            Err(StoreError::Unavailable(_))
        ));

        store.set_unavailable(false);
        store.put_if(TABLE, &item(key, "a"), Expectation::Absent).unwrap();
        assert_eq!(store.len(TABLE), 1);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_conditional_writes() {
        let store = crate::infrastructure_sqlite::SqliteLockStore::open_in_memory().unwrap();
        exercise_conditional_writes(&store);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_key_isolation() {
        let store = crate::infrastructure_sqlite::SqliteLockStore::open_in_memory().unwrap();
        exercise_key_isolation(&store);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_round_trips_tombstones() {
        let store = crate::infrastructure_sqlite::SqliteLockStore::open_in_memory().unwrap();
        let key = LockKey::new("k");
        let mut tombstone = LockItem::acquired(key.clone(), "a", 5000, None, 41, 1000);
        tombstone.is_released = true;

        store.put_if(TABLE, &tombstone, Expectation::Absent).unwrap();
        let read = store.get(TABLE, &key).unwrap().unwrap();
        assert!(read.is_released);
        assert_eq!(read.sequence_number, 41);
        assert_eq!(read.data, None);
    }
}
