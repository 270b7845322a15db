use crate::error::StoreError;
use crate::infrastructure::{Expectation, LockStore};
use crate::types::{LockItem, LockKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A process-local store with the same conditional-write semantics as a real
/// backend. Several clients sharing one instance behave like several
/// processes sharing one table.
#[derive(Default)]
pub struct InMemoryLockStore {
    // (table, key) -> item
    items: Mutex<HashMap<(String, LockKey), LockItem>>,
    unavailable: AtomicBool,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Unconditional write, standing in for a foreign writer.
    pub fn overwrite(&self, table: &str, item: LockItem) {
        self.items()
            .insert((table.to_string(), item.key.clone()), item);
    }

    /// Number of items (tombstones included) in `table`.
    pub fn len(&self, table: &str) -> usize {
        self.items().keys().filter(|(t, _)| t == table).count()
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    fn items(&self) -> MutexGuard<'_, HashMap<(String, LockKey), LockItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl LockStore for InMemoryLockStore {
    fn get(&self, table: &str, key: &LockKey) -> Result<Option<LockItem>, StoreError> {
        self.check_available()?;
        Ok(self.items().get(&(table.to_string(), key.clone())).cloned())
    }

    fn put_if(
        &self,
        table: &str,
        item: &LockItem,
        expected: Expectation<'_>,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut items = self.items();
        let slot = (table.to_string(), item.key.clone());

        let matches = match (items.get(&slot), expected) {
            (None, Expectation::Absent) => true,
            (Some(current), Expectation::Version(version)) => {
                current.record_version_number == version
            }
            _ => false,
        };
        if !matches {
            return Err(StoreError::VersionMismatch);
        }

        items.insert(slot, item.clone());
        Ok(())
    }

    fn delete_if(
        &self,
        table: &str,
        key: &LockKey,
        expected_version: &str,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut items = self.items();
        let slot = (table.to_string(), key.clone());

        match items.get(&slot) {
            None => Err(StoreError::NotFound),
            Some(current) if current.record_version_number != expected_version => {
                Err(StoreError::VersionMismatch)
            }
            Some(_) => {
                items.remove(&slot);
                Ok(())
            }
        }
    }
}
