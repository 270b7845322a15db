use crate::error::StoreError;
use crate::types::{LockItem, LockKey};

/// Precondition for a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation<'a> {
    /// No item may exist for the key.
    Absent,
    /// The stored item must carry exactly this record version.
    Version(&'a str),
}

/// The contract a key-value backend must satisfy to host locks: a read and
/// two compare-and-swap writes. Transport retries, if any, live below this
/// trait.
pub trait LockStore: Send + Sync {
    /// Read the current item for `key`. Absence is `Ok(None)`.
    fn get(&self, table: &str, key: &LockKey) -> Result<Option<LockItem>, StoreError>;

    /// Write `item` only if the stored state matches `expected`, atomically.
    /// A failed precondition is [`StoreError::VersionMismatch`].
    fn put_if(
        &self,
        table: &str,
        item: &LockItem,
        expected: Expectation<'_>,
    ) -> Result<(), StoreError>;

    /// Delete the item only if it carries `expected_version`.
    /// A missing item is [`StoreError::NotFound`].
    fn delete_if(
        &self,
        table: &str,
        key: &LockKey,
        expected_version: &str,
    ) -> Result<(), StoreError>;
}
