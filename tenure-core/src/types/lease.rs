use serde::{Deserialize, Serialize};

use super::LockKey;

/// The persisted state of a lock, as stored in (and read back from) a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockItem {
    pub key: LockKey,
    /// Identity of the process that last wrote the item. Diagnostic only.
    pub owner_name: String,
    /// Fencing value for conditional writes; changes on every write.
    pub record_version_number: String,
    pub lease_duration_ms: u64,
    /// Writer's clock reading at the time of the write.
    pub last_updated_ms: u64,
    /// Tombstone flag left behind by a release that does not delete.
    #[serde(default)]
    pub is_released: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    #[serde(default)]
    pub sequence_number: u64,
}

impl LockItem {
    /// Builds the item written by a successful acquisition.
    pub fn acquired(
        key: LockKey,
        owner_name: impl Into<String>,
        lease_duration_ms: u64,
        data: Option<Vec<u8>>,
        sequence_number: u64,
        now: u64,
    ) -> Self {
        Self {
            key,
            owner_name: owner_name.into(),
            record_version_number: super::new_record_version(),
            lease_duration_ms,
            last_updated_ms: now,
            is_released: false,
            data,
            sequence_number,
        }
    }

    /// Same item with a fresh version and timestamp; used for renewals
    /// and tombstones.
    pub fn rewritten(&self, now: u64) -> Self {
        Self {
            record_version_number: super::new_record_version(),
            last_updated_ms: now,
            ..self.clone()
        }
    }
}

/// What a caller can learn about a lock without holding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwnerInfo {
    pub owner_name: String,
    pub is_expired: bool,
    pub is_released: bool,
    pub sequence_number: u64,
}

/// Local view of a held lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockStatus {
    /// Held, as far as this process knows
    Held,
    /// Superseded by another writer or presumed lost after a missed lease
    Lost,
    /// Explicitly released by this process
    Released,
}
