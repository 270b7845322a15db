use serde::{Deserialize, Serialize};

use super::LockKey;
use crate::error::{LockError, Result};

fn default_lease_duration_ms() -> u64 {
    20_000
}

fn default_heartbeat_period_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_refresh_period_ms() -> u64 {
    1_000
}

/// Client-wide configuration. Validated once by [`LockClientOptions::validate`]
/// when the client is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockClientOptions {
    pub table_name: String,
    pub owner_name: String,
    #[serde(default = "default_lease_duration_ms")]
    pub lease_duration_ms: u64,
    #[serde(default = "default_heartbeat_period_ms")]
    pub heartbeat_period_ms: u64,
    #[serde(default = "default_true")]
    pub create_heartbeat_background_thread: bool,
    #[serde(default)]
    pub sequence_id_tracking: bool,
    #[serde(default)]
    pub release_locks_on_close: bool,
}

impl LockClientOptions {
    pub fn new(table_name: impl Into<String>, owner_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            owner_name: owner_name.into(),
            lease_duration_ms: default_lease_duration_ms(),
            heartbeat_period_ms: default_heartbeat_period_ms(),
            create_heartbeat_background_thread: true,
            sequence_id_tracking: false,
            release_locks_on_close: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.table_name.is_empty() {
            return Err(LockError::InvalidConfiguration(
                "table_name is required".to_string(),
            ));
        }
        if self.owner_name.is_empty() {
            return Err(LockError::InvalidConfiguration(
                "owner_name is required".to_string(),
            ));
        }
        if self.lease_duration_ms == 0 {
            return Err(LockError::InvalidConfiguration(
                "lease_duration_ms must be greater than 0".to_string(),
            ));
        }
        if self.heartbeat_period_ms == 0 {
            return Err(LockError::InvalidConfiguration(
                "heartbeat_period_ms must be greater than 0".to_string(),
            ));
        }
        if self.heartbeat_period_ms >= self.lease_duration_ms {
            return Err(LockError::InvalidConfiguration(format!(
                "heartbeat_period_ms ({}) must be less than lease_duration_ms ({})",
                self.heartbeat_period_ms, self.lease_duration_ms
            )));
        }
        Ok(())
    }
}

/// Per-call acquisition options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireOptions {
    pub key: LockKey,
    #[serde(default)]
    pub data: Option<Vec<u8>>,
    /// When false, an existing item's payload survives the takeover.
    #[serde(default = "default_true")]
    pub replace_data: bool,
    /// Wait budget beyond the first attempt. Zero means fail fast.
    #[serde(default)]
    pub additional_time_to_wait_ms: u64,
    #[serde(default = "default_refresh_period_ms")]
    pub refresh_period_ms: u64,
    #[serde(default)]
    pub acquire_only_if_absent: bool,
}

impl AcquireOptions {
    pub fn new(key: impl Into<LockKey>) -> Self {
        Self {
            key: key.into(),
            data: None,
            replace_data: true,
            additional_time_to_wait_ms: 0,
            refresh_period_ms: default_refresh_period_ms(),
            acquire_only_if_absent: false,
        }
    }

    pub fn data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn replace_data(mut self, replace_data: bool) -> Self {
        self.replace_data = replace_data;
        self
    }

    pub fn wait(mut self, additional_time_to_wait_ms: u64, refresh_period_ms: u64) -> Self {
        self.additional_time_to_wait_ms = additional_time_to_wait_ms;
        self.refresh_period_ms = refresh_period_ms;
        self
    }

    pub fn only_if_absent(mut self) -> Self {
        self.acquire_only_if_absent = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.key.partition_key.is_empty() {
            return Err(LockError::InvalidConfiguration(
                "partition_key is required".to_string(),
            ));
        }
        if self.key.sort_key.as_deref() == Some("") {
            return Err(LockError::InvalidConfiguration(
                "sort_key must not be empty; omit it instead".to_string(),
            ));
        }
        if self.additional_time_to_wait_ms > 0 && self.refresh_period_ms == 0 {
            return Err(LockError::InvalidConfiguration(
                "refresh_period_ms must be greater than 0 when waiting".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOptions {
    /// Delete the item instead of leaving a released tombstone.
    #[serde(default = "default_true")]
    pub delete_lock: bool,
    /// Swallow transport failures and treat the lock as released anyway.
    #[serde(default)]
    pub best_effort: bool,
    /// Payload written onto the tombstone. Ignored when deleting.
    #[serde(default)]
    pub data: Option<Vec<u8>>,
}

impl Default for ReleaseOptions {
    fn default() -> Self {
        Self {
            delete_lock: true,
            best_effort: false,
            data: None,
        }
    }
}

impl ReleaseOptions {
    pub fn keep_tombstone() -> Self {
        Self {
            delete_lock: false,
            ..Self::default()
        }
    }
}

/// Options for a manual heartbeat. The background scheduler always uses the
/// defaults, which leave the payload untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatOptions {
    #[serde(default)]
    pub data: Option<Vec<u8>>,
    #[serde(default)]
    pub delete_data: bool,
}
