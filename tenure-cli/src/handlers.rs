use serde::{Deserialize, Serialize};

use tenure_core::client::parse_lock_key;
use tenure_core::types::{AcquireOptions, LockItem, LockOwnerInfo, ReleaseOptions};
use tenure_core::LockHandle;

// ─── Request Types ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AcquireLockRequest {
    /// "partition" or "partition#sort"
    pub key: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub replace_data: Option<bool>,
    #[serde(default)]
    pub wait_ms: u64,
    #[serde(default)]
    pub refresh_ms: Option<u64>,
    #[serde(default)]
    pub only_if_absent: bool,
}

impl AcquireLockRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.key.is_empty() || self.key.starts_with('#') {
            return Err("key is required".to_string());
        }
        if self.wait_ms > 0 && self.refresh_ms == Some(0) {
            return Err("refresh_ms must be greater than 0 when wait_ms is set".to_string());
        }
        Ok(())
    }

    pub fn to_options(&self) -> AcquireOptions {
        let mut options = AcquireOptions::new(parse_lock_key(&self.key));
        options.data = self.data.as_ref().map(|d| d.as_bytes().to_vec());
        options.replace_data = self.replace_data.unwrap_or(true);
        options.additional_time_to_wait_ms = self.wait_ms;
        if let Some(refresh_ms) = self.refresh_ms {
            options.refresh_period_ms = refresh_ms;
        }
        options.acquire_only_if_absent = self.only_if_absent;
        options
    }
}

#[derive(Deserialize)]
pub struct ReleaseQuery {
    #[serde(default)]
    pub delete: Option<bool>,
    #[serde(default)]
    pub best_effort: bool,
}

impl ReleaseQuery {
    pub fn to_options(&self) -> ReleaseOptions {
        ReleaseOptions {
            delete_lock: self.delete.unwrap_or(true),
            best_effort: self.best_effort,
            data: None,
        }
    }
}

// ─── Response Types ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            reason: None,
            error: None,
        }
    }

    pub fn err(reason: &str, msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            reason: Some(reason.to_string()),
            error: Some(msg.into()),
        }
    }
}

#[derive(Serialize)]
pub struct LockResponse {
    pub key: String,
    pub owner_name: String,
    pub record_version_number: String,
    pub sequence_number: u64,
    pub lease_duration_ms: u64,
    pub last_updated_ms: u64,
    pub remaining_lease_ms: u64,
    pub status: String,
}

impl LockResponse {
    pub fn from_handle(handle: &LockHandle, now: u64) -> Self {
        let status = format!("{:?}", handle.status()).to_uppercase();
        Self::from_item(&handle.item(), handle.remaining_lease(now), status)
    }

    fn from_item(item: &LockItem, remaining_lease_ms: u64, status: String) -> Self {
        Self {
            key: item.key.to_string(),
            owner_name: item.owner_name.clone(),
            record_version_number: item.record_version_number.clone(),
            sequence_number: item.sequence_number,
            lease_duration_ms: item.lease_duration_ms,
            last_updated_ms: item.last_updated_ms,
            remaining_lease_ms,
            status,
        }
    }
}

#[derive(Serialize)]
pub struct OwnerResponse {
    pub key: String,
    #[serde(flatten)]
    pub info: LockOwnerInfo,
}

#[derive(Serialize)]
pub struct ReleaseResponse {
    pub key: String,
    /// False when the lock had already been lost or released.
    pub released: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub held_locks: usize,
    pub version: String,
}

#[derive(Serialize)]
pub struct HeartbeatResponse {
    pub renewed: bool,
    pub key: String,
    pub record_version_number: String,
}
