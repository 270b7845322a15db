use serde::{Deserialize, Serialize};

/// Identifies a lock in its table: a partition key plus an optional sort key
/// for tables that use composite keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockKey {
    pub partition_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<String>,
}

impl LockKey {
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    pub fn with_sort_key(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: Some(sort_key.into()),
        }
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sort_key {
            Some(sort_key) => write!(f, "{}#{}", self.partition_key, sort_key),
            None => write!(f, "{}", self.partition_key),
        }
    }
}

impl From<&str> for LockKey {
    fn from(partition_key: &str) -> Self {
        Self::new(partition_key)
    }
}

impl From<String> for LockKey {
    fn from(partition_key: String) -> Self {
        Self::new(partition_key)
    }
}

/// Generates a fresh record version token. Every write to a lock item
/// carries a new one.
pub fn new_record_version() -> String {
    nanoid::nanoid!()
}
