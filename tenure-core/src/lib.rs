//! # tenure-core
//!
//! Lease-based distributed locks for any key-value store with conditional
//! writes. The store's compare-and-swap on a per-item record version is the
//! only synchronization primitive; leases bound how long a crashed holder
//! can block everyone else, and a background heartbeat keeps live holders'
//! leases fresh.

pub mod acquisition;
pub mod client;
pub mod clock;
pub mod error;
pub mod handle;
pub mod heartbeat;
pub mod infrastructure;
#[path = "infrastructure_in_memory.rs"]
pub mod infrastructure_in_memory;
#[cfg(feature = "sqlite")]
#[path = "infrastructure_sqlite.rs"]
pub mod infrastructure_sqlite;
pub mod release;
pub mod types;

pub use client::LockClient;
pub use error::{LockError, Result, StoreError};
pub use handle::LockHandle;

#[cfg(test)]
mod heartbeat_test;
#[cfg(test)]
#[path = "infrastructure_test.rs"]
mod infrastructure_test;
