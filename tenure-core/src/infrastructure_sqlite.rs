//! SQLite-backed LockStore implementation.
//! Lets several processes on one host share locks through a database file.
//!
//! Enable with the `sqlite` feature flag:
//! ```toml
//! tenure-core = { path = "../tenure-core", features = ["sqlite"] }
//! ```

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::StoreError;
use crate::infrastructure::{Expectation, LockStore};
use crate::types::{LockItem, LockKey};

/// A persistent lock store backed by SQLite.
///
/// Uses WAL mode so readers in other processes are not blocked by writers.
/// Every conditional write is a single statement whose affected-row count
/// decides whether the precondition held.
pub struct SqliteLockStore {
    conn: Mutex<Connection>,
}

impl SqliteLockStore {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        Self::init(conn)
    }

    /// A private, non-persistent database. Mostly useful in tests.
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, rusqlite::Error> {
        // Absent sort keys are stored as '' so they take part in the primary key.
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS locks (
                table_name            TEXT NOT NULL,
                partition_key         TEXT NOT NULL,
                sort_key              TEXT NOT NULL DEFAULT '',
                owner_name            TEXT NOT NULL,
                record_version_number TEXT NOT NULL,
                lease_duration_ms     INTEGER NOT NULL,
                last_updated_ms       INTEGER NOT NULL,
                is_released           INTEGER NOT NULL DEFAULT 0,
                data                  BLOB,
                sequence_number       INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (table_name, partition_key, sort_key)
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sort_key(key: &LockKey) -> &str {
        key.sort_key.as_deref().unwrap_or("")
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<LockItem> {
        let sort_key: String = row.get(1)?;
        Ok(LockItem {
            key: LockKey {
                partition_key: row.get(0)?,
                sort_key: (!sort_key.is_empty()).then_some(sort_key),
            },
            owner_name: row.get(2)?,
            record_version_number: row.get(3)?,
            lease_duration_ms: row.get(4)?,
            last_updated_ms: row.get(5)?,
            is_released: row.get(6)?,
            data: row.get(7)?,
            sequence_number: row.get(8)?,
        })
    }
}

fn unavailable(err: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

impl LockStore for SqliteLockStore {
    fn get(&self, table: &str, key: &LockKey) -> Result<Option<LockItem>, StoreError> {
        self.conn()
            .query_row(
                "SELECT partition_key, sort_key, owner_name, record_version_number,
                        lease_duration_ms, last_updated_ms, is_released, data, sequence_number
                 FROM locks WHERE table_name = ?1 AND partition_key = ?2 AND sort_key = ?3",
                params![table, key.partition_key, Self::sort_key(key)],
                Self::row_to_item,
            )
            .optional()
            .map_err(unavailable)
    }

    fn put_if(
        &self,
        table: &str,
        item: &LockItem,
        expected: Expectation<'_>,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        let rows = match expected {
            Expectation::Absent => conn.execute(
                "INSERT OR IGNORE INTO locks (table_name, partition_key, sort_key, owner_name,
                    record_version_number, lease_duration_ms, last_updated_ms, is_released,
                    data, sequence_number)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    table,
                    item.key.partition_key,
                    Self::sort_key(&item.key),
                    item.owner_name,
                    item.record_version_number,
                    item.lease_duration_ms,
                    item.last_updated_ms,
                    item.is_released,
                    item.data,
                    item.sequence_number,
                ],
            ),
            Expectation::Version(version) => conn.execute(
                "UPDATE locks SET owner_name = ?4, record_version_number = ?5,
                    lease_duration_ms = ?6, last_updated_ms = ?7, is_released = ?8,
                    data = ?9, sequence_number = ?10
                 WHERE table_name = ?1 AND partition_key = ?2 AND sort_key = ?3
                   AND record_version_number = ?11",
                params![
                    table,
                    item.key.partition_key,
                    Self::sort_key(&item.key),
                    item.owner_name,
                    item.record_version_number,
                    item.lease_duration_ms,
                    item.last_updated_ms,
                    item.is_released,
                    item.data,
                    item.sequence_number,
                    version,
                ],
            ),
        }
        .map_err(unavailable)?;

        if rows == 0 {
            Err(StoreError::VersionMismatch)
        } else {
            Ok(())
        }
    }

    fn delete_if(
        &self,
        table: &str,
        key: &LockKey,
        expected_version: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        let rows = conn
            .execute(
                "DELETE FROM locks WHERE table_name = ?1 AND partition_key = ?2
                   AND sort_key = ?3 AND record_version_number = ?4",
                params![table, key.partition_key, Self::sort_key(key), expected_version],
            )
            .map_err(unavailable)?;
        if rows > 0 {
            return Ok(());
        }

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM locks WHERE table_name = ?1
                   AND partition_key = ?2 AND sort_key = ?3)",
                params![table, key.partition_key, Self::sort_key(key)],
                |row| row.get(0),
            )
            .map_err(unavailable)?;
        if exists {
            Err(StoreError::VersionMismatch)
        } else {
            Err(StoreError::NotFound)
        }
    }
}
