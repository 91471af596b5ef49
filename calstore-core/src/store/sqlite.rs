//! SQLite backend.
//!
//! # Invariants
//! - Connections have `foreign_keys=ON`, so dropping a calendar row drops its events.
//! - `(owner, uri)` and `(calendar_id, uri)` are unique at the table level.

use std::path::Path;
use std::time::{Duration, Instant};

use log::{error, info};
use rusqlite::{Connection, OptionalExtension, params};

use super::{
    BackendError, BackendResult, ContainerRecord, PrimaryMeta, PrimaryRecord, StorageBackend,
};

const CREATE_SQL: &str = include_str!("sql/create.sql");
const DROP_SQL: &str = include_str!("sql/drop.sql");

pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> BackendResult<Self> {
        Self::bootstrap(Connection::open(path), "file")
    }

    pub fn open_in_memory() -> BackendResult<Self> {
        Self::bootstrap(Connection::open_in_memory(), "memory")
    }

    fn bootstrap(opened: rusqlite::Result<Connection>, mode: &str) -> BackendResult<Self> {
        let started_at = Instant::now();
        info!("event=db_open module=store status=start mode={}", mode);

        let result = opened.and_then(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.busy_timeout(Duration::from_secs(5))?;
            Ok(conn)
        });

        match result {
            Ok(conn) => {
                info!(
                    "event=db_open module=store status=ok mode={} duration_ms={}",
                    mode,
                    started_at.elapsed().as_millis()
                );
                Ok(SqliteBackend { conn })
            }
            Err(err) => {
                error!(
                    "event=db_open module=store status=error mode={} duration_ms={} error_code=db_open_failed",
                    mode,
                    started_at.elapsed().as_millis()
                );
                Err(err.into())
            }
        }
    }
}

fn expect_one_row(changed: usize, what: &str, id: i64) -> BackendResult<()> {
    if changed == 0 {
        return Err(BackendError::NotFound(format!("{} {}", what, id)));
    }
    Ok(())
}

impl StorageBackend for SqliteBackend {
    fn create_schema(&mut self) -> BackendResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(CREATE_SQL)?;
        tx.commit()?;
        Ok(())
    }

    fn drop_schema(&mut self) -> BackendResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(DROP_SQL)?;
        tx.commit()?;
        Ok(())
    }

    fn create_container(&mut self, owner: &str, key: &str, props: &str) -> BackendResult<i64> {
        self.conn.execute(
            "INSERT INTO calendars (owner, uri, props) VALUES (?1, ?2, ?3);",
            params![owner, key, props],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_container(&mut self, id: i64, props: &str) -> BackendResult<()> {
        let changed = self.conn.execute(
            "UPDATE calendars SET props = ?1 WHERE id = ?2;",
            params![props, id],
        )?;
        expect_one_row(changed, "calendar", id)
    }

    fn create_primary(
        &mut self,
        container_id: i64,
        key: &str,
        document: &[u8],
    ) -> BackendResult<i64> {
        self.conn.execute(
            "INSERT INTO events (calendar_id, uri, document) VALUES (?1, ?2, ?3);",
            params![container_id, key, document],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_primary(&mut self, id: i64, document: &[u8]) -> BackendResult<()> {
        let changed = self.conn.execute(
            "UPDATE events SET document = ?1 WHERE id = ?2;",
            params![document, id],
        )?;
        expect_one_row(changed, "event", id)
    }

    fn list_containers_for_owner(&self, owner: &str) -> BackendResult<Vec<ContainerRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, owner, uri, props FROM calendars WHERE owner = ?1 ORDER BY id;",
        )?;
        let rows = stmt.query_map(params![owner], |row| {
            Ok(ContainerRecord {
                id: row.get(0)?,
                owner: row.get(1)?,
                key: row.get(2)?,
                props: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn list_primaries(&self, container_id: i64) -> BackendResult<Vec<PrimaryMeta>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, uri FROM events WHERE calendar_id = ?1 ORDER BY id;")?;
        let rows = stmt.query_map(params![container_id], |row| {
            Ok(PrimaryMeta {
                id: row.get(0)?,
                key: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn fetch_primaries(
        &self,
        container_id: i64,
        keys: &[String],
    ) -> BackendResult<Vec<PrimaryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uri, document FROM events WHERE calendar_id = ?1 AND uri = ?2;",
        )?;

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let record = stmt
                .query_row(params![container_id, key], |row| {
                    Ok(PrimaryRecord {
                        id: row.get(0)?,
                        key: row.get(1)?,
                        document: row.get(2)?,
                    })
                })
                .optional()?;
            records.extend(record);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SqliteBackend {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        backend.create_schema().unwrap();
        backend
    }

    #[test]
    fn container_key_is_unique_per_owner() {
        let mut backend = backend();
        backend.create_container("alice", "work", "[]").unwrap();
        backend.create_container("bob", "work", "[]").unwrap();

        let err = backend.create_container("alice", "work", "[]").unwrap_err();
        assert!(matches!(err, BackendError::Failure(_)));
    }

    #[test]
    fn primaries_are_fetched_by_key() {
        let mut backend = backend();
        let cal = backend.create_container("alice", "work", "[]").unwrap();
        backend.create_primary(cal, "standup", b"A").unwrap();
        backend.create_primary(cal, "retro", b"B").unwrap();

        let fetched = backend
            .fetch_primaries(cal, &["retro".to_string(), "missing".to_string()])
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].key, "retro");
        assert_eq!(fetched[0].document, b"B".to_vec());

        let listed: Vec<String> = backend
            .list_primaries(cal)
            .unwrap()
            .into_iter()
            .map(|m| m.key)
            .collect();
        assert_eq!(listed, vec!["standup", "retro"]);
    }

    #[test]
    fn updating_missing_row_is_not_found() {
        let mut backend = backend();
        let err = backend.update_primary(42, b"x").unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[test]
    fn drop_schema_removes_tables() {
        let mut backend = backend();
        backend.drop_schema().unwrap();

        let err = backend.list_containers_for_owner("alice").unwrap_err();
        assert!(matches!(err, BackendError::Failure(_)));
    }
}
