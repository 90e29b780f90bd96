//! SQLite flavor (via rusqlite)
//!
//! Connections are plain blocking rusqlite handles, so every statement runs on the blocking
//! pool. Each slot in the pool is guarded by its own mutex and picked round-robin.

use super::DatabaseFlavor;
use crate::error::DriverError;
use crate::types::UNKNOWN_ERROR_CODE;
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, OpenFlags};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Database name that opens a private in-memory database
pub const IN_MEMORY: &str = ":memory:";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteFlavor {
    connections: Vec<Arc<Mutex<Connection>>>,
    next: AtomicUsize,
}

impl SqliteFlavor {
    /// Open `pool_size` connections to `database`.
    ///
    /// `:memory:` databases are private to a connection, so they always get a single one.
    pub fn open(database: &str, pool_size: usize) -> Result<Self, DriverError> {
        let pool_size = if database == IN_MEMORY {
            1
        } else {
            pool_size.max(1)
        };

        let mut connections = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let conn = if database == IN_MEMORY {
                Connection::open_in_memory()?
            } else {
                Connection::open_with_flags(
                    database,
                    OpenFlags::SQLITE_OPEN_READ_WRITE
                        | OpenFlags::SQLITE_OPEN_CREATE
                        | OpenFlags::SQLITE_OPEN_URI
                        | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?
            };
            conn.busy_timeout(BUSY_TIMEOUT)?;
            connections.push(Arc::new(Mutex::new(conn)));
        }

        debug!("Opened {} SQLite connection(s) to {}", pool_size, database);
        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.connections.len()
    }

    fn pick(&self) -> Arc<Mutex<Connection>> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[index].clone()
    }
}

/// Step a statement until it is exhausted so reads pay for every row
fn run_statement(conn: &Connection, statement: &str) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(statement)?;
    let mut rows = stmt.query([])?;
    while rows.next()?.is_some() {}
    Ok(())
}

/// Canonical code for a rusqlite error
pub fn error_code(error: &rusqlite::Error) -> String {
    match error {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::DatabaseBusy => "SQLITE_BUSY".to_string(),
            ErrorCode::DatabaseLocked => "SQLITE_LOCKED".to_string(),
            ErrorCode::ConstraintViolation => "SQLITE_CONSTRAINT".to_string(),
            ErrorCode::ReadOnly => "SQLITE_READONLY".to_string(),
            ErrorCode::DiskFull => "SQLITE_FULL".to_string(),
            ErrorCode::SchemaChanged => "SQLITE_SCHEMA".to_string(),
            ErrorCode::OperationInterrupted => "SQLITE_INTERRUPT".to_string(),
            ErrorCode::TypeMismatch => "SQLITE_MISMATCH".to_string(),
            _ => format!("SQLITE_{}", failure.extended_code),
        },
        _ => UNKNOWN_ERROR_CODE.to_string(),
    }
}

#[async_trait]
impl DatabaseFlavor for SqliteFlavor {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn execute(&self, statement: &str) -> Result<(), DriverError> {
        let conn = self.pick();
        let statement = statement.to_string();
        tokio::task::spawn_blocking(move || run_statement(&conn.lock(), &statement))
            .await??;
        Ok(())
    }

    fn classify_error(&self, error: &DriverError) -> String {
        match error.downcast_ref::<rusqlite::Error>() {
            Some(e) => error_code(e),
            None => UNKNOWN_ERROR_CODE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_and_read_back() {
        let flavor = SqliteFlavor::open(IN_MEMORY, 8).unwrap();
        assert_eq!(flavor.pool_size(), 1);

        flavor
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)")
            .await
            .unwrap();
        flavor.execute("INSERT INTO t (id, v) VALUES (1, 'a')").await.unwrap();
        flavor.execute("SELECT * FROM t").await.unwrap();

        let outcome = flavor.timed_execute("SELECT count(*) FROM t").await;
        assert_eq!(outcome.error_code, None);
    }

    #[tokio::test]
    async fn test_constraint_violation_is_classified() {
        let flavor = SqliteFlavor::open(IN_MEMORY, 1).unwrap();
        flavor
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .await
            .unwrap();
        flavor.execute("INSERT INTO t VALUES (1)").await.unwrap();

        let outcome = flavor.timed_execute("INSERT INTO t VALUES (1)").await;
        assert_eq!(outcome.error_code.as_deref(), Some("SQLITE_CONSTRAINT"));
    }

    #[tokio::test]
    async fn test_syntax_error_gets_a_code() {
        let flavor = SqliteFlavor::open(IN_MEMORY, 1).unwrap();
        let outcome = flavor.timed_execute("SELEKT 1").await;
        let code = outcome.error_code.unwrap();
        assert!(code.starts_with("SQLITE_") || code == UNKNOWN_ERROR_CODE, "{code}");
    }

    #[test]
    fn test_foreign_errors_are_unknown() {
        let flavor = SqliteFlavor::open(IN_MEMORY, 1).unwrap();
        let err: DriverError = "boom".into();
        assert_eq!(flavor.classify_error(&err), UNKNOWN_ERROR_CODE);
    }
}
