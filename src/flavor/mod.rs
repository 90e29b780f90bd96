//! Database flavor capability
//!
//! A flavor runs statement text against one database system and owns the mapping from its
//! driver's native errors to stable canonical codes. The job runner only ever sees
//! `(latency, Option<code>)`.

pub mod sqlite;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use sqlite::SqliteFlavor;

use crate::error::{BenchError, ConfigError, DriverError};
use crate::types::QueryOutcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

/// Statement execution against one database system
#[async_trait]
pub trait DatabaseFlavor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one statement to completion, discarding any rows
    async fn execute(&self, statement: &str) -> Result<(), DriverError>;

    /// Map a driver error to a canonical code
    fn classify_error(&self, error: &DriverError) -> String;

    /// Execute and time a statement, classifying any error
    async fn timed_execute(&self, statement: &str) -> QueryOutcome {
        let started = Instant::now();
        let result = self.execute(statement).await;
        let latency = started.elapsed();
        match result {
            Ok(()) => QueryOutcome::success(latency),
            Err(e) => QueryOutcome::error(latency, self.classify_error(&e)),
        }
    }
}

/// Selectable flavor identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlavorKind {
    #[default]
    Sqlite,
    Postgres,
    Mysql,
}

impl FlavorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlavorKind::Sqlite => "sqlite",
            FlavorKind::Postgres => "postgres",
            FlavorKind::Mysql => "mysql",
        }
    }
}

impl std::fmt::Display for FlavorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlavorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(FlavorKind::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(FlavorKind::Postgres),
            "mysql" | "mariadb" | "memsql" | "singlestore" => Ok(FlavorKind::Mysql),
            other => Err(ConfigError::UnknownFlavor(other.to_string())),
        }
    }
}

/// Connection settings shared by every flavor
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// File path for SQLite, connection URL otherwise
    pub database: String,
    /// Upper bound on open connections
    pub max_connections: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            database: sqlite::IN_MEMORY.to_string(),
            max_connections: num_cpus::get(),
        }
    }
}

/// Open the flavor selected by `kind`
pub async fn connect(
    kind: FlavorKind,
    options: &ConnectOptions,
) -> crate::error::Result<Arc<dyn DatabaseFlavor>> {
    info!(
        "Connecting {} flavor ({} connections max)",
        kind, options.max_connections
    );

    let connect_error = |source: DriverError| BenchError::Connect {
        flavor: kind.to_string(),
        source,
    };

    match kind {
        FlavorKind::Sqlite => {
            let flavor = SqliteFlavor::open(&options.database, options.max_connections)
                .map_err(connect_error)?;
            Ok(Arc::new(flavor))
        }
        #[cfg(feature = "postgres")]
        FlavorKind::Postgres => {
            let flavor =
                postgres::PostgresFlavor::connect(&options.database, options.max_connections)
                    .await
                    .map_err(connect_error)?;
            Ok(Arc::new(flavor))
        }
        #[cfg(feature = "mysql")]
        FlavorKind::Mysql => {
            let flavor = mysql::MysqlFlavor::connect(&options.database, options.max_connections)
                .map_err(connect_error)?;
            Ok(Arc::new(flavor))
        }
        #[allow(unreachable_patterns)]
        other => Err(BenchError::FlavorUnavailable(other.to_string())),
    }
}
