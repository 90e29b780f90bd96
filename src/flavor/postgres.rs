//! Postgres flavor (via tokio-postgres)
//! Codes are SQLSTATE strings, e.g. `40P01` for deadlock_detected

use super::DatabaseFlavor;
use crate::error::DriverError;
use crate::types::UNKNOWN_ERROR_CODE;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

pub struct PostgresFlavor {
    clients: Vec<Client>,
    next: AtomicUsize,
}

impl PostgresFlavor {
    pub async fn connect(dsn: &str, pool_size: usize) -> Result<Self, DriverError> {
        let pool_size = pool_size.max(1);
        let mut clients = Vec::with_capacity(pool_size);

        for id in 0..pool_size {
            let (client, connection) = tokio_postgres::connect(dsn, NoTls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    warn!("Postgres connection {} closed: {}", id, e);
                }
            });
            clients.push(client);
        }

        debug!("Opened {} Postgres connection(s)", pool_size);
        Ok(Self {
            clients,
            next: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DatabaseFlavor for PostgresFlavor {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn execute(&self, statement: &str) -> Result<(), DriverError> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        // Simple query protocol: rows are received and dropped
        self.clients[index].batch_execute(statement).await?;
        Ok(())
    }

    fn classify_error(&self, error: &DriverError) -> String {
        error
            .downcast_ref::<tokio_postgres::Error>()
            .and_then(|e| e.code())
            .map(|state| state.code().to_string())
            .unwrap_or_else(|| UNKNOWN_ERROR_CODE.to_string())
    }
}
