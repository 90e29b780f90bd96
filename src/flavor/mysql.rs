//! MySQL flavor (via mysql_async)
//! Codes are server error numbers, e.g. `1205` for ER_LOCK_WAIT_TIMEOUT

use super::DatabaseFlavor;
use crate::error::DriverError;
use crate::types::UNKNOWN_ERROR_CODE;
use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts};
use tracing::debug;

pub struct MysqlFlavor {
    pool: Pool,
}

impl MysqlFlavor {
    pub fn connect(url: &str, max_connections: usize) -> Result<Self, DriverError> {
        let max = max_connections.max(1);
        let constraints = PoolConstraints::new(1, max)
            .ok_or_else(|| format!("invalid pool bounds 1..{max}"))?;
        let opts = OptsBuilder::from_opts(Opts::from_url(url)?)
            .pool_opts(PoolOpts::default().with_constraints(constraints));

        debug!("MySQL pool created ({} connections max)", max);
        Ok(Self {
            pool: Pool::new(opts),
        })
    }
}

#[async_trait]
impl DatabaseFlavor for MysqlFlavor {
    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn execute(&self, statement: &str) -> Result<(), DriverError> {
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(statement).await?;
        Ok(())
    }

    fn classify_error(&self, error: &DriverError) -> String {
        match error.downcast_ref::<mysql_async::Error>() {
            Some(mysql_async::Error::Server(server)) => server.code.to_string(),
            _ => UNKNOWN_ERROR_CODE.to_string(),
        }
    }
}
