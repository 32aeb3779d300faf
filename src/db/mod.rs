mod agent_ops;
mod catalog_ops;
mod mappers;
mod patch_ops;
mod reboot_ops;
mod schedule_ops;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::error::{FleetError, Result};

pub const SCHEMA_SQL: &str = include_str!("schema.sql");

/// PostgreSQL-backed record store.
#[derive(Clone)]
pub struct FleetDb {
    pool: PgPool,
}

impl FleetDb {
    /// # Errors
    /// Returns an error if the pool cannot connect.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;

        info!(max_connections, "Connected to PostgreSQL fleet database");
        Ok(Self { pool })
    }

    /// Create a new `FleetDb` with an existing pool (for testing).
    #[must_use]
    pub const fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// # Errors
    /// Returns an error if the schema statements fail.
    pub async fn initialize_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(|e| FleetError::Database(format!("Failed to initialize schema: {e}")))
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .is_some_and(|code| code == "23505")
}

pub(crate) fn db_error(context: &str) -> impl FnOnce(sqlx::Error) -> FleetError + '_ {
    move |e| FleetError::Database(format!("{context}: {e}"))
}
