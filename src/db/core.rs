use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Pool, Sqlite,
};
use std::str::FromStr;
use tokio::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::TARGET_DB;

/// Path that selects a private in-memory database
pub const MEMORY_DATABASE: &str = ":memory:";

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Get access to the database pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

impl Database {
    /// Open (creating if needed) the database at `database_path` and make sure
    /// the schema exists. `:memory:` gives a throwaway database.
    #[instrument(target = "db", level = "info")]
    pub async fn new(database_path: &str) -> Result<Self> {
        info!(target: TARGET_DB, "Creating database pool for: {}", database_path);

        let pool = if database_path == MEMORY_DATABASE {
            // Every connection to :memory: is its own database, so keep exactly one alive
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true))
                .await?
        } else {
            let connect_options = SqliteConnectOptions::from_str(&format!("sqlite://{}", database_path))?
                .create_if_missing(true)
                .foreign_keys(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5))
                .synchronous(SqliteSynchronous::Normal);

            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(connect_options)
                .await
                .with_context(|| format!("Failed to open database {}", database_path))?
        };

        info!(target: TARGET_DB, "Database pool created");

        // Initialize schema
        let db = Database { pool };
        db.initialize_schema().await.context("Failed to initialize schema")?;

        Ok(db)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::new(MEMORY_DATABASE).await
    }
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| anyhow!("Invalid id '{}' in database: {}", value, e))
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| anyhow!("Invalid timestamp '{}' in database: {}", value, e))
}

/// `?, ?, ?` for binding a list of values into an `IN (...)` clause
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
