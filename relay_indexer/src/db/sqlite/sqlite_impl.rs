//! `SqliteDatabase` is the concrete storage backend for the relay indexer.
use std::fmt::Debug;

use alloy_primitives::B256;
use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite, SqlitePool, Transaction};

use super::{db_url, new_pool, orders};
use crate::{db_types::OrderRecord, indexer::IndexerError};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `RELAY_DATABASE_URL`, or the default.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Creates the SQLite database file at `url` if it does not exist yet.
    pub async fn create_if_missing(url: &str) -> Result<(), sqlx::Error> {
        if !Sqlite::database_exists(url).await? {
            Sqlite::create_database(url).await?;
            info!("🗃️ Created Sqlite database {url}");
        }
        Ok(())
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Starts a new unit of work. Nothing is persisted until the transaction is committed; dropping it rolls back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    pub async fn run_migrations(&self) -> Result<(), IndexerError> {
        migrate!("./src/db/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| IndexerError::DatabaseError(e.into()))?;
        info!("🗃️ Migrations complete");
        Ok(())
    }

    pub async fn fetch_order_by_hash(&self, order_hash: &B256) -> Result<Option<OrderRecord>, IndexerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_hash(order_hash, &mut conn).await?;
        Ok(order)
    }
}
