//! # SQLite storage for the relay indexer
//!
//! The functions in [`orders`] are "low-level" SQLite interactions. They are simple functions (rather than stateful
//! structs) that accept a `&mut SqliteConnection` argument. Callers can obtain a connection from a pool, or create an
//! atomic transaction as the need arises and call through to the functions without any other changes.
//!
//! [`SqliteDatabase`] owns the connection pool and hands out units of work.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod orders;
mod sqlite_impl;

pub use sqlite_impl::SqliteDatabase;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/relay_orders.db";

pub fn db_url() -> String {
    let result = env::var("RELAY_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ RELAY_DATABASE_URL is not set. Using the default.");
        DEFAULT_DATABASE_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
