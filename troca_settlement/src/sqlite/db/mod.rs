//! # SQLite database methods
//!
//! This module contains the "low-level" SQLite interactions.
//!
//! All of these are simple functions (rather than stateful structs) that accept a `&mut SqliteConnection` argument.
//! Callers can obtain a connection from a pool, or open a transaction and pass `&mut *tx` when several of them must
//! commit or roll back together — the escrow release and refund paths rely on exactly that.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod escrows;
pub mod payments;
pub mod reputation;
pub mod trades;

const SQLITE_DB_URL: &str = "sqlite://data/troca_settlement.db";

pub fn db_url() -> String {
    let result = env::var("TROCA_DATABASE_URL").unwrap_or_else(|_| {
        info!("TROCA_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
