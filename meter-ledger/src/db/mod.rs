pub mod ledger_queries;
pub mod registry_queries;

use std::path::Path;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// Open (or create) the SQLite database file behind a connection pool.
///
/// Every query acquires a pooled connection for the duration of the call, so
/// release happens on all exit paths, including errors.
pub async fn connect<P: AsRef<Path>>(path: P, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create the tables if they are not present. Safe to run on every startup.
///
/// `meter_id` on `readings` is treated as a reference into `meters` but is
/// deliberately not declared as a foreign key; reporting joins enforce the
/// relationship instead.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meters (
            meter_id TEXT PRIMARY KEY,
            location TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS readings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meter_id TEXT NOT NULL,
            opening REAL NOT NULL,
            closing REAL NOT NULL,
            consumption REAL NOT NULL,
            user TEXT NOT NULL,
            date TEXT NOT NULL,
            photo TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
