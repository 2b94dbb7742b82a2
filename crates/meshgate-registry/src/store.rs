//! SQLite persistence for Local and Beaconed registrations
//!
//! Each source has its own table of `(device_id, call_sign, icon, timestamp)`
//! rows. Inserting a row first deletes any prior row for the same device or
//! call sign, inside one transaction, so each table holds only the most
//! recent fact per identity.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::event::{Registration, Source};

/// Schema version written to `VersionInfo` on creation
pub const DB_VERSION: i64 = 1;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS VersionInfo (
        db_version INTEGER,
        package_version TEXT
    )",
    "CREATE TABLE IF NOT EXISTS LocalRegistrations (
        device_id TEXT UNIQUE,
        call_sign TEXT UNIQUE,
        icon TEXT,
        timestamp REAL
    )",
    "CREATE TABLE IF NOT EXISTS BeaconedRegistrations (
        device_id TEXT UNIQUE,
        call_sign TEXT UNIQUE,
        icon TEXT,
        timestamp REAL
    )",
];

fn table(source: Source) -> Result<&'static str> {
    match source {
        Source::Local => Ok("LocalRegistrations"),
        Source::Beaconed => Ok("BeaconedRegistrations"),
        other => Err(RegistryError::InvalidArgument(format!(
            "{other:?} registrations are not persisted"
        ))),
    }
}

/// Durable store of Local and Beaconed registrations
#[derive(Debug, Clone)]
pub struct RegistrationStore {
    pool: SqlitePool,
}

impl RegistrationStore {
    /// Open (creating if needed) the database at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        debug!(path = %path.display(), "Opened registration database");
        Ok(store)
    }

    /// Open a private in-memory database
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM VersionInfo")
            .fetch_one(&self.pool)
            .await?;
        if rows == 0 {
            sqlx::query("INSERT INTO VersionInfo (db_version, package_version) VALUES (?, ?)")
                .bind(DB_VERSION)
                .bind(env!("CARGO_PKG_VERSION"))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Schema and package version recorded when the database was created
    pub async fn version_info(&self) -> Result<(i64, String)> {
        let row = sqlx::query_as("SELECT db_version, package_version FROM VersionInfo LIMIT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    /// Persist a Local or Beaconed event, superseding older rows
    pub async fn insert(&self, event: &Registration) -> Result<()> {
        let table = table(event.source)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "DELETE FROM {table} WHERE device_id = ? OR call_sign = ?"
        ))
        .bind(event.device_id.as_deref())
        .bind(event.call_sign.as_deref())
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "INSERT INTO {table} (device_id, call_sign, icon, timestamp) VALUES (?, ?, ?, ?)"
        ))
        .bind(event.device_id.as_deref())
        .bind(event.call_sign.as_deref())
        .bind(event.icon.as_deref())
        .bind(event.timestamp)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// All rows of one source
    pub async fn load(&self, source: Source) -> Result<Vec<Registration>> {
        let table = table(source)?;
        let rows: Vec<(Option<String>, Option<String>, Option<String>, f64)> =
            sqlx::query_as(&format!(
                "SELECT device_id, call_sign, icon, timestamp FROM {table}"
            ))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(device_id, call_sign, icon, timestamp)| {
                Registration::new(device_id, call_sign, icon, timestamp, source)
            })
            .collect())
    }

    /// Beaconed rows followed by Local rows
    pub async fn load_all(&self) -> Result<Vec<Registration>> {
        let mut events = self.load(Source::Beaconed).await?;
        events.extend(self.load(Source::Local).await?);
        Ok(events)
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
