//! SQLite reading repository.
//!
//! One row per reading; timestamps are stored as milliseconds since the
//! Unix epoch so range filters compare integers.

use super::{ReadingRepository, StoreError};
use crate::core::reading::Reading;
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Transaction};
use std::path::Path;
use std::sync::Mutex;

const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Repository backed by a single SQLite connection.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open (or create) a database file and bring its schema up to date.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open SQLite database {}", path.display()))?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            tracing::warn!("Failed to enable WAL mode: {err}");
        }
        Self::from_connection(conn)
    }

    /// Transient database, mostly for tests.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> anyhow::Result<Self> {
        run_migrations(&mut conn).context("failed to run database migrations")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Unavailable("database connection poisoned".into()))?;
        f(&conn).map_err(map_sqlite_error)
    }
}

impl ReadingRepository for SqliteRepository {
    fn insert(&self, reading: &Reading) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO readings (
                    user_id, x, y, z, gx, gy, gz, knee_angle, timestamp_ms, prediction
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    reading.user_id,
                    reading.x,
                    reading.y,
                    reading.z,
                    reading.gx,
                    reading.gy,
                    reading.gz,
                    reading.knee_angle,
                    reading.timestamp.timestamp_millis(),
                    reading.prediction,
                ],
            )?;
            Ok(())
        })
    }

    fn find_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<Vec<Reading>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, x, y, z, gx, gy, gz, knee_angle, timestamp_ms, prediction
                FROM readings
                WHERE user_id = ?1 AND timestamp_ms >= ?2
                ORDER BY id ASC",
            )?;

            let rows = stmt.query_map(params![user_id, lower_bound_millis(since)], |row| {
                let timestamp_ms: i64 = row.get(8)?;
                let timestamp = DateTime::from_timestamp_millis(timestamp_ms).ok_or_else(|| {
                    rusqlite::Error::IntegralValueOutOfRange(8, timestamp_ms)
                })?;

                Ok(Reading {
                    user_id: row.get(0)?,
                    x: row.get(1)?,
                    y: row.get(2)?,
                    z: row.get(3)?,
                    gx: row.get(4)?,
                    gy: row.get(5)?,
                    gz: row.get(6)?,
                    knee_angle: row.get(7)?,
                    timestamp,
                    prediction: row.get(9)?,
                })
            })?;

            rows.collect()
        })
    }
}

/// First whole millisecond at or after `since`. Rows hold millisecond
/// timestamps, so flooring a sub-millisecond bound would admit a row older
/// than `since`.
fn lower_bound_millis(since: DateTime<Utc>) -> i64 {
    let millis = since.timestamp_millis();
    if since.timestamp_subsec_nanos() % 1_000_000 == 0 {
        millis
    } else {
        millis + 1
    }
}

fn map_sqlite_error(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if matches!(
                e.code,
                rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
                    | rusqlite::ErrorCode::SystemIoFailure
                    | rusqlite::ErrorCode::NotADatabase
            ) =>
        {
            StoreError::Unavailable(err.to_string())
        }
        other => StoreError::Query(other.to_string()),
    }
}

fn run_migrations(conn: &mut Connection) -> anyhow::Result<()> {
    let mut version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if version > CURRENT_SCHEMA_VERSION {
        bail!(
            "database version ({}) is newer than supported schema ({})",
            version,
            CURRENT_SCHEMA_VERSION
        );
    }

    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;

    while version < CURRENT_SCHEMA_VERSION {
        let next_version = version + 1;
        apply_migration(&tx, next_version)
            .with_context(|| format!("migration to version {next_version} failed"))?;
        version = next_version;
    }

    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> anyhow::Result<()> {
    match version {
        1 => {
            tx.execute_batch(include_str!("schemas/schema_v1.sql"))
                .context("failed to execute schema_v1.sql")?;
            Ok(())
        }
        _ => bail!("no migration defined for version {version}"),
    }
}
