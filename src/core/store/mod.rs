//! SQLite-backed local snapshot of one remote source
//!
//! Each remote source gets its own database file. The store:
//! - Upserts routes, holds, faces and setters by primary key
//! - Keeps the `route_holds` association in step with each route's `holds_list`
//! - Tracks sync metadata such as the `last_sync` timestamp
//!
//! Schema changes are not migrated: a version mismatch drops and recreates every
//! table, and the next sync repopulates them.

mod faces;
mod routes;
mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use miette::{IntoDiagnostic, Result};
use rusqlite::{params, Connection, OptionalExtension};

/// Current schema version - tables are recreated on mismatch
const SCHEMA_VERSION: i32 = 3;

const LAST_SYNC_KEY: &str = "last_sync";

/// Row counts across the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub routes: usize,
    pub holds: usize,
    pub faces: usize,
    pub setters: usize,
}

/// Local persistent store backed by SQLite
pub struct LocalStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// Open or create the store at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).into_diagnostic()?;
        }

        let conn = Connection::open(path).into_diagnostic()?;

        // WAL lets `status` read while a sync is writing
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .into_diagnostic()?;

        let mut store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.prepare_schema()?;

        tracing::debug!(path = %path.display(), "opened local store");
        Ok(store)
    }

    /// Store that lives only as long as the value
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().into_diagnostic()?;
        let mut store = Self { conn, path: None };
        store.prepare_schema()?;
        Ok(store)
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn prepare_schema(&mut self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys=ON;")
            .into_diagnostic()?;

        if self.needs_schema_rebuild()? {
            self.reinitialize_schema()?;
        } else {
            self.init_schema()?;
        }
        Ok(())
    }

    /// Check if the stored schema version matches this build
    fn needs_schema_rebuild(&self) -> Result<bool> {
        let has_version_table: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .into_diagnostic()?
            > 0;

        if !has_version_table {
            return Ok(false);
        }

        let current_version: i32 = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        Ok(current_version != SCHEMA_VERSION)
    }

    /// Drop all tables and recreate them at the current version
    fn reinitialize_schema(&mut self) -> Result<()> {
        tracing::info!(version = SCHEMA_VERSION, "local store schema changed, recreating");
        self.conn
            .execute_batch(
                r#"
                DROP TABLE IF EXISTS route_holds;
                DROP TABLE IF EXISTS routes;
                DROP TABLE IF EXISTS holds;
                DROP TABLE IF EXISTS faces;
                DROP TABLE IF EXISTS setters;
                DROP TABLE IF EXISTS sync_metadata;
                DROP TABLE IF EXISTS schema_version;
                "#,
            )
            .into_diagnostic()?;

        self.init_schema()
    }

    /// Remove every route, hold, face, setter and metadata entry
    pub fn clear_all(&mut self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
                DELETE FROM route_holds;
                DELETE FROM routes;
                DELETE FROM holds;
                DELETE FROM faces;
                DELETE FROM setters;
                DELETE FROM sync_metadata;
                "#,
            )
            .into_diagnostic()?;
        Ok(())
    }

    // =========================================================================
    // Sync metadata
    // =========================================================================

    pub fn get_metadata(&self, key: &str) -> Option<String> {
        self.conn
            .query_row(
                "SELECT value FROM sync_metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .ok()
            .flatten()
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_metadata (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .into_diagnostic()?;
        Ok(())
    }

    /// Time of the last successful sync, `None` before the first one
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.get_metadata(LAST_SYNC_KEY)
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn set_last_sync(&self, at: DateTime<Utc>) -> Result<()> {
        self.set_metadata(LAST_SYNC_KEY, &format_datetime(at))
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    pub fn route_count(&self) -> usize {
        self.count_rows("routes")
    }

    pub fn hold_count(&self) -> usize {
        self.count_rows("holds")
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            routes: self.route_count(),
            holds: self.hold_count(),
            faces: self.count_rows("faces"),
            setters: self.count_rows("setters"),
        }
    }

    fn count_rows(&self, table: &str) -> usize {
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as usize)
            .unwrap_or(0)
    }
}

/// Timestamps are stored with a fixed-width UTC form so text order is time order
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse datetime from a stored string
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}
