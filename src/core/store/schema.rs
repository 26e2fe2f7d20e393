//! Database schema initialization

use miette::{IntoDiagnostic, Result};
use rusqlite::params;

use super::{LocalStore, SCHEMA_VERSION};

impl LocalStore {
    /// Create any missing tables and stamp the schema version
    pub(super) fn init_schema(&mut self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            -- Wall faces
            CREATE TABLE IF NOT EXISTS faces (
                id TEXT PRIMARY KEY,
                picture_name TEXT,
                picture_width INTEGER,
                picture_height INTEGER,
                has_symmetry INTEGER NOT NULL DEFAULT 0,
                feet_rules TEXT NOT NULL DEFAULT '[]'
            );

            -- Holds; ids are only unique within a face
            CREATE TABLE IF NOT EXISTS holds (
                face_id TEXT NOT NULL,
                id INTEGER NOT NULL,
                polygon_str TEXT NOT NULL DEFAULT '',
                centroid_x REAL NOT NULL DEFAULT 0,
                centroid_y REAL NOT NULL DEFAULT 0,
                area REAL NOT NULL DEFAULT 0,
                PRIMARY KEY (face_id, id)
            );
            CREATE INDEX IF NOT EXISTS idx_holds_id ON holds(id);

            -- Route setters
            CREATE TABLE IF NOT EXISTS setters (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );

            -- Routes
            CREATE TABLE IF NOT EXISTS routes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                holds_list TEXT NOT NULL,
                grade_ircra REAL,
                grade_font TEXT,
                setter_id TEXT,
                face_id TEXT NOT NULL,
                feet_rule TEXT,
                is_private INTEGER NOT NULL DEFAULT 0,
                ascents INTEGER NOT NULL DEFAULT 0,
                likes INTEGER NOT NULL DEFAULT 0,
                comments INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_routes_created ON routes(created_at);
            CREATE INDEX IF NOT EXISTS idx_routes_grade_font ON routes(grade_font);
            CREATE INDEX IF NOT EXISTS idx_routes_setter ON routes(setter_id);
            CREATE INDEX IF NOT EXISTS idx_routes_face ON routes(face_id);

            -- Route/hold association derived from holds_list
            CREATE TABLE IF NOT EXISTS route_holds (
                route_id TEXT NOT NULL,
                hold_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                PRIMARY KEY (route_id, hold_id, role),
                FOREIGN KEY (route_id) REFERENCES routes(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_route_holds_hold ON route_holds(hold_id);

            -- Key/value sync state
            CREATE TABLE IF NOT EXISTS sync_metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
            )
            .into_diagnostic()?;

        self.conn
            .execute("DELETE FROM schema_version", [])
            .into_diagnostic()?;
        self.conn
            .execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )
            .into_diagnostic()?;

        Ok(())
    }
}
