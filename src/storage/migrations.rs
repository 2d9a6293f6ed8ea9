//! Schema migrations tracked through `PRAGMA user_version`.

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: u32 = 2;

const MIGRATIONS: &[(u32, &str)] = &[
    (
        1,
        "CREATE TABLE IF NOT EXISTS users (
             id TEXT PRIMARY KEY,
             email TEXT UNIQUE,
             created_at TEXT NOT NULL,
             churn_probability REAL
         );

         CREATE TABLE IF NOT EXISTS experiments (
             id TEXT PRIMARY KEY,
             name TEXT NOT NULL UNIQUE,
             is_active INTEGER NOT NULL DEFAULT 1,
             created_at TEXT NOT NULL
         );

         CREATE TABLE IF NOT EXISTS variants (
             id TEXT PRIMARY KEY,
             experiment_id TEXT NOT NULL REFERENCES experiments(id) ON DELETE CASCADE,
             name TEXT NOT NULL,
             traffic_percentage INTEGER NOT NULL CHECK (traffic_percentage >= 0),
             position INTEGER NOT NULL,
             UNIQUE (experiment_id, name),
             UNIQUE (experiment_id, position)
         );

         CREATE TABLE IF NOT EXISTS assignments (
             id TEXT PRIMARY KEY,
             user_id TEXT NOT NULL REFERENCES users(id),
             experiment_id TEXT NOT NULL REFERENCES experiments(id),
             variant_id TEXT NOT NULL REFERENCES variants(id),
             assigned_at TEXT NOT NULL,
             UNIQUE (user_id, experiment_id)
         );

         CREATE TABLE IF NOT EXISTS events (
             id TEXT PRIMARY KEY,
             user_id TEXT NOT NULL REFERENCES users(id),
             event_type TEXT NOT NULL,
             payload TEXT NOT NULL DEFAULT '{}',
             timestamp TEXT NOT NULL
         );",
    ),
    (
        2,
        "CREATE INDEX IF NOT EXISTS idx_assignments_variant ON assignments(variant_id);
         CREATE INDEX IF NOT EXISTS idx_events_user_ts ON events(user_id, timestamp);
         CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
         CREATE INDEX IF NOT EXISTS idx_users_created ON users(created_at);",
    ),
];

/// Apply pending migrations and return the resulting schema version.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    let current: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        tracing::debug!(target: "storage", version, "applying migration");
        conn.execute_batch(&format!(
            "BEGIN;\n{sql}\nPRAGMA user_version = {version};\nCOMMIT;"
        ))?;
    }

    let version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
