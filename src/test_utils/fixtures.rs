use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use crate::storage::Database;

/// File-backed store in an isolated temp directory.
pub struct StoreFixture {
    pub temp_dir: TempDir,
    pub db_path: PathBuf,
    pub db: Database,
}

impl Default for StoreFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreFixture {
    #[must_use]
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("splitlab.db");
        let db = Database::open(&db_path).expect("Failed to open fixture database");
        println!("[FIXTURE] Created store: {db_path:?}");
        Self {
            temp_dir,
            db_path,
            db,
        }
    }

    /// Create `count` users signed up at `at`, returning their ids.
    pub fn users(&self, count: usize, at: DateTime<Utc>) -> Vec<String> {
        (0..count)
            .map(|_| self.db.create_user(None, at).expect("Failed to create user").id)
            .collect()
    }
}
