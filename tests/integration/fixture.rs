//! Store fixture shared by the integration tests.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use splitlab::experiment::CONVERSION_EVENT_TYPE;
use splitlab::storage::{Database, NewVariant};

/// Fixed reference time so day arithmetic is reproducible.
pub fn reference_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0)
        .single()
        .expect("valid reference time")
}

pub struct TestFixture {
    pub temp_dir: TempDir,
    pub db: Database,
}

impl TestFixture {
    pub fn new(name: &str) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let db = Database::open(temp_dir.path().join("splitlab.db")).expect("open db");
        println!("[FIXTURE] {name}: {}", temp_dir.path().display());
        Self { temp_dir, db }
    }

    pub fn db_path(&self) -> PathBuf {
        self.temp_dir.path().join("splitlab.db")
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Independent connection to the same file, as another process would hold.
    pub fn connect(&self) -> Database {
        Database::open(self.db_path()).expect("reopen db")
    }

    pub fn experiment(&self, name: &str, weights: &[(&str, u32)]) -> String {
        let variants: Vec<_> = weights
            .iter()
            .map(|(variant, weight)| NewVariant::new(*variant, *weight))
            .collect();
        self.db
            .create_experiment(name, &variants, reference_now())
            .expect("create experiment")
            .id
    }

    pub fn users(&self, count: usize) -> Vec<String> {
        (0..count)
            .map(|_| {
                self.db
                    .create_user(None, reference_now())
                    .expect("create user")
                    .id
            })
            .collect()
    }

    pub fn convert(&self, user_id: &str, experiment: &str) {
        self.db
            .log_event(
                user_id,
                CONVERSION_EVENT_TYPE,
                serde_json::json!({ "experiment": experiment }),
                reference_now(),
            )
            .expect("log conversion");
    }
}
