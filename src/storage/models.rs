//! Row types for the experiment store.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Last computed churn probability; `None` until the first refresh.
    pub churn_probability: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRecord {
    pub id: String,
    pub experiment_id: String,
    pub name: String,
    /// Share of traffic in percent. Intended to sum to 100 per experiment.
    pub traffic_percentage: u32,
    /// Stored order used when walking cumulative weights.
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub id: String,
    pub user_id: String,
    pub experiment_id: String,
    pub variant_id: String,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub user_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Variant definition supplied when creating an experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVariant {
    pub name: String,
    pub traffic_percentage: u32,
}

impl NewVariant {
    pub fn new(name: impl Into<String>, traffic_percentage: u32) -> Self {
        Self {
            name: name.into(),
            traffic_percentage,
        }
    }
}

/// Per-user aggregate over events and assignments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserActivity {
    pub user_id: String,
    pub total_events: u64,
    pub last_event_at: Option<DateTime<Utc>>,
    pub experiment_exposed: bool,
}

/// Fixed-width UTC timestamp so lexicographic order matches time order.
pub(crate) fn to_db_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn from_db_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
        })
}
