//! Storage layer for splitlab
//!
//! SQLite holds experiments, variants, assignments, events and users.
//! Query helpers live on [`Database`], split by table family.

pub mod events;
pub mod experiments;
pub mod migrations;
pub mod models;
pub mod sqlite;
pub mod users;

pub use models::{
    AssignmentRecord, EventRecord, ExperimentRecord, NewVariant, UserActivity, UserRecord,
    VariantRecord,
};
pub use sqlite::Database;
