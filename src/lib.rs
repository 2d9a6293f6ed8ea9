//! splitlab: an experimentation and retention analytics engine.
//!
//! Users are bound to weighted experiment variants with sticky, race-free
//! assignment; conversions are compared with a two-proportion z-test; and
//! behavioural features feed a hot-swappable churn scorer whose scores are
//! refreshed in resumable batches. Everything is persisted in SQLite.

pub mod analytics;
pub mod app;
pub mod churn;
pub mod cli;
pub mod config;
pub mod error;
pub mod experiment;
pub mod query;
pub mod scheduler;
pub mod storage;

#[cfg(test)]
pub mod test_utils;

pub use error::{Result, SplitError};
