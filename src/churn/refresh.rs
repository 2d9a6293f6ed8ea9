//! Batch recomputation of stored churn probabilities.
//!
//! The job walks users in id order a page at a time. Every score write is
//! independent, so a run that stops early (deadline, cancel, store error)
//! leaves already written scores in place and can be resumed from the
//! reported cursor. Re-running with unchanged events rewrites the same
//! values.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::churn::features::{ChurnFeatures, ChurnPolicy};
use crate::churn::model::ScorerHandle;
use crate::error::Result;
use crate::storage::Database;

pub const DEFAULT_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOptions {
    /// Stop once this much time has elapsed.
    pub deadline: Option<Duration>,
    /// Start after this user id (exclusive).
    pub resume_after: Option<String>,
    pub page_size: usize,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            deadline: None,
            resume_after: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    Completed,
    /// No model loaded; nothing was written.
    Unavailable,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    pub status: RefreshStatus,
    pub model_version: Option<u64>,
    pub updated: usize,
    /// Last user whose score was written; pass back as `resume_after`.
    pub last_user_id: Option<String>,
    pub elapsed_ms: u64,
}

/// Score every user with the currently loaded model and store the result.
///
/// One model version is pinned for the whole run even if the handle is
/// reloaded meanwhile. Store failures abort the run with an error.
pub fn refresh_churn_scores(
    db: &Database,
    scorer: &ScorerHandle,
    now: DateTime<Utc>,
    policy: &ChurnPolicy,
    options: &RefreshOptions,
    cancel: &AtomicBool,
) -> Result<RefreshReport> {
    let started = Instant::now();
    let mut report = RefreshReport {
        status: RefreshStatus::Completed,
        model_version: None,
        updated: 0,
        last_user_id: options.resume_after.clone(),
        elapsed_ms: 0,
    };

    let Some(model) = scorer.snapshot() else {
        warn!(target: "churn", "churn model not loaded; scores left unchanged");
        report.status = RefreshStatus::Unavailable;
        return Ok(report);
    };
    report.model_version = Some(model.version);

    let page_size = options.page_size.max(1);
    'pages: loop {
        let page = db.user_activity_page(report.last_user_id.as_deref(), page_size)?;
        if page.is_empty() {
            break;
        }
        let full_page = page.len() == page_size;

        for activity in page {
            if cancel.load(Ordering::Relaxed) {
                report.status = RefreshStatus::Cancelled;
                break 'pages;
            }
            if options
                .deadline
                .is_some_and(|deadline| started.elapsed() >= deadline)
            {
                report.status = RefreshStatus::TimedOut;
                break 'pages;
            }

            let features = ChurnFeatures {
                total_events: activity.total_events,
                days_since_last_event: policy.days_since(activity.last_event_at, now),
            };
            db.update_churn_probability(&activity.user_id, model.predict(&features))?;
            report.updated += 1;
            report.last_user_id = Some(activity.user_id);
        }

        if !full_page {
            break;
        }
    }

    report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    info!(
        target: "churn",
        status = ?report.status,
        updated = report.updated,
        model_version = model.version,
        elapsed_ms = report.elapsed_ms,
        "churn refresh finished"
    );
    Ok(report)
}
