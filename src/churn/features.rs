//! Behavioural features for churn scoring and training export.

use std::io::Write;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SplitError};
use crate::storage::{Database, UserActivity};

/// Days reported for a user with no events at all.
pub const NEVER_ACTIVE_DAYS: i64 = 999;

/// Default inactivity window after which a user counts as churned.
pub const DEFAULT_INACTIVITY_DAYS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurnPolicy {
    pub inactivity_days: u32,
    pub never_active_days: i64,
}

impl Default for ChurnPolicy {
    fn default() -> Self {
        Self {
            inactivity_days: DEFAULT_INACTIVITY_DAYS,
            never_active_days: NEVER_ACTIVE_DAYS,
        }
    }
}

impl ChurnPolicy {
    #[must_use]
    pub const fn with_inactivity_days(mut self, days: u32) -> Self {
        self.inactivity_days = days;
        self
    }

    /// Whole days since `last_event`, or the never-active sentinel.
    #[must_use]
    pub fn days_since(&self, last_event: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
        match last_event {
            Some(last) => (now - last).num_days().max(0),
            None => self.never_active_days,
        }
    }

    /// Churned when never active, or last active before the window.
    #[must_use]
    pub fn is_churned(&self, last_event: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let cutoff = now - Duration::days(i64::from(self.inactivity_days));
        last_event.is_none_or(|last| last < cutoff)
    }
}

/// Inputs the churn scorer consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurnFeatures {
    pub total_events: u64,
    pub days_since_last_event: i64,
}

/// One labelled row of the training dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurnFeatureRow {
    pub user_id: String,
    pub total_events: u64,
    pub days_since_last_event: i64,
    /// 1 if the user has ever been assigned to any experiment.
    pub experiment_exposed: u8,
    pub churned: u8,
}

impl ChurnFeatureRow {
    #[must_use]
    pub fn from_activity(activity: &UserActivity, now: DateTime<Utc>, policy: &ChurnPolicy) -> Self {
        Self {
            user_id: activity.user_id.clone(),
            total_events: activity.total_events,
            days_since_last_event: policy.days_since(activity.last_event_at, now),
            experiment_exposed: u8::from(activity.experiment_exposed),
            churned: u8::from(policy.is_churned(activity.last_event_at, now)),
        }
    }

    #[must_use]
    pub const fn features(&self) -> ChurnFeatures {
        ChurnFeatures {
            total_events: self.total_events,
            days_since_last_event: self.days_since_last_event,
        }
    }
}

/// Scorer features for one existing user.
pub fn features_for(
    db: &Database,
    user_id: &str,
    now: DateTime<Utc>,
    policy: &ChurnPolicy,
) -> Result<ChurnFeatures> {
    if !db.user_exists(user_id)? {
        return Err(SplitError::UserNotFound(user_id.to_string()));
    }
    let (total_events, last_event) = db.event_stats_for_user(user_id)?;
    Ok(ChurnFeatures {
        total_events,
        days_since_last_event: policy.days_since(last_event, now),
    })
}

/// 1 if the user has any assignment row, else 0.
pub fn experiment_exposed(db: &Database, user_id: &str) -> Result<u8> {
    Ok(u8::from(db.user_has_assignment(user_id)?))
}

/// Labelled feature rows for every user, ordered by user id.
pub fn generate_churn_features(
    db: &Database,
    now: DateTime<Utc>,
    policy: &ChurnPolicy,
) -> Result<Vec<ChurnFeatureRow>> {
    let rows = db
        .user_activity()?
        .iter()
        .map(|activity| ChurnFeatureRow::from_activity(activity, now, policy))
        .collect::<Vec<_>>();
    tracing::debug!(target: "churn", rows = rows.len(), inactivity_days = policy.inactivity_days, "churn features generated");
    Ok(rows)
}

/// Write rows as CSV with a header, for the offline trainer.
pub fn write_csv<W: Write>(rows: &[ChurnFeatureRow], mut out: W) -> Result<()> {
    writeln!(
        out,
        "user_id,total_events,days_since_last_event,experiment_exposed,churned"
    )?;
    for row in rows {
        writeln!(
            out,
            "{},{},{},{},{}",
            row.user_id,
            row.total_events,
            row.days_since_last_event,
            row.experiment_exposed,
            row.churned
        )?;
    }
    Ok(())
}
