//! Product analytics over the event log.
//!
//! Calendar days are UTC days. Every function takes `now` so results are
//! reproducible in tests and batch runs.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::experiment::stats::round_to;
use crate::storage::{Database, UserRecord};

/// Window used for monthly active users.
pub const MONTHLY_WINDOW_DAYS: i64 = 30;

/// `[start, end)` of a UTC calendar day.
fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    (start, start + Duration::days(1))
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round_to(part as f64 / whole as f64 * 100.0, 2)
}

/// Distinct users with an event on `now`'s UTC day.
pub fn daily_active_users(db: &Database, now: DateTime<Utc>) -> Result<u64> {
    let (start, end) = day_bounds(now.date_naive());
    db.count_active_users_between(start, end)
}

/// Distinct users with an event in the last `days` days.
pub fn rolling_active_users(db: &Database, now: DateTime<Utc>, days: u32) -> Result<u64> {
    db.count_active_users_since(now - Duration::days(i64::from(days)))
}

pub fn monthly_active_users(db: &Database, now: DateTime<Utc>) -> Result<u64> {
    db.count_active_users_since(now - Duration::days(MONTHLY_WINDOW_DAYS))
}

/// Percent of yesterday's signups with an event today, 2 decimals.
pub fn day1_retention(db: &Database, now: DateTime<Utc>) -> Result<f64> {
    let today = now.date_naive();
    let Some(yesterday) = today.pred_opt() else {
        return Ok(0.0);
    };
    let cohort: Vec<String> = db
        .user_signups()?
        .into_iter()
        .filter(|(_, signed_up)| signed_up.date_naive() == yesterday)
        .map(|(id, _)| id)
        .collect();
    if cohort.is_empty() {
        return Ok(0.0);
    }
    let (start, end) = day_bounds(today);
    let retained = db.count_active_among(&cohort, start, end)?;
    Ok(percent(retained, cohort.len() as u64))
}

/// Retention curve for the users who signed up on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortRetention {
    pub cohort_date: NaiveDate,
    pub cohort_size: u64,
    /// `retention[n]` is the percent of the cohort active on day `n`
    /// after signup, for `n` in `0..=max_days`.
    pub retention: Vec<f64>,
}

/// Signup-date cohorts in date order with day-N activity percentages.
pub fn cohort_retention(db: &Database, max_days: u32) -> Result<Vec<CohortRetention>> {
    let mut cohorts: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
    for (user_id, signed_up) in db.user_signups()? {
        cohorts.entry(signed_up.date_naive()).or_default().push(user_id);
    }

    let mut out = Vec::with_capacity(cohorts.len());
    for (cohort_date, members) in cohorts {
        let size = members.len() as u64;
        let mut retention = Vec::with_capacity(max_days as usize + 1);
        for day in 0..=max_days {
            let (start, end) = day_bounds(cohort_date + Duration::days(i64::from(day)));
            let active = db.count_active_among(&members, start, end)?;
            retention.push(percent(active, size));
        }
        out.push(CohortRetention {
            cohort_date,
            cohort_size: size,
            retention,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveMetrics {
    pub total_users: u64,
    pub daily_active_users: u64,
    pub monthly_active_users: u64,
    /// Mean over scored users, 4 decimals; 0 when nobody is scored.
    pub average_churn_probability: f64,
    /// Users whose stored probability is strictly above the threshold.
    pub high_risk_users: u64,
}

pub fn executive_metrics(
    db: &Database,
    now: DateTime<Utc>,
    high_risk_threshold: f64,
) -> Result<ExecutiveMetrics> {
    Ok(ExecutiveMetrics {
        total_users: db.count_users()?,
        daily_active_users: daily_active_users(db, now)?,
        monthly_active_users: monthly_active_users(db, now)?,
        average_churn_probability: round_to(db.average_churn_probability()?.unwrap_or(0.0), 4),
        high_risk_users: db.count_users_above_risk(high_risk_threshold)?,
    })
}

pub fn top_churn_risk_users(db: &Database, limit: usize) -> Result<Vec<UserRecord>> {
    db.top_churn_risk_users(limit)
}
