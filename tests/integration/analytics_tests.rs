//! Engagement metrics over a small synthetic population.

use chrono::Duration;

use splitlab::analytics::{
    cohort_retention, daily_active_users, day1_retention, executive_metrics,
    monthly_active_users, top_churn_risk_users,
};

use super::fixture::{TestFixture, reference_now};

#[test]
fn active_user_windows() {
    let fixture = TestFixture::new("active_user_windows");
    let users = fixture.users(3);
    let now = reference_now();
    let log = |user: &str, days_ago: i64| {
        fixture
            .db
            .log_event(user, "login", serde_json::json!({}), now - Duration::days(days_ago))
            .expect("log");
    };
    log(&users[0], 0);
    log(&users[0], 0);
    log(&users[1], 5);
    log(&users[2], 45);

    assert_eq!(daily_active_users(&fixture.db, now).expect("dau"), 1);
    assert_eq!(monthly_active_users(&fixture.db, now).expect("mau"), 2);
}

#[test]
fn day_one_retention_uses_yesterdays_signups() {
    let fixture = TestFixture::new("day_one_retention_uses_yesterdays_signups");
    let now = reference_now();
    let yesterday = now - Duration::days(1);
    let cohort: Vec<String> = (0..4)
        .map(|_| fixture.db.create_user(None, yesterday).expect("user").id)
        .collect();
    fixture
        .db
        .log_event(&cohort[0], "login", serde_json::json!({}), now)
        .expect("log");

    assert_eq!(day1_retention(&fixture.db, now).expect("retention"), 25.0);

    let curves = cohort_retention(&fixture.db, 1).expect("cohorts");
    assert_eq!(curves.len(), 1);
    assert_eq!(curves[0].cohort_size, 4);
    assert_eq!(curves[0].retention, vec![0.0, 25.0]);
}

#[test]
fn executive_summary_counts_high_risk_strictly() {
    let fixture = TestFixture::new("executive_summary_counts_high_risk_strictly");
    let users = fixture.users(3);
    fixture.db.update_churn_probability(&users[0], 0.9).expect("score");
    fixture.db.update_churn_probability(&users[1], 0.7).expect("score");

    let metrics = executive_metrics(&fixture.db, reference_now(), 0.7).expect("metrics");
    assert_eq!(metrics.total_users, 3);
    assert_eq!(metrics.high_risk_users, 1);
    assert_eq!(metrics.average_churn_probability, 0.8);

    let top = top_churn_risk_users(&fixture.db, 5).expect("top");
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].id, users[0]);
}
