//! Churn features, scoring and refresh over a file-backed store.

use std::sync::atomic::AtomicBool;

use chrono::Duration;

use splitlab::churn::{
    ChurnPolicy, NEVER_ACTIVE_DAYS, Prediction, RefreshOptions, RefreshStatus, ScorerHandle,
    features_for, generate_churn_features, refresh_churn_scores, write_csv,
};
use splitlab::experiment::AssignmentEngine;

use super::fixture::{TestFixture, reference_now};

fn write_model(fixture: &TestFixture, body: &serde_json::Value) -> std::path::PathBuf {
    let path = fixture.root().join("churn_model.json");
    std::fs::write(&path, serde_json::to_vec(body).expect("encode model")).expect("write model");
    path
}

#[test]
fn dataset_labels_and_sentinels() {
    let fixture = TestFixture::new("dataset_labels_and_sentinels");
    fixture.experiment("exposure", &[("A", 100)]);
    let users = fixture.users(3);
    let now = reference_now();

    // users[0]: active yesterday and exposed; users[1]: last seen 10 days ago;
    // users[2]: never active.
    fixture
        .db
        .log_event(&users[0], "login", serde_json::json!({}), now - Duration::days(1))
        .expect("log");
    fixture
        .db
        .log_event(&users[1], "login", serde_json::json!({}), now - Duration::days(10))
        .expect("log");
    AssignmentEngine::new(&fixture.db)
        .assign_at(&users[0], "exposure", now)
        .expect("assign");

    let rows = generate_churn_features(&fixture.db, now, &ChurnPolicy::default()).expect("features");
    let by_user = |id: &str| rows.iter().find(|row| row.user_id == id).expect("row present");

    let active = by_user(&users[0]);
    assert_eq!((active.days_since_last_event, active.churned), (1, 0));
    assert_eq!(active.experiment_exposed, 1);

    let lapsed = by_user(&users[1]);
    assert_eq!((lapsed.days_since_last_event, lapsed.churned), (10, 1));
    assert_eq!(lapsed.experiment_exposed, 0);

    let silent = by_user(&users[2]);
    assert_eq!(silent.days_since_last_event, NEVER_ACTIVE_DAYS);
    assert_eq!((silent.total_events, silent.churned), (0, 1));

    // A wider window relabels the lapsed user as retained.
    let wide = generate_churn_features(&fixture.db, now, &ChurnPolicy::default().with_inactivity_days(14))
        .expect("features");
    let lapsed = wide.iter().find(|row| row.user_id == users[1]).expect("row");
    assert_eq!(lapsed.churned, 0);

    let mut csv = Vec::new();
    write_csv(&rows, &mut csv).expect("csv");
    let csv = String::from_utf8(csv).expect("utf8");
    assert_eq!(csv.lines().count(), 4);
}

#[test]
fn loaded_model_scores_and_refresh_persists() {
    let fixture = TestFixture::new("loaded_model_scores_and_refresh_persists");
    let users = fixture.users(4);
    let now = reference_now();
    fixture
        .db
        .log_event(&users[0], "login", serde_json::json!({}), now)
        .expect("log");

    let path = write_model(
        &fixture,
        &serde_json::json!({
            "intercept": -2.0,
            "coefficients": { "days_since_last_event": 0.01, "total_events": -0.5 }
        }),
    );
    let scorer = ScorerHandle::empty();
    assert_eq!(scorer.load_from_path(&path).expect("load model"), 1);

    let policy = ChurnPolicy::default();
    let features = features_for(&fixture.db, &users[0], now, &policy).expect("features");
    let Prediction::Probability(active_score) = scorer.predict(&features) else {
        panic!("model is loaded");
    };
    assert!((0.0..=1.0).contains(&active_score));

    let cancel = AtomicBool::new(false);
    let report = refresh_churn_scores(
        &fixture.db,
        &scorer,
        now,
        &policy,
        &RefreshOptions {
            page_size: 3,
            ..RefreshOptions::default()
        },
        &cancel,
    )
    .expect("refresh");
    assert_eq!(report.status, RefreshStatus::Completed);
    assert_eq!(report.updated, 4);
    assert_eq!(report.model_version, Some(1));

    let stored = fixture.db.get_user(&users[0]).expect("get").expect("user");
    assert_eq!(stored.churn_probability, Some(active_score));

    // A second run over unchanged data writes the same scores.
    let before: Vec<_> = users
        .iter()
        .map(|id| fixture.db.get_user(id).expect("get").expect("user").churn_probability)
        .collect();
    refresh_churn_scores(&fixture.db, &scorer, now, &policy, &RefreshOptions::default(), &cancel)
        .expect("refresh again");
    let after: Vec<_> = users
        .iter()
        .map(|id| fixture.db.get_user(id).expect("get").expect("user").churn_probability)
        .collect();
    assert_eq!(before, after);
}

#[test]
fn failed_reload_keeps_previous_model() {
    let fixture = TestFixture::new("failed_reload_keeps_previous_model");
    let good = write_model(&fixture, &serde_json::json!({ "intercept": 0.0, "coefficients": {} }));
    let scorer = ScorerHandle::empty();
    scorer.load_from_path(&good).expect("load");

    let broken = fixture.root().join("broken.json");
    std::fs::write(&broken, "{ not json").expect("write");
    let err = scorer.load_from_path(&broken).unwrap_err();
    assert_eq!(err.code(), "model_load_failed");

    let status = scorer.status();
    assert!(status.loaded);
    assert_eq!(status.version, Some(1));
    assert_eq!(status.source.as_deref(), Some(good.as_path()));
}

#[test]
fn refresh_without_model_leaves_scores_untouched() {
    let fixture = TestFixture::new("refresh_without_model_leaves_scores_untouched");
    let users = fixture.users(2);
    fixture
        .db
        .update_churn_probability(&users[0], 0.42)
        .expect("seed score");

    let report = refresh_churn_scores(
        &fixture.db,
        &ScorerHandle::empty(),
        reference_now(),
        &ChurnPolicy::default(),
        &RefreshOptions::default(),
        &AtomicBool::new(false),
    )
    .expect("refresh");
    assert_eq!(report.status, RefreshStatus::Unavailable);
    assert_eq!(report.updated, 0);

    let first = fixture.db.get_user(&users[0]).expect("get").expect("user");
    let second = fixture.db.get_user(&users[1]).expect("get").expect("user");
    assert_eq!(first.churn_probability, Some(0.42));
    assert_eq!(second.churn_probability, None);
}

#[test]
fn features_for_unknown_user_is_an_error() {
    let fixture = TestFixture::new("features_for_unknown_user_is_an_error");
    let err = features_for(&fixture.db, "ghost", reference_now(), &ChurnPolicy::default()).unwrap_err();
    assert_eq!(err.code(), "user_not_found");
}
