//! Conversion counting and significance against a real store.

use splitlab::SplitError;
use splitlab::experiment::{
    AssignmentEngine, ConversionRules, SequenceDraw, Significance, evaluate,
};

use super::fixture::{TestFixture, reference_now};

/// Assign `count` users with alternating draws so A and B each get half.
fn split_users(fixture: &TestFixture, experiment: &str, count: usize) -> (Vec<String>, Vec<String>) {
    let users = fixture.users(count);
    let mut engine = AssignmentEngine::with_draw(&fixture.db, SequenceDraw::new(vec![1, 100]));
    let mut a = Vec::new();
    let mut b = Vec::new();
    for user in users {
        let outcome = engine
            .assign_at(&user, experiment, reference_now())
            .expect("assign");
        if outcome.variant_name == "A" {
            a.push(user);
        } else {
            b.push(user);
        }
    }
    (a, b)
}

#[test]
fn known_split_yields_reference_statistics() {
    let fixture = TestFixture::new("known_split_yields_reference_statistics");
    fixture.experiment("pricing", &[("A", 50), ("B", 50)]);
    let (a, b) = split_users(&fixture, "pricing", 200);
    assert_eq!((a.len(), b.len()), (100, 100));

    for user in a.iter().take(30) {
        fixture.convert(user, "pricing");
    }
    for user in b.iter().take(45) {
        fixture.convert(user, "pricing");
    }

    let evaluation = evaluate(&fixture.db, "pricing", &ConversionRules::default()).expect("evaluate");
    assert_eq!(evaluation.variants[0].conversion_rate, 0.3);
    assert_eq!(evaluation.variants[1].conversion_rate, 0.45);
    assert_eq!(
        evaluation.significance,
        Significance::Tested {
            z_statistic: -2.19089,
            p_value: 0.02846,
        }
    );
}

#[test]
fn only_matching_conversions_are_counted() {
    let fixture = TestFixture::new("only_matching_conversions_are_counted");
    fixture.experiment("banner", &[("A", 50), ("B", 50)]);
    fixture.experiment("other", &[("A", 50), ("B", 50)]);
    let (a, b) = split_users(&fixture, "banner", 4);
    let outsider = fixture.users(1).remove(0);

    // Counted: one conversion for a[0], repeated events collapse to one user.
    fixture.convert(&a[0], "banner");
    fixture.convert(&a[0], "banner");
    // Not counted: other experiment, wrong event type, unassigned user.
    fixture.convert(&b[0], "other");
    fixture
        .db
        .log_event(
            &b[1],
            "page_view",
            serde_json::json!({ "experiment": "banner" }),
            reference_now(),
        )
        .expect("log page view");
    fixture.convert(&outsider, "banner");

    let evaluation = evaluate(&fixture.db, "banner", &ConversionRules::default()).expect("evaluate");
    let counts: Vec<(u64, u64)> = evaluation
        .variants
        .iter()
        .map(|v| (v.total_users, v.conversions))
        .collect();
    assert_eq!(counts, vec![(2, 1), (2, 0)]);
}

#[test]
fn custom_conversion_rules_are_honoured() {
    let fixture = TestFixture::new("custom_conversion_rules_are_honoured");
    fixture.experiment("signup", &[("A", 50), ("B", 50)]);
    let (a, _b) = split_users(&fixture, "signup", 2);
    fixture
        .db
        .log_event(
            &a[0],
            "purchase",
            serde_json::json!({ "campaign": "signup" }),
            reference_now(),
        )
        .expect("log purchase");

    let rules = ConversionRules {
        event_type: "purchase".to_string(),
        payload_key: "campaign".to_string(),
    };
    let evaluation = evaluate(&fixture.db, "signup", &rules).expect("evaluate");
    assert_eq!(evaluation.variants[0].conversions, 1);

    let defaults = evaluate(&fixture.db, "signup", &ConversionRules::default()).expect("evaluate");
    assert_eq!(defaults.variants[0].conversions, 0);
}

#[test]
fn variant_without_users_is_insufficient_data() {
    let fixture = TestFixture::new("variant_without_users_is_insufficient_data");
    fixture.experiment("lopsided", &[("A", 50), ("B", 50)]);
    let users = fixture.users(3);
    let mut engine = AssignmentEngine::with_draw(&fixture.db, SequenceDraw::new(vec![1]));
    for user in &users {
        engine
            .assign_at(user, "lopsided", reference_now())
            .expect("assign");
    }

    let evaluation = evaluate(&fixture.db, "lopsided", &ConversionRules::default()).expect("evaluate");
    assert_eq!(evaluation.variants[1].total_users, 0);
    assert_eq!(evaluation.variants[1].conversion_rate, 0.0);
    assert_eq!(evaluation.significance, Significance::InsufficientData);
}

#[test]
fn closed_experiment_can_still_be_evaluated() {
    let fixture = TestFixture::new("closed_experiment_can_still_be_evaluated");
    fixture.experiment("archived", &[("A", 50), ("B", 50)]);
    let (a, _b) = split_users(&fixture, "archived", 10);
    fixture.convert(&a[0], "archived");
    fixture
        .db
        .set_experiment_active("archived", false)
        .expect("close");

    let evaluation = evaluate(&fixture.db, "archived", &ConversionRules::default()).expect("evaluate");
    assert!(!evaluation.active);
    assert_eq!(evaluation.variants[0].conversions, 1);
}

#[test]
fn three_variants_skip_the_test() {
    let fixture = TestFixture::new("three_variants_skip_the_test");
    fixture.experiment("tri", &[("A", 34), ("B", 33), ("C", 33)]);

    let evaluation = evaluate(&fixture.db, "tri", &ConversionRules::default()).expect("evaluate");
    assert_eq!(evaluation.variants.len(), 3);
    assert_eq!(
        evaluation.significance,
        Significance::UnsupportedVariantCount { variants: 3 }
    );
}

#[test]
fn single_variant_experiment_is_rejected() {
    let fixture = TestFixture::new("single_variant_experiment_is_rejected");
    fixture.experiment("solo", &[("A", 100)]);

    let err = evaluate(&fixture.db, "solo", &ConversionRules::default()).unwrap_err();
    assert!(matches!(
        err,
        SplitError::InsufficientVariants { found: 1, .. }
    ));
}

#[test]
fn unknown_experiment_is_not_found() {
    let fixture = TestFixture::new("unknown_experiment_is_not_found");
    let err = evaluate(&fixture.db, "missing", &ConversionRules::default()).unwrap_err();
    assert_eq!(err.code(), "experiment_not_found");
}
