//! Sticky assignment against a file-backed store.

use std::sync::{Arc, Barrier};
use std::thread;

use splitlab::SplitError;
use splitlab::experiment::{AssignmentEngine, SeededDraw, SequenceDraw};

use super::fixture::{TestFixture, reference_now};

#[test]
fn assignment_is_sticky_across_connections() {
    let fixture = TestFixture::new("assignment_is_sticky_across_connections");
    fixture.experiment("onboarding", &[("control", 50), ("treatment", 50)]);
    let user = fixture.users(1).remove(0);

    let first = AssignmentEngine::with_draw(&fixture.db, SequenceDraw::new(vec![10]))
        .assign_at(&user, "onboarding", reference_now())
        .expect("first assignment");
    assert!(first.created);
    assert_eq!(first.variant_name, "control");

    // A draw that would pick the other variant must not move the user.
    let other = fixture.connect();
    let again = AssignmentEngine::with_draw(&other, SequenceDraw::new(vec![90]))
        .assign_at(&user, "onboarding", reference_now())
        .expect("repeat assignment");
    assert!(!again.created);
    assert_eq!(again.variant_id, first.variant_id);
}

#[test]
fn checkout_draws_follow_cumulative_weights() {
    let fixture = TestFixture::new("checkout_draws_follow_cumulative_weights");
    fixture.experiment("checkout_test", &[("A", 50), ("B", 50)]);
    let users = fixture.users(3);

    let mut engine = AssignmentEngine::with_draw(&fixture.db, SequenceDraw::new(vec![5, 45, 85]));
    let names: Vec<String> = users
        .iter()
        .map(|user| {
            engine
                .assign_at(user, "checkout_test", reference_now())
                .expect("assign")
                .variant_name
        })
        .collect();
    assert_eq!(names, vec!["A", "A", "B"]);
}

#[test]
fn forty_sixty_split_pins_bucket_boundaries() {
    let fixture = TestFixture::new("forty_sixty_split_pins_bucket_boundaries");
    fixture.experiment("checkout_40_60", &[("A", 40), ("B", 60)]);
    let users = fixture.users(5);

    let mut engine = AssignmentEngine::with_draw(
        &fixture.db,
        SequenceDraw::new(vec![5, 45, 85, 40, 41]),
    );
    let names: Vec<String> = users
        .iter()
        .map(|user| {
            engine
                .assign_at(user, "checkout_40_60", reference_now())
                .expect("assign")
                .variant_name
        })
        .collect();
    assert_eq!(names, vec!["A", "B", "B", "A", "B"]);
}

#[test]
fn even_split_stays_near_half() {
    let fixture = TestFixture::new("even_split_stays_near_half");
    fixture.experiment("split", &[("A", 50), ("B", 50)]);
    let users = fixture.users(10_000);

    let mut engine = AssignmentEngine::with_draw(&fixture.db, SeededDraw::new(42));
    let mut in_a = 0usize;
    for user in &users {
        let outcome = engine
            .assign_at(user, "split", reference_now())
            .expect("assign");
        if outcome.variant_name == "A" {
            in_a += 1;
        }
    }

    let share = in_a as f64 / users.len() as f64;
    println!("[SPLIT] share in A = {share:.4}");
    assert!((0.45..=0.55).contains(&share), "share {share} outside 45-55%");
}

#[test]
fn concurrent_first_assignment_creates_one_row() {
    let fixture = TestFixture::new("concurrent_first_assignment_creates_one_row");
    let experiment_id = fixture.experiment("race", &[("A", 50), ("B", 50)]);
    let user = fixture.users(1).remove(0);
    let db_path = fixture.db_path();

    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|worker| {
            let barrier = Arc::clone(&barrier);
            let db_path = db_path.clone();
            let user = user.clone();
            thread::spawn(move || {
                let db = splitlab::storage::Database::open(&db_path).expect("open db");
                // Half the workers would pick A, half B.
                let draw = if worker % 2 == 0 { 1 } else { 100 };
                let mut engine = AssignmentEngine::with_draw(&db, SequenceDraw::new(vec![draw]));
                barrier.wait();
                engine
                    .assign_at(&user, "race", reference_now())
                    .expect("assign under contention")
            })
        })
        .collect();

    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("worker panicked"))
        .collect();

    let winner = &outcomes[0].variant_id;
    assert!(outcomes.iter().all(|o| &o.variant_id == winner));
    assert_eq!(outcomes.iter().filter(|o| o.created).count(), 1);
    assert_eq!(
        fixture
            .db
            .count_assignments_for_experiment(&experiment_id)
            .expect("count"),
        1
    );
}

#[test]
fn closed_experiment_rejects_new_and_existing_users() {
    let fixture = TestFixture::new("closed_experiment_rejects_new_and_existing_users");
    fixture.experiment("retired", &[("A", 50), ("B", 50)]);
    let users = fixture.users(2);

    AssignmentEngine::new(&fixture.db)
        .assign_at(&users[0], "retired", reference_now())
        .expect("assign while active");
    assert!(fixture.db.set_experiment_active("retired", false).expect("close"));

    for user in &users {
        let err = AssignmentEngine::new(&fixture.db)
            .assign_at(user, "retired", reference_now())
            .unwrap_err();
        assert!(matches!(err, SplitError::ExperimentNotFound(_)));
    }
}

#[test]
fn unknown_user_is_not_assigned() {
    let fixture = TestFixture::new("unknown_user_is_not_assigned");
    let experiment_id = fixture.experiment("ghosts", &[("A", 100)]);

    let err = AssignmentEngine::new(&fixture.db)
        .assign_at("no-such-user", "ghosts", reference_now())
        .unwrap_err();
    assert!(matches!(err, SplitError::UserNotFound(_)));
    assert_eq!(
        fixture
            .db
            .count_assignments_for_experiment(&experiment_id)
            .expect("count"),
        0
    );
}

#[test]
fn experiment_without_variants_reports_no_variants() {
    let fixture = TestFixture::new("experiment_without_variants_reports_no_variants");
    fixture.experiment("empty", &[]);
    let user = fixture.users(1).remove(0);

    let err = AssignmentEngine::new(&fixture.db)
        .assign_at(&user, "empty", reference_now())
        .unwrap_err();
    assert!(matches!(err, SplitError::NoVariants(_)));
}

#[test]
fn underweight_experiment_falls_back_to_last_variant() {
    let fixture = TestFixture::new("underweight_experiment_falls_back_to_last_variant");
    fixture.experiment("short", &[("A", 30), ("B", 30)]);
    let user = fixture.users(1).remove(0);

    let outcome = AssignmentEngine::with_draw(&fixture.db, SequenceDraw::new(vec![95]))
        .assign_at(&user, "short", reference_now())
        .expect("assign");
    assert_eq!(outcome.variant_name, "B");
}
