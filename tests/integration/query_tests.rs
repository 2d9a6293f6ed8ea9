//! Read-only query screening against populated data.

use std::time::Duration;

use splitlab::query::{QueryLimits, execute_readonly};

use super::fixture::TestFixture;

fn limits(max_rows: usize) -> QueryLimits {
    QueryLimits {
        statement_timeout: Duration::from_secs(3),
        max_rows,
    }
}

#[test]
fn select_over_domain_tables_returns_rows() {
    let fixture = TestFixture::new("select_over_domain_tables_returns_rows");
    fixture.experiment("q", &[("A", 50), ("B", 50)]);
    fixture.users(5);

    let result = execute_readonly(
        &fixture.db,
        "SELECT COUNT(*) AS n FROM users",
        &limits(10),
    )
    .expect("query");
    assert_eq!(result.columns, vec!["n"]);
    assert_eq!(result.rows, vec![vec![serde_json::json!(5)]]);
    assert!(!result.truncated);

    let joined = execute_readonly(
        &fixture.db,
        "SELECT e.name, v.name FROM experiments e JOIN variants v ON v.experiment_id = e.id ORDER BY v.position",
        &limits(10),
    )
    .expect("join");
    assert_eq!(joined.rows.len(), 2);
}

#[test]
fn row_cap_marks_truncation() {
    let fixture = TestFixture::new("row_cap_marks_truncation");
    fixture.users(12);

    let result = execute_readonly(&fixture.db, "SELECT id FROM users LIMIT 50", &limits(5)).expect("query");
    assert_eq!(result.rows.len(), 5);
    assert!(result.truncated);
}

#[test]
fn writes_are_rejected_and_data_survives() {
    let fixture = TestFixture::new("writes_are_rejected_and_data_survives");
    fixture.users(3);

    for sql in [
        "DELETE FROM users",
        "SELECT 1; DROP TABLE users",
        "WITH x AS (SELECT 1) DELETE FROM users",
        "SELECT name FROM sqlite_master",
    ] {
        let err = execute_readonly(&fixture.db, sql, &limits(10)).unwrap_err();
        assert_eq!(err.code(), "query_rejected", "{sql}");
    }
    assert_eq!(fixture.db.count_users().expect("count"), 3);

    // The connection is writable again for normal operations.
    fixture.users(1);
    assert_eq!(fixture.db.count_users().expect("count"), 4);
}
