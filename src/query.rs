//! Guarded ad-hoc SQL for analysts.
//!
//! Only one `SELECT`/`WITH` statement is accepted. Statements are screened
//! for write and schema keywords, row counts are capped, the connection is
//! put in `query_only` mode while the statement runs, and a watchdog thread
//! interrupts anything that outlives the statement timeout.

use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, bounded};
use regex::Regex;
use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SplitError};
use crate::storage::Database;

pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_ROWS: usize = 100;

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "replace", "attach", "detach",
    "pragma", "vacuum",
];

const FORBIDDEN_IDENTIFIERS: &[&str] = &[
    "sqlite_master",
    "sqlite_schema",
    "sqlite_temp_master",
    "load_extension",
];

static WORD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryLimits {
    pub statement_timeout: Duration,
    pub max_rows: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    /// True when more rows were available than `max_rows`.
    pub truncated: bool,
}

/// Check `sql` and return the statement that will actually run.
pub fn prepare_readonly_sql(sql: &str, max_rows: usize) -> Result<String> {
    let statement = sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if statement.is_empty() {
        return Err(SplitError::QueryRejected("empty query".to_string()));
    }
    if statement.contains(';') {
        return Err(SplitError::QueryRejected(
            "only a single statement is allowed".to_string(),
        ));
    }

    let words: Vec<String> = WORD_REGEX
        .find_iter(statement)
        .map(|m| m.as_str().to_ascii_lowercase())
        .collect();
    match words.first().map(String::as_str) {
        Some("select" | "with") => {}
        _ => {
            return Err(SplitError::QueryRejected(
                "only SELECT queries are allowed".to_string(),
            ));
        }
    }
    if let Some(word) = words.iter().find(|w| FORBIDDEN_KEYWORDS.contains(&w.as_str())) {
        return Err(SplitError::QueryRejected(format!(
            "keyword '{word}' not allowed"
        )));
    }
    if let Some(word) = words
        .iter()
        .find(|w| FORBIDDEN_IDENTIFIERS.contains(&w.as_str()))
    {
        return Err(SplitError::QueryRejected(format!(
            "access to '{word}' is not allowed"
        )));
    }

    if words.iter().any(|w| w == "limit") {
        Ok(statement.to_string())
    } else {
        Ok(format!("{statement} LIMIT {max_rows}"))
    }
}

fn json_value(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        ValueRef::Text(bytes) => serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => serde_json::Value::String(format!("<{} bytes>", bytes.len())),
    }
}

/// Run one screened read-only statement.
pub fn execute_readonly(db: &Database, sql: &str, limits: &QueryLimits) -> Result<QueryResult> {
    let statement = prepare_readonly_sql(sql, limits.max_rows)?;
    let conn = db.conn();

    conn.pragma_update(None, "query_only", true)?;
    let result = run_with_watchdog(db, &statement, limits);
    if let Err(err) = conn.pragma_update(None, "query_only", false) {
        warn!(target: "query", error = %err, "failed to clear query_only");
    }
    result
}

fn run_with_watchdog(db: &Database, statement: &str, limits: &QueryLimits) -> Result<QueryResult> {
    let interrupt = db.conn().get_interrupt_handle();
    let (done_tx, done_rx) = bounded::<()>(1);
    let timeout = limits.statement_timeout;
    let watchdog = thread::spawn(move || match done_rx.recv_timeout(timeout) {
        Err(RecvTimeoutError::Timeout) => {
            interrupt.interrupt();
            true
        }
        _ => false,
    });

    let outcome = collect_rows(db, statement, limits.max_rows);
    let _ = done_tx.send(());
    let timed_out = watchdog.join().unwrap_or(false);

    match outcome {
        Err(SplitError::Database(rusqlite::Error::SqliteFailure(err, _)))
            if timed_out && err.code == rusqlite::ErrorCode::OperationInterrupted =>
        {
            warn!(target: "query", timeout_ms = timeout.as_millis() as u64, "query interrupted");
            Err(SplitError::QueryTimeout(timeout))
        }
        other => other,
    }
}

fn collect_rows(db: &Database, statement: &str, max_rows: usize) -> Result<QueryResult> {
    let mut stmt = db
        .conn()
        .prepare(statement)
        .map_err(|err| SplitError::QueryRejected(err.to_string()))?;
    if !stmt.readonly() {
        return Err(SplitError::QueryRejected(
            "statement is not read-only".to_string(),
        ));
    }
    let columns: Vec<String> = stmt.column_names().iter().map(|c| (*c).to_string()).collect();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    let mut truncated = false;
    while let Some(row) = rows.next()? {
        if out.len() == max_rows {
            truncated = true;
            break;
        }
        let values = (0..columns.len())
            .map(|idx| row.get_ref(idx).map(json_value))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        out.push(values);
    }
    debug!(target: "query", rows = out.len(), truncated, "query executed");
    Ok(QueryResult {
        columns,
        rows: out,
        truncated,
    })
}
