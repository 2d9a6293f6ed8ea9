//! splitlab query - guarded read-only SQL

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::emit_json;
use crate::error::Result;
use crate::query::execute_readonly;

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// A single SELECT or WITH statement
    pub sql: String,

    /// Row cap for this query (cannot exceed query.max_rows)
    #[arg(long)]
    pub max_rows: Option<usize>,
}

pub fn run(ctx: &AppContext, args: &QueryArgs) -> Result<()> {
    let mut limits = ctx.config.query.limits();
    if let Some(max_rows) = args.max_rows {
        limits.max_rows = max_rows.clamp(1, limits.max_rows);
    }
    let result = execute_readonly(&ctx.db, &args.sql, &limits)?;

    if ctx.robot_mode {
        return emit_json(&serde_json::json!({ "status": "ok", "result": result }));
    }

    println!("{}", result.columns.join("\t"));
    for row in &result.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|value| match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => "NULL".to_string(),
                other => other.to_string(),
            })
            .collect();
        println!("{}", cells.join("\t"));
    }
    if result.truncated {
        eprintln!("(truncated at {} rows)", limits.max_rows);
    }
    Ok(())
}
