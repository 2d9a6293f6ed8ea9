//! splitlab init - create the data root, database and default config

use std::path::PathBuf;

use clap::Args;

use crate::app::{AppContext, ROOT_DIR_NAME, database_path, find_root};
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::config::Config;
use crate::error::{Result, SplitError};
use crate::storage::Database;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Create `.splitlab/` in the current directory instead of using the
    /// resolved data root
    #[arg(long)]
    pub local: bool,

    /// Overwrite an existing config.toml with defaults
    #[arg(long, short)]
    pub force: bool,
}

pub fn run(ctx: &AppContext, args: &InitArgs) -> Result<()> {
    run_without_context(ctx.robot_mode, args)
}

/// Init must work before any root or database exists, so it does not
/// build an [`AppContext`].
pub fn run_without_context(robot: bool, args: &InitArgs) -> Result<()> {
    let root = if args.local {
        std::env::current_dir()?.join(ROOT_DIR_NAME)
    } else {
        find_root()?
    };
    std::fs::create_dir_all(&root)?;

    let config_path = root.join("config.toml");
    let wrote_config = if config_path.exists() && !args.force {
        false
    } else {
        let rendered = toml::to_string_pretty(&Config::default())
            .map_err(|err| SplitError::Serialization(format!("render config: {err}")))?;
        std::fs::write(&config_path, rendered)?;
        true
    };

    let db_path: PathBuf = database_path(&root);
    let db = Database::open(&db_path)?;
    tracing::info!(target: "init", root = %root.display(), schema_version = db.schema_version(), "initialized");

    if robot {
        emit_json(&serde_json::json!({
            "status": "ok",
            "root": root.display().to_string(),
            "database": db_path.display().to_string(),
            "config": config_path.display().to_string(),
            "config_written": wrote_config,
            "schema_version": db.schema_version(),
        }))
    } else {
        let mut layout = HumanLayout::new();
        layout
            .title("splitlab initialized")
            .kv("Root", &root.display().to_string())
            .kv("Database", &db_path.display().to_string())
            .kv(
                "Config",
                &format!(
                    "{}{}",
                    config_path.display(),
                    if wrote_config { "" } else { " (kept existing)" }
                ),
            )
            .kv("Schema version", &db.schema_version().to_string());
        emit_human(layout);
        Ok(())
    }
}
