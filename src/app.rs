use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::churn::ScorerHandle;
use crate::config::Config;
use crate::error::{Result, SplitError};
use crate::storage::Database;

pub const DATABASE_FILE: &str = "splitlab.db";
pub const ROOT_DIR_NAME: &str = ".splitlab";

pub struct AppContext {
    pub root: PathBuf,
    pub config: Config,
    pub db: Database,
    pub scorer: Arc<ScorerHandle>,
    pub robot_mode: bool,
    pub verbosity: u8,
}

impl AppContext {
    pub fn from_cli(cli: &crate::cli::Cli) -> Result<Self> {
        let root = find_root()?;
        let config = Config::load(cli.config.as_deref(), &root)?;
        let db = Database::open_with_timeout(database_path(&root), config.storage.busy_timeout())?;

        let scorer = Arc::new(ScorerHandle::empty());
        let model_path = config.churn.resolved_model_path(&root);
        if model_path.exists() {
            // A broken model file leaves scoring unavailable.
            if let Err(err) = scorer.load_from_path(&model_path) {
                warn!(target: "churn", path = %model_path.display(), error = %err, "churn model not loaded");
            }
        } else {
            debug!(target: "churn", path = %model_path.display(), "no churn model file");
        }

        Ok(Self {
            root,
            config,
            db,
            scorer,
            robot_mode: cli.robot,
            verbosity: cli.verbose,
        })
    }

    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        database_path(&self.root)
    }

    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.config.churn.resolved_model_path(&self.root)
    }
}

#[must_use]
pub fn database_path(root: &Path) -> PathBuf {
    root.join(DATABASE_FILE)
}

/// Data root: `SPLITLAB_ROOT`, else the nearest `.splitlab` directory at or
/// above the working directory, else the user data directory.
pub fn find_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var("SPLITLAB_ROOT") {
        return Ok(PathBuf::from(root));
    }
    let cwd = std::env::current_dir()?;
    if let Some(found) = find_upwards(&cwd, ROOT_DIR_NAME) {
        return Ok(found);
    }

    let data_dir = dirs::data_dir()
        .ok_or_else(|| SplitError::MissingConfig("data directory not found".to_string()))?;
    Ok(data_dir.join("splitlab"))
}

fn find_upwards(start: &Path, name: &str) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        let candidate = dir.join(name);
        if candidate.is_dir() {
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}
