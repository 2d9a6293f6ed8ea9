use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::churn::ChurnPolicy;
use crate::churn::features::{DEFAULT_INACTIVITY_DAYS, NEVER_ACTIVE_DAYS};
use crate::error::{Result, SplitError};
use crate::experiment::ConversionRules;
use crate::experiment::evaluation::{CONVERSION_EVENT_TYPE, CONVERSION_PAYLOAD_KEY};
use crate::query::{DEFAULT_MAX_ROWS, DEFAULT_STATEMENT_TIMEOUT, QueryLimits};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub experiments: ExperimentsConfig,
    #[serde(default)]
    pub churn: ChurnConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Config {
    pub fn load(explicit_path: Option<&Path>, root: &Path) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("SPLITLAB_CONFIG").ok().map(PathBuf::from));

        if let Some(path) = explicit {
            if let Some(patch) = Self::load_patch(&path)? {
                config.merge_patch(patch);
            }
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_patch(global);
            }
            if let Some(project) = Self::load_project(root)? {
                config.merge_patch(project);
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        let path = dirs::config_dir()
            .ok_or_else(|| SplitError::MissingConfig("config directory not found".to_string()))?
            .join("splitlab/config.toml");
        Self::load_patch(&path)
    }

    fn load_project(root: &Path) -> Result<Option<ConfigPatch>> {
        Self::load_patch(&root.join("config.toml"))
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| SplitError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| SplitError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.storage {
            self.storage.merge(patch);
        }
        if let Some(patch) = patch.experiments {
            self.experiments.merge(patch);
        }
        if let Some(patch) = patch.churn {
            self.churn.merge(patch);
        }
        if let Some(patch) = patch.query {
            self.query.merge(patch);
        }
        if let Some(patch) = patch.scheduler {
            self.scheduler.merge(patch);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = env_u64("SPLITLAB_STORAGE_BUSY_TIMEOUT_MS")? {
            self.storage.busy_timeout_ms = value;
        }

        if let Some(value) = env_string("SPLITLAB_EXPERIMENTS_CONVERSION_EVENT_TYPE") {
            self.experiments.conversion_event_type = value;
        }
        if let Some(value) = env_string("SPLITLAB_EXPERIMENTS_CONVERSION_PAYLOAD_KEY") {
            self.experiments.conversion_payload_key = value;
        }

        if let Some(value) = env_u32("SPLITLAB_CHURN_INACTIVITY_DAYS")? {
            self.churn.inactivity_days = value;
        }
        if let Some(value) = env_f64("SPLITLAB_CHURN_HIGH_RISK_THRESHOLD")? {
            self.churn.high_risk_threshold = value;
        }
        if let Some(value) = env_string("SPLITLAB_CHURN_MODEL_PATH") {
            self.churn.model_path = Some(PathBuf::from(value));
        }

        if let Some(value) = env_u64("SPLITLAB_QUERY_STATEMENT_TIMEOUT_MS")? {
            self.query.statement_timeout = Duration::from_millis(value);
        }
        if let Some(value) = env_u64("SPLITLAB_QUERY_MAX_ROWS")? {
            self.query.max_rows = usize::try_from(value).unwrap_or(usize::MAX);
        }

        if let Some(value) = env_u64("SPLITLAB_SCHEDULER_REFRESH_INTERVAL_SECS")? {
            self.scheduler.refresh_interval = Duration::from_secs(value);
        }
        if let Some(value) = env_u64("SPLITLAB_SCHEDULER_RELOAD_INTERVAL_SECS")? {
            self.scheduler.reload_interval = Duration::from_secs(value);
        }
        if let Some(value) = env_u64("SPLITLAB_SCHEDULER_JOB_TIMEOUT_SECS")? {
            self.scheduler.job_timeout = Duration::from_secs(value);
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.churn.high_risk_threshold) {
            return Err(SplitError::Config(format!(
                "churn.high_risk_threshold must be within [0, 1], got {}",
                self.churn.high_risk_threshold
            )));
        }
        if self.query.max_rows == 0 {
            return Err(SplitError::Config("query.max_rows must be positive".to_string()));
        }
        for (key, value) in [
            ("scheduler.refresh_interval", self.scheduler.refresh_interval),
            ("scheduler.reload_interval", self.scheduler.reload_interval),
            ("scheduler.job_timeout", self.scheduler.job_timeout),
            ("query.statement_timeout", self.query.statement_timeout),
        ] {
            if value.is_zero() {
                return Err(SplitError::Config(format!("{key} must be positive")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
        }
    }
}

impl StorageConfig {
    fn merge(&mut self, patch: StoragePatch) {
        if let Some(value) = patch.busy_timeout_ms {
            self.busy_timeout_ms = value;
        }
    }

    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentsConfig {
    pub conversion_event_type: String,
    pub conversion_payload_key: String,
}

impl Default for ExperimentsConfig {
    fn default() -> Self {
        Self {
            conversion_event_type: CONVERSION_EVENT_TYPE.to_string(),
            conversion_payload_key: CONVERSION_PAYLOAD_KEY.to_string(),
        }
    }
}

impl ExperimentsConfig {
    fn merge(&mut self, patch: ExperimentsPatch) {
        if let Some(value) = patch.conversion_event_type {
            self.conversion_event_type = value;
        }
        if let Some(value) = patch.conversion_payload_key {
            self.conversion_payload_key = value;
        }
    }

    #[must_use]
    pub fn conversion_rules(&self) -> ConversionRules {
        ConversionRules {
            event_type: self.conversion_event_type.clone(),
            payload_key: self.conversion_payload_key.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChurnConfig {
    pub inactivity_days: u32,
    pub never_active_days: i64,
    pub high_risk_threshold: f64,
    /// Model file produced by the offline trainer. Relative paths resolve
    /// against the data root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            inactivity_days: DEFAULT_INACTIVITY_DAYS,
            never_active_days: NEVER_ACTIVE_DAYS,
            high_risk_threshold: 0.7,
            model_path: None,
        }
    }
}

impl ChurnConfig {
    fn merge(&mut self, patch: ChurnPatch) {
        if let Some(value) = patch.inactivity_days {
            self.inactivity_days = value;
        }
        if let Some(value) = patch.never_active_days {
            self.never_active_days = value;
        }
        if let Some(value) = patch.high_risk_threshold {
            self.high_risk_threshold = value;
        }
        if let Some(value) = patch.model_path {
            self.model_path = Some(value);
        }
    }

    #[must_use]
    pub const fn policy(&self) -> ChurnPolicy {
        ChurnPolicy {
            inactivity_days: self.inactivity_days,
            never_active_days: self.never_active_days,
        }
    }

    /// Configured model file, or `churn_model.json` under `root`.
    #[must_use]
    pub fn resolved_model_path(&self, root: &Path) -> PathBuf {
        match &self.model_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root.join(path),
            None => root.join("churn_model.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    #[serde(with = "humantime_serde")]
    pub statement_timeout: Duration,
    pub max_rows: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

impl QueryConfig {
    fn merge(&mut self, patch: QueryPatch) {
        if let Some(value) = patch.statement_timeout {
            self.statement_timeout = value;
        }
        if let Some(value) = patch.max_rows {
            self.max_rows = value;
        }
    }

    #[must_use]
    pub const fn limits(&self) -> QueryLimits {
        QueryLimits {
            statement_timeout: self.statement_timeout,
            max_rows: self.max_rows,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub reload_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub job_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(60 * 60),
            reload_interval: Duration::from_secs(24 * 60 * 60),
            job_timeout: Duration::from_secs(10 * 60),
        }
    }
}

impl SchedulerConfig {
    fn merge(&mut self, patch: SchedulerPatch) {
        if let Some(value) = patch.refresh_interval {
            self.refresh_interval = value;
        }
        if let Some(value) = patch.reload_interval {
            self.reload_interval = value;
        }
        if let Some(value) = patch.job_timeout {
            self.job_timeout = value;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub storage: Option<StoragePatch>,
    pub experiments: Option<ExperimentsPatch>,
    pub churn: Option<ChurnPatch>,
    pub query: Option<QueryPatch>,
    pub scheduler: Option<SchedulerPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StoragePatch {
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ExperimentsPatch {
    pub conversion_event_type: Option<String>,
    pub conversion_payload_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ChurnPatch {
    pub inactivity_days: Option<u32>,
    pub never_active_days: Option<i64>,
    pub high_risk_threshold: Option<f64>,
    pub model_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct QueryPatch {
    #[serde(default, with = "humantime_serde")]
    pub statement_timeout: Option<Duration>,
    pub max_rows: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SchedulerPatch {
    #[serde(default, with = "humantime_serde")]
    pub refresh_interval: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub reload_interval: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub job_timeout: Option<Duration>,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_u32(key: &str) -> Result<Option<u32>> {
    match std::env::var(key) {
        Ok(value) => value.parse::<u32>().map(Some).map_err(|err| {
            SplitError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(value) => value.parse::<u64>().map(Some).map_err(|err| {
            SplitError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}

fn env_f64(key: &str) -> Result<Option<f64>> {
    match std::env::var(key) {
        Ok(value) => value.parse::<f64>().map(Some).map_err(|err| {
            SplitError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}
