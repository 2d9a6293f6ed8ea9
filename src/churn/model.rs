//! Churn scoring service with atomic model replacement.
//!
//! The scorer itself is produced by an offline trainer and shipped as a
//! JSON model file. [`ScorerHandle`] owns the currently loaded model; a
//! reload parses and validates the new file completely before swapping
//! the shared pointer, so readers only ever see a whole model.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::churn::features::ChurnFeatures;
use crate::error::{Result, SplitError};
use crate::experiment::stats::round_to;

pub const FEATURE_TOTAL_EVENTS: &str = "total_events";
pub const FEATURE_DAYS_SINCE_LAST_EVENT: &str = "days_since_last_event";
pub const FEATURE_EXPERIMENT_EXPOSED: &str = "experiment_exposed";

/// Result of asking the scoring service for a probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "probability", rename_all = "snake_case")]
pub enum Prediction {
    Probability(f64),
    /// No model is loaded.
    Unavailable,
}

impl Prediction {
    #[must_use]
    pub const fn probability(self) -> Option<f64> {
        match self {
            Self::Probability(p) => Some(p),
            Self::Unavailable => None,
        }
    }
}

/// A fitted churn classifier.
pub trait ChurnScorer: Send + Sync + fmt::Debug {
    /// Probability in `[0, 1]` that a user with these features churns.
    fn score(&self, features: &ChurnFeatures) -> f64;

    /// Short name for status output.
    fn kind(&self) -> &'static str;
}

/// Logistic regression over named features.
///
/// Features the model was not trained on are ignored; features the model
/// expects but the caller does not provide contribute 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub intercept: f64,
    pub coefficients: BTreeMap<String, f64>,
}

impl LogisticModel {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| SplitError::ModelLoad(format!("read {}: {err}", path.display())))?;
        let model: Self = serde_json::from_str(&raw)
            .map_err(|err| SplitError::ModelLoad(format!("parse {}: {err}", path.display())))?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.intercept.is_finite() {
            return Err(SplitError::ModelLoad("intercept is not finite".to_string()));
        }
        if let Some((name, _)) = self.coefficients.iter().find(|(_, w)| !w.is_finite()) {
            return Err(SplitError::ModelLoad(format!(
                "coefficient {name} is not finite"
            )));
        }
        Ok(())
    }

    fn coefficient(&self, name: &str) -> f64 {
        self.coefficients.get(name).copied().unwrap_or(0.0)
    }
}

impl ChurnScorer for LogisticModel {
    fn score(&self, features: &ChurnFeatures) -> f64 {
        // Online scoring has no exposure signal, so FEATURE_EXPERIMENT_EXPOSED
        // contributes nothing here.
        let logit = self.intercept
            + self.coefficient(FEATURE_TOTAL_EVENTS) * features.total_events as f64
            + self.coefficient(FEATURE_DAYS_SINCE_LAST_EVENT)
                * features.days_since_last_event as f64;
        1.0 / (1.0 + (-logit).exp())
    }

    fn kind(&self) -> &'static str {
        "logistic"
    }
}

/// An immutable, versioned model installed in a [`ScorerHandle`].
#[derive(Debug)]
pub struct LoadedModel {
    pub version: u64,
    pub source: Option<PathBuf>,
    pub loaded_at: DateTime<Utc>,
    scorer: Box<dyn ChurnScorer>,
}

impl LoadedModel {
    /// Churn probability rounded to 4 decimals.
    #[must_use]
    pub fn predict(&self, features: &ChurnFeatures) -> f64 {
        round_to(self.scorer.score(features).clamp(0.0, 1.0), 4)
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.scorer.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub loaded: bool,
    pub version: Option<u64>,
    pub kind: Option<String>,
    pub source: Option<PathBuf>,
    pub loaded_at: Option<DateTime<Utc>>,
}

/// Shared reference to the current churn model.
#[derive(Debug, Default)]
pub struct ScorerHandle {
    current: RwLock<Option<Arc<LoadedModel>>>,
    versions: AtomicU64,
}

impl ScorerHandle {
    /// A handle with no model loaded.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the model file at `path` and install it. On failure the
    /// previously installed model stays in place.
    pub fn load_from_path(&self, path: &Path) -> Result<u64> {
        let model = LogisticModel::from_path(path)?;
        let version = self.install(Box::new(model), Some(path.to_path_buf()));
        info!(target: "churn", path = %path.display(), version, "churn model loaded");
        Ok(version)
    }

    /// Install a scorer, replacing the current one. Returns its version.
    pub fn install(&self, scorer: Box<dyn ChurnScorer>, source: Option<PathBuf>) -> u64 {
        let mut current = self.current.write();
        // Versions are handed out under the write lock so they only grow.
        let version = self.versions.fetch_add(1, Ordering::SeqCst) + 1;
        *current = Some(Arc::new(LoadedModel {
            version,
            source,
            loaded_at: Utc::now(),
            scorer,
        }));
        version
    }

    /// The current model, pinned for the caller's use.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<LoadedModel>> {
        self.current.read().clone()
    }

    #[must_use]
    pub fn predict(&self, features: &ChurnFeatures) -> Prediction {
        self.snapshot()
            .map_or(Prediction::Unavailable, |model| {
                Prediction::Probability(model.predict(features))
            })
    }

    #[must_use]
    pub fn status(&self) -> ModelStatus {
        match self.snapshot() {
            Some(model) => ModelStatus {
                loaded: true,
                version: Some(model.version),
                kind: Some(model.kind().to_string()),
                source: model.source.clone(),
                loaded_at: Some(model.loaded_at),
            },
            None => ModelStatus {
                loaded: false,
                version: None,
                kind: None,
                source: None,
                loaded_at: None,
            },
        }
    }
}
