//! Churn features, scoring, and batch refresh.

pub mod features;
pub mod model;
pub mod refresh;

pub use features::{
    ChurnFeatureRow, ChurnFeatures, ChurnPolicy, NEVER_ACTIVE_DAYS, experiment_exposed,
    features_for, generate_churn_features, write_csv,
};
pub use model::{ChurnScorer, LoadedModel, LogisticModel, ModelStatus, Prediction, ScorerHandle};
pub use refresh::{RefreshOptions, RefreshReport, RefreshStatus, refresh_churn_scores};
