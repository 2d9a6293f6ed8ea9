//! Error types for splitlab.
//!
//! Domain outcomes a caller is expected to handle (unknown experiment,
//! missing variants, rejected query) are distinct variants so the CLI can
//! map them to stable codes. Statistical outcomes and scorer availability
//! are values, not errors; see [`crate::experiment::Significance`] and
//! [`crate::churn::Prediction`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SplitError>;

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("experiment not found: {0}")]
    ExperimentNotFound(String),

    #[error("experiment has no variants: {0}")]
    NoVariants(String),

    #[error("experiment {name} has {found} variant(s), at least 2 required")]
    InsufficientVariants { name: String, found: usize },

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("invalid experiment configuration: {0}")]
    InvalidConfiguration(String),

    #[error("query rejected: {0}")]
    QueryRejected(String),

    #[error("query exceeded statement timeout of {0:?}")]
    QueryTimeout(std::time::Duration),

    #[error("failed to load churn model: {0}")]
    ModelLoad(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing configuration: {0}")]
    MissingConfig(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SplitError {
    /// Stable machine-readable code used in robot output.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ExperimentNotFound(_) => "experiment_not_found",
            Self::NoVariants(_) => "no_variants",
            Self::InsufficientVariants { .. } => "insufficient_variants",
            Self::UserNotFound(_) => "user_not_found",
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::QueryRejected(_) => "query_rejected",
            Self::QueryTimeout(_) => "query_timeout",
            Self::ModelLoad(_) => "model_load_failed",
            Self::Config(_) | Self::MissingConfig(_) => "config_error",
            Self::Serialization(_) => "serialization_error",
            Self::Database(_) => "store_unavailable",
            Self::Io(_) => "io_error",
        }
    }

    /// Whether the error is a recoverable domain outcome rather than an
    /// infrastructure failure.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Database(_) | Self::Io(_) | Self::Config(_) | Self::MissingConfig(_)
        )
    }
}

impl From<serde_json::Error> for SplitError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
