//! Churn impact of an experiment, per variant.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SplitError};
use crate::experiment::stats::round_to;
use crate::storage::Database;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantChurn {
    pub variant_name: String,
    pub assigned_users: u64,
    /// Mean stored churn probability of scored users, 4 decimals; 0 when
    /// none of the variant's users has been scored.
    pub average_churn_probability: f64,
}

pub fn churn_by_variant(db: &Database, experiment_name: &str) -> Result<Vec<VariantChurn>> {
    let experiment = db
        .get_experiment_by_name(experiment_name)?
        .ok_or_else(|| SplitError::ExperimentNotFound(experiment_name.to_string()))?;

    db.variants_for(&experiment.id)?
        .into_iter()
        .map(|variant| {
            let average = db.average_churn_for_variant(&variant.id)?.unwrap_or(0.0);
            Ok(VariantChurn {
                assigned_users: db.count_assignments_for_variant(&variant.id)?,
                variant_name: variant.name,
                average_churn_probability: round_to(average, 4),
            })
        })
        .collect()
}
