//! Conversion evaluation and significance testing.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SplitError};
use crate::experiment::stats::{round_to, two_proportion_z_test};
use crate::storage::Database;

/// Default event type that marks a conversion.
pub const CONVERSION_EVENT_TYPE: &str = "experiment_conversion";

/// Default payload field naming the experiment a conversion belongs to.
pub const CONVERSION_PAYLOAD_KEY: &str = "experiment";

/// Which events count as conversions for an experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRules {
    pub event_type: String,
    pub payload_key: String,
}

impl Default for ConversionRules {
    fn default() -> Self {
        Self {
            event_type: CONVERSION_EVENT_TYPE.to_string(),
            payload_key: CONVERSION_PAYLOAD_KEY.to_string(),
        }
    }
}

impl ConversionRules {
    /// JSON path of the payload key, quoted so keys with dots or spaces
    /// address a single member.
    fn payload_path(&self) -> String {
        format!("$.\"{}\"", self.payload_key.replace('"', ""))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantResult {
    pub variant_id: String,
    pub variant_name: String,
    pub total_users: u64,
    pub conversions: u64,
    /// conversions / total_users rounded to 4 decimals, 0 with no users.
    pub conversion_rate: f64,
}

/// Significance verdict for an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Significance {
    /// Two-proportion z-test result; p-value rounded to 5 decimals.
    Tested { z_statistic: f64, p_value: f64 },
    /// A variant has no assigned users.
    InsufficientData,
    /// The test statistic is undefined (zero pooled variance).
    Inconclusive,
    /// Only two-variant experiments are tested.
    UnsupportedVariantCount { variants: usize },
}

impl Significance {
    #[must_use]
    pub const fn p_value(&self) -> Option<f64> {
        match self {
            Self::Tested { p_value, .. } => Some(*p_value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Tested { .. } => "two-proportion z-test computed",
            Self::InsufficientData => "not enough data for statistical test",
            Self::Inconclusive => "statistical test inconclusive (insufficient variance)",
            Self::UnsupportedVariantCount { .. } => {
                "statistical test only implemented for 2 variants"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub experiment: String,
    pub active: bool,
    pub variants: Vec<VariantResult>,
    pub significance: Significance,
}

/// Compute per-variant conversion rates for `experiment_name` and, for
/// two-variant experiments, test whether they differ.
///
/// Closed experiments can be evaluated.
pub fn evaluate(db: &Database, experiment_name: &str, rules: &ConversionRules) -> Result<Evaluation> {
    let experiment = db
        .get_experiment_by_name(experiment_name)?
        .ok_or_else(|| SplitError::ExperimentNotFound(experiment_name.to_string()))?;

    let variants = db.variants_for(&experiment.id)?;
    if variants.len() < 2 {
        return Err(SplitError::InsufficientVariants {
            name: experiment.name,
            found: variants.len(),
        });
    }

    let payload_path = rules.payload_path();
    let mut results = Vec::with_capacity(variants.len());
    for variant in &variants {
        let total_users = db.count_assignments_for_variant(&variant.id)?;
        let conversions = db.count_variant_conversions(
            &variant.id,
            &rules.event_type,
            &payload_path,
            &experiment.name,
        )?;
        results.push(VariantResult {
            variant_id: variant.id.clone(),
            variant_name: variant.name.clone(),
            total_users,
            conversions,
            conversion_rate: conversion_rate(conversions, total_users),
        });
    }

    let significance = significance_for(&results);
    debug!(
        target: "evaluation",
        experiment = %experiment.name,
        variants = results.len(),
        verdict = significance.message(),
        "experiment evaluated"
    );

    Ok(Evaluation {
        experiment: experiment.name,
        active: experiment.is_active,
        variants: results,
        significance,
    })
}

/// conversions / total rounded to 4 decimals; 0 for an empty variant.
#[must_use]
pub fn conversion_rate(conversions: u64, total_users: u64) -> f64 {
    if total_users == 0 {
        return 0.0;
    }
    round_to(conversions as f64 / total_users as f64, 4)
}

/// Significance verdict for a set of variant results.
#[must_use]
pub fn significance_for(results: &[VariantResult]) -> Significance {
    let [a, b] = results else {
        return Significance::UnsupportedVariantCount {
            variants: results.len(),
        };
    };
    if a.total_users == 0 || b.total_users == 0 {
        return Significance::InsufficientData;
    }
    match two_proportion_z_test(a.conversions, a.total_users, b.conversions, b.total_users) {
        Some(test) => Significance::Tested {
            z_statistic: round_to(test.z_statistic, 5),
            p_value: round_to(test.p_value, 5),
        },
        None => Significance::Inconclusive,
    }
}
