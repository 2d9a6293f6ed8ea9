//! Experimentation: sticky assignment, evaluation and churn impact.

pub mod assignment;
pub mod evaluation;
pub mod impact;
pub mod stats;
pub mod weights;

pub use assignment::{
    AssignmentEngine, AssignmentOutcome, BUCKET_COUNT, BucketDraw, SeededDraw, Selection,
    SequenceDraw, ThreadRngDraw, select_variant,
};
pub use evaluation::{
    CONVERSION_EVENT_TYPE, CONVERSION_PAYLOAD_KEY, ConversionRules, Evaluation, Significance,
    VariantResult, conversion_rate, evaluate, significance_for,
};
pub use impact::{VariantChurn, churn_by_variant};
pub use stats::{ZTest, two_proportion_z_test};
pub use weights::{Allocation, WeightCheck, check_variants, check_weights};
