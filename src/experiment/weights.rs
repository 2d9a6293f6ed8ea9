//! Traffic weight validation.
//!
//! Weights are not required to sum to 100. When they fall short, draws
//! above the total resolve to the last variant; when they exceed it, the
//! trailing variants receive less than their nominal share. Both cases are
//! reported so operators can fix the configuration.

use serde::{Deserialize, Serialize};

use crate::experiment::assignment::BUCKET_COUNT;
use crate::storage::VariantRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Allocation {
    Exact,
    /// Total below 100; the last variant absorbs the remainder.
    Under,
    /// Total above 100; variants past the 100 mark are starved.
    Over,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightCheck {
    pub total: u32,
    pub allocation: Allocation,
}

impl WeightCheck {
    #[must_use]
    pub const fn is_exact(&self) -> bool {
        matches!(self.allocation, Allocation::Exact)
    }

    /// Effective share in percent that the last variant receives on top of
    /// its own weight because of under-allocation.
    #[must_use]
    pub const fn fallback_share(&self) -> u32 {
        BUCKET_COUNT.saturating_sub(self.total)
    }
}

#[must_use]
pub fn check_weights<I>(weights: I) -> WeightCheck
where
    I: IntoIterator<Item = u32>,
{
    let total = weights
        .into_iter()
        .fold(0u32, |acc, weight| acc.saturating_add(weight));
    let allocation = match total.cmp(&BUCKET_COUNT) {
        std::cmp::Ordering::Equal => Allocation::Exact,
        std::cmp::Ordering::Less => Allocation::Under,
        std::cmp::Ordering::Greater => Allocation::Over,
    };
    WeightCheck { total, allocation }
}

#[must_use]
pub fn check_variants(variants: &[VariantRecord]) -> WeightCheck {
    check_weights(variants.iter().map(|variant| variant.traffic_percentage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_totals() {
        assert_eq!(check_weights([40, 60]).allocation, Allocation::Exact);
        let under = check_weights([30, 30]);
        assert_eq!(under.allocation, Allocation::Under);
        assert_eq!(under.fallback_share(), 40);
        assert_eq!(check_weights([70, 70]).allocation, Allocation::Over);
        assert_eq!(check_weights(std::iter::empty()).total, 0);
    }
}
