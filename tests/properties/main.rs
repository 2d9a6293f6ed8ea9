use proptest::prelude::*;

use splitlab::experiment::stats::two_sided_p_value;
use splitlab::experiment::{BUCKET_COUNT, check_weights, select_variant, two_proportion_z_test};
use splitlab::storage::VariantRecord;

fn records(weights: &[u32]) -> Vec<VariantRecord> {
    weights
        .iter()
        .enumerate()
        .map(|(position, weight)| VariantRecord {
            id: format!("v{position}"),
            experiment_id: "exp".to_string(),
            name: format!("variant-{position}"),
            traffic_percentage: *weight,
            position: position as u32,
        })
        .collect()
}

/// Weights that sum to exactly 100 across 2..=5 variants.
fn exact_weights() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(1u32..=100, 1..=4).prop_map(|cuts| {
        let mut cuts: Vec<u32> = cuts.into_iter().map(|c| c.min(99)).collect();
        cuts.sort_unstable();
        cuts.dedup();
        let mut weights = Vec::with_capacity(cuts.len() + 1);
        let mut previous = 0;
        for cut in cuts {
            weights.push(cut - previous);
            previous = cut;
        }
        weights.push(BUCKET_COUNT - previous);
        weights
    })
}

proptest! {
    #[test]
    fn selection_is_total_for_non_empty_variants(
        weights in prop::collection::vec(0u32..=120, 1..6),
        draw in 1u32..=BUCKET_COUNT,
    ) {
        let variants = records(&weights);
        let selection = select_variant(&variants, draw);
        prop_assert!(selection.is_some());
        let selection = selection.unwrap();
        prop_assert!(variants.iter().any(|v| v.id == selection.variant.id));
    }

    #[test]
    fn exact_weights_never_fall_back(weights in exact_weights(), draw in 1u32..=BUCKET_COUNT) {
        prop_assert!(check_weights(weights.iter().copied()).is_exact());
        let variants = records(&weights);
        let selection = select_variant(&variants, draw).unwrap();
        prop_assert!(!selection.fell_back);
    }

    #[test]
    fn selection_matches_cumulative_bucket(weights in exact_weights(), draw in 1u32..=BUCKET_COUNT) {
        let variants = records(&weights);
        let selection = select_variant(&variants, draw).unwrap();
        let index = variants.iter().position(|v| v.id == selection.variant.id).unwrap();
        let upper: u32 = weights[..=index].iter().sum();
        let lower = upper - weights[index];
        prop_assert!(draw > lower && draw <= upper);
    }

    #[test]
    fn p_value_is_a_probability(z in -50.0f64..50.0) {
        let p = two_sided_p_value(z);
        prop_assert!((0.0..=1.0).contains(&p));
        prop_assert!((p - two_sided_p_value(-z)).abs() < 1e-12);
    }

    #[test]
    fn z_test_is_antisymmetric_in_group_order(
        n1 in 1u64..5_000,
        n2 in 1u64..5_000,
        f1 in 0.0f64..=1.0,
        f2 in 0.0f64..=1.0,
    ) {
        let c1 = (n1 as f64 * f1) as u64;
        let c2 = (n2 as f64 * f2) as u64;
        match (two_proportion_z_test(c1, n1, c2, n2), two_proportion_z_test(c2, n2, c1, n1)) {
            (Some(forward), Some(reverse)) => {
                prop_assert!((forward.z_statistic + reverse.z_statistic).abs() < 1e-9);
                prop_assert!((forward.p_value - reverse.p_value).abs() < 1e-12);
                prop_assert!((0.0..=1.0).contains(&forward.p_value));
            }
            (None, None) => {}
            _ => prop_assert!(false, "z-test defined in one order only"),
        }
    }
}
