//! Sticky weighted variant assignment.
//!
//! A user is bound to a variant the first time they join an active
//! experiment and keeps that variant for the life of the experiment.
//! Selection draws a bucket in `1..=100` and walks variants in stored
//! order, picking the first whose cumulative weight reaches the draw.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::{Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SplitError};
use crate::experiment::weights::check_variants;
use crate::storage::{Database, VariantRecord};

/// Number of traffic buckets; weights are percentages of this.
pub const BUCKET_COUNT: u32 = 100;

/// Source of bucket draws in `1..=BUCKET_COUNT`.
pub trait BucketDraw {
    fn draw(&mut self) -> u32;
}

/// Production draw source backed by the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngDraw;

impl BucketDraw for ThreadRngDraw {
    fn draw(&mut self) -> u32 {
        rand::rng().random_range(1..=BUCKET_COUNT)
    }
}

/// Reproducible draw source for simulations.
#[derive(Debug, Clone)]
pub struct SeededDraw {
    rng: StdRng,
}

impl SeededDraw {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl BucketDraw for SeededDraw {
    fn draw(&mut self) -> u32 {
        self.rng.random_range(1..=BUCKET_COUNT)
    }
}

/// Replays a fixed sequence of draws, cycling when exhausted.
///
/// Values are clamped into `1..=BUCKET_COUNT`. An empty sequence always
/// draws the top bucket.
#[derive(Debug, Clone)]
pub struct SequenceDraw {
    draws: Vec<u32>,
    next: usize,
}

impl SequenceDraw {
    #[must_use]
    pub fn new(draws: Vec<u32>) -> Self {
        Self { draws, next: 0 }
    }
}

impl BucketDraw for SequenceDraw {
    fn draw(&mut self) -> u32 {
        if self.draws.is_empty() {
            return BUCKET_COUNT;
        }
        let value = self.draws[self.next % self.draws.len()];
        self.next = self.next.wrapping_add(1);
        value.clamp(1, BUCKET_COUNT)
    }
}

/// Outcome of walking the cumulative weights for one draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection<'a> {
    pub variant: &'a VariantRecord,
    /// True when no cumulative weight reached the draw and the last
    /// variant was taken instead.
    pub fell_back: bool,
}

/// Pick the variant for `draw` using cumulative weights.
///
/// When weights sum to less than the draw, the last variant is selected.
/// That keeps assignment total but over-weights the last variant; it is
/// a configuration problem surfaced by [`check_variants`], not corrected
/// here. Returns `None` only for an empty slice.
#[must_use]
pub fn select_variant(variants: &[VariantRecord], draw: u32) -> Option<Selection<'_>> {
    let mut cumulative = 0u32;
    for variant in variants {
        cumulative = cumulative.saturating_add(variant.traffic_percentage);
        if draw <= cumulative {
            return Some(Selection {
                variant,
                fell_back: false,
            });
        }
    }
    variants.last().map(|variant| Selection {
        variant,
        fell_back: true,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentOutcome {
    pub experiment_id: String,
    pub variant_id: String,
    pub variant_name: String,
    /// False when an existing assignment was returned.
    pub created: bool,
}

/// Assigns users to variants of active experiments.
pub struct AssignmentEngine<'db, D = ThreadRngDraw> {
    db: &'db Database,
    draw: D,
}

impl<'db> AssignmentEngine<'db, ThreadRngDraw> {
    #[must_use]
    pub const fn new(db: &'db Database) -> Self {
        Self {
            db,
            draw: ThreadRngDraw,
        }
    }
}

impl<'db, D: BucketDraw> AssignmentEngine<'db, D> {
    pub const fn with_draw(db: &'db Database, draw: D) -> Self {
        Self { db, draw }
    }

    /// Return the user's variant in `experiment_name`, creating the
    /// assignment on first access.
    pub fn assign(&mut self, user_id: &str, experiment_name: &str) -> Result<AssignmentOutcome> {
        self.assign_at(user_id, experiment_name, Utc::now())
    }

    pub fn assign_at(
        &mut self,
        user_id: &str,
        experiment_name: &str,
        now: DateTime<Utc>,
    ) -> Result<AssignmentOutcome> {
        let experiment = self
            .db
            .get_active_experiment(experiment_name)?
            .ok_or_else(|| SplitError::ExperimentNotFound(experiment_name.to_string()))?;

        if !self.db.user_exists(user_id)? {
            return Err(SplitError::UserNotFound(user_id.to_string()));
        }

        if let Some(existing) = self.db.find_assignment(user_id, &experiment.id)? {
            return self.outcome_for(&existing.experiment_id, &existing.variant_id, false);
        }

        let variants = self.db.variants_for(&experiment.id)?;
        let draw = self.draw.draw();
        let Some(selection) = select_variant(&variants, draw) else {
            return Err(SplitError::NoVariants(experiment_name.to_string()));
        };
        if selection.fell_back {
            let check = check_variants(&variants);
            warn!(
                target: "assignment",
                experiment = experiment_name,
                draw,
                total_weight = check.total,
                variant = %selection.variant.name,
                "draw exceeded cumulative weights; assigned last variant"
            );
        }

        // The write lock is taken up front so the existence check and
        // insert cannot interleave with another writer; the unique
        // (user, experiment) constraint backs this up across processes.
        let tx = Transaction::new_unchecked(self.db.conn(), TransactionBehavior::Immediate)?;
        let created = self.db.insert_assignment_if_absent(
            user_id,
            &experiment.id,
            &selection.variant.id,
            now,
        )?;
        let stored = self
            .db
            .find_assignment(user_id, &experiment.id)?
            .ok_or_else(|| SplitError::Database(rusqlite::Error::QueryReturnedNoRows))?;
        tx.commit()?;

        debug!(
            target: "assignment",
            experiment = experiment_name,
            user = user_id,
            draw,
            variant = %stored.variant_id,
            created,
            "assignment resolved"
        );
        self.outcome_for(&stored.experiment_id, &stored.variant_id, created)
    }

    fn outcome_for(
        &self,
        experiment_id: &str,
        variant_id: &str,
        created: bool,
    ) -> Result<AssignmentOutcome> {
        let variant = self
            .db
            .get_variant(variant_id)?
            .ok_or_else(|| SplitError::Database(rusqlite::Error::QueryReturnedNoRows))?;
        Ok(AssignmentOutcome {
            experiment_id: experiment_id.to_string(),
            variant_id: variant.id,
            variant_name: variant.name,
            created,
        })
    }
}
