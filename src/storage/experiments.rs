//! Experiment, variant and assignment queries.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use uuid::Uuid;

use crate::error::{Result, SplitError};
use crate::experiment::weights::check_weights;
use crate::storage::models::{
    AssignmentRecord, ExperimentRecord, NewVariant, VariantRecord, from_db_time, to_db_time,
};
use crate::storage::sqlite::Database;

const EXPERIMENT_COLUMNS: &str = "id, name, is_active, created_at";
const VARIANT_COLUMNS: &str = "id, experiment_id, name, traffic_percentage, position";
const ASSIGNMENT_COLUMNS: &str = "id, user_id, experiment_id, variant_id, assigned_at";

fn experiment_from_row(row: &Row<'_>) -> rusqlite::Result<ExperimentRecord> {
    let created: String = row.get(3)?;
    Ok(ExperimentRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        is_active: row.get(2)?,
        created_at: from_db_time(3, &created)?,
    })
}

fn variant_from_row(row: &Row<'_>) -> rusqlite::Result<VariantRecord> {
    Ok(VariantRecord {
        id: row.get(0)?,
        experiment_id: row.get(1)?,
        name: row.get(2)?,
        traffic_percentage: row.get(3)?,
        position: row.get(4)?,
    })
}

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<AssignmentRecord> {
    let assigned: String = row.get(4)?;
    Ok(AssignmentRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        experiment_id: row.get(2)?,
        variant_id: row.get(3)?,
        assigned_at: from_db_time(4, &assigned)?,
    })
}

impl Database {
    /// Create an experiment and its variants in one transaction.
    ///
    /// Variants keep the order given here; that order drives cumulative
    /// weight selection.
    pub fn create_experiment(
        &self,
        name: &str,
        variants: &[NewVariant],
        created_at: DateTime<Utc>,
    ) -> Result<ExperimentRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SplitError::InvalidConfiguration(
                "experiment name must not be empty".to_string(),
            ));
        }
        for variant in variants {
            if variant.name.trim().is_empty() {
                return Err(SplitError::InvalidConfiguration(format!(
                    "variant names must not be empty (experiment {name})"
                )));
            }
        }
        if self.get_experiment_by_name(name)?.is_some() {
            return Err(SplitError::InvalidConfiguration(format!(
                "experiment already exists: {name}"
            )));
        }

        let tx = self.conn().unchecked_transaction()?;
        let record = ExperimentRecord {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            is_active: true,
            created_at,
        };
        tx.execute(
            "INSERT INTO experiments (id, name, is_active, created_at) VALUES (?, ?, ?, ?)",
            params![record.id, record.name, record.is_active, to_db_time(created_at)],
        )?;
        for (position, variant) in variants.iter().enumerate() {
            tx.execute(
                "INSERT INTO variants (id, experiment_id, name, traffic_percentage, position)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    Uuid::new_v4().to_string(),
                    record.id,
                    variant.name.trim(),
                    variant.traffic_percentage,
                    position as i64,
                ],
            )?;
        }
        tx.commit()?;

        let check = check_weights(variants.iter().map(|variant| variant.traffic_percentage));
        if !variants.is_empty() && !check.is_exact() {
            tracing::warn!(
                target: "experiments",
                experiment = %record.name,
                total_weight = check.total,
                allocation = ?check.allocation,
                "variant weights do not sum to 100"
            );
        }
        Ok(record)
    }

    /// Look up an experiment by its unique name, active or not.
    pub fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentRecord>> {
        let sql = format!("SELECT {EXPERIMENT_COLUMNS} FROM experiments WHERE name = ?");
        Ok(self
            .conn()
            .query_row(&sql, [name], experiment_from_row)
            .optional()?)
    }

    /// Look up an experiment that currently accepts assignments.
    pub fn get_active_experiment(&self, name: &str) -> Result<Option<ExperimentRecord>> {
        Ok(self
            .get_experiment_by_name(name)?
            .filter(|experiment| experiment.is_active))
    }

    /// Open or close an experiment. Returns false when no such experiment.
    pub fn set_experiment_active(&self, name: &str, active: bool) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE experiments SET is_active = ? WHERE name = ?",
            params![active, name],
        )?;
        Ok(changed > 0)
    }

    pub fn list_experiments(&self) -> Result<Vec<ExperimentRecord>> {
        let sql = format!("SELECT {EXPERIMENT_COLUMNS} FROM experiments ORDER BY created_at, name");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt
            .query_map([], experiment_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Variants of an experiment in stored order.
    pub fn variants_for(&self, experiment_id: &str) -> Result<Vec<VariantRecord>> {
        let sql = format!(
            "SELECT {VARIANT_COLUMNS} FROM variants WHERE experiment_id = ? ORDER BY position"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt
            .query_map([experiment_id], variant_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_variant(&self, variant_id: &str) -> Result<Option<VariantRecord>> {
        let sql = format!("SELECT {VARIANT_COLUMNS} FROM variants WHERE id = ?");
        Ok(self
            .conn()
            .query_row(&sql, [variant_id], variant_from_row)
            .optional()?)
    }

    pub fn find_assignment(
        &self,
        user_id: &str,
        experiment_id: &str,
    ) -> Result<Option<AssignmentRecord>> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE user_id = ? AND experiment_id = ?"
        );
        Ok(self
            .conn()
            .query_row(&sql, [user_id, experiment_id], assignment_from_row)
            .optional()?)
    }

    /// Insert an assignment unless one already exists for the
    /// (user, experiment) pair. Returns whether a row was written.
    pub fn insert_assignment_if_absent(
        &self,
        user_id: &str,
        experiment_id: &str,
        variant_id: &str,
        assigned_at: DateTime<Utc>,
    ) -> Result<bool> {
        let inserted = self.conn().execute(
            "INSERT INTO assignments (id, user_id, experiment_id, variant_id, assigned_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (user_id, experiment_id) DO NOTHING",
            params![
                Uuid::new_v4().to_string(),
                user_id,
                experiment_id,
                variant_id,
                to_db_time(assigned_at),
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn count_assignments_for_experiment(&self, experiment_id: &str) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM assignments WHERE experiment_id = ?",
            [experiment_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    pub fn count_assignments_for_variant(&self, variant_id: &str) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM assignments WHERE variant_id = ?",
            [variant_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Distinct users assigned to `variant_id` who logged an event of
    /// `event_type` whose payload field at `payload_path` equals
    /// `experiment_name` exactly.
    pub fn count_variant_conversions(
        &self,
        variant_id: &str,
        event_type: &str,
        payload_path: &str,
        experiment_name: &str,
    ) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(DISTINCT e.user_id)
             FROM events e
             WHERE e.event_type = ?1
               AND json_valid(e.payload)
               AND json_type(e.payload, ?2) = 'text'
               AND json_extract(e.payload, ?2) = ?3
               AND e.user_id IN (SELECT a.user_id FROM assignments a WHERE a.variant_id = ?4)",
            params![event_type, payload_path, experiment_name, variant_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Whether the user has been assigned to any experiment at all.
    pub fn user_has_assignment(&self, user_id: &str) -> Result<bool> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM assignments WHERE user_id = ?)",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Mean stored churn probability of a variant's users, ignoring users
    /// that have not been scored yet.
    pub fn average_churn_for_variant(&self, variant_id: &str) -> Result<Option<f64>> {
        let avg: Option<f64> = self.conn().query_row(
            "SELECT AVG(u.churn_probability)
             FROM users u
             WHERE u.id IN (SELECT a.user_id FROM assignments a WHERE a.variant_id = ?)",
            [variant_id],
            |row| row.get(0),
        )?;
        Ok(avg)
    }
}
