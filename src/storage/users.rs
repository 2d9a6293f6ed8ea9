//! User queries and churn score persistence.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use uuid::Uuid;

use crate::error::Result;
use crate::storage::models::{UserActivity, UserRecord, from_db_time, to_db_time};
use crate::storage::sqlite::Database;

const USER_COLUMNS: &str = "id, email, created_at, churn_probability";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    let created: String = row.get(2)?;
    Ok(UserRecord {
        id: row.get(0)?,
        email: row.get(1)?,
        created_at: from_db_time(2, &created)?,
        churn_probability: row.get(3)?,
    })
}

fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<UserActivity> {
    let total: i64 = row.get(1)?;
    let last: Option<String> = row.get(2)?;
    let last_event_at = match last {
        Some(raw) => Some(from_db_time(2, &raw)?),
        None => None,
    };
    Ok(UserActivity {
        user_id: row.get(0)?,
        total_events: total.max(0) as u64,
        last_event_at,
        experiment_exposed: row.get(3)?,
    })
}

const ACTIVITY_SELECT: &str = "SELECT u.id,
        (SELECT COUNT(*) FROM events e WHERE e.user_id = u.id),
        (SELECT MAX(e.timestamp) FROM events e WHERE e.user_id = u.id),
        EXISTS(SELECT 1 FROM assignments a WHERE a.user_id = u.id)
     FROM users u";

impl Database {
    pub fn create_user(&self, email: Option<&str>, created_at: DateTime<Utc>) -> Result<UserRecord> {
        let user = UserRecord {
            id: Uuid::new_v4().to_string(),
            email: email.map(str::to_string),
            created_at,
            churn_probability: None,
        };
        self.insert_user(&user)?;
        Ok(user)
    }

    /// Insert a fully specified user row (imports and fixtures).
    pub fn insert_user(&self, user: &UserRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, email, created_at, churn_probability) VALUES (?, ?, ?, ?)",
            params![
                user.id,
                user.email,
                to_db_time(user.created_at),
                user.churn_probability
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        Ok(self
            .conn()
            .query_row(&sql, [user_id], user_from_row)
            .optional()?)
    }

    pub fn user_exists(&self, user_id: &str) -> Result<bool> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn count_users(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Activity summary for every user, ordered by id.
    pub fn user_activity(&self) -> Result<Vec<UserActivity>> {
        let sql = format!("{ACTIVITY_SELECT} ORDER BY u.id");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt
            .query_map([], activity_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// One page of activity summaries for users whose id sorts after
    /// `after`, ordered by id. Used by resumable batch jobs.
    pub fn user_activity_page(&self, after: Option<&str>, limit: usize) -> Result<Vec<UserActivity>> {
        let sql = format!("{ACTIVITY_SELECT} WHERE u.id > ?1 ORDER BY u.id LIMIT ?2");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt
            .query_map(params![after.unwrap_or(""), limit as i64], activity_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_churn_probability(&self, user_id: &str, probability: f64) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE users SET churn_probability = ? WHERE id = ?",
            params![probability, user_id],
        )?;
        Ok(changed > 0)
    }

    /// Mean churn probability over scored users.
    pub fn average_churn_probability(&self) -> Result<Option<f64>> {
        let avg: Option<f64> =
            self.conn()
                .query_row("SELECT AVG(churn_probability) FROM users", [], |row| row.get(0))?;
        Ok(avg)
    }

    pub fn count_users_above_risk(&self, threshold: f64) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE churn_probability > ?",
            [threshold],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Scored users with the highest churn probability first.
    pub fn top_churn_risk_users(&self, limit: usize) -> Result<Vec<UserRecord>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE churn_probability IS NOT NULL
             ORDER BY churn_probability DESC, id
             LIMIT ?"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt
            .query_map([limit as i64], user_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// (user id, signup time) for every user.
    pub fn user_signups(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, created_at FROM users ORDER BY created_at, id")?;
        let rows = stmt
            .query_map([], |row| {
                let created: String = row.get(1)?;
                Ok((row.get(0)?, from_db_time(1, &created)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
