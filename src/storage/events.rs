//! Append-only event log.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::error::{Result, SplitError};
use crate::storage::models::{EventRecord, from_db_time, to_db_time};
use crate::storage::sqlite::Database;

impl Database {
    /// Append an event for an existing user.
    pub fn log_event(
        &self,
        user_id: &str,
        event_type: &str,
        payload: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Result<EventRecord> {
        if !self.user_exists(user_id)? {
            return Err(SplitError::UserNotFound(user_id.to_string()));
        }
        let record = EventRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            event_type: event_type.to_string(),
            payload,
            timestamp,
        };
        self.conn().execute(
            "INSERT INTO events (id, user_id, event_type, payload, timestamp) VALUES (?, ?, ?, ?, ?)",
            params![
                record.id,
                record.user_id,
                record.event_type,
                serde_json::to_string(&record.payload)?,
                to_db_time(record.timestamp),
            ],
        )?;
        tracing::debug!(target: "events", user = %record.user_id, event_type = %record.event_type, "event logged");
        Ok(record)
    }

    /// (event count, most recent event time) for one user.
    pub fn event_stats_for_user(&self, user_id: &str) -> Result<(u64, Option<DateTime<Utc>>)> {
        let (count, last): (i64, Option<String>) = self.conn().query_row(
            "SELECT COUNT(*), MAX(timestamp) FROM events WHERE user_id = ?",
            [user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let last = match last {
            Some(raw) => Some(from_db_time(1, &raw)?),
            None => None,
        };
        Ok((count.max(0) as u64, last))
    }

    /// Distinct users with at least one event in `[start, end)`.
    pub fn count_active_users_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(DISTINCT user_id) FROM events WHERE timestamp >= ? AND timestamp < ?",
            params![to_db_time(start), to_db_time(end)],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Distinct users with at least one event at or after `start`.
    pub fn count_active_users_since(&self, start: DateTime<Utc>) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(DISTINCT user_id) FROM events WHERE timestamp >= ?",
            [to_db_time(start)],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Distinct users among `user_ids` with at least one event in `[start, end)`.
    pub fn count_active_among(
        &self,
        user_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64> {
        // Chunks keep the bound parameter count well under SQLite's limit.
        let mut total = 0u64;
        for chunk in user_ids.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT COUNT(DISTINCT user_id) FROM events
                 WHERE timestamp >= ? AND timestamp < ? AND user_id IN ({placeholders})"
            );
            let mut values: Vec<String> = Vec::with_capacity(chunk.len() + 2);
            values.push(to_db_time(start));
            values.push(to_db_time(end));
            values.extend(chunk.iter().cloned());
            let count: i64 = self.conn().query_row(
                &sql,
                rusqlite::params_from_iter(values.iter()),
                |row| row.get(0),
            )?;
            total += count.max(0) as u64;
        }
        Ok(total)
    }

    /// Every event for `user_id`, oldest first.
    pub fn events_for_user(&self, user_id: &str) -> Result<Vec<EventRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, event_type, payload, timestamp FROM events
             WHERE user_id = ? ORDER BY timestamp, id",
        )?;
        let rows = stmt
            .query_map([user_id], |row| {
                let payload: String = row.get(3)?;
                let timestamp: String = row.get(4)?;
                Ok(EventRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    event_type: row.get(2)?,
                    payload: serde_json::from_str(&payload).map_err(|err| {
                        rusqlite::Error::FromSqlConversionFailure(
                            3,
                            rusqlite::types::Type::Text,
                            Box::new(err),
                        )
                    })?,
                    timestamp: from_db_time(4, &timestamp)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
