use anyhow::Result;
use rusqlite::{OptionalExtension, Row};

use crate::Database;
use crate::models::{ActivityRow, ActivityTotalsRow, PageCursor};

const ACTIVITY_COLUMNS: &str =
    "id, user_id, kind, duration_minutes, calories, notes, performed_at, created_at";

impl Database {
    pub fn insert_activity(&self, activity: &ActivityRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO activities (id, user_id, kind, duration_minutes, calories, notes, performed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    activity.id,
                    activity.user_id,
                    activity.kind,
                    activity.duration_minutes,
                    activity.calories,
                    activity.notes,
                    activity.performed_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Newest first. `before` is the (`performed_at`, id) of the last
    /// activity on the previous page.
    pub fn list_activities(
        &self,
        user_id: &str,
        limit: u32,
        before: Option<&PageCursor>,
    ) -> Result<Vec<ActivityRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ACTIVITY_COLUMNS} FROM activities
                 WHERE user_id = ?1
                   AND (?2 IS NULL OR performed_at < ?2 OR (performed_at = ?2 AND id < ?4))
                 ORDER BY performed_at DESC, id DESC
                 LIMIT ?3"
            );
            let at = before.map(|c| c.at.as_str());
            let id = before.and_then(|c| c.id.as_deref());
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, at, limit, id], map_activity)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Scoped to the owner: another user's activity reads as missing.
    pub fn get_activity(&self, id: &str, user_id: &str) -> Result<Option<ActivityRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = ?1 AND user_id = ?2");
            let row = conn.query_row(&sql, [id, user_id], map_activity).optional()?;
            Ok(row)
        })
    }

    pub fn update_activity(&self, activity: &ActivityRow) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE activities
                 SET kind = ?3, duration_minutes = ?4, calories = ?5, notes = ?6, performed_at = ?7
                 WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![
                    activity.id,
                    activity.user_id,
                    activity.kind,
                    activity.duration_minutes,
                    activity.calories,
                    activity.notes,
                    activity.performed_at,
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_activity(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "DELETE FROM activities WHERE id = ?1 AND user_id = ?2",
                [id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Per-kind totals for activities performed at or after `since`.
    pub fn activity_totals(&self, user_id: &str, since: &str) -> Result<Vec<ActivityTotalsRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT kind, COUNT(*), COALESCE(SUM(duration_minutes), 0), COALESCE(SUM(calories), 0)
                 FROM activities
                 WHERE user_id = ?1 AND performed_at >= ?2
                 GROUP BY kind
                 ORDER BY kind",
            )?;
            let rows = stmt
                .query_map([user_id, since], |row| {
                    Ok(ActivityTotalsRow {
                        kind: row.get(0)?,
                        count: row.get(1)?,
                        minutes: row.get(2)?,
                        calories: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_activity(row: &Row<'_>) -> rusqlite::Result<ActivityRow> {
    Ok(ActivityRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        duration_minutes: row.get(3)?,
        calories: row.get(4)?,
        notes: row.get(5)?,
        performed_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}
