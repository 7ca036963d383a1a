use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::info;

use wellspring_health::compute_streak;
use wellspring_types::{CompletionStatus, Frequency};

use crate::Database;
use crate::models::{CompletionRow, HabitRow, PendingCompletionRow, ReviewOutcome};
use crate::timestamps::parse_date;

const HABIT_COLUMNS: &str =
    "id, user_id, name, description, frequency, current_streak, longest_streak, created_at";

const COMPLETION_COLUMNS: &str = "c.id, c.habit_id, c.user_id, c.completed_on, c.proof_path, \
     c.proof_content_type, c.proof_sha256, c.note, c.status, c.reviewer_id, c.review_note, \
     c.submitted_at, c.reviewed_at";

impl Database {
    // -- Habits --

    pub fn insert_habit(&self, habit: &HabitRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO habits (id, user_id, name, description, frequency)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    habit.id,
                    habit.user_id,
                    habit.name,
                    habit.description,
                    habit.frequency,
                ],
            )?;
            Ok(())
        })
    }

    pub fn list_habits(&self, user_id: &str) -> Result<Vec<HabitRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {HABIT_COLUMNS} FROM habits WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], map_habit)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_habit(&self, id: &str) -> Result<Option<HabitRow>> {
        self.with_conn(|conn| query_habit(conn, id))
    }

    /// Returns false if the habit does not exist for this user. Changing the
    /// frequency changes the period unit, so both streaks are recomputed from
    /// the approved dates.
    pub fn update_habit(
        &self,
        id: &str,
        user_id: &str,
        name: &str,
        description: Option<&str>,
        frequency: &str,
        today: NaiveDate,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let previous: Option<String> = tx
                .query_row(
                    "SELECT frequency FROM habits WHERE id = ?1 AND user_id = ?2",
                    [id, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(previous) = previous else {
                return Ok(false);
            };

            tx.execute(
                "UPDATE habits SET name = ?2, description = ?3, frequency = ?4 WHERE id = ?1",
                rusqlite::params![id, name, description, frequency],
            )?;
            if previous != frequency {
                tx.execute(
                    "UPDATE habits SET current_streak = 0, longest_streak = 0 WHERE id = ?1",
                    [id],
                )?;
                refresh_streak(&tx, id, today)?;
                info!("Habit {} switched from {} to {}; streak recomputed", id, previous, frequency);
            }

            tx.commit()?;
            Ok(true)
        })
    }

    /// Deletes the habit and its completions. Returns the proof paths that
    /// were attached so the caller can remove the files, or `None` if the
    /// habit does not exist for this user.
    pub fn delete_habit(&self, id: &str, user_id: &str) -> Result<Option<Vec<String>>> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let paths = {
                let mut stmt =
                    tx.prepare("SELECT proof_path FROM habit_completions WHERE habit_id = ?1")?;
                let paths = stmt
                    .query_map([id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                paths
            };

            let changed = tx.execute(
                "DELETE FROM habits WHERE id = ?1 AND user_id = ?2",
                [id, user_id],
            )?;
            tx.commit()?;

            Ok((changed > 0).then_some(paths))
        })
    }

    // -- Completions --

    /// Insert a pending completion. Returns false when the habit already has
    /// a pending or approved completion for the same date.
    pub fn insert_completion(&self, completion: &CompletionRow) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let live: i64 = tx.query_row(
                "SELECT COUNT(*) FROM habit_completions
                 WHERE habit_id = ?1 AND completed_on = ?2 AND status != 'rejected'",
                [&completion.habit_id, &completion.completed_on],
                |row| row.get(0),
            )?;
            if live > 0 {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO habit_completions
                    (id, habit_id, user_id, completed_on, proof_path, proof_content_type, proof_sha256, note, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending')",
                rusqlite::params![
                    completion.id,
                    completion.habit_id,
                    completion.user_id,
                    completion.completed_on,
                    completion.proof_path,
                    completion.proof_content_type,
                    completion.proof_sha256,
                    completion.note,
                ],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn get_completion(&self, id: &str) -> Result<Option<CompletionRow>> {
        self.with_conn(|conn| query_completion(conn, id))
    }

    pub fn list_completions(&self, habit_id: &str) -> Result<Vec<CompletionRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {COMPLETION_COLUMNS} FROM habit_completions c
                 WHERE c.habit_id = ?1
                 ORDER BY c.completed_on DESC, c.submitted_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([habit_id], map_completion)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Reviewer queue, oldest submission first.
    pub fn list_pending_completions(&self, limit: u32) -> Result<Vec<PendingCompletionRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {COMPLETION_COLUMNS}, h.name, u.name
                 FROM habit_completions c
                 JOIN habits h ON h.id = c.habit_id
                 JOIN users u ON u.id = c.user_id
                 WHERE c.status = 'pending'
                 ORDER BY c.submitted_at ASC, c.rowid ASC
                 LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(PendingCompletionRow {
                        completion: map_completion(row)?,
                        habit_name: row.get(13)?,
                        user_name: row.get(14)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Pending completions, across everyone or for one user.
    pub fn count_pending_completions(&self, user_id: Option<&str>) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM habit_completions
                 WHERE status = 'pending' AND (?1 IS NULL OR user_id = ?1)",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Move a pending completion to `approved` or `rejected`.
    ///
    /// The status change is conditional on the row still being pending, so
    /// of two concurrent reviews only one takes effect. Nobody reviews their
    /// own completion. Approval recomputes
    /// the habit's streak from every approved date, relative to `today`.
    pub fn review_completion(
        &self,
        id: &str,
        reviewer_id: &str,
        decision: CompletionStatus,
        note: Option<&str>,
        today: NaiveDate,
    ) -> Result<ReviewOutcome> {
        if decision == CompletionStatus::Pending {
            anyhow::bail!("a review must approve or reject");
        }

        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let changed = tx.execute(
                "UPDATE habit_completions
                 SET status = ?2, reviewer_id = ?3, review_note = ?4, reviewed_at = datetime('now')
                 WHERE id = ?1 AND status = 'pending' AND user_id != ?3",
                rusqlite::params![id, decision.as_str(), reviewer_id, note],
            )?;

            if changed == 0 {
                let existing: Option<(String, String)> = tx
                    .query_row(
                        "SELECT status, user_id FROM habit_completions WHERE id = ?1",
                        [id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                return Ok(match existing {
                    None => ReviewOutcome::NotFound,
                    Some((_, owner)) if owner == reviewer_id => ReviewOutcome::OwnCompletion,
                    Some((status, _)) => ReviewOutcome::AlreadyReviewed(status),
                });
            }

            let completion = query_completion(&tx, id)?.context("completion vanished mid-review")?;

            if decision == CompletionStatus::Approved {
                refresh_streak(&tx, &completion.habit_id, today)?;
            }

            let habit = query_habit(&tx, &completion.habit_id)?.context("habit vanished mid-review")?;
            tx.commit()?;

            info!(
                "Completion {} {} by reviewer {}",
                id,
                decision.as_str(),
                reviewer_id
            );
            Ok(ReviewOutcome::Reviewed { completion, habit })
        })
    }
}

fn refresh_streak(conn: &Connection, habit_id: &str, today: NaiveDate) -> Result<()> {
    let (frequency, longest): (String, i64) = conn.query_row(
        "SELECT frequency, longest_streak FROM habits WHERE id = ?1",
        [habit_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let frequency: Frequency = frequency.parse()?;

    let dates = {
        let mut stmt = conn.prepare(
            "SELECT completed_on FROM habit_completions WHERE habit_id = ?1 AND status = 'approved'",
        )?;
        let raw = stmt
            .query_map([habit_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raw.iter().map(|s| parse_date(s)).collect::<Result<Vec<_>>>()?
    };

    let streak = compute_streak(&dates, frequency, today);
    conn.execute(
        "UPDATE habits SET current_streak = ?2, longest_streak = ?3 WHERE id = ?1",
        rusqlite::params![
            habit_id,
            streak.current,
            longest.max(streak.longest as i64),
        ],
    )?;
    Ok(())
}

fn query_habit(conn: &Connection, id: &str) -> Result<Option<HabitRow>> {
    let sql = format!("SELECT {HABIT_COLUMNS} FROM habits WHERE id = ?1");
    let row = conn.query_row(&sql, [id], map_habit).optional()?;
    Ok(row)
}

fn query_completion(conn: &Connection, id: &str) -> Result<Option<CompletionRow>> {
    let sql = format!("SELECT {COMPLETION_COLUMNS} FROM habit_completions c WHERE c.id = ?1");
    let row = conn.query_row(&sql, [id], map_completion).optional()?;
    Ok(row)
}

fn map_habit(row: &Row<'_>) -> rusqlite::Result<HabitRow> {
    Ok(HabitRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        frequency: row.get(4)?,
        current_streak: row.get(5)?,
        longest_streak: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn map_completion(row: &Row<'_>) -> rusqlite::Result<CompletionRow> {
    Ok(CompletionRow {
        id: row.get(0)?,
        habit_id: row.get(1)?,
        user_id: row.get(2)?,
        completed_on: row.get(3)?,
        proof_path: row.get(4)?,
        proof_content_type: row.get(5)?,
        proof_sha256: row.get(6)?,
        note: row.get(7)?,
        status: row.get(8)?,
        reviewer_id: row.get(9)?,
        review_note: row.get(10)?,
        submitted_at: row.get(11)?,
        reviewed_at: row.get(12)?,
    })
}
