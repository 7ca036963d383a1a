use anyhow::Result;
use rusqlite::{OptionalExtension, Row};
use tracing::{info, warn};

use crate::Database;
use crate::models::{AssessmentRow, Assignment, Referral};

const ASSESSMENT_COLUMNS: &str = "id, user_id, responses, score, severity, category_scores, \
     recommendations, assigned_doctor_id, created_at";

impl Database {
    /// Persist an assessment. With a referral, the least-loaded available
    /// doctor is assigned and the referral opens a thread from the patient
    /// to that doctor, all in one transaction. If no doctor is available the
    /// referral's unassigned recommendations are stored instead. Returns the
    /// assignment, or `None` when no referral was requested or no doctor is
    /// available.
    pub fn insert_assessment(
        &self,
        assessment: &AssessmentRow,
        referral: Option<&Referral>,
    ) -> Result<Option<Assignment>> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let doctor: Option<(String, String)> = match referral {
                Some(_) => tx
                    .query_row(
                        "SELECT u.id, u.name FROM users u
                         WHERE u.role = 'doctor' AND u.available = 1 AND u.id != ?1
                         ORDER BY (SELECT COUNT(*) FROM assessments a WHERE a.assigned_doctor_id = u.id) ASC,
                                  u.created_at ASC, u.rowid ASC
                         LIMIT 1",
                        [&assessment.user_id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?,
                None => None,
            };

            let recommendations = match (referral, &doctor) {
                (Some(referral), None) => &referral.unassigned_recommendations,
                _ => &assessment.recommendations,
            };

            tx.execute(
                "INSERT INTO assessments
                    (id, user_id, responses, score, severity, category_scores, recommendations, assigned_doctor_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    assessment.id,
                    assessment.user_id,
                    assessment.responses,
                    assessment.score,
                    assessment.severity,
                    assessment.category_scores,
                    recommendations,
                    doctor.as_ref().map(|(id, _)| id),
                ],
            )?;

            let assignment = match (referral, doctor) {
                (Some(referral), Some((doctor_id, doctor_name))) => {
                    tx.execute(
                        "INSERT INTO messages (id, thread_id, sender_id, recipient_id, subject, body)
                         VALUES (?1, ?1, ?2, ?3, ?4, ?5)",
                        rusqlite::params![
                            referral.message_id,
                            assessment.user_id,
                            doctor_id,
                            referral.subject,
                            referral.body,
                        ],
                    )?;
                    info!(
                        "Assessment {} ({}) assigned to doctor {}",
                        assessment.id, assessment.severity, doctor_id
                    );
                    Some(Assignment {
                        doctor_id,
                        doctor_name,
                        thread_id: referral.message_id.clone(),
                    })
                }
                (Some(_), None) => {
                    warn!(
                        "Assessment {} ({}) needs a doctor but none is available",
                        assessment.id, assessment.severity
                    );
                    None
                }
                (None, _) => None,
            };

            tx.commit()?;
            Ok(assignment)
        })
    }

    pub fn get_assessment(&self, id: &str) -> Result<Option<AssessmentRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {ASSESSMENT_COLUMNS} FROM assessments WHERE id = ?1");
            let row = conn.query_row(&sql, [id], map_assessment).optional()?;
            Ok(row)
        })
    }

    /// Newest first.
    pub fn list_assessments(&self, user_id: &str, limit: u32) -> Result<Vec<AssessmentRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ASSESSMENT_COLUMNS} FROM assessments
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], map_assessment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn latest_assessment(&self, user_id: &str) -> Result<Option<AssessmentRow>> {
        Ok(self.list_assessments(user_id, 1)?.into_iter().next())
    }

    pub fn list_assigned_assessments(&self, doctor_id: &str, limit: u32) -> Result<Vec<AssessmentRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ASSESSMENT_COLUMNS} FROM assessments
                 WHERE assigned_doctor_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![doctor_id, limit], map_assessment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_assessments_by_severity(&self) -> Result<Vec<(String, i64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT severity, COUNT(*) FROM assessments GROUP BY severity ORDER BY severity",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// High-severity assessments still waiting for a doctor.
    pub fn count_unassigned_high_severity(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM assessments
                 WHERE severity IN ('poor', 'critical') AND assigned_doctor_id IS NULL",
                [],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

fn map_assessment(row: &Row<'_>) -> rusqlite::Result<AssessmentRow> {
    Ok(AssessmentRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        responses: row.get(2)?,
        score: row.get(3)?,
        severity: row.get(4)?,
        category_scores: row.get(5)?,
        recommendations: row.get(6)?,
        assigned_doctor_id: row.get(7)?,
        created_at: row.get(8)?,
    })
}
