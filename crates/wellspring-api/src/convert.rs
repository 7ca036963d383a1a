//! Row -> API model conversions. A row that fails to parse means the
//! database holds something the schema should not allow, so these return
//! internal errors rather than guessing.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use wellspring_db::models::{
    ActivityRow, AssessmentRow, CompletionRow, HabitRow, MessageRow, PageCursor, UserRow,
};
use wellspring_db::timestamps::{format_timestamp, parse_date, parse_timestamp};
use wellspring_types::api::{
    ActivityResponse, AssessmentResponse, CompletionResponse, DoctorSummary, HabitResponse, MessageResponse,
};
use wellspring_types::models::User;

pub fn uuid(s: &str) -> Result<Uuid> {
    s.parse().with_context(|| format!("corrupt id '{}'", s))
}

/// Paging cursor from `before` / `before_id` query values. `before_id` only
/// matters alongside `before`.
pub fn cursor(before: Option<DateTime<Utc>>, before_id: Option<Uuid>) -> Option<PageCursor> {
    before.map(|at| PageCursor {
        at: format_timestamp(&at),
        id: before_id.map(|id| id.to_string()),
    })
}

fn opt_uuid(s: Option<&str>) -> Result<Option<Uuid>> {
    s.map(uuid).transpose()
}

pub fn user(row: &UserRow) -> Result<User> {
    Ok(User {
        id: uuid(&row.id)?,
        email: row.email.clone(),
        name: row.name.clone(),
        role: row.role.parse()?,
        specialization: row.specialization.clone(),
        available: row.available,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

pub fn doctor(row: &UserRow) -> Result<DoctorSummary> {
    Ok(DoctorSummary {
        id: uuid(&row.id)?,
        name: row.name.clone(),
        specialization: row.specialization.clone(),
        available: row.available,
    })
}

pub fn activity(row: &ActivityRow) -> Result<ActivityResponse> {
    Ok(ActivityResponse {
        id: uuid(&row.id)?,
        kind: row.kind.parse()?,
        duration_minutes: u32::try_from(row.duration_minutes)?,
        calories: u32::try_from(row.calories)?,
        notes: row.notes.clone(),
        performed_at: parse_timestamp(&row.performed_at)?,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

pub fn habit(row: &HabitRow) -> Result<HabitResponse> {
    Ok(HabitResponse {
        id: uuid(&row.id)?,
        name: row.name.clone(),
        description: row.description.clone(),
        frequency: row.frequency.parse()?,
        current_streak: u32::try_from(row.current_streak)?,
        longest_streak: u32::try_from(row.longest_streak)?,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

pub fn completion(row: &CompletionRow) -> Result<CompletionResponse> {
    Ok(CompletionResponse {
        id: uuid(&row.id)?,
        habit_id: uuid(&row.habit_id)?,
        user_id: uuid(&row.user_id)?,
        completed_on: parse_date(&row.completed_on)?,
        proof_content_type: row.proof_content_type.clone(),
        proof_sha256: row.proof_sha256.clone(),
        note: row.note.clone(),
        status: row.status.parse()?,
        reviewer_id: opt_uuid(row.reviewer_id.as_deref())?,
        review_note: row.review_note.clone(),
        submitted_at: parse_timestamp(&row.submitted_at)?,
        reviewed_at: row.reviewed_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

pub fn assessment(row: &AssessmentRow) -> Result<AssessmentResponse> {
    Ok(AssessmentResponse {
        id: uuid(&row.id)?,
        user_id: uuid(&row.user_id)?,
        responses: serde_json::from_str(&row.responses).context("corrupt responses")?,
        score: row.score,
        severity: row.severity.parse()?,
        category_scores: serde_json::from_str(&row.category_scores).context("corrupt category scores")?,
        recommendations: serde_json::from_str(&row.recommendations).context("corrupt recommendations")?,
        assigned_doctor_id: opt_uuid(row.assigned_doctor_id.as_deref())?,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

pub fn message(row: &MessageRow) -> Result<MessageResponse> {
    Ok(MessageResponse {
        id: uuid(&row.id)?,
        thread_id: uuid(&row.thread_id)?,
        sender_id: uuid(&row.sender_id)?,
        sender_name: row.sender_name.clone(),
        recipient_id: uuid(&row.recipient_id)?,
        recipient_name: row.recipient_name.clone(),
        subject: row.subject.clone(),
        body: row.body.clone(),
        read: row.read,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

/// Convert a list of rows, failing on the first bad one.
pub fn all<R, T>(rows: &[R], f: impl Fn(&R) -> Result<T>) -> Result<Vec<T>> {
    rows.iter().map(f).collect()
}
