//! Database row types. These map directly to SQLite rows and stay separate
//! from the wellspring-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: String,
    pub specialization: Option<String>,
    pub available: bool,
    pub created_at: String,
}

/// Keyset position for newest-first listings: the timestamp and id of the
/// last row on the previous page. Rows sharing `at` are ordered by id.
#[derive(Debug, Clone)]
pub struct PageCursor {
    pub at: String,
    pub id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ActivityRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub duration_minutes: i64,
    pub calories: i64,
    pub notes: Option<String>,
    pub performed_at: String,
    pub created_at: String,
}

/// Aggregate for one activity kind over a time window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityTotalsRow {
    pub kind: String,
    pub count: i64,
    pub minutes: i64,
    pub calories: i64,
}

#[derive(Debug, Clone)]
pub struct HabitRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub frequency: String,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct CompletionRow {
    pub id: String,
    pub habit_id: String,
    pub user_id: String,
    pub completed_on: String,
    pub proof_path: String,
    pub proof_content_type: String,
    pub proof_sha256: String,
    pub note: Option<String>,
    pub status: String,
    pub reviewer_id: Option<String>,
    pub review_note: Option<String>,
    pub submitted_at: String,
    pub reviewed_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PendingCompletionRow {
    pub completion: CompletionRow,
    pub habit_name: String,
    pub user_name: String,
}

#[derive(Debug)]
pub enum ReviewOutcome {
    NotFound,
    /// The reviewer submitted this completion themselves.
    OwnCompletion,
    /// The completion left `pending` before this review; carries its status.
    AlreadyReviewed(String),
    Reviewed {
        completion: CompletionRow,
        habit: HabitRow,
    },
}

#[derive(Debug, Clone)]
pub struct AssessmentRow {
    pub id: String,
    pub user_id: String,
    /// JSON object: question id -> option index.
    pub responses: String,
    pub score: f64,
    pub severity: String,
    /// JSON object: category -> score.
    pub category_scores: String,
    /// JSON array of strings.
    pub recommendations: String,
    pub assigned_doctor_id: Option<String>,
    pub created_at: String,
}

/// Opening message sent to a doctor when an assessment is auto-assigned.
#[derive(Debug, Clone)]
pub struct Referral {
    pub message_id: String,
    pub subject: String,
    pub body: String,
    /// Stored in place of the assessment's recommendations when no doctor
    /// can take the referral.
    pub unassigned_recommendations: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub doctor_id: String,
    pub doctor_name: String,
    pub thread_id: String,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub recipient_id: String,
    pub recipient_name: String,
    pub subject: String,
    pub body: String,
    pub read: bool,
    pub created_at: String,
}
