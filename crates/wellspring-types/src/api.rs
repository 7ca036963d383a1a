use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ActivityKind, CompletionStatus, Frequency, ReviewDecision, Role, Severity, User};

// -- JWT Claims --

/// Session claims carried by both the bearer token and the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

// -- Activities --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateActivityRequest {
    pub kind: ActivityKind,
    pub duration_minutes: u32,
    pub calories: Option<u32>,
    pub notes: Option<String>,
    pub performed_at: Option<DateTime<Utc>>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateActivityRequest {
    pub kind: Option<ActivityKind>,
    pub duration_minutes: Option<u32>,
    pub calories: Option<u32>,
    pub notes: Option<String>,
    pub performed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityResponse {
    pub id: Uuid,
    pub kind: ActivityKind,
    pub duration_minutes: u32,
    pub calories: u32,
    pub notes: Option<String>,
    pub performed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindTotals {
    pub kind: ActivityKind,
    pub count: u64,
    pub minutes: u64,
    pub calories: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub days: u32,
    pub total_count: u64,
    pub total_minutes: u64,
    pub total_calories: u64,
    pub by_kind: Vec<KindTotals>,
}

// -- Habits --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateHabitRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_frequency")]
    pub frequency: Frequency,
}

fn default_frequency() -> Frequency {
    Frequency::Daily
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateHabitRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub frequency: Option<Frequency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub frequency: Frequency,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: Uuid,
    pub habit_id: Uuid,
    pub user_id: Uuid,
    pub completed_on: NaiveDate,
    pub proof_content_type: String,
    pub proof_sha256: String,
    pub note: Option<String>,
    pub status: CompletionStatus,
    pub reviewer_id: Option<Uuid>,
    pub review_note: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// A pending completion as shown to reviewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewQueueItem {
    #[serde(flatten)]
    pub completion: CompletionResponse,
    pub habit_name: String,
    pub user_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub completion: CompletionResponse,
    pub habit: HabitResponse,
}

// -- Assessments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitAssessmentRequest {
    /// Question id -> index of the chosen option.
    pub responses: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub responses: BTreeMap<String, usize>,
    pub score: f64,
    pub severity: Severity,
    pub category_scores: BTreeMap<String, f64>,
    pub recommendations: Vec<String>,
    pub assigned_doctor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitAssessmentResponse {
    #[serde(flatten)]
    pub assessment: AssessmentResponse,
    /// Thread opened with the assigned doctor, when one was assigned.
    pub thread_id: Option<Uuid>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    /// Required unless `reply_to` is set, in which case it is derived.
    pub recipient_id: Option<Uuid>,
    pub subject: Option<String>,
    pub body: String,
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub recipient_id: Uuid,
    pub recipient_name: String,
    pub subject: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub unread: u64,
}

// -- Doctors & admin --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSummary {
    pub id: Uuid,
    pub name: String,
    pub specialization: Option<String>,
    pub available: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Role,
    pub specialization: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AvailabilityRequest {
    pub available: bool,
}

// -- Dashboard --

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum DashboardResponse {
    User {
        activity: ActivitySummary,
        habits: Vec<HabitResponse>,
        pending_completions: u64,
        latest_assessment: Option<AssessmentResponse>,
        unread_messages: u64,
    },
    Doctor {
        available: bool,
        pending_reviews: u64,
        assigned_assessments: Vec<AssessmentResponse>,
        unread_messages: u64,
    },
    Admin {
        users_by_role: BTreeMap<String, u64>,
        pending_reviews: u64,
        assessments_by_severity: BTreeMap<String, u64>,
        unassigned_high_severity: u64,
    },
}
