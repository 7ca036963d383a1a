use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use wellspring_db::models::{AssessmentRow, Referral};
use wellspring_health::{QUESTIONS, ScoreCard, recommend, score};
use wellspring_types::Role;
use wellspring_types::api::{SubmitAssessmentRequest, SubmitAssessmentResponse};

use crate::convert;
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::middleware::{Claims, require_role};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    20
}

pub async fn list_questions() -> impl IntoResponse {
    Json(&QUESTIONS[..])
}

/// Score the answers, store the result and, for poor or critical results,
/// refer the patient to the least-loaded available doctor.
pub async fn submit_assessment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitAssessmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let card = score(&req.responses).map_err(|e| ApiError::validation(e.to_string()))?;
    let to_json = |recs: &[String]| serde_json::to_string(recs).map_err(anyhow::Error::from);

    let row = AssessmentRow {
        id: Uuid::new_v4().to_string(),
        user_id: claims.sub.to_string(),
        responses: serde_json::to_string(&req.responses).map_err(anyhow::Error::from)?,
        score: card.score,
        severity: card.severity.as_str().to_string(),
        category_scores: serde_json::to_string(&card.category_scores_by_name())
            .map_err(anyhow::Error::from)?,
        recommendations: to_json(&recommend(&card, true))?,
        assigned_doctor_id: None,
        created_at: String::new(),
    };

    let referral = match card.severity.is_high() {
        true => Some(referral_for(&card, to_json(&recommend(&card, false))?)),
        false => None,
    };

    let id = row.id.clone();
    let (assignment, stored) = state
        .with_db(move |db| {
            let assignment = db.insert_assessment(&row, referral.as_ref())?;
            Ok((assignment, db.get_assessment(&id)?))
        })
        .await?;
    let stored =
        stored.ok_or_else(|| ApiError::Internal(anyhow::anyhow!("assessment missing after insert")))?;

    info!(
        "User {} completed assessment {}: {} ({})",
        claims.sub, stored.id, stored.score, stored.severity
    );

    let thread_id = assignment
        .map(|a| convert::uuid(&a.thread_id))
        .transpose()?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitAssessmentResponse {
            assessment: convert::assessment(&stored)?,
            thread_id,
        }),
    ))
}

/// The caller's own assessments, newest first.
pub async fn list_assessments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let limit = query.limit.clamp(1, 100);
    let rows = state
        .with_db(move |db| db.list_assessments(&user_id, limit))
        .await?;
    Ok(Json(convert::all(&rows, convert::assessment)?))
}

/// Visible to the patient, the assigned doctor and admins.
pub async fn get_assessment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .with_db(move |db| db.get_assessment(&id.to_string()))
        .await?
        .ok_or(ApiError::NotFound)?;

    let caller = claims.sub.to_string();
    let allowed = row.user_id == caller
        || row.assigned_doctor_id.as_deref() == Some(caller.as_str())
        || claims.role == Role::Admin;
    if !allowed {
        return Err(ApiError::NotFound);
    }

    Ok(Json(convert::assessment(&row)?))
}

/// GET /assessments/assigned: the calling doctor's referrals.
pub async fn assigned_assessments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&claims, &[Role::Doctor])?;

    let doctor_id = claims.sub.to_string();
    let limit = query.limit.clamp(1, 100);
    let rows = state
        .with_db(move |db| db.list_assigned_assessments(&doctor_id, limit))
        .await?;
    Ok(Json(convert::all(&rows, convert::assessment)?))
}

/// Opening message of the doctor thread, sent in the patient's name.
fn referral_for(card: &ScoreCard, unassigned_recommendations: String) -> Referral {
    let mut body = format!(
        "My wellness assessment scored {:.1}/100 ({}). I would like to discuss the results.",
        card.score, card.severity
    );

    let mut weak: Vec<_> = card
        .category_scores
        .iter()
        .filter(|(_, s)| **s < wellspring_health::recommendations::CATEGORY_ATTENTION_THRESHOLD)
        .collect();
    weak.sort_by(|a, b| a.1.total_cmp(b.1));
    if !weak.is_empty() {
        let areas: Vec<String> = weak
            .iter()
            .map(|(category, s)| format!("{} {:.1}", category.as_str(), s))
            .collect();
        body.push_str(&format!("\n\nAreas of concern: {}.", areas.join(", ")));
    }

    Referral {
        message_id: Uuid::new_v4().to_string(),
        subject: format!("Assessment follow-up: {} result", card.severity),
        body,
        unassigned_recommendations,
    }
}
