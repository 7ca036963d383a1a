use axum::{
    Extension,
    extract::{State, rejection::BytesRejection},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use wellspring_db::models::{CompletionRow, HabitRow, ReviewOutcome};
use wellspring_db::timestamps::format_date;
use wellspring_types::api::{
    CreateHabitRequest, ReviewQueueItem, ReviewRequest, ReviewResponse, UpdateHabitRequest,
};
use wellspring_types::{CompletionStatus, Role};

use crate::convert;
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::middleware::{Claims, require_role};
use crate::state::AppState;
use crate::storage::{content_type_for, extension_for};
use crate::validation::{optional_text, required_text};

const MAX_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 1000;
const MAX_NOTE_LEN: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct CompletionQuery {
    pub note: Option<String>,
    /// Defaults to today (UTC).
    pub completed_on: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    #[serde(default = "default_queue_limit")]
    pub limit: u32,
}

fn default_queue_limit() -> u32 {
    50
}

pub async fn create_habit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateHabitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let row = HabitRow {
        id: Uuid::new_v4().to_string(),
        user_id: claims.sub.to_string(),
        name: required_text("Name", &req.name, MAX_NAME_LEN)?,
        description: optional_text("Description", req.description.as_deref(), MAX_DESCRIPTION_LEN)?,
        frequency: req.frequency.as_str().to_string(),
        current_streak: 0,
        longest_streak: 0,
        created_at: String::new(),
    };

    let id = row.id.clone();
    let stored = state
        .with_db(move |db| {
            db.insert_habit(&row)?;
            db.get_habit(&id)
        })
        .await?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("habit missing after insert")))?;

    info!("User {} created habit {}", claims.sub, stored.id);
    Ok((StatusCode::CREATED, Json(convert::habit(&stored)?)))
}

pub async fn list_habits(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let rows = state.with_db(move |db| db.list_habits(&user_id)).await?;
    Ok(Json(convert::all(&rows, convert::habit)?))
}

pub async fn get_habit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let habit = owned_habit(&state, id, &claims).await?;
    Ok(Json(convert::habit(&habit)?))
}

pub async fn update_habit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateHabitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let current = owned_habit(&state, id, &claims).await?;

    let name = match req.name.as_deref() {
        Some(name) => required_text("Name", name, MAX_NAME_LEN)?,
        None => current.name,
    };
    let description = match req.description.as_deref() {
        Some(d) => optional_text("Description", Some(d), MAX_DESCRIPTION_LEN)?,
        None => current.description,
    };
    let frequency = match req.frequency {
        Some(f) => f.as_str().to_string(),
        None => current.frequency,
    };

    let (id, user_id) = (id.to_string(), claims.sub.to_string());
    let today = Utc::now().date_naive();
    let updated = state
        .with_db(move |db| {
            let description = description.as_deref();
            if !db.update_habit(&id, &user_id, &name, description, &frequency, today)? {
                return Ok(None);
            }
            db.get_habit(&id)
        })
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(convert::habit(&updated)?))
}

/// Deletes the habit, its completions and their proof files.
pub async fn delete_habit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let proofs = state
        .with_db(move |db| db.delete_habit(&id.to_string(), &user_id))
        .await?
        .ok_or(ApiError::NotFound)?;

    for proof in &proofs {
        if let Err(e) = state.proofs.delete(proof).await {
            warn!("Failed to remove proof {} of deleted habit {}: {:#}", proof, id, e);
        }
    }

    info!("User {} deleted habit {} ({} proofs)", claims.sub, id, proofs.len());
    Ok(StatusCode::NO_CONTENT)
}

/// POST /habits/{id}/completions: the raw request body is the proof file,
/// typed by its Content-Type header. The completion starts out pending.
/// The router caps the body at `MAX_PROOF_SIZE`; a larger one surfaces here
/// as a rejection and is reported once ownership and type are known good.
pub async fn submit_completion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<CompletionQuery>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let habit = owned_habit(&state, id, &claims).await?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let extension = extension_for(content_type).ok_or(ApiError::UnsupportedMediaType)?;

    let body = body?;
    if body.is_empty() {
        return Err(ApiError::validation("Proof file is required"));
    }

    let today = Utc::now().date_naive();
    let completed_on = query.completed_on.unwrap_or(today);
    if completed_on > today {
        return Err(ApiError::validation("Completion date cannot be in the future"));
    }
    let note = optional_text("Note", query.note.as_deref(), MAX_NOTE_LEN)?;

    let stored = state.proofs.save(&body, extension).await?;

    let row = CompletionRow {
        id: Uuid::new_v4().to_string(),
        habit_id: habit.id,
        user_id: claims.sub.to_string(),
        completed_on: format_date(&completed_on),
        proof_path: stored.file_name.clone(),
        proof_content_type: content_type_for(&stored.file_name).to_string(),
        proof_sha256: stored.sha256,
        note,
        status: CompletionStatus::Pending.as_str().to_string(),
        reviewer_id: None,
        review_note: None,
        submitted_at: String::new(),
        reviewed_at: None,
    };

    let completion_id = row.id.clone();
    let inserted = state
        .with_db(move |db| {
            if !db.insert_completion(&row)? {
                return Ok(None);
            }
            db.get_completion(&completion_id)
        })
        .await;

    let inserted = match inserted {
        Ok(Some(row)) => row,
        Ok(None) => {
            discard_proof(&state, &stored.file_name).await;
            return Err(ApiError::conflict(
                "This habit already has a completion for that date",
            ));
        }
        Err(e) => {
            discard_proof(&state, &stored.file_name).await;
            return Err(e);
        }
    };

    info!(
        "User {} submitted completion {} for habit {} on {}",
        claims.sub, inserted.id, id, inserted.completed_on
    );
    Ok((StatusCode::CREATED, Json(convert::completion(&inserted)?)))
}

pub async fn list_completions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let habit = owned_habit(&state, id, &claims).await?;
    let rows = state
        .with_db(move |db| db.list_completions(&habit.id))
        .await?;
    Ok(Json(convert::all(&rows, convert::completion)?))
}

/// The submitter and reviewers may fetch a proof.
pub async fn download_proof(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let completion = state
        .with_db(move |db| db.get_completion(&id.to_string()))
        .await?
        .ok_or(ApiError::NotFound)?;

    if completion.user_id != claims.sub.to_string() && !claims.role.is_reviewer() {
        return Err(ApiError::NotFound);
    }

    let bytes = state.proofs.read(&completion.proof_path).await.map_err(|e| {
        error!("Proof {} for completion {} unreadable: {:#}", completion.proof_path, id, e);
        ApiError::NotFound
    })?;

    Ok((
        [(header::CONTENT_TYPE, completion.proof_content_type)],
        bytes,
    ))
}

/// GET /reviews/pending: oldest first.
pub async fn pending_reviews(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<QueueQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&claims, &[Role::Doctor, Role::Admin])?;

    let limit = query.limit.clamp(1, 200);
    let rows = state
        .with_db(move |db| db.list_pending_completions(limit))
        .await?;

    let items = rows
        .iter()
        .map(|row| {
            Ok(ReviewQueueItem {
                completion: convert::completion(&row.completion)?,
                habit_name: row.habit_name.clone(),
                user_name: row.user_name.clone(),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Json(items))
}

/// POST /completions/{id}/review: a completion is reviewed exactly once.
pub async fn review_completion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&claims, &[Role::Doctor, Role::Admin])?;

    let note = optional_text("Note", req.note.as_deref(), MAX_NOTE_LEN)?;
    let decision = req.decision.resulting_status();
    let reviewer_id = claims.sub.to_string();
    let today = Utc::now().date_naive();

    let outcome = state
        .with_db(move |db| {
            db.review_completion(&id.to_string(), &reviewer_id, decision, note.as_deref(), today)
        })
        .await?;

    match outcome {
        ReviewOutcome::NotFound => Err(ApiError::NotFound),
        ReviewOutcome::OwnCompletion => Err(ApiError::Forbidden),
        ReviewOutcome::AlreadyReviewed(status) => Err(ApiError::conflict(format!(
            "This completion has already been {status}"
        ))),
        ReviewOutcome::Reviewed { completion, habit } => Ok(Json(ReviewResponse {
            completion: convert::completion(&completion)?,
            habit: convert::habit(&habit)?,
        })),
    }
}

/// Habits are private to their owner; anyone else gets 404.
async fn owned_habit(state: &AppState, id: Uuid, claims: &Claims) -> Result<HabitRow, ApiError> {
    let habit = state
        .with_db(move |db| db.get_habit(&id.to_string()))
        .await?
        .ok_or(ApiError::NotFound)?;
    if habit.user_id != claims.sub.to_string() {
        return Err(ApiError::NotFound);
    }
    Ok(habit)
}

async fn discard_proof(state: &AppState, file_name: &str) {
    if let Err(e) = state.proofs.delete(file_name).await {
        warn!("Failed to discard unused proof {}: {:#}", file_name, e);
    }
}
