use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use wellspring_db::models::{MessageRow, NewMessage};
use wellspring_types::Role;
use wellspring_types::api::{SendMessageRequest, UnreadCountResponse};

use crate::convert;
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::middleware::Claims;
use crate::state::AppState;
use crate::validation::required_text;

const MAX_SUBJECT_LEN: usize = 200;
const MAX_BODY_LEN: usize = 5000;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub before: Option<DateTime<Utc>>,
    pub before_id: Option<Uuid>,
}

fn default_limit() -> u32 {
    50
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let body = required_text("Body", &req.body, MAX_BODY_LEN)?;
    let sender_id = claims.sub.to_string();

    let (recipient_id, thread_id, subject) = match req.reply_to {
        Some(parent_id) => {
            let parent = state
                .with_db(move |db| db.get_message(&parent_id.to_string()))
                .await?
                .ok_or(ApiError::NotFound)?;
            if !is_participant(&parent, &sender_id) {
                return Err(ApiError::NotFound);
            }

            let other = if parent.sender_id == sender_id {
                parent.recipient_id.clone()
            } else {
                parent.sender_id.clone()
            };
            if req.recipient_id.is_some_and(|r| r.to_string() != other) {
                return Err(ApiError::validation(
                    "A reply goes to the other participant of the thread",
                ));
            }
            let subject = match req.subject.as_deref() {
                Some(s) => required_text("Subject", s, MAX_SUBJECT_LEN)?,
                None => reply_subject(&parent.subject),
            };
            (other, parent.thread_id, subject)
        }
        None => {
            let recipient = req
                .recipient_id
                .ok_or_else(|| ApiError::validation("A recipient is required"))?;
            let subject = required_text(
                "Subject",
                req.subject.as_deref().unwrap_or(""),
                MAX_SUBJECT_LEN,
            )?;
            // A fresh message starts its own thread
            (recipient.to_string(), String::new(), subject)
        }
    };

    if recipient_id == sender_id {
        return Err(ApiError::validation("You cannot message yourself"));
    }

    let lookup = recipient_id.clone();
    let recipient = state
        .with_db(move |db| db.get_user_by_id(&lookup))
        .await?
        .ok_or(ApiError::NotFound)?;
    let recipient_role: Role = recipient.role.parse().map_err(anyhow::Error::from)?;
    if !may_message(claims.role, recipient_role) && req.reply_to.is_none() {
        return Err(ApiError::Forbidden);
    }

    let id = Uuid::new_v4().to_string();
    let message = NewMessage {
        thread_id: if thread_id.is_empty() { id.clone() } else { thread_id },
        id: id.clone(),
        sender_id,
        recipient_id,
        subject,
        body,
    };

    let stored = state
        .with_db(move |db| {
            db.insert_message(&message)?;
            db.get_message(&id)
        })
        .await?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("message missing after insert")))?;

    info!(
        "User {} sent message {} to {} (thread {})",
        claims.sub, stored.id, stored.recipient_id, stored.thread_id
    );
    Ok((StatusCode::CREATED, Json(convert::message(&stored)?)))
}

pub async fn inbox(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let limit = query.limit.clamp(1, 200);
    let before = convert::cursor(query.before, query.before_id);
    let rows = state
        .with_db(move |db| db.inbox(&user_id, limit, before.as_ref()))
        .await?;
    Ok(Json(convert::all(&rows, convert::message)?))
}

pub async fn sent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let limit = query.limit.clamp(1, 200);
    let before = convert::cursor(query.before, query.before_id);
    let rows = state
        .with_db(move |db| db.sent_messages(&user_id, limit, before.as_ref()))
        .await?;
    Ok(Json(convert::all(&rows, convert::message)?))
}

/// Reading a message as its recipient marks it read.
pub async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = claims.sub.to_string();
    let mut row = participant_message(&state, id, &caller).await?;

    if row.recipient_id == caller && !row.read {
        let (id, recipient) = (row.id.clone(), caller.clone());
        state.with_db(move |db| db.mark_read(&id, &recipient)).await?;
        row.read = true;
    }

    Ok(Json(convert::message(&row)?))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = claims.sub.to_string();
    let marked = state
        .with_db(move |db| db.mark_read(&id.to_string(), &caller))
        .await?;
    if !marked {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let unread = state.with_db(move |db| db.unread_count(&user_id)).await?;
    Ok(Json(UnreadCountResponse {
        unread: unread as u64,
    }))
}

/// GET /messages/{id}/thread: the whole conversation `id` belongs to,
/// oldest first.
pub async fn thread(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = claims.sub.to_string();
    let anchor = participant_message(&state, id, &caller).await?;

    let rows = state
        .with_db(move |db| db.thread(&anchor.thread_id))
        .await?;
    // Only messages the caller took part in
    let visible: Vec<MessageRow> = rows
        .into_iter()
        .filter(|m| is_participant(m, &caller))
        .collect();
    Ok(Json(convert::all(&visible, convert::message)?))
}

/// Patients may only start conversations with staff.
fn may_message(sender: Role, recipient: Role) -> bool {
    match sender {
        Role::User => matches!(recipient, Role::Doctor | Role::Admin),
        Role::Doctor | Role::Admin => true,
    }
}

fn is_participant(message: &MessageRow, user_id: &str) -> bool {
    message.sender_id == user_id || message.recipient_id == user_id
}

fn reply_subject(subject: &str) -> String {
    if subject.to_ascii_lowercase().starts_with("re:") {
        return subject.to_string();
    }
    format!("Re: {subject}").chars().take(MAX_SUBJECT_LEN).collect()
}

/// Non-participants get 404 so message ids do not leak.
async fn participant_message(
    state: &AppState,
    id: Uuid,
    user_id: &str,
) -> Result<MessageRow, ApiError> {
    let row = state
        .with_db(move |db| db.get_message(&id.to_string()))
        .await?
        .ok_or(ApiError::NotFound)?;
    if !is_participant(&row, user_id) {
        return Err(ApiError::NotFound);
    }
    Ok(row)
}
