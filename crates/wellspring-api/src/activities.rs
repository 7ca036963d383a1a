use std::collections::BTreeMap;

use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use wellspring_db::Database;
use wellspring_db::models::ActivityRow;
use wellspring_db::timestamps::format_timestamp;
use wellspring_health::calories;
use wellspring_types::ActivityKind;
use wellspring_types::api::{
    ActivitySummary, CreateActivityRequest, KindTotals, UpdateActivityRequest,
};

use crate::convert;
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::middleware::Claims;
use crate::state::AppState;
use crate::validation::optional_text;

const MAX_DURATION_MINUTES: u32 = 24 * 60;
const MAX_CALORIES: u32 = 10_000;
const MAX_NOTES_LEN: usize = 1000;
const MAX_SUMMARY_DAYS: u32 = 365;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor: `performed_at` and id of the last activity on the previous page.
    pub before: Option<DateTime<Utc>>,
    pub before_id: Option<Uuid>,
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    #[serde(default = "default_days")]
    pub days: u32,
}

fn default_days() -> u32 {
    7
}

pub async fn create_activity(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateActivityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_duration(req.duration_minutes)?;
    let calories = match req.calories {
        Some(c) => validate_calories(c)?,
        None => calories::estimate(req.kind, req.duration_minutes),
    };
    let performed_at = validate_performed_at(req.performed_at.unwrap_or_else(Utc::now))?;

    let row = ActivityRow {
        id: Uuid::new_v4().to_string(),
        user_id: claims.sub.to_string(),
        kind: req.kind.as_str().to_string(),
        duration_minutes: req.duration_minutes as i64,
        calories: calories as i64,
        notes: optional_text("Notes", req.notes.as_deref(), MAX_NOTES_LEN)?,
        performed_at: format_timestamp(&performed_at),
        created_at: String::new(),
    };

    let (id, user_id) = (row.id.clone(), row.user_id.clone());
    let stored = state
        .with_db(move |db| {
            db.insert_activity(&row)?;
            db.get_activity(&id, &user_id)
        })
        .await?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("activity missing after insert")))?;

    info!("User {} logged {} activity {}", claims.sub, req.kind, stored.id);
    Ok((StatusCode::CREATED, Json(convert::activity(&stored)?)))
}

pub async fn list_activities(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let limit = query.limit.clamp(1, 200);
    let before = convert::cursor(query.before, query.before_id);

    let rows = state
        .with_db(move |db| db.list_activities(&user_id, limit, before.as_ref()))
        .await?;
    Ok(Json(convert::all(&rows, convert::activity)?))
}

pub async fn get_activity(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .with_db(move |db| db.get_activity(&id.to_string(), &claims.sub.to_string()))
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(convert::activity(&row)?))
}

pub async fn update_activity(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateActivityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (id, user_id) = (id.to_string(), claims.sub.to_string());
    let (lookup_id, lookup_user) = (id.clone(), user_id.clone());
    let mut row = state
        .with_db(move |db| db.get_activity(&lookup_id, &lookup_user))
        .await?
        .ok_or(ApiError::NotFound)?;

    let current = convert::activity(&row)?;
    let kind = req.kind.unwrap_or(current.kind);
    let duration = match req.duration_minutes {
        Some(d) => validate_duration(d)?,
        None => current.duration_minutes,
    };
    // Re-estimate when the inputs changed and no explicit figure was given.
    let calories = match req.calories {
        Some(c) => validate_calories(c)?,
        None if req.kind.is_some() || req.duration_minutes.is_some() => {
            calories::estimate(kind, duration)
        }
        None => current.calories,
    };

    row.kind = kind.as_str().to_string();
    row.duration_minutes = duration as i64;
    row.calories = calories as i64;
    if req.notes.is_some() {
        row.notes = optional_text("Notes", req.notes.as_deref(), MAX_NOTES_LEN)?;
    }
    if let Some(at) = req.performed_at {
        row.performed_at = format_timestamp(&validate_performed_at(at)?);
    }

    let updated = state
        .with_db(move |db| {
            if !db.update_activity(&row)? {
                return Ok(None);
            }
            db.get_activity(&id, &user_id)
        })
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(convert::activity(&updated)?))
}

pub async fn delete_activity(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .with_db(move |db| db.delete_activity(&id.to_string(), &claims.sub.to_string()))
        .await?;
    if !deleted {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn activity_summary(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SummaryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if query.days == 0 || query.days > MAX_SUMMARY_DAYS {
        return Err(ApiError::validation(format!(
            "Days must be between 1 and {MAX_SUMMARY_DAYS}"
        )));
    }
    let user_id = claims.sub.to_string();
    let days = query.days;
    let summary = state
        .with_db(move |db| summarize(db, &user_id, days, Utc::now()))
        .await?;
    Ok(Json(summary))
}

/// Totals for the `days` days ending at `now`.
pub fn summarize(
    db: &Database,
    user_id: &str,
    days: u32,
    now: DateTime<Utc>,
) -> anyhow::Result<ActivitySummary> {
    let since = format_timestamp(&(now - Duration::days(days as i64)));
    let rows = db.activity_totals(user_id, &since)?;

    let mut by_kind: BTreeMap<&str, KindTotals> = BTreeMap::new();
    for row in &rows {
        let kind: ActivityKind = row.kind.parse()?;
        by_kind.insert(
            kind.as_str(),
            KindTotals {
                kind,
                count: row.count as u64,
                minutes: row.minutes as u64,
                calories: row.calories as u64,
            },
        );
    }
    let by_kind: Vec<KindTotals> = by_kind.into_values().collect();

    Ok(ActivitySummary {
        days,
        total_count: by_kind.iter().map(|k| k.count).sum(),
        total_minutes: by_kind.iter().map(|k| k.minutes).sum(),
        total_calories: by_kind.iter().map(|k| k.calories).sum(),
        by_kind,
    })
}

fn validate_duration(minutes: u32) -> Result<u32, ApiError> {
    if minutes == 0 || minutes > MAX_DURATION_MINUTES {
        return Err(ApiError::validation(format!(
            "Duration must be between 1 and {MAX_DURATION_MINUTES} minutes"
        )));
    }
    Ok(minutes)
}

fn validate_calories(calories: u32) -> Result<u32, ApiError> {
    if calories > MAX_CALORIES {
        return Err(ApiError::validation(format!(
            "Calories must be at most {MAX_CALORIES}"
        )));
    }
    Ok(calories)
}

fn validate_performed_at(at: DateTime<Utc>) -> Result<DateTime<Utc>, ApiError> {
    // Small allowance for client clock skew
    if at > Utc::now() + Duration::minutes(5) {
        return Err(ApiError::validation("Activity time cannot be in the future"));
    }
    Ok(at)
}
