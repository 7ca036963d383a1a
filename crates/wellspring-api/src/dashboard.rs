use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;

use wellspring_types::Role;
use wellspring_types::api::DashboardResponse;

use crate::activities::summarize;
use crate::convert;
use crate::error::ApiError;
use crate::middleware::Claims;
use crate::state::AppState;

const SUMMARY_DAYS: u32 = 7;
const ASSIGNED_LIMIT: u32 = 20;

/// GET /dashboard: a different payload per role, gathered in one blocking
/// task.
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let role = claims.role;
    let now = Utc::now();

    let dashboard = state
        .with_db(move |db| {
            let response = match role {
                Role::User => DashboardResponse::User {
                    activity: summarize(db, &user_id, SUMMARY_DAYS, now)?,
                    habits: convert::all(&db.list_habits(&user_id)?, convert::habit)?,
                    pending_completions: db.count_pending_completions(Some(&user_id))? as u64,
                    latest_assessment: db
                        .latest_assessment(&user_id)?
                        .as_ref()
                        .map(convert::assessment)
                        .transpose()?,
                    unread_messages: db.unread_count(&user_id)? as u64,
                },
                Role::Doctor => DashboardResponse::Doctor {
                    available: db
                        .get_user_by_id(&user_id)?
                        .map(|u| u.available)
                        .unwrap_or(false),
                    pending_reviews: db.count_pending_completions(None)? as u64,
                    assigned_assessments: convert::all(
                        &db.list_assigned_assessments(&user_id, ASSIGNED_LIMIT)?,
                        convert::assessment,
                    )?,
                    unread_messages: db.unread_count(&user_id)? as u64,
                },
                Role::Admin => DashboardResponse::Admin {
                    users_by_role: counts(db.count_users_by_role()?),
                    pending_reviews: db.count_pending_completions(None)? as u64,
                    assessments_by_severity: counts(db.count_assessments_by_severity()?),
                    unassigned_high_severity: db.count_unassigned_high_severity()? as u64,
                },
            };
            Ok(response)
        })
        .await?;

    Ok(Json(dashboard))
}

fn counts(rows: Vec<(String, i64)>) -> std::collections::BTreeMap<String, u64> {
    rows.into_iter().map(|(k, n)| (k, n as u64)).collect()
}
