use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use wellspring_types::Role;
use wellspring_types::api::{AvailabilityRequest, CreateUserRequest, UpdateRoleRequest};

use crate::auth::create_account;
use crate::convert;
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::middleware::{Claims, require_role};
use crate::state::AppState;
use crate::validation::{normalize_email, optional_text, required_text, validate_password};

#[derive(Debug, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(filter): Query<UserFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .with_db(move |db| db.list_users(filter.role.map(|r| r.as_str())))
        .await?;
    Ok(Json(convert::all(&rows, convert::user)?))
}

/// Provision an account with any role; the only way to create doctors and
/// admins.
pub async fn create_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email)?;
    let name = required_text("Name", &req.name, 100)?;
    validate_password(&req.password)?;
    let specialization = optional_text("Specialization", req.specialization.as_deref(), 100)?;

    let user = create_account(&state, email, name, &req.password, req.role, specialization).await?;
    info!("Admin {} created {} account {}", claims.sub, user.role, user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if id == claims.sub && req.role != Role::Admin {
        return Err(ApiError::validation("You cannot remove your own admin role"));
    }

    let user_id = id.to_string();
    let row = state
        .with_db(move |db| {
            if !db.update_role(&user_id, req.role.as_str())? {
                return Ok(None);
            }
            db.get_user_by_id(&user_id)
        })
        .await?
        .ok_or(ApiError::NotFound)?;

    info!("Admin {} set role of {} to {}", claims.sub, id, req.role);
    Ok(Json(convert::user(&row)?))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if id == claims.sub {
        return Err(ApiError::validation("You cannot delete your own account"));
    }

    let user_id = id.to_string();
    let proofs = state
        .with_db(move |db| db.delete_user(&user_id))
        .await?
        .ok_or(ApiError::NotFound)?;

    for proof in &proofs {
        if let Err(e) = state.proofs.delete(proof).await {
            tracing::warn!("Failed to remove proof {} of deleted user {}: {:#}", proof, id, e);
        }
    }

    info!("Admin {} deleted user {}", claims.sub, id);
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /admin/doctors/{id}/availability
pub async fn set_doctor_availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    set_availability(&state, id, req.available).await
}

/// PUT /doctors/me/availability
pub async fn set_my_availability(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&claims, &[Role::Doctor])?;
    set_availability(&state, claims.sub, req.available).await
}

/// GET /doctors: public directory.
pub async fn list_doctors(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let rows = state.with_db(|db| db.list_doctors()).await?;
    Ok(Json(convert::all(&rows, convert::doctor)?))
}

async fn set_availability(
    state: &AppState,
    doctor_id: Uuid,
    available: bool,
) -> Result<Json<wellspring_types::api::DoctorSummary>, ApiError> {
    let id = doctor_id.to_string();
    let row = state
        .with_db(move |db| {
            if !db.set_availability(&id, available)? {
                return Ok(None);
            }
            db.get_user_by_id(&id)
        })
        .await?
        .ok_or(ApiError::NotFound)?;

    info!(
        "Doctor {} is now {}",
        doctor_id,
        if available { "available" } else { "unavailable" }
    );
    Ok(Json(convert::doctor(&row)?))
}
