use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Extension, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{EncodingKey, Header, encode};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use wellspring_db::NewUser;
use wellspring_types::Role;
use wellspring_types::api::{
    AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RegisterRequest,
    ResetPasswordRequest,
};
use wellspring_types::models::User;

use crate::convert;
use crate::error::ApiError;
use crate::extract::Json;
use crate::mailer::password_reset_mail;
use crate::middleware::{Claims, SESSION_COOKIE};
use crate::state::AppState;
use crate::validation::{normalize_email, required_text, validate_password};

pub const SESSION_DAYS: i64 = 7;
pub const RESET_TOKEN_TTL_MINUTES: i64 = 60;

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email)?;
    let name = required_text("Name", &req.name, 100)?;
    validate_password(&req.password)?;

    let user = create_account(&state, email, name, &req.password, Role::User, None).await?;
    info!("Registered user {} ({})", user.id, user.email);

    let token = create_token(&state.jwt_secret, &user)?;
    let jar = jar.add(session_cookie(&state, token.clone()));

    Ok((StatusCode::CREATED, jar, Json(AuthResponse { user, token })))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Malformed emails cannot match an account; answer like a wrong password.
    let email = normalize_email(&req.email).map_err(|_| ApiError::Unauthorized)?;

    let row = state
        .with_db(move |db| db.get_user_by_email(&email))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    if !verify_password(&req.password, &row.password)? {
        warn!("Failed login for {}", row.email);
        return Err(ApiError::Unauthorized);
    }

    let user = convert::user(&row)?;
    let token = create_token(&state.jwt_secret, &user)?;
    let jar = jar.add(session_cookie(&state, token.clone()));
    info!("User {} logged in", user.id);

    Ok((jar, Json(AuthResponse { user, token })))
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, StatusCode::NO_CONTENT)
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let id = claims.sub.to_string();
    let row = state
        .with_db(move |db| db.get_user_by_id(&id))
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(convert::user(&row)?))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_password(&req.new_password)?;

    let id = claims.sub.to_string();
    let row = state
        .with_db(move |db| db.get_user_by_id(&id))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    if !verify_password(&req.current_password, &row.password)? {
        return Err(ApiError::validation("Current password is incorrect"));
    }

    let hash = hash_password(&req.new_password)?;
    state.with_db(move |db| db.set_password(&row.id, &hash)).await?;
    info!("User {} changed their password", claims.sub);

    Ok(StatusCode::NO_CONTENT)
}

/// Always answers 202 so the response does not reveal which emails exist.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Ok(email) = normalize_email(&req.email) else {
        return Ok(StatusCode::ACCEPTED);
    };

    let Some(user) = state.with_db(move |db| db.get_user_by_email(&email)).await? else {
        info!("Password reset requested for unknown email");
        return Ok(StatusCode::ACCEPTED);
    };

    let token = generate_reset_token();
    let token_hash = hash_reset_token(&token);
    let user_id = user.id.clone();
    state
        .with_db(move |db| db.set_reset_token(&user_id, &token_hash, RESET_TOKEN_TTL_MINUTES))
        .await?;

    let mail = password_reset_mail(&user.email, &state.public_url, &token, RESET_TOKEN_TTL_MINUTES);
    if let Err(e) = state.mailer.send(mail).await {
        warn!("Failed to send password reset mail to user {}: {:#}", user.id, e);
    } else {
        info!("Password reset issued for user {}", user.id);
    }

    Ok(StatusCode::ACCEPTED)
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_password(&req.password)?;

    let token_hash = hash_reset_token(req.token.trim());
    let password_hash = hash_password(&req.password)?;

    let user_id = state
        .with_db(move |db| db.consume_reset_token(&token_hash, &password_hash))
        .await?
        .ok_or_else(|| ApiError::validation("This reset link is invalid or has expired"))?;

    info!("Password reset completed for user {}", user_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Hash the password and insert the account. Shared by self-registration
/// and admin provisioning.
pub async fn create_account(
    state: &AppState,
    email: String,
    name: String,
    password: &str,
    role: Role,
    specialization: Option<String>,
) -> Result<User, ApiError> {
    let lookup = email.clone();
    if state.with_db(move |db| db.get_user_by_email(&lookup)).await?.is_some() {
        return Err(ApiError::conflict("An account with this email already exists"));
    }

    let password_hash = hash_password(password)?;
    let id = Uuid::new_v4().to_string();

    let row = state
        .with_db(move |db| {
            db.create_user(&NewUser {
                id: &id,
                email: &email,
                name: &name,
                password_hash: &password_hash,
                role: role.as_str(),
                specialization: specialization.as_deref(),
            })?;
            db.get_user_by_id(&id)
        })
        .await?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("user missing after insert")))?;

    Ok(convert::user(&row)?)
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, ApiError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub fn create_token(secret: &str, user: &User) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        role: user.role,
        exp: (chrono::Utc::now() + chrono::Duration::days(SESSION_DAYS)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(e.into()))
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.secure_cookies)
        .path("/")
        .build()
}

/// 32 random bytes, URL-safe base64.
fn generate_reset_token() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Only this digest is stored, never the token itself.
fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
