use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
};

use crate::middleware::{require_admin, require_auth};
use crate::state::AppState;
use crate::storage::MAX_PROOF_SIZE;
use crate::{activities, admin, assessments, auth, dashboard, habits, messages};

/// Every API route. Transport layers (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/doctors", get(admin::list_doctors))
        .route("/assessments/questions", get(assessments::list_questions))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/me", get(auth::me))
        .route("/me/password", post(auth::change_password))
        // Activities
        .route(
            "/activities",
            get(activities::list_activities).post(activities::create_activity),
        )
        .route("/activities/summary", get(activities::activity_summary))
        .route(
            "/activities/{id}",
            get(activities::get_activity)
                .put(activities::update_activity)
                .delete(activities::delete_activity),
        )
        // Habits and proof review
        .route("/habits", get(habits::list_habits).post(habits::create_habit))
        .route(
            "/habits/{id}",
            get(habits::get_habit)
                .put(habits::update_habit)
                .delete(habits::delete_habit),
        )
        .route(
            "/habits/{id}/completions",
            get(habits::list_completions)
                .post(habits::submit_completion)
                .layer(DefaultBodyLimit::max(MAX_PROOF_SIZE)),
        )
        .route("/completions/{id}/proof", get(habits::download_proof))
        .route("/completions/{id}/review", post(habits::review_completion))
        .route("/reviews/pending", get(habits::pending_reviews))
        // Assessments
        .route(
            "/assessments",
            get(assessments::list_assessments).post(assessments::submit_assessment),
        )
        .route("/assessments/assigned", get(assessments::assigned_assessments))
        .route("/assessments/{id}", get(assessments::get_assessment))
        // Messages
        .route("/messages", get(messages::inbox).post(messages::send_message))
        .route("/messages/sent", get(messages::sent))
        .route("/messages/unread-count", get(messages::unread_count))
        .route("/messages/{id}", get(messages::get_message))
        .route("/messages/{id}/read", post(messages::mark_read))
        .route("/messages/{id}/thread", get(messages::thread))
        .route("/dashboard", get(dashboard::dashboard))
        .route("/doctors/me/availability", put(admin::set_my_availability))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // require_auth is the outer layer, so claims exist when require_admin runs
    let admin_routes = Router::new()
        .route("/admin/users", get(admin::list_users).post(admin::create_user))
        .route("/admin/users/{id}", delete(admin::delete_user))
        .route("/admin/users/{id}/role", put(admin::update_role))
        .route(
            "/admin/doctors/{id}/availability",
            put(admin::set_doctor_availability),
        )
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
