//! End-to-end tests: the full router over a temp database and proof
//! directory, driven with `oneshot` requests.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use wellspring_api::auth::hash_password;
use wellspring_api::mailer::{Mailer, Outbox};
use wellspring_api::storage::{MAX_PROOF_SIZE, ProofStorage};
use wellspring_api::{AppState, AppStateInner, router};
use wellspring_db::{Database, NewUser};
use wellspring_health::QUESTIONS;

const PASSWORD: &str = "correct horse battery";
const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake image data";

struct TestApp {
    app: Router,
    state: AppState,
    outbox: Outbox,
    _dir: TempDir,
}

struct Reply {
    status: StatusCode,
    headers: header::HeaderMap,
    bytes: Vec<u8>,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.bytes).unwrap_or(Value::Null)
    }
}

impl TestApp {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        let proofs = ProofStorage::new(dir.path().join("proofs")).await.unwrap();
        let (mailer, outbox) = Mailer::memory();

        let state = Arc::new(AppStateInner {
            db,
            jwt_secret: "integration-test-secret".into(),
            mailer,
            proofs,
            public_url: "https://wellspring.test".into(),
            secure_cookies: false,
        });

        TestApp {
            app: router(state.clone()),
            state,
            outbox,
            _dir: dir,
        }
    }

    async fn send(&self, req: Request<Body>) -> Reply {
        let res = self.app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap().to_vec();
        Reply { status, headers, bytes }
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    async fn get(&self, uri: &str, token: &str) -> Reply {
        self.call(Method::GET, uri, Some(token), None).await
    }

    async fn post(&self, uri: &str, token: &str, body: Value) -> Reply {
        self.call(Method::POST, uri, Some(token), Some(body)).await
    }

    async fn upload(&self, uri: &str, token: &str, content_type: &str, data: &[u8]) -> Reply {
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(data.to_vec()))
            .unwrap();
        self.send(req).await
    }

    /// Self-registration; returns (user id, token).
    async fn register(&self, email: &str, name: &str) -> (String, String) {
        let reply = self
            .call(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({ "email": email, "name": name, "password": PASSWORD })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "register {email}");
        let body = reply.json();
        (
            body["user"]["id"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    /// Staff accounts cannot self-register, so seed them directly.
    async fn seed_staff(&self, email: &str, role: &str, available: bool) -> (String, String) {
        let id = Uuid::new_v4().to_string();
        let hash = hash_password(PASSWORD).unwrap();
        self.state
            .db
            .create_user(&NewUser {
                id: &id,
                email,
                name: email.split('@').next().unwrap(),
                password_hash: &hash,
                role,
                specialization: None,
            })
            .unwrap();
        if available {
            assert!(self.state.db.set_availability(&id, true).unwrap());
        }
        (id, self.login(email, PASSWORD).await)
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let reply = self
            .call(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "login {email}");
        reply.json()["token"].as_str().unwrap().to_string()
    }
}

fn answers(points: usize) -> Value {
    let map: BTreeMap<&str, usize> = QUESTIONS.iter().map(|q| (q.id, points)).collect();
    json!({ "responses": map })
}

// ── Auth ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn register_then_session_cookie_authenticates() {
    let app = TestApp::new().await;
    let reply = app
        .call(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "email": " Ana@Example.com ", "name": "Ana", "password": PASSWORD })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.json()["user"]["email"], "ana@example.com");
    assert_eq!(reply.json()["user"]["role"], "user");

    let cookie = reply.headers[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with("wellspring_session="));
    assert!(cookie.contains("HttpOnly"));

    let session = cookie.split(';').next().unwrap();
    let me = app
        .send(
            Request::builder()
                .uri("/me")
                .header(header::COOKIE, session)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.json()["name"], "Ana");
}

#[tokio::test]
async fn registration_and_login_failures() {
    let app = TestApp::new().await;
    app.register("ana@example.com", "Ana").await;

    let dup = app
        .call(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "email": "ANA@example.com", "name": "Other", "password": PASSWORD })),
        )
        .await;
    assert_eq!(dup.status, StatusCode::CONFLICT);

    let weak = app
        .call(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "email": "bo@example.com", "name": "Bo", "password": "short" })),
        )
        .await;
    assert_eq!(weak.status, StatusCode::BAD_REQUEST);
    assert!(weak.json()["error"].as_str().unwrap().contains("at least 8"));

    let wrong = app
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "ana@example.com", "password": "not the password" })),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let unknown = app
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "nobody@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);

    let anonymous = app.call(Method::GET, "/me", None, None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    let forged = app.get("/me", "not.a.jwt").await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_input_gets_a_json_400() {
    let app = TestApp::new().await;
    let missing_field = app
        .call(Method::POST, "/auth/register", None, Some(json!({ "email": "a@b.co" })))
        .await;
    assert_eq!(missing_field.status, StatusCode::BAD_REQUEST);
    assert!(missing_field.json()["error"].as_str().unwrap().contains("name"));

    let (_, ana) = app.register("ana@example.com", "Ana").await;
    let bad_kind = app
        .post("/activities", &ana, json!({ "kind": "juggling", "duration_minutes": 10 }))
        .await;
    assert_eq!(bad_kind.status, StatusCode::BAD_REQUEST);
    assert!(bad_kind.json()["error"].is_string());

    let bad_query = app.get("/activities?limit=lots", &ana).await;
    assert_eq!(bad_query.status, StatusCode::BAD_REQUEST);
    assert!(bad_query.json()["error"].is_string());

    let bad_id = app.get("/activities/not-a-uuid", &ana).await;
    assert_eq!(bad_id.status, StatusCode::BAD_REQUEST);
    assert!(bad_id.json()["error"].is_string());
}

#[tokio::test]
async fn password_reset_token_is_single_use() {
    let app = TestApp::new().await;
    app.register("ana@example.com", "Ana").await;

    let unknown = app
        .call(
            Method::POST,
            "/auth/forgot-password",
            None,
            Some(json!({ "email": "nobody@example.com" })),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::ACCEPTED);
    assert!(app.outbox.lock().unwrap().is_empty());

    let forgot = app
        .call(
            Method::POST,
            "/auth/forgot-password",
            None,
            Some(json!({ "email": "ana@example.com" })),
        )
        .await;
    assert_eq!(forgot.status, StatusCode::ACCEPTED);

    let token = {
        let outbox = app.outbox.lock().unwrap();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].to, "ana@example.com");
        let text = &outbox[0].text;
        let start = text.find("token=").unwrap() + "token=".len();
        text[start..].split_whitespace().next().unwrap().to_string()
    };

    let reset = app
        .call(
            Method::POST,
            "/auth/reset-password",
            None,
            Some(json!({ "token": token, "password": "a brand new password" })),
        )
        .await;
    assert_eq!(reset.status, StatusCode::NO_CONTENT);
    app.login("ana@example.com", "a brand new password").await;

    let reuse = app
        .call(
            Method::POST,
            "/auth/reset-password",
            None,
            Some(json!({ "token": token, "password": "yet another password" })),
        )
        .await;
    assert_eq!(reuse.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn change_password_requires_current_password() {
    let app = TestApp::new().await;
    let (_, token) = app.register("ana@example.com", "Ana").await;

    let wrong = app
        .post(
            "/me/password",
            &token,
            json!({ "current_password": "nope nope nope", "new_password": "another password" }),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::BAD_REQUEST);

    let ok = app
        .post(
            "/me/password",
            &token,
            json!({ "current_password": PASSWORD, "new_password": "another password" }),
        )
        .await;
    assert_eq!(ok.status, StatusCode::NO_CONTENT);
    app.login("ana@example.com", "another password").await;
}

#[tokio::test]
async fn tokens_follow_the_current_account() {
    let app = TestApp::new().await;
    let (ana_id, ana) = app.register("ana@example.com", "Ana").await;
    let (bo_id, bo) = app.register("bo@example.com", "Bo").await;
    let (_, admin) = app.seed_staff("root@example.com", "admin", false).await;

    // A role change applies to tokens issued before it
    assert_eq!(app.get("/reviews/pending", &ana).await.status, StatusCode::FORBIDDEN);
    let promoted = app
        .call(
            Method::PUT,
            &format!("/admin/users/{ana_id}/role"),
            Some(&admin),
            Some(json!({ "role": "doctor" })),
        )
        .await;
    assert_eq!(promoted.status, StatusCode::OK);
    assert_eq!(app.get("/reviews/pending", &ana).await.status, StatusCode::OK);
    assert_eq!(app.get("/me", &ana).await.json()["role"], "doctor");

    // A deleted account's token stops working
    let deleted = app
        .call(Method::DELETE, &format!("/admin/users/{bo_id}"), Some(&admin), None)
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    let activity = app
        .post("/activities", &bo, json!({ "kind": "walking", "duration_minutes": 10 }))
        .await;
    assert_eq!(activity.status, StatusCode::UNAUTHORIZED);
    assert!(activity.json()["error"].is_string());
    let habit = app.post("/habits", &bo, json!({ "name": "Ghost habit" })).await;
    assert_eq!(habit.status, StatusCode::UNAUTHORIZED);
}

// ── Activities ──────────────────────────────────────────────────────────

#[tokio::test]
async fn activity_crud_is_owner_scoped() {
    let app = TestApp::new().await;
    let (_, ana) = app.register("ana@example.com", "Ana").await;
    let (_, bo) = app.register("bo@example.com", "Bo").await;

    let created = app
        .post("/activities", &ana, json!({ "kind": "running", "duration_minutes": 30 }))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let activity = created.json();
    assert_eq!(activity["calories"], 330);
    let uri = format!("/activities/{}", activity["id"].as_str().unwrap());

    assert_eq!(app.get(&uri, &bo).await.status, StatusCode::NOT_FOUND);
    let hijack = app
        .call(Method::PUT, &uri, Some(&bo), Some(json!({ "duration_minutes": 5 })))
        .await;
    assert_eq!(hijack.status, StatusCode::NOT_FOUND);

    let updated = app
        .call(Method::PUT, &uri, Some(&ana), Some(json!({ "duration_minutes": 60 })))
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.json()["duration_minutes"], 60);
    assert_eq!(updated.json()["calories"], 660);

    let invalid = app
        .post("/activities", &ana, json!({ "kind": "yoga", "duration_minutes": 0 }))
        .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);

    app.post(
        "/activities",
        &ana,
        json!({ "kind": "yoga", "duration_minutes": 20, "calories": 90 }),
    )
    .await;

    let summary = app.get("/activities/summary?days=7", &ana).await;
    assert_eq!(summary.status, StatusCode::OK);
    let summary = summary.json();
    assert_eq!(summary["total_count"], 2);
    assert_eq!(summary["total_minutes"], 80);
    assert_eq!(summary["total_calories"], 750);

    assert_eq!(app.get("/activities", &bo).await.json().as_array().unwrap().len(), 0);

    let deleted = app.call(Method::DELETE, &uri, Some(&ana), None).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert_eq!(app.get(&uri, &ana).await.status, StatusCode::NOT_FOUND);
}

// ── Habits ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn completion_is_reviewed_exactly_once() {
    let app = TestApp::new().await;
    let (_, ana) = app.register("ana@example.com", "Ana").await;
    let (_, bo) = app.register("bo@example.com", "Bo").await;
    let (_, doctor) = app.seed_staff("dr.lee@example.com", "doctor", true).await;

    let habit = app
        .post("/habits", &ana, json!({ "name": "Morning walk" }))
        .await
        .json();
    assert_eq!(habit["frequency"], "daily");
    let habit_id = habit["id"].as_str().unwrap();
    let completions = format!("/habits/{habit_id}/completions");

    let unsupported = app.upload(&completions, &ana, "text/plain", b"hello").await;
    assert_eq!(unsupported.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let empty = app.upload(&completions, &ana, "image/png", b"").await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
    let foreign = app.upload(&completions, &bo, "image/png", PNG).await;
    assert_eq!(foreign.status, StatusCode::NOT_FOUND);

    let submitted = app.upload(&completions, &ana, "image/png", PNG).await;
    assert_eq!(submitted.status, StatusCode::CREATED);
    let completion = submitted.json();
    assert_eq!(completion["status"], "pending");
    let completion_id = completion["id"].as_str().unwrap();

    let duplicate = app.upload(&completions, &ana, "image/png", PNG).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    // Proof is visible to the owner and reviewers only
    let proof_uri = format!("/completions/{completion_id}/proof");
    let proof = app.get(&proof_uri, &ana).await;
    assert_eq!(proof.status, StatusCode::OK);
    assert_eq!(proof.headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(proof.bytes, PNG);
    assert_eq!(app.get(&proof_uri, &doctor).await.status, StatusCode::OK);
    assert_eq!(app.get(&proof_uri, &bo).await.status, StatusCode::NOT_FOUND);

    assert_eq!(app.get("/reviews/pending", &ana).await.status, StatusCode::FORBIDDEN);
    let queue = app.get("/reviews/pending", &doctor).await.json();
    assert_eq!(queue.as_array().unwrap().len(), 1);
    assert_eq!(queue[0]["habit_name"], "Morning walk");
    assert_eq!(queue[0]["user_name"], "Ana");

    let review_uri = format!("/completions/{completion_id}/review");
    let self_review = app.post(&review_uri, &ana, json!({ "decision": "approve" })).await;
    assert_eq!(self_review.status, StatusCode::FORBIDDEN);

    let approved = app
        .post(&review_uri, &doctor, json!({ "decision": "approve", "note": "Nice" }))
        .await;
    assert_eq!(approved.status, StatusCode::OK);
    let approved = approved.json();
    assert_eq!(approved["completion"]["status"], "approved");
    assert_eq!(approved["completion"]["review_note"], "Nice");
    assert_eq!(approved["habit"]["current_streak"], 1);
    assert_eq!(approved["habit"]["longest_streak"], 1);

    let again = app.post(&review_uri, &doctor, json!({ "decision": "reject" })).await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    let listed = app.get(&completions, &ana).await.json();
    assert_eq!(listed[0]["status"], "approved");
    assert!(app.get("/reviews/pending", &doctor).await.json().as_array().unwrap().is_empty());
}

#[tokio::test]
async fn oversized_proof_is_a_json_413() {
    let app = TestApp::new().await;
    let (_, ana) = app.register("ana@example.com", "Ana").await;
    let habit = app.post("/habits", &ana, json!({ "name": "Swim" })).await.json();
    let completions = format!("/habits/{}/completions", habit["id"].as_str().unwrap());

    let too_big = vec![0u8; MAX_PROOF_SIZE + 1];
    let reply = app.upload(&completions, &ana, "image/png", &too_big).await;
    assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(reply.json()["error"], "Upload is too large");

    let proofs_left = std::fs::read_dir(app._dir.path().join("proofs")).unwrap().count();
    assert_eq!(proofs_left, 0);
    assert!(app.get(&completions, &ana).await.json().as_array().unwrap().is_empty());
}

#[tokio::test]
async fn reviewers_cannot_approve_their_own_proof() {
    let app = TestApp::new().await;
    let (_, doctor) = app.seed_staff("dr.lee@example.com", "doctor", true).await;
    let (_, colleague) = app.seed_staff("dr.kim@example.com", "doctor", true).await;

    let habit = app.post("/habits", &doctor, json!({ "name": "Run" })).await.json();
    let habit_uri = format!("/habits/{}", habit["id"].as_str().unwrap());
    let completion = app
        .upload(&format!("{habit_uri}/completions"), &doctor, "image/png", PNG)
        .await
        .json();
    let review_uri = format!("/completions/{}/review", completion["id"].as_str().unwrap());

    let own = app.post(&review_uri, &doctor, json!({ "decision": "approve" })).await;
    assert_eq!(own.status, StatusCode::FORBIDDEN);
    assert_eq!(app.get(&habit_uri, &doctor).await.json()["current_streak"], 0);

    let approved = app.post(&review_uri, &colleague, json!({ "decision": "approve" })).await;
    assert_eq!(approved.status, StatusCode::OK);
    assert_eq!(approved.json()["habit"]["current_streak"], 1);

    // Switching to weekly recomputes the streak in weeks
    let weekly = app
        .call(Method::PUT, &habit_uri, Some(&doctor), Some(json!({ "frequency": "weekly" })))
        .await;
    assert_eq!(weekly.status, StatusCode::OK);
    assert_eq!(weekly.json()["frequency"], "weekly");
    assert_eq!(weekly.json()["current_streak"], 1);
}

#[tokio::test]
async fn rejected_completion_can_be_resubmitted() {
    let app = TestApp::new().await;
    let (_, ana) = app.register("ana@example.com", "Ana").await;
    let (_, admin) = app.seed_staff("root@example.com", "admin", false).await;

    let habit = app.post("/habits", &ana, json!({ "name": "Stretch" })).await.json();
    let completions = format!("/habits/{}/completions", habit["id"].as_str().unwrap());

    let first = app.upload(&completions, &ana, "image/jpeg", PNG).await.json();
    let rejected = app
        .post(
            &format!("/completions/{}/review", first["id"].as_str().unwrap()),
            &admin,
            json!({ "decision": "reject", "note": "Blurry photo" }),
        )
        .await;
    assert_eq!(rejected.status, StatusCode::OK);
    assert_eq!(rejected.json()["habit"]["current_streak"], 0);

    let retry = app.upload(&completions, &ana, "image/jpeg", PNG).await;
    assert_eq!(retry.status, StatusCode::CREATED);

    let future = app
        .upload(&format!("{completions}?completed_on=2999-01-01"), &ana, "image/png", PNG)
        .await;
    assert_eq!(future.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleting_a_habit_removes_its_proofs() {
    let app = TestApp::new().await;
    let (_, ana) = app.register("ana@example.com", "Ana").await;

    let habit = app.post("/habits", &ana, json!({ "name": "Read" })).await.json();
    let habit_uri = format!("/habits/{}", habit["id"].as_str().unwrap());
    let completion = app
        .upload(&format!("{habit_uri}/completions"), &ana, "video/mp4", b"mp4 bytes")
        .await
        .json();

    let deleted = app.call(Method::DELETE, &habit_uri, Some(&ana), None).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert_eq!(app.get(&habit_uri, &ana).await.status, StatusCode::NOT_FOUND);

    let proof_uri = format!("/completions/{}/proof", completion["id"].as_str().unwrap());
    assert_eq!(app.get(&proof_uri, &ana).await.status, StatusCode::NOT_FOUND);

    let proofs_left = std::fs::read_dir(app._dir.path().join("proofs")).unwrap().count();
    assert_eq!(proofs_left, 0);
}

// ── Assessments ─────────────────────────────────────────────────────────

#[tokio::test]
async fn critical_assessment_is_assigned_to_a_doctor() {
    let app = TestApp::new().await;
    let (ana_id, ana) = app.register("ana@example.com", "Ana").await;
    let (_, bo) = app.register("bo@example.com", "Bo").await;
    app.seed_staff("dr.off@example.com", "doctor", false).await;
    let (doctor_id, doctor) = app.seed_staff("dr.lee@example.com", "doctor", true).await;

    let questions = app.call(Method::GET, "/assessments/questions", None, None).await;
    assert_eq!(questions.json().as_array().unwrap().len(), QUESTIONS.len());

    let submitted = app.post("/assessments", &ana, answers(0)).await;
    assert_eq!(submitted.status, StatusCode::CREATED);
    let assessment = submitted.json();
    assert_eq!(assessment["severity"], "critical");
    assert_eq!(assessment["score"], 0.0);
    assert_eq!(assessment["assigned_doctor_id"], doctor_id.as_str());
    let thread_id = assessment["thread_id"].as_str().unwrap().to_string();
    assert!(
        assessment["recommendations"]
            .as_array()
            .unwrap()
            .iter()
            .any(|r| r.as_str().unwrap().starts_with("A doctor has been asked"))
    );

    let inbox = app.get("/messages", &doctor).await.json();
    assert_eq!(inbox.as_array().unwrap().len(), 1);
    assert_eq!(inbox[0]["id"], thread_id.as_str());
    assert_eq!(inbox[0]["sender_id"], ana_id.as_str());
    assert!(inbox[0]["body"].as_str().unwrap().contains("critical"));

    let assigned = app.get("/assessments/assigned", &doctor).await.json();
    assert_eq!(assigned.as_array().unwrap().len(), 1);
    assert_eq!(app.get("/assessments/assigned", &ana).await.status, StatusCode::FORBIDDEN);

    let uri = format!("/assessments/{}", assessment["id"].as_str().unwrap());
    assert_eq!(app.get(&uri, &ana).await.status, StatusCode::OK);
    assert_eq!(app.get(&uri, &doctor).await.status, StatusCode::OK);
    assert_eq!(app.get(&uri, &bo).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn healthy_assessment_is_not_referred() {
    let app = TestApp::new().await;
    let (_, ana) = app.register("ana@example.com", "Ana").await;
    app.seed_staff("dr.lee@example.com", "doctor", true).await;

    let assessment = app.post("/assessments", &ana, answers(4)).await.json();
    assert_eq!(assessment["severity"], "excellent");
    assert_eq!(assessment["score"], 100.0);
    assert!(assessment["assigned_doctor_id"].is_null());
    assert!(assessment["thread_id"].is_null());

    let mut partial = answers(2);
    partial["responses"].as_object_mut().unwrap().remove("mood");
    let missing = app.post("/assessments", &ana, partial).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);

    let mut out_of_range = answers(2);
    out_of_range["responses"]["mood"] = json!(9);
    assert_eq!(
        app.post("/assessments", &ana, out_of_range).await.status,
        StatusCode::BAD_REQUEST
    );

    let history = app.get("/assessments", &ana).await.json();
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn high_severity_without_doctors_is_saved_unassigned() {
    let app = TestApp::new().await;
    let (_, ana) = app.register("ana@example.com", "Ana").await;
    let (_, admin) = app.seed_staff("root@example.com", "admin", false).await;

    let assessment = app.post("/assessments", &ana, answers(0)).await;
    assert_eq!(assessment.status, StatusCode::CREATED);
    let assessment = assessment.json();
    assert!(assessment["assigned_doctor_id"].is_null());
    let follow_up = assessment["recommendations"].as_array().unwrap().last().unwrap().clone();
    assert!(follow_up.as_str().unwrap().starts_with("No doctor is available"));
    assert!(!follow_up.as_str().unwrap().contains("has been asked"));

    let dashboard = app.get("/dashboard", &admin).await.json();
    assert_eq!(dashboard["role"], "admin");
    assert_eq!(dashboard["unassigned_high_severity"], 1);
    assert_eq!(dashboard["assessments_by_severity"]["critical"], 1);
}

// ── Messages ────────────────────────────────────────────────────────────

#[tokio::test]
async fn messaging_permissions_and_threads() {
    let app = TestApp::new().await;
    let (ana_id, ana) = app.register("ana@example.com", "Ana").await;
    let (bo_id, bo) = app.register("bo@example.com", "Bo").await;
    let (doctor_id, doctor) = app.seed_staff("dr.lee@example.com", "doctor", true).await;

    let to_patient = app
        .post("/messages", &ana, json!({ "recipient_id": bo_id, "subject": "Hi", "body": "Hello" }))
        .await;
    assert_eq!(to_patient.status, StatusCode::FORBIDDEN);

    let to_self = app
        .post("/messages", &ana, json!({ "recipient_id": ana_id, "subject": "Hi", "body": "Me" }))
        .await;
    assert_eq!(to_self.status, StatusCode::BAD_REQUEST);

    let no_subject = app
        .post("/messages", &ana, json!({ "recipient_id": doctor_id, "body": "Hello" }))
        .await;
    assert_eq!(no_subject.status, StatusCode::BAD_REQUEST);

    let opened = app
        .post(
            "/messages",
            &ana,
            json!({ "recipient_id": doctor_id, "subject": "Sleep", "body": "I sleep badly" }),
        )
        .await;
    assert_eq!(opened.status, StatusCode::CREATED);
    let opened = opened.json();
    let opened_id = opened["id"].as_str().unwrap();
    assert_eq!(opened["thread_id"], opened_id);

    assert_eq!(app.get("/messages/unread-count", &doctor).await.json()["unread"], 1);

    let read = app.get(&format!("/messages/{opened_id}"), &doctor).await;
    assert_eq!(read.status, StatusCode::OK);
    assert_eq!(read.json()["read"], true);
    assert_eq!(app.get("/messages/unread-count", &doctor).await.json()["unread"], 0);

    let reply = app
        .post("/messages", &doctor, json!({ "reply_to": opened_id, "body": "Let's talk" }))
        .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let reply = reply.json();
    assert_eq!(reply["recipient_id"], ana_id.as_str());
    assert_eq!(reply["thread_id"], opened_id);
    assert_eq!(reply["subject"], "Re: Sleep");

    let thread = app.get(&format!("/messages/{opened_id}/thread"), &ana).await.json();
    let bodies: Vec<&str> = thread
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["body"].as_str().unwrap())
        .collect();
    assert_eq!(bodies, ["I sleep badly", "Let's talk"]);

    assert_eq!(
        app.get(&format!("/messages/{opened_id}"), &bo).await.status,
        StatusCode::NOT_FOUND
    );
    let intrude = app
        .post("/messages", &bo, json!({ "reply_to": opened_id, "body": "Me too" }))
        .await;
    assert_eq!(intrude.status, StatusCode::NOT_FOUND);

    let marked = app
        .call(
            Method::POST,
            &format!("/messages/{}/read", reply["id"].as_str().unwrap()),
            Some(&ana),
            None,
        )
        .await;
    assert_eq!(marked.status, StatusCode::NO_CONTENT);

    let sent = app.get("/messages/sent", &ana).await.json();
    assert_eq!(sent.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn message_paging_reaches_every_message() {
    let app = TestApp::new().await;
    let (_, ana) = app.register("ana@example.com", "Ana").await;
    let (doctor_id, _) = app.seed_staff("dr.lee@example.com", "doctor", true).await;

    for n in 0..3 {
        let sent = app
            .post(
                "/messages",
                &ana,
                json!({ "recipient_id": doctor_id, "subject": format!("Note {n}"), "body": "Hello" }),
            )
            .await;
        assert_eq!(sent.status, StatusCode::CREATED);
    }

    let first = app.get("/messages/sent?limit=2", &ana).await.json();
    let first = first.as_array().unwrap().clone();
    assert_eq!(first.len(), 2);
    let last = &first[1];
    let next_uri = format!(
        "/messages/sent?limit=2&before={}&before_id={}",
        last["created_at"].as_str().unwrap(),
        last["id"].as_str().unwrap()
    );
    let second = app.get(&next_uri, &ana).await.json();
    let second = second.as_array().unwrap().clone();
    assert_eq!(second.len(), 1);

    let mut ids: Vec<&str> = first.iter().chain(&second).map(|m| m["id"].as_str().unwrap()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

// ── Dashboard and admin ─────────────────────────────────────────────────

#[tokio::test]
async fn user_dashboard_summarises_own_data() {
    let app = TestApp::new().await;
    let (_, ana) = app.register("ana@example.com", "Ana").await;

    app.post("/activities", &ana, json!({ "kind": "walking", "duration_minutes": 15 }))
        .await;
    let habit = app.post("/habits", &ana, json!({ "name": "Water" })).await.json();
    app.upload(
        &format!("/habits/{}/completions", habit["id"].as_str().unwrap()),
        &ana,
        "image/webp",
        PNG,
    )
    .await;

    let dashboard = app.get("/dashboard", &ana).await;
    assert_eq!(dashboard.status, StatusCode::OK);
    let dashboard = dashboard.json();
    assert_eq!(dashboard["role"], "user");
    assert_eq!(dashboard["activity"]["total_minutes"], 15);
    assert_eq!(dashboard["habits"].as_array().unwrap().len(), 1);
    assert_eq!(dashboard["pending_completions"], 1);
    assert!(dashboard["latest_assessment"].is_null());
    assert_eq!(dashboard["unread_messages"], 0);
}

#[tokio::test]
async fn admin_routes_are_gated() {
    let app = TestApp::new().await;
    let (ana_id, ana) = app.register("ana@example.com", "Ana").await;
    let (admin_id, admin) = app.seed_staff("root@example.com", "admin", false).await;

    assert_eq!(
        app.call(Method::GET, "/admin/users", None, None).await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(app.get("/admin/users", &ana).await.status, StatusCode::FORBIDDEN);

    let users = app.get("/admin/users", &admin).await;
    assert_eq!(users.status, StatusCode::OK);
    assert_eq!(users.json().as_array().unwrap().len(), 2);

    let created = app
        .post(
            "/admin/users",
            &admin,
            json!({
                "email": "dr.kim@example.com",
                "name": "Dr Kim",
                "password": PASSWORD,
                "role": "doctor",
                "specialization": "Sleep medicine"
            }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let kim_id = created.json()["id"].as_str().unwrap().to_string();

    let doctors = app.get("/admin/users?role=doctor", &admin).await.json();
    assert_eq!(doctors.as_array().unwrap().len(), 1);

    // New doctors start unavailable
    let listed = app.call(Method::GET, "/doctors", None, None).await.json();
    assert_eq!(listed[0]["available"], false);
    let toggled = app
        .call(
            Method::PUT,
            &format!("/admin/doctors/{kim_id}/availability"),
            Some(&admin),
            Some(json!({ "available": true })),
        )
        .await;
    assert_eq!(toggled.status, StatusCode::OK);
    assert_eq!(toggled.json()["available"], true);

    let kim = app.login("dr.kim@example.com", PASSWORD).await;
    let self_toggle = app
        .call(
            Method::PUT,
            "/doctors/me/availability",
            Some(&kim),
            Some(json!({ "available": false })),
        )
        .await;
    assert_eq!(self_toggle.status, StatusCode::OK);
    let patient_toggle = app
        .call(
            Method::PUT,
            "/doctors/me/availability",
            Some(&ana),
            Some(json!({ "available": true })),
        )
        .await;
    assert_eq!(patient_toggle.status, StatusCode::FORBIDDEN);

    let promoted = app
        .call(
            Method::PUT,
            &format!("/admin/users/{ana_id}/role"),
            Some(&admin),
            Some(json!({ "role": "doctor" })),
        )
        .await;
    assert_eq!(promoted.status, StatusCode::OK);
    assert_eq!(promoted.json()["role"], "doctor");

    let delete_self = app
        .call(Method::DELETE, &format!("/admin/users/{admin_id}"), Some(&admin), None)
        .await;
    assert_eq!(delete_self.status, StatusCode::BAD_REQUEST);

    let deleted = app
        .call(Method::DELETE, &format!("/admin/users/{ana_id}"), Some(&admin), None)
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    let gone = app
        .call(Method::DELETE, &format!("/admin/users/{ana_id}"), Some(&admin), None)
        .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new().await;
    let reply = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.bytes, b"ok");
}
