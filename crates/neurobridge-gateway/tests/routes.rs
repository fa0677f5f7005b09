// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Route-level tests driven through `tower::ServiceExt::oneshot`.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use neurobridge_gateway::{GatewayState, router};
use neurobridge_test_utils::TestHarness;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const BOUNDARY: &str = "nb-test-boundary";

fn app(harness: &TestHarness) -> Router {
    let state = GatewayState::new(harness.services.clone(), CancellationToken::new());
    router(state, 1024 * 1024)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn multipart_body(files: &[(&str, &str, &[u8])], prompt: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, mime, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: {mime}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(prompt) = prompt {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"prompt\"\r\n\r\n{prompt}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn learning_build_request(token: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/learning-builds")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn register(app: &Router, email: &str) -> Value {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/v1/auth/register",
            None,
            json!({"email": email, "password": "long enough pw", "first_name": "Ada"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

#[tokio::test]
async fn health_is_public() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = app(&harness);
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn api_routes_require_a_valid_bearer() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = app(&harness);

    let request = Request::builder().uri("/v1/me").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "invalid credentials"}));

    let (status, _) = send(&app, get("/v1/me", "not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_login_me_and_logout() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = app(&harness);
    let registered = register(&app, "Ada@Example.test").await;
    assert_eq!(registered["user"]["email"], "ada@example.test");
    assert!(registered["user"].get("password_hash").is_none());

    let (status, tokens) = send(
        &app,
        json_request(
            "POST",
            "/v1/auth/login",
            None,
            json!({"email": "ada@example.test", "password": "long enough pw"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let access = tokens["access_token"].as_str().unwrap().to_string();

    let (status, me) = send(&app, get("/v1/me", &access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["first_name"], "Ada");

    let (status, me) = send(
        &app,
        json_request("PATCH", "/v1/me", Some(&access), json!({"last_name": "Lovelace"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["last_name"], "Lovelace");

    let (status, _) = send(
        &app,
        json_request("POST", "/v1/auth/logout", Some(&access), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, get("/v1/me", &access)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = app(&harness);
    register(&app, "dup@example.test").await;
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/auth/register",
            None,
            json!({"email": "dup@example.test", "password": "long enough pw"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already registered"));
}

#[tokio::test]
async fn multipart_learning_build_creates_everything() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = app(&harness);
    let registered = register(&app, "learner@example.test").await;
    let access = registered["tokens"]["access_token"].as_str().unwrap().to_string();

    let body = multipart_body(
        &[("notes.pdf", "application/pdf", b"%PDF-1.4 fake")],
        Some("help me learn this"),
    );
    let (status, build) = send(&app, learning_build_request(&access, body)).await;
    assert_eq!(status, StatusCode::CREATED, "{build}");
    assert_eq!(build["dispatched"], true);
    assert_eq!(build["files"].as_array().unwrap().len(), 1);
    assert_eq!(build["files"][0]["original_name"], "notes.pdf");
    assert_eq!(harness.store.len(), 1);

    let thread_id = build["thread"]["id"].as_str().unwrap();
    let (status, messages) = send(
        &app,
        get(&format!("/v1/threads/{thread_id}/messages"), &access),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(messages.as_array().unwrap().len(), 2);
    assert_eq!(messages[0]["content"], "help me learn this");

    let job_id = build["job"]["id"].as_str().unwrap();
    let (status, job) = send(&app, get(&format!("/v1/jobs/{job_id}"), &access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "dispatched");

    let path_id = build["path_id"].as_str().unwrap();
    let (status, path) = send(&app, get(&format!("/v1/paths/{path_id}"), &access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(path["job_id"], job_id);
}

#[tokio::test]
async fn empty_learning_build_is_a_bad_request() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = app(&harness);
    let registered = register(&app, "empty@example.test").await;
    let access = registered["tokens"]["access_token"].as_str().unwrap().to_string();

    let (status, body) = send(&app, learning_build_request(&access, multipart_body(&[], None))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("no files or prompt"));
}

#[tokio::test]
async fn dispatch_failure_is_accepted_with_ids() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = app(&harness);
    let registered = register(&app, "retry@example.test").await;
    let access = registered["tokens"]["access_token"].as_str().unwrap().to_string();
    harness.engine.fail_next(1);

    let (status, build) = send(
        &app,
        learning_build_request(&access, multipart_body(&[], Some("teach me ownership"))),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{build}");
    assert_eq!(build["dispatched"], false);
    assert_eq!(build["job"]["status"], "queued");
    assert!(build["dispatch_error"].is_string());
}

#[tokio::test]
async fn other_users_resources_are_not_found() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = app(&harness);
    let owner = register(&app, "owner@example.test").await;
    let stranger = register(&app, "stranger@example.test").await;
    let owner_token = owner["tokens"]["access_token"].as_str().unwrap().to_string();
    let stranger_token = stranger["tokens"]["access_token"].as_str().unwrap().to_string();

    let (_, build) = send(
        &app,
        learning_build_request(&owner_token, multipart_body(&[], Some("mine"))),
    )
    .await;
    let thread_id = build["thread"]["id"].as_str().unwrap();
    let (status, _) = send(&app, get(&format!("/v1/threads/{thread_id}"), &stranger_token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn gaze_requires_consent_via_prefs() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = app(&harness);
    let registered = register(&app, "eyes@example.test").await;
    let access = registered["tokens"]["access_token"].as_str().unwrap().to_string();
    let batch = json!({
        "session_id": "s1",
        "hits": [{"block_id": "b1", "x": 0.1, "y": 0.2, "confidence": 0.9, "ts": 1700000000.0}]
    });

    let (status, body) = send(&app, json_request("POST", "/v1/gaze", Some(&access), batch.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], 0);

    let (status, prefs) = send(
        &app,
        json_request("PUT", "/v1/me/prefs", Some(&access), json!({"allowEyeTracking": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(prefs["allowEyeTracking"], true);

    let (_, body) = send(&app, json_request("POST", "/v1/gaze", Some(&access), batch)).await;
    assert_eq!(body["accepted"], 1);

    let (status, blocks) = send(&app, get("/v1/gaze/blocks?session_id=s1", &access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(blocks[0]["block_id"], "b1");
    assert_eq!(blocks[0]["fixation_ms"], 100);
}
