mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::TestApp;
use serde_json::{json, Value};
use tower::util::ServiceExt;

fn json_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn register_body() -> Value {
    json!({
        "fullName": "Alice Example",
        "email": "alice@example.com",
        "username": "alice1",
        "phone": "+62 811-234-567",
        "institution": "Example University",
        "password": "password1",
        "confirmPassword": "password1",
        "terms": true
    })
}

/// Pull the session cookie pair out of a login response.
fn session_cookie(response: &axum::response::Response) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("session_token="))
        .and_then(|v| v.split(';').next())
        .expect("session cookie not set")
        .to_string()
}

#[tokio::test]
async fn register_returns_envelope_with_user_id() {
    let app = TestApp::new().router();

    let response = app.oneshot(json_post("/auth/register", register_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["email_verification_required"], json!(true));
    assert!(body["data"]["user_id"].is_string());
}

#[tokio::test]
async fn register_rejects_invalid_json() {
    let app = TestApp::new().router();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn register_reports_field_errors() {
    let app = TestApp::new().router();

    let response = app
        .oneshot(json_post("/auth/register", json!({ "terms": false })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert!(body["errors"]["fullName"].is_string());
    assert!(body["errors"]["email"].is_string());
    assert!(body["errors"]["terms"].is_string());
}

#[tokio::test]
async fn register_conflict_uses_combined_message() {
    let test_app = TestApp::new();
    let app = test_app.router();

    let response = app
        .clone()
        .oneshot(json_post("/auth/register", register_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(json_post("/auth/register", register_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
    // One combined message, no field map, so the colliding field is not leaked
    assert!(body.get("errors").is_none());
    assert_eq!(
        body["message"],
        json!("Email or username already registered")
    );
}

#[tokio::test]
async fn register_rejects_non_post() {
    let app = TestApp::new().router();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/register")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn login_failure_bodies_do_not_leak_existence() {
    let test_app = TestApp::new();
    let app = test_app.router();

    app.clone()
        .oneshot(json_post("/auth/register", register_body()))
        .await
        .unwrap();

    let unknown = app
        .clone()
        .oneshot(json_post(
            "/auth/login",
            json!({"identifier": "nobody", "password": "password1"}),
        ))
        .await
        .unwrap();
    let wrong_password = app
        .oneshot(json_post(
            "/auth/login",
            json!({"identifier": "alice1", "password": "wrong-password"}),
        ))
        .await
        .unwrap();

    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(unknown).await, body_json(wrong_password).await);
}

#[tokio::test]
async fn full_register_verify_login_me_logout_flow() {
    let test_app = TestApp::new();
    let app = test_app.router();

    // Register
    let response = app
        .clone()
        .oneshot(json_post("/auth/register", register_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Login is blocked until the email is verified
    let response = app
        .clone()
        .oneshot(json_post(
            "/auth/login",
            json!({"identifier": "alice1", "password": "password1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Verify using the stored token
    let token = test_app
        .stored_user("alice@example.com")
        .await
        .verification_token
        .unwrap();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/auth/verify?token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Replaying the consumed token fails
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/auth/verify?token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Login succeeds and returns the sanitized projection plus a cookie
    let response = app
        .clone()
        .oneshot(json_post(
            "/auth/login",
            json!({"identifier": "alice1", "password": "password1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);

    let body = body_json(response).await;
    assert_eq!(body["data"]["username"], json!("alice1"));
    assert_eq!(body["data"]["email"], json!("alice@example.com"));
    assert_eq!(body["data"]["role"], json!("user"));
    assert!(body["data"].get("password").is_none());
    assert!(body["data"].get("password_hash").is_none());

    // Session query sees the account
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/me")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["username"], json!("alice1"));

    // Logout destroys the session
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/me")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn password_reset_request_is_uniformly_successful() {
    let test_app = TestApp::new();
    let app = test_app.router();

    app.clone()
        .oneshot(json_post("/auth/register", register_body()))
        .await
        .unwrap();

    let known = app
        .clone()
        .oneshot(json_post(
            "/auth/password-reset/request",
            json!({"email": "alice@example.com"}),
        ))
        .await
        .unwrap();
    let unknown = app
        .oneshot(json_post(
            "/auth/password-reset/request",
            json!({"email": "unknown@example.com"}),
        ))
        .await
        .unwrap();

    assert_eq!(known.status(), StatusCode::OK);
    assert_eq!(unknown.status(), StatusCode::OK);
    assert_eq!(body_json(known).await, body_json(unknown).await);
}
