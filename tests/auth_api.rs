use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use auth_service::{
    app::build_app,
    auth::{
        jwt::JwtKeys,
        repo::{MemoryUserStore, UserStore},
    },
    state::AppState,
};

const EMAIL: &str = "test@example.com";
const PASSWORD: &str = "password123";

fn test_app() -> Router {
    build_app(AppState::fake().expect("state"))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.expect("request");
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.expect("body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_profile(auth: Option<&str>) -> Request<Body> {
    let mut req = Request::get("/api/auth/profile");
    if let Some(value) = auth {
        req = req.header(header::AUTHORIZATION, value);
    }
    req.body(Body::empty()).unwrap()
}

async fn register(app: &Router) -> (StatusCode, Value) {
    send(
        app,
        post_json("/api/auth/register", json!({ "email": EMAIL, "password": PASSWORD })),
    )
    .await
}

#[tokio::test]
async fn register_creates_user() {
    let users = Arc::new(MemoryUserStore::new());
    let state =
        AppState::from_parts(users.clone(), Arc::new(AppState::fake_config())).expect("state");
    let app = build_app(state);

    let (status, body) = register(&app).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["token"].is_string());
    assert!(body["userId"].is_string());
    assert_eq!(body["message"], "User created successfully");

    let stored = users.find_by_email(EMAIL).await.unwrap().expect("stored");
    assert_eq!(stored.email, EMAIL);
    assert_eq!(stored.id.to_string(), body["userId"].as_str().unwrap());
    assert_ne!(stored.password_hash, PASSWORD);
}

#[tokio::test]
async fn register_twice_conflicts() {
    let app = test_app();
    let (first, _) = register(&app).await;
    let (second, body) = register(&app).await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email already in use");
}

#[tokio::test]
async fn register_rejects_invalid_email() {
    let app = test_app();
    let (status, body) = send(
        &app,
        post_json(
            "/api/auth/register",
            json!({ "email": "invalid-email", "password": PASSWORD }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn register_rejects_missing_fields_and_bad_json() {
    let app = test_app();
    let (status, _) = send(&app, post_json("/api/auth/register", json!({ "email": EMAIL }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = Request::post("/api/auth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid request data");
}

#[tokio::test]
async fn login_with_valid_credentials() {
    let app = test_app();
    let (_, reg) = register(&app).await;

    let (status, body) = send(
        &app,
        post_json("/api/auth/login", json!({ "email": EMAIL, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userId"], reg["userId"]);

    let keys = JwtKeys::from_config(&AppState::fake_config().jwt);
    let claims = keys.verify(body["token"].as_str().unwrap()).expect("valid token");
    assert_eq!(claims.user_id.to_string(), reg["userId"].as_str().unwrap());
    assert_eq!(claims.email, EMAIL);
}

#[tokio::test]
async fn login_failures_share_one_message() {
    let app = test_app();
    register(&app).await;

    let (wrong_status, wrong) = send(
        &app,
        post_json("/api/auth/login", json!({ "email": EMAIL, "password": "wrongpassword" })),
    )
    .await;
    let (unknown_status, unknown) = send(
        &app,
        post_json(
            "/api/auth/login",
            json!({ "email": "nonexistent@example.com", "password": PASSWORD }),
        ),
    )
    .await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong["message"], "Invalid email or password");
    assert_eq!(wrong["message"], unknown["message"]);
}

#[tokio::test]
async fn login_with_incomplete_body_is_unauthorized() {
    let app = test_app();
    register(&app).await;

    let (status, body) =
        send(&app, post_json("/api/auth/login", json!({ "email": EMAIL }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid email or password");

    let req = Request::post("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid email or password");
}

#[tokio::test]
async fn profile_with_valid_token() {
    let app = test_app();
    let (_, reg) = register(&app).await;
    let token = reg["token"].as_str().unwrap();

    let (status, body) = send(&app, get_profile(Some(&format!("Bearer {token}")))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], EMAIL);
    assert_eq!(body["_id"], reg["userId"]);
    assert!(body.get("password").is_none());
    assert!(body.get("passwordHash").is_none());
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn profile_token_failures_are_distinct() {
    let app = test_app();

    let (s_missing, missing) = send(&app, get_profile(None)).await;
    let (s_malformed, malformed) = send(&app, get_profile(Some("InvalidTokenFormat"))).await;
    let (s_invalid, invalid) = send(&app, get_profile(Some("Bearer invalid-token"))).await;

    assert_eq!(s_missing, StatusCode::UNAUTHORIZED);
    assert_eq!(s_malformed, StatusCode::UNAUTHORIZED);
    assert_eq!(s_invalid, StatusCode::UNAUTHORIZED);
    assert_eq!(missing["message"], "Token missing");
    assert_eq!(malformed["message"], "Token malformed");
    assert_eq!(invalid["message"], "Invalid token");
}

#[tokio::test]
async fn profile_rejects_expired_token() {
    let app = test_app();
    let (_, reg) = register(&app).await;
    let user_id = reg["userId"].as_str().unwrap().parse().unwrap();

    let keys = JwtKeys::from_config(&AppState::fake_config().jwt);
    let issued = time::OffsetDateTime::now_utc() - time::Duration::days(2);
    let token = keys.sign_at(user_id, EMAIL, issued).unwrap();

    let (status, body) = send(&app, get_profile(Some(&format!("Bearer {token}")))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid token");
}

#[tokio::test]
async fn profile_of_deleted_user_is_not_found() {
    let users = Arc::new(MemoryUserStore::new());
    let state =
        AppState::from_parts(users.clone(), Arc::new(AppState::fake_config())).expect("state");
    let app = build_app(state);

    let (_, reg) = register(&app).await;
    let token = reg["token"].as_str().unwrap().to_string();
    let user_id = reg["userId"].as_str().unwrap().parse().unwrap();
    assert!(users.delete(user_id).await);

    let (status, body) = send(&app, get_profile(Some(&format!("Bearer {token}")))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "User not found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registration_has_one_success() {
    let app = test_app();
    let mut handles = Vec::new();
    for _ in 0..4 {
        let app = app.clone();
        handles.push(tokio::spawn(async move { register(&app).await.0 }));
    }

    let mut created = 0;
    let mut rejected = 0;
    for h in handles {
        match h.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::BAD_REQUEST => rejected += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(rejected, 3);
}

#[tokio::test]
async fn health_and_ping() {
    let app = test_app();

    let (status, body) = send(&app, Request::get("/api/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "OK", "service": "auth-service" }));

    let (status, body) =
        send(&app, Request::get("/api/auth/ping").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Auth service is reachable");
}

#[tokio::test]
async fn metrics_count_requests() {
    let app = test_app();
    send(&app, Request::get("/api/health").body(Body::empty()).unwrap()).await;

    let res = app
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("http_requests_total 1"));
    assert!(text.contains("http_response_time_seconds_bucket"));
    assert!(text.contains(
        r#"http_request_duration_seconds_count{method="GET",path="/api/health",status_code="200"} 1"#
    ));
}
