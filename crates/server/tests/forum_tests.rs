use arc_swap::ArcSwap;
use axum::Router;
use axum::body::Body;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{Request, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use forum_core::config::Config;
use forum_core::mdc::{self, CURRENT_USER_KEY};
use forum_server::auth::authentication_middleware;
use forum_server::middleware::logging_configuration::logging_configuration_middleware;
use forum_server::session::session_middleware;
use forum_server::{AppState, build_router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_state() -> AppState {
    let password_hash = bcrypt::hash("test123", 4).expect("failed to hash password");
    let yaml = format!(
        r#"
security:
  jwt-secret: test-secret
  users:
    - username: alice
      password-hash: "{password_hash}"
    - username: bob
      password-hash: "{password_hash}"
"#
    );
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, yaml).expect("failed to write config");
    let config = Config::load(path.to_str().unwrap()).expect("failed to load config");
    AppState::new(Arc::new(ArcSwap::from_pointee(config)))
}

/// Send a request through the full router; returns (status, body as Value).
async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = build_router(state.clone())
        .oneshot(request)
        .await
        .expect("request failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    let value: Value = serde_json::from_slice(&bytes).unwrap_or(json!({}));
    (status, value)
}

async fn login(state: &AppState, username: &str) -> String {
    let request = post_json(
        "/api/auth/login",
        None,
        json!({"username": username, "password": "test123"}),
    );
    let (status, body) = send(state, request).await;
    assert_eq!(status, StatusCode::OK, "login failed: {body:?}");
    body["token"].as_str().expect("no token").to_string()
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn create_review(state: &AppState, token: &str) -> u64 {
    let (status, body) = send(state, post_json("/reviews", Some(token), json!({}))).await;
    assert_eq!(status, StatusCode::CREATED, "{body:?}");
    body["id"].as_u64().unwrap()
}

async fn add_comment(state: &AppState, token: &str, review_id: u64, body: &str) -> Value {
    let (status, response) = send(
        state,
        post_json(
            &format!("/reviewcomments/new?reviewId={review_id}"),
            Some(token),
            json!({"lineNumber": 1, "body": body}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{response:?}");
    response
}

// ===========================================================================
// Health & auth
// ===========================================================================

#[tokio::test]
async fn test_health() {
    let state = test_state();
    let (status, body) = send(&state, get_req("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_request_id_echoed() {
    let state = test_state();
    let response = build_router(state).oneshot(get_req("/health")).await.unwrap();
    let id = response
        .headers()
        .get("x-request-id")
        .expect("missing x-request-id")
        .to_str()
        .unwrap();
    assert_eq!(id.len(), 36);
}

#[tokio::test]
async fn test_login_with_valid_credentials() {
    let state = test_state();
    let request = post_json(
        "/api/auth/login",
        None,
        json!({"username": "alice", "password": "test123"}),
    );
    let (status, body) = send(&state, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
}

#[tokio::test]
async fn test_login_with_invalid_password() {
    let state = test_state();
    let request = post_json(
        "/api/auth/login",
        None,
        json!({"username": "alice", "password": "wrong"}),
    );
    let (status, body) = send(&state, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "invalid_credentials");
}

#[tokio::test]
async fn test_login_with_unknown_user() {
    let state = test_state();
    let request = post_json(
        "/api/auth/login",
        None,
        json!({"username": "nobody", "password": "test123"}),
    );
    let (status, _) = send(&state, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ===========================================================================
// Sessions
// ===========================================================================

#[tokio::test]
async fn test_new_session_cookie_issued() {
    let state = test_state();
    let response = build_router(state).oneshot(get_req("/health")).await.unwrap();
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .expect("missing Set-Cookie")
        .to_str()
        .unwrap();
    assert!(cookie.starts_with("JSESSIONID="), "{cookie}");
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn test_existing_session_not_reissued() {
    let state = test_state();
    let request = Request::builder()
        .uri("/health")
        .header(COOKIE, "JSESSIONID=AF7823")
        .body(Body::empty())
        .unwrap();
    let response = build_router(state).oneshot(request).await.unwrap();
    assert!(response.headers().get(SET_COOKIE).is_none());
}

// ===========================================================================
// Reviews
// ===========================================================================

#[tokio::test]
async fn test_create_review_requires_authentication() {
    let state = test_state();
    let (status, body) = send(&state, post_json("/reviews", None, json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "access_denied");
}

#[tokio::test]
async fn test_invalid_token_is_treated_as_anonymous() {
    let state = test_state();
    let (status, _) = send(
        &state,
        post_json("/reviews", Some("invalid.jwt.token"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_get_review_with_comments() {
    let state = test_state();
    let token = login(&state, "alice").await;
    let review_id = create_review(&state, &token).await;
    add_comment(&state, &token, review_id, "first").await;

    let (status, body) = send(&state, get_req(&format!("/reviews/{review_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["author"]["username"], "alice");
    assert_eq!(body["comments"][0]["body"], "first");
    assert_eq!(body["comments"][0]["lineNumber"], 1);
}

#[tokio::test]
async fn test_get_missing_review() {
    let state = test_state();
    let (status, _) = send(&state, get_req("/reviews/99")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ===========================================================================
// Review comments
// ===========================================================================

#[tokio::test]
async fn test_add_comment_success() {
    let state = test_state();
    let token = login(&state, "alice").await;
    let review_id = create_review(&state, &token).await;

    let (status, body) = send(
        &state,
        post_json(
            &format!("/reviewcomments/new?reviewId={review_id}"),
            Some(&token),
            json!({"lineNumber": 1, "body": "body"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "SUCCESS");
    assert_eq!(body["result"]["id"], 1);
    assert_eq!(body["result"]["body"], "body");
    assert_eq!(body["result"]["lineNumber"], 1);
    assert_eq!(body["result"]["authorId"], 1);
    assert_eq!(body["result"]["authorUsername"], "alice");
}

#[tokio::test]
async fn test_add_comment_trims_body() {
    let state = test_state();
    let token = login(&state, "alice").await;
    let review_id = create_review(&state, &token).await;

    let body = add_comment(&state, &token, review_id, "   spaced out \n").await;
    assert_eq!(body["result"]["body"], "spaced out");
}

#[tokio::test]
async fn test_add_comment_validation_fail() {
    let state = test_state();
    let token = login(&state, "alice").await;
    let review_id = create_review(&state, &token).await;

    let (status, body) = send(
        &state,
        post_json(
            &format!("/reviewcomments/new?reviewId={review_id}"),
            Some(&token),
            json!({"lineNumber": 0, "body": "   "}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "FAIL");
    let fields: Vec<&str> = body["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["body", "lineNumber"]);

    let (_, review) = send(&state, get_req(&format!("/reviews/{review_id}"))).await;
    assert!(review["comments"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_add_comment_review_not_found() {
    let state = test_state();
    let token = login(&state, "alice").await;

    let (status, body) = send(
        &state,
        post_json(
            "/reviewcomments/new?reviewId=42",
            Some(&token),
            json!({"lineNumber": 1, "body": "body"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_add_comment_access_denied() {
    let state = test_state();
    let token = login(&state, "alice").await;
    let review_id = create_review(&state, &token).await;

    let (status, _) = send(
        &state,
        post_json(
            &format!("/reviewcomments/new?reviewId={review_id}"),
            None,
            json!({"lineNumber": 1, "body": "body"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_add_comment_malformed_body_is_bad_request() {
    let state = test_state();
    let token = login(&state, "alice").await;
    let review_id = create_review(&state, &token).await;

    let (status, body) = send(
        &state,
        post_json(
            &format!("/reviewcomments/new?reviewId={review_id}"),
            Some(&token),
            json!({"lineNumber": -1, "body": "x"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_add_comment_missing_review_id_is_bad_request() {
    let state = test_state();
    let token = login(&state, "alice").await;

    let (status, body) = send(
        &state,
        post_json(
            "/reviewcomments/new",
            Some(&token),
            json!({"lineNumber": 1, "body": "x"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn test_edit_comment_non_json_is_bad_request() {
    let state = test_state();
    let request = Request::builder()
        .method("POST")
        .uri("/reviewcomments/edit")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(&state, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn test_get_review_with_non_numeric_id_is_bad_request() {
    let state = test_state();
    let (status, body) = send(&state, get_req("/reviews/abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn test_login_malformed_body_is_bad_request() {
    let state = test_state();
    let (status, body) = send(
        &state,
        post_json("/api/auth/login", None, json!({"username": "alice"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn test_edit_comment_success() {
    let state = test_state();
    let token = login(&state, "alice").await;
    let review_id = create_review(&state, &token).await;
    let created = add_comment(&state, &token, review_id, "before").await;
    let comment_id = created["result"]["id"].as_u64().unwrap();

    let (status, body) = send(
        &state,
        post_json(
            "/reviewcomments/edit",
            Some(&token),
            json!({"id": comment_id, "body": "after"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "SUCCESS");
    assert_eq!(body["result"]["id"], comment_id);
    assert_eq!(body["result"]["body"], "after");
    assert_eq!(body["result"]["lineNumber"], 1);
    assert_eq!(body["result"]["authorUsername"], "alice");
}

#[tokio::test]
async fn test_edit_comment_validation_fail() {
    let state = test_state();
    let token = login(&state, "alice").await;
    let review_id = create_review(&state, &token).await;
    let created = add_comment(&state, &token, review_id, "before").await;
    let comment_id = created["result"]["id"].as_u64().unwrap();

    let (status, body) = send(
        &state,
        post_json("/reviewcomments/edit", Some(&token), json!({"id": comment_id})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "FAIL");
    assert!(!body["result"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_edit_comment_not_found() {
    let state = test_state();
    let token = login(&state, "alice").await;

    let (status, _) = send(
        &state,
        post_json(
            "/reviewcomments/edit",
            Some(&token),
            json!({"id": 77, "body": "body"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_edit_comment_access_denied_for_other_user() {
    let state = test_state();
    let alice = login(&state, "alice").await;
    let bob = login(&state, "bob").await;
    let review_id = create_review(&state, &alice).await;
    let created = add_comment(&state, &alice, review_id, "mine").await;
    let comment_id = created["result"]["id"].as_u64().unwrap();

    let (status, _) = send(
        &state,
        post_json(
            "/reviewcomments/edit",
            Some(&bob),
            json!({"id": comment_id, "body": "hijacked"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ===========================================================================
// Identity registration through the real middleware stack
// ===========================================================================

/// Same session → auth → identity layering as `build_router`, with a route
/// that reports what the logging context holds while the handler runs.
fn whoami_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/whoami",
            get(|| async { mdc::get(CURRENT_USER_KEY).unwrap_or_default() }),
        )
        .layer(from_fn_with_state(
            state.clone(),
            logging_configuration_middleware,
        ))
        .layer(from_fn_with_state(state.clone(), authentication_middleware))
        .layer(from_fn_with_state(state.clone(), session_middleware))
        .with_state(state)
}

async fn whoami(state: &AppState, request: Request<Body>) -> (String, Option<String>) {
    let response = whoami_router(state.clone())
        .oneshot(request)
        .await
        .unwrap();
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (String::from_utf8(bytes.to_vec()).unwrap(), cookie)
}

#[tokio::test]
async fn test_authenticated_user_is_registered() {
    let state = test_state();
    let token = login(&state, "alice").await;
    let request = Request::builder()
        .uri("/whoami")
        .header("authorization", format!("Bearer {token}"))
        .header(COOKIE, "JSESSIONID=AF7823")
        .body(Body::empty())
        .unwrap();

    let (user, _) = whoami(&state, request).await;
    assert_eq!(user, "alice");
    assert_eq!(mdc::get(CURRENT_USER_KEY), None);
}

#[tokio::test]
async fn test_anonymous_user_is_registered_from_session_cookie() {
    let state = test_state();
    let request = Request::builder()
        .uri("/whoami")
        .header(COOKIE, "JSESSIONID=AF7823")
        .body(Body::empty())
        .unwrap();

    let (user, _) = whoami(&state, request).await;
    assert_eq!(user, "anonymous-7823");
}

#[tokio::test]
async fn test_fresh_session_gets_anonymous_tag() {
    let state = test_state();
    let (user, cookie) = whoami(&state, get_req("/whoami")).await;

    let cookie = cookie.expect("missing Set-Cookie");
    let id = cookie
        .strip_prefix("JSESSIONID=")
        .and_then(|rest| rest.split(';').next())
        .unwrap();
    assert_eq!(user, format!("anonymous-{}", &id[id.len() - 4..]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_do_not_share_identity() {
    let state = test_state();
    let mut handles = Vec::new();
    for i in 0..32 {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            let session = format!("SESSION{i:04}");
            let request = Request::builder()
                .uri("/whoami")
                .header(COOKIE, format!("JSESSIONID={session}"))
                .body(Body::empty())
                .unwrap();
            let (user, _) = whoami(&state, request).await;
            (user, format!("anonymous-{i:04}"))
        }));
    }
    for handle in handles {
        let (seen, expected) = handle.await.unwrap();
        assert_eq!(seen, expected);
    }
}
