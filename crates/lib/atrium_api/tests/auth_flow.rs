//! End-to-end auth flow tests — build the router over in-memory stores,
//! drive it with `tower::ServiceExt::oneshot`, assert on wire behavior.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Request, Response, StatusCode};
use tower::ServiceExt;
use uuid::Uuid;

use atrium_api::config::ApiConfig;
use atrium_api::middleware::refresh::ACCESS_TOKEN_HEADER;
use atrium_api::{AppState, router};
use atrium_core::auth::jwt::TokenCodec;
use atrium_core::auth::ledger::RefreshTokenStore;
use atrium_core::auth::memory::{MemoryDirectory, MemoryLedger};
use atrium_core::auth::password::hash_password;
use atrium_core::auth::session::SessionManager;
use atrium_core::auth::AuthError;
use atrium_core::models::auth::{NewRefreshToken, RefreshTokenRecord};
use atrium_core::models::directory::{UserAccount, UserStatus};

const EMAIL: &str = "ada@example.com";
const PASSWORD: &str = "correct-horse-battery";
const ACCESS_SECRET: &str = "test-access-secret";
const REFRESH_SECRET: &str = "test-refresh-secret";
const REFRESH_COOKIE: &str = "atrium_refresh";

struct TestApp {
    app: Router,
    ledger: Arc<MemoryLedger>,
    directory: Arc<MemoryDirectory>,
    codec: TokenCodec,
    user_id: Uuid,
}

fn test_codec(access_ttl_secs: i64) -> TokenCodec {
    TokenCodec::new(
        ACCESS_SECRET,
        Some(REFRESH_SECRET.into()),
        access_ttl_secs,
        3600,
    )
    .unwrap()
}

fn test_config() -> ApiConfig {
    ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        database_url: "postgres://unused".into(),
        access_token_secret: ACCESS_SECRET.into(),
        refresh_token_secret: Some(REFRESH_SECRET.into()),
        access_ttl_secs: 900,
        refresh_ttl_secs: 3600,
    }
}

fn seeded_directory() -> (Arc<MemoryDirectory>, Uuid) {
    let directory = Arc::new(MemoryDirectory::new());
    let user_id = Uuid::new_v4();
    directory.add_user(UserAccount {
        id: user_id,
        email: EMAIL.into(),
        display_name: Some("Ada".into()),
        password_hash: Some(hash_password(PASSWORD).unwrap()),
        status: UserStatus::Active,
    });
    directory.assign_role(user_id, "editor");
    directory.set_role_permissions("editor", &["user.read", "doc.write"]);
    (directory, user_id)
}

fn test_app_with(ledger: Arc<dyn RefreshTokenStore>, memory: Arc<MemoryLedger>) -> TestApp {
    let (directory, user_id) = seeded_directory();
    let codec = test_codec(900);
    let sessions = SessionManager::new(directory.clone(), ledger, codec.clone());
    let state = AppState::new(sessions, test_config());
    TestApp {
        app: router(state),
        ledger: memory,
        directory,
        codec,
        user_id,
    }
}

fn test_app() -> TestApp {
    let ledger = Arc::new(MemoryLedger::new());
    test_app_with(ledger.clone(), ledger)
}

async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse JSON")
}

/// Pull the refresh cookie's value out of a `Set-Cookie` header.
fn refresh_cookie_value(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(REFRESH_COOKIE))
        .and_then(|v| {
            let rest = v.strip_prefix(REFRESH_COOKIE)?.strip_prefix('=')?;
            Some(rest.split(';').next().unwrap_or(rest).to_string())
        })
}

fn login_request() -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(format!(
            r#"{{"email":"{EMAIL}","password":"{PASSWORD}"}}"#
        )))
        .unwrap()
}

async fn login(app: &TestApp) -> (String, String) {
    let response = app.app.clone().oneshot(login_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let refresh = refresh_cookie_value(&response).expect("refresh cookie");
    let body = json_body(response).await;
    let access = body["accessToken"].as_str().expect("access token").to_string();
    (access, refresh)
}

#[tokio::test]
async fn login_sets_refresh_cookie_and_keeps_it_out_of_the_body() {
    let app = test_app();
    let response = app.app.clone().oneshot(login_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("Set-Cookie header");
    assert!(cookie.starts_with(REFRESH_COOKIE));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Path=/auth"));

    let refresh = refresh_cookie_value_str(cookie);
    let body = json_body(response).await;
    assert_eq!(body["tokenType"], "Bearer");
    assert_eq!(body["user"]["email"], EMAIL);
    assert!(body["accessToken"].is_string());
    // The refresh token lives in the cookie only.
    assert!(!body.to_string().contains(&refresh));

    // One ledger row for the fresh session.
    assert_eq!(
        app.ledger.find_active_by_subject(app.user_id).await.unwrap().len(),
        1
    );
}

fn refresh_cookie_value_str(header: &str) -> String {
    header
        .strip_prefix(REFRESH_COOKIE)
        .and_then(|v| v.strip_prefix('='))
        .map(|rest| rest.split(';').next().unwrap_or(rest).to_string())
        .expect("cookie value")
}

#[tokio::test]
async fn login_failures_share_one_response() {
    let app = test_app();
    for body in [
        format!(r#"{{"email":"{EMAIL}","password":"wrong-wrong-wrong"}}"#),
        format!(r#"{{"email":"nobody@example.com","password":"{PASSWORD}"}}"#),
    ] {
        let request = Request::builder()
            .method("POST")
            .uri("/auth/login")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = json_body(response).await;
        assert_eq!(json["message"], "Invalid credentials");
    }
}

#[tokio::test]
async fn me_requires_a_bearer_token() {
    let app = test_app();
    let request = Request::builder()
        .uri("/auth/me")
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (access, _) = login(&app).await;
    let request = Request::builder()
        .uri("/auth/me")
        .header(AUTHORIZATION, format!("Bearer {access}"))
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["email"], EMAIL);
    assert!(json["permissions"]
        .as_array()
        .unwrap()
        .contains(&serde_json::json!("user.read")));
}

#[tokio::test]
async fn permission_gate_requires_every_listed_code() {
    let app = test_app();
    let (access, _) = login(&app).await;

    // editor carries user.read, so the listing is allowed.
    let request = Request::builder()
        .uri("/users")
        .header(AUTHORIZATION, format!("Bearer {access}"))
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["users"].as_array().unwrap().len(), 1);

    // Strip the grant and log in again: same route, now forbidden.
    app.directory.set_role_permissions("editor", &["doc.write"]);
    let (access, _) = login(&app).await;
    let request = Request::builder()
        .uri("/users")
        .header(AUTHORIZATION, format!("Bearer {access}"))
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = json_body(response).await;
    assert_eq!(json["message"], "Insufficient permissions");
}

#[tokio::test]
async fn refresh_endpoint_rotates_the_cookie() {
    let app = test_app();
    let (first_access, refresh) = login(&app).await;

    let request = Request::builder()
        .method("POST")
        .uri("/auth/refresh")
        .header(COOKIE, format!("{REFRESH_COOKIE}={refresh}"))
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let new_refresh = refresh_cookie_value(&response).expect("rotated cookie");
    assert_ne!(new_refresh, refresh);
    let json = json_body(response).await;
    assert_ne!(json["accessToken"], first_access);
    assert_eq!(app.ledger.rotation_count(), 1);
}

#[tokio::test]
async fn replayed_refresh_cookie_gets_a_cleared_cookie_and_401() {
    let app = test_app();
    let (_, refresh) = login(&app).await;

    // Rotate once, then replay the consumed cookie.
    let rotate = Request::builder()
        .method("POST")
        .uri("/auth/refresh")
        .header(COOKIE, format!("{REFRESH_COOKIE}={refresh}"))
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(rotate).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let replay = Request::builder()
        .method("POST")
        .uri("/auth/refresh")
        .header(COOKIE, format!("{REFRESH_COOKIE}={refresh}"))
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(replay).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Cookie cleared, nothing leaked about why.
    let cleared = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("cleared cookie");
    assert!(cleared.contains("Max-Age=0"));
    let json = json_body(response).await;
    assert_eq!(json["message"], "Authentication required");

    // Blast radius: no active sessions survive the replay.
    assert!(app
        .ledger
        .find_active_by_subject(app.user_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn expired_access_token_is_refreshed_transparently() {
    let app = test_app();
    let (_, refresh) = login(&app).await;

    // Same secrets, negative lifetime: already expired when signed.
    let expired = test_codec(-60)
        .sign_access(app.user_id, &["editor".into()], &["user.read".into()])
        .unwrap();

    let request = Request::builder()
        .uri("/auth/me")
        .header(AUTHORIZATION, format!("Bearer {expired}"))
        .header(COOKIE, format!("{REFRESH_COOKIE}={refresh}"))
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The fresh access token is surfaced for the client to adopt.
    let new_access = response
        .headers()
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .expect("x-access-token header");
    assert!(app.codec.verify_access(new_access).is_ok());

    // And the rotated refresh token replaced the cookie.
    let new_refresh = refresh_cookie_value(&response).expect("rotated cookie");
    assert_ne!(new_refresh, refresh);
    assert_eq!(app.ledger.rotation_count(), 1);
}

#[tokio::test]
async fn expired_token_without_a_cookie_is_401() {
    let app = test_app();
    login(&app).await;

    let expired = test_codec(-60)
        .sign_access(app.user_id, &[], &[])
        .unwrap();
    let request = Request::builder()
        .uri("/auth/me")
        .header(AUTHORIZATION, format!("Bearer {expired}"))
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.ledger.rotation_count(), 0);
}

#[tokio::test]
async fn tampered_token_never_triggers_a_rotation() {
    let app = test_app();
    let (access, refresh) = login(&app).await;

    // Flip the signature: structurally a JWT, cryptographically not ours.
    let mut tampered = access.clone();
    tampered.pop();
    tampered.push(if access.ends_with('A') { 'B' } else { 'A' });

    let request = Request::builder()
        .uri("/auth/me")
        .header(AUTHORIZATION, format!("Bearer {tampered}"))
        .header(COOKIE, format!("{REFRESH_COOKIE}={refresh}"))
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Invalid is not expired: the interceptor stays out of it.
    assert_eq!(app.ledger.rotation_count(), 0);
    assert_eq!(
        app.ledger.find_active_by_subject(app.user_id).await.unwrap().len(),
        1
    );
}

/// Ledger wrapper that yields before reads, holding the first rotation
/// in flight long enough for the rest of a burst to pile onto it.
struct SlowLedger {
    inner: Arc<MemoryLedger>,
}

#[async_trait]
impl RefreshTokenStore for SlowLedger {
    async fn record(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AuthError> {
        self.inner.record(token).await
    }

    async fn find_active_by_subject(
        &self,
        subject_id: Uuid,
    ) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        tokio::task::yield_now().await;
        self.inner.find_active_by_subject(subject_id).await
    }

    async fn consume_and_replace(
        &self,
        consumed_id: Uuid,
        replacement: NewRefreshToken,
    ) -> Result<RefreshTokenRecord, AuthError> {
        self.inner.consume_and_replace(consumed_id, replacement).await
    }

    async fn revoke(&self, id: Uuid) -> Result<(), AuthError> {
        self.inner.revoke(id).await
    }

    async fn revoke_all_for_subject(&self, subject_id: Uuid) -> Result<u64, AuthError> {
        self.inner.revoke_all_for_subject(subject_id).await
    }
}

#[tokio::test]
async fn concurrent_expired_requests_share_a_single_rotation() {
    let memory = Arc::new(MemoryLedger::new());
    let app = test_app_with(
        Arc::new(SlowLedger {
            inner: memory.clone(),
        }),
        memory,
    );
    let (_, refresh) = login(&app).await;

    let expired = test_codec(-60)
        .sign_access(app.user_id, &["editor".into()], &["user.read".into()])
        .unwrap();

    // A burst of identical requests, all carrying the same expired
    // access token and the same refresh cookie. Without coalescing the
    // second rotation would trip reuse detection and burn the session.
    let burst = (0..4).map(|_| {
        let request = Request::builder()
            .uri("/auth/me")
            .header(AUTHORIZATION, format!("Bearer {expired}"))
            .header(COOKIE, format!("{REFRESH_COOKIE}={refresh}"))
            .body(Body::empty())
            .unwrap();
        app.app.clone().oneshot(request)
    });
    let responses = futures::future::join_all(burst).await;

    for response in responses {
        let response = response.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(ACCESS_TOKEN_HEADER));
    }
    assert_eq!(app.ledger.rotation_count(), 1);
    assert_eq!(
        app.ledger.find_active_by_subject(app.user_id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn logout_clears_the_cookie_and_revokes_the_session() {
    let app = test_app();
    let (_, refresh) = login(&app).await;

    let request = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .header(COOKIE, format!("{REFRESH_COOKIE}={refresh}"))
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("cleared cookie");
    assert!(cleared.contains("Max-Age=0"));

    assert!(app
        .ledger
        .find_active_by_subject(app.user_id)
        .await
        .unwrap()
        .is_empty());

    // Logging out again, or with no cookie at all, still succeeds.
    let request = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn logout_all_revokes_every_device() {
    let app = test_app();
    let (access, _) = login(&app).await;
    login(&app).await;
    login(&app).await;
    assert_eq!(
        app.ledger.find_active_by_subject(app.user_id).await.unwrap().len(),
        3
    );

    let request = Request::builder()
        .method("POST")
        .uri("/auth/logout-all")
        .header(AUTHORIZATION, format!("Bearer {access}"))
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app
        .ledger
        .find_active_by_subject(app.user_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn healthz_is_public() {
    let app = test_app();
    let request = Request::builder()
        .uri("/healthz")
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
}
