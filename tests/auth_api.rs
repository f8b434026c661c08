use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use jsonwebtoken::Algorithm;
use serde_json::{json, Value};
use tower::ServiceExt;

use async_trait::async_trait;
use planner_auth::{
    build_router,
    config::Config,
    db::{CredentialStore, InMemoryCredentialStore},
    middleware::rate_limit::RateLimitPolicy,
    models::auth::{Credential, Token},
    AppState,
};

const USERNAME: &str = "testuser";
const PASSWORD: &str = "testpassword123";

fn test_config() -> Config {
    Config {
        database_url: String::new(),
        jwt_secret: "test_secret_key_for_testing_only_12345678901234567890".into(),
        jwt_algorithm: Algorithm::HS256,
        access_token_expire_minutes: 30,
        refresh_token_expire_days: 7,
        environment: "testing".into(),
        host: "127.0.0.1".into(),
        port: 0,
        cors_allowed_origins: vec!["http://localhost:3000".into()],
        bcrypt_cost: 4,
        hash_workers: 2,
        login_rate_limit: RateLimitPolicy::LOGIN,
        refresh_rate_limit: RateLimitPolicy::REFRESH,
        trust_proxy_headers: false,
    }
}

struct TestApp {
    router: Router,
    state: AppState,
}

impl TestApp {
    fn new(config: Config) -> Self {
        let store = InMemoryCredentialStore::new();
        store.insert(USERNAME, &bcrypt::hash(PASSWORD, 4).unwrap());

        let state = AppState::new(Arc::new(config), Arc::new(store)).unwrap();
        let router = build_router(state.clone())
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
        Self { router, state }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn login(&self, username: &str, password: &str) -> Response {
        self.send(login_request(username, password)).await
    }

    async fn refresh(&self, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().method("POST").uri("/api/refresh");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }
}

fn login_request(username: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "username": username, "password": password }).to_string(),
        ))
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn set_cookie(response: &Response) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .expect("Set-Cookie header")
        .to_str()
        .unwrap()
        .to_string()
}

/// `refresh_token=<value>` pair out of a `Set-Cookie` header.
fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().trim().to_string()
}

#[tokio::test]
async fn test_login_success_sets_refresh_cookie() {
    let app = TestApp::new(test_config());

    let response = app.login(USERNAME, PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = set_cookie(&response);
    assert!(cookie.starts_with("refresh_token="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Max-Age=604800"));
    assert!(!cookie.contains("Secure"));

    let body = json_body(response).await;
    assert_eq!(body["token_type"], "bearer");
    let access = body["access_token"].as_str().unwrap();
    let token = app.state.auth.codec().verify_token(access).unwrap();
    assert!(matches!(token, Token::Access(_)));
    assert_eq!(token.subject(), USERNAME);
}

#[tokio::test]
async fn test_production_cookie_is_secure() {
    let mut config = test_config();
    config.environment = "production".into();
    let app = TestApp::new(config);

    let response = app.login(USERNAME, PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response).contains("Secure"));
}

#[tokio::test]
async fn test_login_failures_share_one_message() {
    let app = TestApp::new(test_config());

    let wrong_password = app.login(USERNAME, "wrongpassword").await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert!(wrong_password.headers().get(header::SET_COOKIE).is_none());
    let wrong_password = json_body(wrong_password).await;

    let unknown_user = app.login("nonexistent", "wrongpassword").await;
    assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);
    let unknown_user = json_body(unknown_user).await;

    assert_eq!(wrong_password, unknown_user);
    assert_eq!(wrong_password["detail"], "Incorrect username or password");
}

#[tokio::test]
async fn test_login_timing_does_not_reveal_user_existence() {
    let app = TestApp::new(test_config());
    let trials = 5;

    let mut existing = Duration::ZERO;
    let mut missing = Duration::ZERO;
    for _ in 0..trials {
        let start = Instant::now();
        let response = app.login(USERNAME, "wrongpassword").await;
        existing += start.elapsed();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let start = Instant::now();
        let response = app.login("nonexistent", "wrongpassword").await;
        missing += start.elapsed();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let existing = existing / trials;
    let missing = missing / trials;
    let diff = if existing > missing { existing - missing } else { missing - existing };
    assert!(diff < Duration::from_millis(100), "timing gap too large: {diff:?}");
}

#[tokio::test]
async fn test_eleventh_login_in_a_minute_is_throttled() {
    let app = TestApp::new(test_config());

    for _ in 0..10 {
        let response = app.login(USERNAME, "wrongpassword").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // Correct credentials do not help once the window is exhausted.
    let response = app.login(USERNAME, PASSWORD).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "60");
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let body = json_body(response).await;
    assert_eq!(body["retry_after_seconds"], 60);
    assert_eq!(body["error"], "Too many requests");
    assert!(body["message"].as_str().unwrap().contains("minute"));
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_malformed_login_bodies_count_against_the_limit() {
    let app = TestApp::new(test_config());

    for _ in 0..10 {
        let request = Request::builder()
            .method("POST")
            .uri("/api/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"username\": 42"))
            .unwrap();
        assert!(app.send(request).await.status().is_client_error());
    }

    let response = app.login(USERNAME, PASSWORD).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_forwarded_clients_are_limited_separately() {
    let mut config = test_config();
    config.trust_proxy_headers = true;
    let app = TestApp::new(config);

    let from = |ip: &'static str| {
        let mut request = login_request(USERNAME, "wrongpassword");
        request
            .headers_mut()
            .insert("X-Forwarded-For", ip.parse().unwrap());
        request
    };

    for _ in 0..10 {
        assert_eq!(app.send(from("203.0.113.1")).await.status(), StatusCode::UNAUTHORIZED);
    }
    assert_eq!(app.send(from("203.0.113.1")).await.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(app.send(from("203.0.113.2")).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_then_refresh_issues_access_token_for_same_subject() {
    let app = TestApp::new(test_config());

    let login = app.login(USERNAME, PASSWORD).await;
    assert_eq!(login.status(), StatusCode::OK);
    let cookie = cookie_pair(&set_cookie(&login));

    let response = app.refresh(Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    // Not rotated: refresh never sets a new cookie.
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let body = json_body(response).await;
    assert_eq!(body["token_type"], "bearer");
    let token = app
        .state
        .auth
        .codec()
        .verify_token(body["access_token"].as_str().unwrap())
        .unwrap();
    assert!(matches!(token, Token::Access(_)));
    assert_eq!(token.subject(), USERNAME);
}

#[tokio::test]
async fn test_refresh_without_cookie() {
    let app = TestApp::new(test_config());

    let response = app.refresh(None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(response).await["detail"],
        "No authentication token provided"
    );
}

#[tokio::test]
async fn test_refresh_rejects_access_token_and_garbage() {
    let app = TestApp::new(test_config());

    let login = json_body(app.login(USERNAME, PASSWORD).await).await;
    let access = login["access_token"].as_str().unwrap();

    let response = app.refresh(Some(&format!("refresh_token={access}"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["detail"], "Invalid token type");

    let response = app.refresh(Some("refresh_token=not.a.token")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["detail"], "Invalid token");
}

#[tokio::test]
async fn test_refresh_rejects_expired_token() {
    let app = TestApp::new(test_config());
    let expired = app
        .state
        .auth
        .codec()
        .create_refresh_token_at(USERNAME, chrono::Utc::now() - chrono::Duration::days(8))
        .unwrap();

    let response = app.refresh(Some(&format!("refresh_token={expired}"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["detail"], "Token has expired");
}

#[tokio::test]
async fn test_thirty_first_refresh_in_a_minute_is_throttled() {
    let app = TestApp::new(test_config());

    let login = app.login(USERNAME, PASSWORD).await;
    let cookie = cookie_pair(&set_cookie(&login));

    for _ in 0..30 {
        assert_eq!(app.refresh(Some(&cookie)).await.status(), StatusCode::OK);
    }

    // A valid cookie does not bypass the limit.
    let response = app.refresh(Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "60");

    let body = json_body(response).await;
    assert_eq!(body["retry_after_seconds"], 60);
    assert!(body["access_token"].is_null());

    // The login limiter is a separate budget.
    assert_eq!(app.login(USERNAME, PASSWORD).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_clears_cookie() {
    let app = TestApp::new(test_config());

    let request = Request::builder()
        .method("POST")
        .uri("/api/logout")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = set_cookie(&response);
    assert!(cookie.starts_with("refresh_token=;"));
    assert!(cookie.contains("Max-Age=0"));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert_eq!(json_body(response).await["message"], "Logged out");
}

#[tokio::test]
async fn test_me_accepts_only_access_tokens() {
    let app = TestApp::new(test_config());

    let login = app.login(USERNAME, PASSWORD).await;
    let refresh = cookie_pair(&set_cookie(&login));
    let refresh = refresh.trim_start_matches("refresh_token=").to_string();
    let access = json_body(login).await["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    let me = |token: Option<String>| {
        let mut builder = Request::builder().uri("/api/me");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    };

    let response = app.send(me(Some(access))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["username"], USERNAME);

    let response = app.send(me(Some(refresh))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");

    let response = app.send(me(None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.send(me(Some("invalid_token_here".into()))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = TestApp::new(test_config());

    let response = app
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");

    app.login(USERNAME, PASSWORD).await;
    let response = app
        .send(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("auth_logins_total"));
}

struct UnreachableStore;

#[async_trait]
impl CredentialStore for UnreachableStore {
    async fn find(&self, _username: &str) -> anyhow::Result<Option<Credential>> {
        anyhow::bail!("connection to db.internal:5432 refused")
    }

    async fn ping(&self) -> anyhow::Result<()> {
        anyhow::bail!("connection to db.internal:5432 refused")
    }
}

#[tokio::test]
async fn test_health_hides_store_error_details() {
    let state = AppState::new(Arc::new(test_config()), Arc::new(UnreachableStore)).unwrap();
    let router = build_router(state);

    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = json_body(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["store"], "unavailable");
    assert!(!body.to_string().contains("db.internal"));
}
