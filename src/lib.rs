// Library exports for binary tools and tests
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use db::CredentialStore;
use middleware::rate_limit::RateLimiter;
use services::{
    auth::AuthService,
    credentials::{CredentialVerifier, HashPool},
    token::TokenCodec,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn CredentialStore>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Wire the codec, verifier and both limiters from configuration.
    /// Builds the decoy hash, so this takes one bcrypt round at the configured cost.
    pub fn new(config: Arc<Config>, store: Arc<dyn CredentialStore>) -> anyhow::Result<Self> {
        let codec = TokenCodec::from_config(&config);
        let verifier = CredentialVerifier::with_random_decoy(
            store.clone(),
            HashPool::new(config.hash_workers),
            config.bcrypt_cost,
        )?;
        let auth = AuthService::new(
            codec,
            verifier,
            Arc::new(RateLimiter::new("login", config.login_rate_limit)),
            Arc::new(RateLimiter::new("refresh", config.refresh_rate_limit)),
        );

        Ok(Self {
            config,
            store,
            auth: Arc::new(auth),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_allowed_origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    // Credentials must be allowed for the refresh cookie to reach the browser client.
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true);

    let api: Router<AppState> = Router::new()
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh_token))
        .route("/logout", post(routes::auth::logout))
        .route("/me", get(routes::auth::me));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
