use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use planner_auth::{
    build_router,
    config::Config,
    db::{self, CredentialStore, PgCredentialStore},
    middleware::rate_limit,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let config = Arc::new(config);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let store: Arc<dyn CredentialStore> = Arc::new(PgCredentialStore::new(pool));
    let state = AppState::new(config.clone(), store)?;
    info!(
        algorithm = ?config.jwt_algorithm,
        access_minutes = config.access_token_expire_minutes,
        refresh_days = config.refresh_token_expire_days,
        hash_workers = config.hash_workers,
        production = config.is_production(),
        "Auth service configured"
    );

    rate_limit::start_pruning(state.auth.login_limiter().clone(), Duration::from_secs(600));
    rate_limit::start_pruning(state.auth.refresh_limiter().clone(), Duration::from_secs(600));

    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Auth API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
