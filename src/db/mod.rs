pub mod credentials;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::models::auth::Credential;

pub use credentials::{InMemoryCredentialStore, PgCredentialStore};

/// Read-only view of the record store holding user credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find(&self, username: &str) -> anyhow::Result<Option<Credential>>;

    /// Liveness probe used by the health endpoint.
    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run the migrations embedded in ./migrations/
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
