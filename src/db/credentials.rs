use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::PgPool;

use super::CredentialStore;
use crate::models::auth::Credential;

/// Credentials backed by the `users` table.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a user with an already-hashed password. Used by the `create-user` tool.
    pub async fn insert(&self, username: &str, email: Option<&str>, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO users (username, email, hashed_password) VALUES ($1, $2, $3)")
            .bind(username)
            .bind(email)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find(&self, username: &str) -> anyhow::Result<Option<Credential>> {
        let credential = sqlx::query_as::<_, Credential>(
            "SELECT username, hashed_password AS password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(credential)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Process-local store for tests and local runs without a database.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<String, String>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, username: &str, password_hash: &str) {
        self.users
            .write()
            .insert(username.to_string(), password_hash.to_string());
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find(&self, username: &str) -> anyhow::Result<Option<Credential>> {
        Ok(self.users.read().get(username).map(|hash| Credential {
            username: username.to_string(),
            password_hash: hash.clone(),
        }))
    }
}
