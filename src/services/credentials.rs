use std::sync::Arc;

use anyhow::Context;
use rand::{distributions::Alphanumeric, Rng};
use tokio::sync::Semaphore;
use tracing::warn;

use crate::{db::CredentialStore, error::AuthError};

/// Bounded pool for bcrypt comparisons.
///
/// Work runs on tokio's blocking threads; the semaphore caps how many run at
/// once, so excess comparisons queue instead of starving the runtime.
#[derive(Clone)]
pub struct HashPool {
    permits: Arc<Semaphore>,
}

impl HashPool {
    pub fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Compare `password` against a bcrypt `hash` off the request thread.
    /// An unreadable hash counts as a mismatch.
    pub async fn verify(&self, password: String, hash: String) -> Result<bool, AuthError> {
        match self.compare(password, hash).await? {
            Ok(matches) => Ok(matches),
            Err(e) => {
                warn!("Stored password hash could not be checked: {}", e);
                Ok(false)
            }
        }
    }

    /// Run one comparison and hand back bcrypt's own verdict, including a
    /// rejected hash.
    async fn compare(&self, password: String, hash: String) -> Result<bcrypt::BcryptResult<bool>, AuthError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .context("Hash pool closed")?;

        let outcome = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            bcrypt::verify(password, &hash)
        })
        .await
        .context("Hash worker panicked")?;

        Ok(outcome)
    }
}

/// Checks a username/password pair while keeping "unknown user" and
/// "wrong password" indistinguishable by latency.
pub struct CredentialVerifier {
    store: Arc<dyn CredentialStore>,
    pool: HashPool,
    decoy_hash: String,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn CredentialStore>, pool: HashPool, decoy_hash: String) -> Self {
        Self {
            store,
            pool,
            decoy_hash,
        }
    }

    /// Build a verifier whose decoy hash is computed once, at `cost`, from a
    /// random password nobody knows. `cost` should match the stored hashes.
    pub fn with_random_decoy(store: Arc<dyn CredentialStore>, pool: HashPool, cost: u32) -> anyhow::Result<Self> {
        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let decoy_hash = bcrypt::hash(secret, cost).context("Failed to build decoy hash")?;
        Ok(Self::new(store, pool, decoy_hash))
    }

    pub async fn verify(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        let credential = self.store.find(username).await?;

        let Some(credential) = credential else {
            return self.reject_with_decoy(password).await;
        };

        match self
            .pool
            .compare(password.to_string(), credential.password_hash)
            .await?
        {
            Ok(matches) => Ok(matches),
            Err(e) => {
                // bcrypt bails out before hashing, so pay the full cost on the decoy.
                warn!(username = %username, "Stored password hash could not be checked: {}", e);
                self.reject_with_decoy(password).await
            }
        }
    }

    /// Same cost, same pool, result thrown away.
    async fn reject_with_decoy(&self, password: &str) -> Result<bool, AuthError> {
        let _ = self
            .pool
            .verify(password.to_string(), self.decoy_hash.clone())
            .await?;
        Ok(false)
    }
}
