use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    error::AuthError,
    middleware::rate_limit::RateLimiter,
    services::{
        credentials::CredentialVerifier,
        metrics::{outcome_label, LOGINS_COUNTER, REFRESHES_COUNTER},
        token::TokenCodec,
    },
};

/// Tokens issued by a successful login.
#[derive(Debug)]
pub struct LoginTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Login and refresh flows. Holds no per-session state: logout only needs the
/// HTTP layer to clear the client's cookie.
pub struct AuthService {
    codec: TokenCodec,
    verifier: CredentialVerifier,
    login_limiter: Arc<RateLimiter>,
    refresh_limiter: Arc<RateLimiter>,
}

impl AuthService {
    pub fn new(
        codec: TokenCodec,
        verifier: CredentialVerifier,
        login_limiter: Arc<RateLimiter>,
        refresh_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            codec,
            verifier,
            login_limiter,
            refresh_limiter,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn login_limiter(&self) -> &Arc<RateLimiter> {
        &self.login_limiter
    }

    pub fn refresh_limiter(&self) -> &Arc<RateLimiter> {
        &self.refresh_limiter
    }

    /// Rate-limit, check credentials, then issue an access/refresh pair.
    ///
    /// The rate limit is checked first so that a throttled client never
    /// reaches the hash pool.
    pub async fn login(&self, client: &str, username: &str, password: &str) -> Result<LoginTokens, AuthError> {
        let result = self.try_login(client, username, password).await;
        LOGINS_COUNTER
            .with_label_values(&[outcome_label(&result)])
            .inc();
        result
    }

    async fn try_login(&self, client: &str, username: &str, password: &str) -> Result<LoginTokens, AuthError> {
        self.login_limiter.enforce(client)?;

        if !self.verifier.verify(username, password).await? {
            info!(username = %username, client = %client, "Login rejected: invalid credentials");
            return Err(AuthError::InvalidCredentials);
        }

        let access_token = self.codec.create_access_token(username)?;
        let refresh_token = self.codec.create_refresh_token(username)?;
        info!(username = %username, client = %client, "Login succeeded");

        Ok(LoginTokens {
            access_token,
            refresh_token,
        })
    }

    /// Mint a new access token from the refresh token presented by the client.
    /// The refresh token itself is not rotated.
    pub fn refresh(&self, client: &str, refresh_token: Option<&str>) -> Result<String, AuthError> {
        let result = self.try_refresh(client, refresh_token);
        REFRESHES_COUNTER
            .with_label_values(&[outcome_label(&result)])
            .inc();
        result
    }

    fn try_refresh(&self, client: &str, refresh_token: Option<&str>) -> Result<String, AuthError> {
        self.refresh_limiter.enforce(client)?;

        let token = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let subject = self.codec.verify_refresh_token(token).map_err(|e| {
            warn!(client = %client, "Refresh rejected: {}", e);
            e
        })?;

        self.codec.create_access_token(&subject)
    }
}
