use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Deserialize;
use tracing::debug;

use crate::{
    config::Config,
    error::AuthError,
    models::auth::{AccessClaims, RefreshClaims, Token, REFRESH_TOKEN_TYPE},
};

/// Claims as they come off the wire, before any requirement is checked.
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<String>,
    exp: Option<i64>,
    #[serde(rename = "type")]
    token_type: Option<String>,
}

/// Signs and verifies access and refresh tokens with one process-wide key.
#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: &str, algorithm: Algorithm, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.jwt_secret,
            config.jwt_algorithm,
            Duration::minutes(config.access_token_expire_minutes),
            Duration::days(config.refresh_token_expire_days),
        )
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn create_access_token(&self, subject: &str) -> Result<String, AuthError> {
        self.create_access_token_at(subject, Utc::now())
    }

    pub fn create_access_token_at(&self, subject: &str, issued_at: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = AccessClaims {
            sub: subject.to_string(),
            exp: expiry(issued_at, self.access_ttl)?,
        };
        self.sign(&claims)
    }

    pub fn create_refresh_token(&self, subject: &str) -> Result<String, AuthError> {
        self.create_refresh_token_at(subject, Utc::now())
    }

    pub fn create_refresh_token_at(&self, subject: &str, issued_at: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = RefreshClaims::new(subject.to_string(), expiry(issued_at, self.refresh_ttl)?);
        self.sign(&claims)
    }

    fn sign<T: serde::Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        let token = encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .context("Failed to sign token")?;
        Ok(token)
    }

    pub fn verify_token(&self, token: &str) -> Result<Token, AuthError> {
        self.verify_token_at(token, Utc::now())
    }

    /// Check signature, required claims and expiry, then tag the token by kind.
    pub fn verify_token_at(&self, token: &str, now: DateTime<Utc>) -> Result<Token, AuthError> {
        // Expiry is checked by hand below: a token is already expired at `exp == now`.
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        let raw = decode::<RawClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                debug!("Token rejected: {}", e);
                AuthError::InvalidToken
            })?
            .claims;

        let sub = raw
            .sub
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::InvalidToken)?;
        let exp = raw.exp.ok_or(AuthError::InvalidToken)?;

        if exp <= now.timestamp() {
            return Err(AuthError::ExpiredToken);
        }

        match raw.token_type.as_deref() {
            None => Ok(Token::Access(AccessClaims { sub, exp })),
            Some(REFRESH_TOKEN_TYPE) => Ok(Token::Refresh(RefreshClaims::new(sub, exp))),
            Some(other) => {
                debug!("Token rejected: unknown type {:?}", other);
                Err(AuthError::WrongTokenType)
            }
        }
    }

    /// Verify a refresh token and return its subject.
    pub fn verify_refresh_token(&self, token: &str) -> Result<String, AuthError> {
        match self.verify_token(token)? {
            Token::Refresh(claims) => Ok(claims.sub),
            Token::Access(_) => Err(AuthError::WrongTokenType),
        }
    }
}

fn expiry(issued_at: DateTime<Utc>, ttl: Duration) -> Result<i64, AuthError> {
    let exp = issued_at
        .checked_add_signed(ttl)
        .ok_or_else(|| anyhow::anyhow!("Token lifetime {} overflows the clock", ttl))?;
    Ok(exp.timestamp())
}
