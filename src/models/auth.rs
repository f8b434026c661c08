use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Value of the `type` claim carried by refresh tokens.
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Claims embedded in the JWT access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String, // username
    pub exp: i64,    // UTC epoch seconds
}

/// Claims embedded in the JWT refresh token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: String,
}

impl RefreshClaims {
    pub fn new(sub: String, exp: i64) -> Self {
        Self {
            sub,
            exp,
            token_type: REFRESH_TOKEN_TYPE.to_string(),
        }
    }
}

/// A verified token, tagged by kind as soon as it leaves the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Access(AccessClaims),
    Refresh(RefreshClaims),
}

impl Token {
    pub fn subject(&self) -> &str {
        match self {
            Token::Access(c) => &c.sub,
            Token::Refresh(c) => &c.sub,
        }
    }

    pub fn expires_at(&self) -> i64 {
        match self {
            Token::Access(c) => c.exp,
            Token::Refresh(c) => c.exp,
        }
    }
}

/// Credential row as read from the store. Never serialized.
#[derive(Debug, Clone, FromRow)]
pub struct Credential {
    pub username: String,
    pub password_hash: String,
}

/// Extracted from a validated access token, available via Axum extractors
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub username: String,
}

// Request/Response DTOs
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}
