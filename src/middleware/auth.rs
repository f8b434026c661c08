use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::{
    error::AuthError,
    models::auth::{AuthenticatedUser, Token},
    AppState,
};

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::InvalidToken)?;

        let token = bearer_token(auth_header)?;

        // Refresh tokens are not valid credentials for protected resources.
        match state.auth.codec().verify_token(token)? {
            Token::Access(claims) => Ok(AuthenticatedUser { username: claims.sub }),
            Token::Refresh(_) => Err(AuthError::WrongTokenType),
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
/// The scheme is matched case-insensitively.
pub fn bearer_token(header_value: &str) -> Result<&str, AuthError> {
    let (scheme, token) = header_value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::InvalidToken)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() || token.contains(' ') {
        return Err(AuthError::InvalidToken);
    }
    Ok(token)
}
