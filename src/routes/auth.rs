use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::AuthError,
    middleware::client::ClientKey,
    models::auth::{AuthenticatedUser, LoginRequest, TokenResponse},
    AppState,
};

pub const REFRESH_COOKIE: &str = "refresh_token";

/// Extract a named cookie value from request headers.
fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|part| part.trim().strip_prefix(&prefix).map(str::to_string))
}

/// `Set-Cookie` value for the refresh token. Logout sends the same attributes
/// with an empty value and `Max-Age=0`.
fn refresh_cookie(value: &str, max_age_secs: i64, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!("{REFRESH_COOKIE}={value}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_secs}{secure}")
}

pub async fn login(
    State(state): State<AppState>,
    ClientKey(client): ClientKey,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, AuthError> {
    // Malformed bodies still count against the client's login budget.
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            state.auth.login_limiter().enforce(&client)?;
            return Ok(rejection.into_response());
        }
    };

    let tokens = state
        .auth
        .login(&client, &body.username, &body.password)
        .await?;

    let cookie = refresh_cookie(
        &tokens.refresh_token,
        state.auth.codec().refresh_ttl().num_seconds(),
        state.config.is_production(),
    );

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(TokenResponse::bearer(tokens.access_token)),
    )
        .into_response())
}

pub async fn refresh_token(
    State(state): State<AppState>,
    ClientKey(client): ClientKey,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AuthError> {
    let cookie = get_cookie(&headers, REFRESH_COOKIE);
    let access_token = state.auth.refresh(&client, cookie.as_deref())?;
    Ok(Json(TokenResponse::bearer(access_token)))
}

/// Only the client's cookie is cleared; the refresh token itself stays valid
/// until it expires.
pub async fn logout(State(state): State<AppState>) -> Response {
    let cookie = refresh_cookie("", 0, state.config.is_production());
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "message": "Logged out" })),
    )
        .into_response()
}

pub async fn me(user: AuthenticatedUser) -> Json<Value> {
    Json(json!({ "username": user.username }))
}
