use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

use crate::error::AuthError;

lazy_static! {
    // ── Event counters (increment on each event) ────────────────────────────
    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "auth_logins_total",
        "Login attempts by outcome",
        &["status"]
    ).unwrap();

    pub static ref REFRESHES_COUNTER: CounterVec = register_counter_vec!(
        "auth_refreshes_total",
        "Access token refresh attempts by outcome",
        &["status"]
    ).unwrap();

    pub static ref RATE_LIMIT_DENIALS_COUNTER: CounterVec = register_counter_vec!(
        "auth_rate_limit_denials_total",
        "Requests rejected by a rate limiter, by limiter and window",
        &["limiter", "tier"]
    ).unwrap();
}

/// Stable label for an outcome, used by the login and refresh counters.
pub fn outcome_label<T>(result: &Result<T, AuthError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(AuthError::InvalidCredentials) => "invalid_credentials",
        Err(AuthError::MissingToken) => "missing_token",
        Err(AuthError::InvalidToken) => "invalid_token",
        Err(AuthError::ExpiredToken) => "expired_token",
        Err(AuthError::WrongTokenType) => "wrong_token_type",
        Err(AuthError::RateLimitExceeded { .. }) => "rate_limited",
        Err(AuthError::Internal(_)) => "error",
    }
}
