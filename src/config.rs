use std::env;
use std::str::FromStr;

use jsonwebtoken::Algorithm;

use crate::middleware::rate_limit::RateLimitPolicy;

/// Longest accepted access-token lifetime: one day.
const MAX_ACCESS_TOKEN_MINUTES: i64 = 24 * 60;
/// Longest accepted refresh-token lifetime: one year.
const MAX_REFRESH_TOKEN_DAYS: i64 = 365;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_algorithm: Algorithm,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_days: i64,
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub bcrypt_cost: u32,
    pub hash_workers: usize,
    pub login_rate_limit: RateLimitPolicy,
    pub refresh_rate_limit: RateLimitPolicy,
    /// Key clients by the first `X-Forwarded-For` entry instead of the peer address.
    pub trust_proxy_headers: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let default_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_algorithm: parse_algorithm(
                &env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".into()),
            )?,
            access_token_expire_minutes: lifetime(
                "ACCESS_TOKEN_EXPIRE_MINUTES",
                &env::var("ACCESS_TOKEN_EXPIRE_MINUTES").unwrap_or_else(|_| "30".into()),
                MAX_ACCESS_TOKEN_MINUTES,
            )?,
            refresh_token_expire_days: lifetime(
                "REFRESH_TOKEN_EXPIRE_DAYS",
                &env::var("REFRESH_TOKEN_EXPIRE_DAYS").unwrap_or_else(|_| "7".into()),
                MAX_REFRESH_TOKEN_DAYS,
            )?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".into())
                .parse()?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            bcrypt_cost: env::var("BCRYPT_COST")
                .unwrap_or_else(|_| bcrypt::DEFAULT_COST.to_string())
                .parse()?,
            hash_workers: match env::var("HASH_WORKERS") {
                Ok(v) => v.parse()?,
                Err(_) => default_workers,
            },
            login_rate_limit: env::var("LOGIN_RATE_LIMIT")
                .unwrap_or_else(|_| "10/30/100".into())
                .parse()?,
            refresh_rate_limit: env::var("REFRESH_RATE_LIMIT")
                .unwrap_or_else(|_| "30/200/1000".into())
                .parse()?,
            trust_proxy_headers: env::var("TRUST_PROXY_HEADERS")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}

/// Token lifetimes must be positive and no longer than `max`.
fn lifetime(key: &str, value: &str, max: i64) -> anyhow::Result<i64> {
    let parsed: i64 = value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be an integer, got {:?}", key, value))?;
    if parsed <= 0 || parsed > max {
        anyhow::bail!("{} must be between 1 and {}, got {}", key, max, parsed);
    }
    Ok(parsed)
}

/// Only HMAC algorithms make sense with a shared secret.
pub fn parse_algorithm(name: &str) -> anyhow::Result<Algorithm> {
    let alg = Algorithm::from_str(name.trim())
        .map_err(|_| anyhow::anyhow!("Unknown JWT algorithm: {}", name))?;
    match alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(alg),
        other => anyhow::bail!("Unsupported JWT algorithm {:?}: only HS256/HS384/HS512", other),
    }
}
