pub mod auth;
pub mod credentials;
pub mod metrics;
pub mod token;
