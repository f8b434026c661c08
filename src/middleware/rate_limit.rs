use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::services::metrics::RATE_LIMIT_DENIALS_COUNTER;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateTier {
    Minute,
    Hour,
    Day,
}

impl RateTier {
    /// Evaluation order; the first violated tier is the one reported.
    pub const ALL: [RateTier; 3] = [RateTier::Minute, RateTier::Hour, RateTier::Day];

    pub fn window_seconds(self) -> u64 {
        match self {
            RateTier::Minute => 60,
            RateTier::Hour => 3_600,
            RateTier::Day => 86_400,
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            RateTier::Minute => "Too many requests this minute. Please wait a minute and try again.",
            RateTier::Hour => "Too many requests this hour. Please try again later.",
            RateTier::Day => "Daily request limit reached. Please try again tomorrow.",
        }
    }

    fn index(self) -> usize {
        match self {
            RateTier::Minute => 0,
            RateTier::Hour => 1,
            RateTier::Day => 2,
        }
    }
}

impl fmt::Display for RateTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RateTier::Minute => "minute",
            RateTier::Hour => "hour",
            RateTier::Day => "day",
        };
        write!(f, "{s}")
    }
}

/// Per-client thresholds for each tier. A tier is violated once its count
/// exceeds the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub per_minute: u64,
    pub per_hour: u64,
    pub per_day: u64,
}

impl RateLimitPolicy {
    pub const LOGIN: RateLimitPolicy = RateLimitPolicy {
        per_minute: 10,
        per_hour: 30,
        per_day: 100,
    };

    pub const REFRESH: RateLimitPolicy = RateLimitPolicy {
        per_minute: 30,
        per_hour: 200,
        per_day: 1000,
    };

    pub fn threshold(&self, tier: RateTier) -> u64 {
        match tier {
            RateTier::Minute => self.per_minute,
            RateTier::Hour => self.per_hour,
            RateTier::Day => self.per_day,
        }
    }
}

/// Parses `"minute/hour/day"`, e.g. `"10/30/100"`.
impl FromStr for RateLimitPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').map(str::trim).collect();
        let [minute, hour, day] = parts.as_slice() else {
            anyhow::bail!("Rate limit must look like \"minute/hour/day\", got {:?}", s);
        };
        Ok(Self {
            per_minute: minute.parse()?,
            per_hour: hour.parse()?,
            per_day: day.parse()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied {
        tier: RateTier,
        retry_after_seconds: u64,
    },
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    window_start: DateTime<Utc>,
    count: u64,
}

#[derive(Debug)]
struct ClientWindows {
    tiers: [WindowCounter; 3],
}

impl ClientWindows {
    fn new(now: DateTime<Utc>) -> Self {
        let fresh = WindowCounter {
            window_start: now,
            count: 0,
        };
        Self { tiers: [fresh; 3] }
    }

    /// Count one request against every tier and return the resulting counts.
    fn record(&mut self, now: DateTime<Utc>) -> [u64; 3] {
        let mut counts = [0; 3];
        for tier in RateTier::ALL {
            let counter = &mut self.tiers[tier.index()];
            // Window starts on first hit and resets once it has fully elapsed
            if elapsed_seconds(counter.window_start, now) >= tier.window_seconds() as i64 {
                counter.window_start = now;
                counter.count = 0;
            }
            counter.count += 1;
            counts[tier.index()] = counter.count;
        }
        counts
    }

    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        RateTier::ALL.iter().all(|tier| {
            elapsed_seconds(self.tiers[tier.index()].window_start, now)
                >= tier.window_seconds() as i64
        })
    }
}

fn elapsed_seconds(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - start).num_seconds()
}

/// Fixed-window limiter over minute, hour and day tiers, keyed by client.
///
/// Every call counts against all three tiers, including calls that end up
/// denied. A denied call never moves a window's start, so the minute tier
/// still resets on schedule, but each one adds to the hour and day counts.
/// Counts are never rolled back.
pub struct RateLimiter {
    name: &'static str,
    policy: RateLimitPolicy,
    clients: Mutex<HashMap<String, ClientWindows>>,
}

impl RateLimiter {
    pub fn new(name: &'static str, policy: RateLimitPolicy) -> Self {
        Self {
            name,
            policy,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    pub fn check(&self, client_key: &str) -> RateDecision {
        self.check_at(client_key, Utc::now())
    }

    pub fn check_at(&self, client_key: &str, now: DateTime<Utc>) -> RateDecision {
        let counts = {
            let mut clients = self.clients.lock();
            clients
                .entry(client_key.to_string())
                .or_insert_with(|| ClientWindows::new(now))
                .record(now)
        };

        for tier in RateTier::ALL {
            if counts[tier.index()] > self.policy.threshold(tier) {
                return RateDecision::Denied {
                    tier,
                    retry_after_seconds: tier.window_seconds(),
                };
            }
        }
        RateDecision::Allowed
    }

    /// Like [`check`](Self::check), but turns a denial into an [`AuthError`].
    pub fn enforce(&self, client_key: &str) -> Result<(), AuthError> {
        match self.check(client_key) {
            RateDecision::Allowed => Ok(()),
            RateDecision::Denied {
                tier,
                retry_after_seconds,
            } => {
                warn!(
                    limiter = self.name,
                    client = %client_key,
                    tier = %tier,
                    retry_after_secs = retry_after_seconds,
                    "Rate limit exceeded"
                );
                let tier_label = tier.to_string();
                RATE_LIMIT_DENIALS_COUNTER
                    .with_label_values(&[self.name, tier_label.as_str()])
                    .inc();
                Err(AuthError::RateLimitExceeded {
                    tier,
                    retry_after_seconds,
                })
            }
        }
    }

    /// Drop clients whose every window has elapsed. Returns how many were removed.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|_, windows| !windows.is_stale(now));
        before - clients.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().len()
    }
}

/// Spawn a background task that periodically prunes stale client entries.
pub fn start_pruning(limiter: Arc<RateLimiter>, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let removed = limiter.prune(Utc::now());
            if removed > 0 {
                debug!(limiter = limiter.name(), removed, "Pruned stale rate-limit entries");
            }
        }
    });
}
