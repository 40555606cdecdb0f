//! Rate limiting for action endpoints
//!
//! Two mechanisms live here:
//! - Sliding windows recomputed from the action log on every request
//!   (per IP and per user). Pure functions of the history and `now`.
//! - A per-user token bucket kept in memory for the bonus pings, which are
//!   not recorded in the action log.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::{RateLimits, WindowLimit};
use crate::models::ActionRecord;
use crate::services::error::Rejection;

/// Parse an IP that is subject to network limits.
/// Absent, unparsable and loopback addresses are exempt.
pub fn limitable_ip(ip: Option<&str>) -> Option<IpAddr> {
    let ip = ip?.trim().parse::<IpAddr>().ok()?.to_canonical();
    (!ip.is_loopback()).then_some(ip)
}

/// Check the network and per-user windows. First failing rule wins.
pub fn check_rate_limit(
    ip: Option<&str>,
    ip_history: &[ActionRecord],
    user_id: i64,
    user_history: &[ActionRecord],
    limits: &RateLimits,
    now: DateTime<Utc>,
) -> Result<(), Rejection> {
    if let Some(ip) = limitable_ip(ip) {
        let from_ip =
            |record: &&ActionRecord| limitable_ip(record.ip_address.as_deref()) == Some(ip);

        if count_in_window(ip_history.iter().filter(from_ip), limits.ip_window, now)
            >= limits.ip_window.max_actions
        {
            return Err(Rejection::new("too many actions from this network")
                .with_cooldown(limits.ip_window_cooldown_ms));
        }

        if count_in_window(ip_history.iter().filter(from_ip), limits.ip_burst, now)
            >= limits.ip_burst.max_actions
        {
            return Err(
                Rejection::new("actions too frequent").with_cooldown(limits.ip_burst_cooldown_ms)
            );
        }
    }

    let window_start = now - limits.per_user.window;
    let mut in_window: Vec<DateTime<Utc>> = user_history
        .iter()
        .filter(|record| record.user_id == user_id && record.created_at >= window_start)
        .map(|record| record.created_at)
        .collect();

    if in_window.len() >= limits.per_user.max_actions {
        // The window frees up once enough of the oldest entries age out
        in_window.sort_unstable();
        let excess = in_window.len() - limits.per_user.max_actions;
        let remaining = match in_window.get(excess) {
            Some(oldest) => *oldest + limits.per_user.window - now,
            // A zero limit never frees up; report a whole window
            None => limits.per_user.window,
        };
        return Err(Rejection::new("too many actions").with_cooldown(remaining.num_milliseconds()));
    }

    Ok(())
}

fn count_in_window<'a>(
    records: impl Iterator<Item = &'a ActionRecord>,
    limit: WindowLimit,
    now: DateTime<Utc>,
) -> usize {
    let window_start = now - limit.window;
    records
        .filter(|record| record.created_at >= window_start)
        .count()
}

/// Token bucket configuration
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Maximum tokens (burst capacity)
    pub max_tokens: u32,
    /// Tokens added per second
    pub refill_rate: f64,
}

struct UserBucket {
    tokens: f64,
    last_update: Instant,
}

/// Per-user token bucket for the fail-open bonus endpoints
pub struct PingRateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<i64, UserBucket>>,
}

impl PingRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true if the ping is allowed, false if rate limited.
    pub fn check(&self, user_id: i64) -> bool {
        self.check_at(user_id, Instant::now())
    }

    fn check_at(&self, user_id: i64, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());

        let bucket = buckets.entry(user_id).or_insert_with(|| UserBucket {
            tokens: self.config.max_tokens as f64,
            last_update: now,
        });

        // Refill tokens based on time elapsed
        let elapsed = now.saturating_duration_since(bucket.last_update);
        let refill = elapsed.as_secs_f64() * self.config.refill_rate;
        bucket.tokens = (bucket.tokens + refill).min(self.config.max_tokens as f64);
        bucket.last_update = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets of users who haven't pinged in a while
    pub fn cleanup(&self, max_age: Duration) {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_update) < max_age);
    }

    pub fn tracked_users(&self) -> usize {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
