//! Fixed-window rate limiting keyed `ratelimit:<endpoint>:<ip>`.
//!
//! The first increment in a window sets the TTL; the window resets when
//! the key expires. The limiter is advisory: when Redis is unreachable the
//! request is admitted and a warning logged (never fail-closed for
//! authentication availability).

use fred::prelude::{Client, KeysInterface};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub endpoint: &'static str,
    pub limit: u32,
    pub window_secs: i64,
}

impl RatePolicy {
    pub const REGISTER: RatePolicy =
        RatePolicy { endpoint: "register", limit: 5, window_secs: 3_600 };
    pub const LOGIN: RatePolicy = RatePolicy { endpoint: "login", limit: 10, window_secs: 3_600 };
    /// Generic ceiling for the remaining auth endpoints.
    pub const AUTH: RatePolicy = RatePolicy { endpoint: "auth", limit: 60, window_secs: 60 };
}

/// Outcome advertised to the client via `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the window resets; also the `retry_after` value when
    /// the request is rejected.
    pub reset_secs: i64,
}

fn decide(policy: &RatePolicy, count: i64, ttl_secs: i64) -> RateDecision {
    let allowed = count <= policy.limit as i64;
    let remaining = (policy.limit as i64 - count).max(0) as u32;
    // A missing TTL (-1/-2) means the key just expired or the EXPIRE was
    // lost; report a full window rather than zero.
    let reset_secs = if ttl_secs > 0 { ttl_secs } else { policy.window_secs };
    RateDecision { allowed, limit: policy.limit, remaining, reset_secs }
}

#[derive(Clone)]
pub struct RateLimiter {
    client: Client,
}

impl RateLimiter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn key(policy: &RatePolicy, ip: &str) -> String {
        format!("ratelimit:{}:{}", policy.endpoint, ip)
    }

    /// Count this request against the window. `None` means Redis was
    /// unreachable and the caller must admit the request.
    pub async fn check(&self, policy: &RatePolicy, ip: &str) -> Option<RateDecision> {
        let key = Self::key(policy, ip);

        let count: i64 = match self.client.incr(&key).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(endpoint = policy.endpoint, error = %e, "rate limiter unavailable, admitting request");
                return None;
            }
        };

        if count == 1 {
            let result: Result<(), _> =
                self.client.expire(&key, policy.window_secs, None).await;
            if let Err(e) = result {
                tracing::warn!(endpoint = policy.endpoint, error = %e, "failed to set rate limit window TTL");
            }
        }

        let ttl: i64 = self.client.ttl(&key).await.unwrap_or(-1);
        Some(decide(policy, count, ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_math_under_and_over_limit() {
        let policy = RatePolicy::LOGIN;

        let first = decide(&policy, 1, 3_600);
        assert!(first.allowed);
        assert_eq!(first.remaining, 9);

        let at_limit = decide(&policy, 10, 120);
        assert!(at_limit.allowed);
        assert_eq!(at_limit.remaining, 0);

        let over = decide(&policy, 11, 120);
        assert!(!over.allowed);
        assert_eq!(over.remaining, 0);
        assert_eq!(over.reset_secs, 120);
    }

    #[test]
    fn test_missing_ttl_reports_full_window() {
        let decision = decide(&RatePolicy::REGISTER, 3, -1);
        assert_eq!(decision.reset_secs, RatePolicy::REGISTER.window_secs);
    }

    #[test]
    fn test_key_is_scoped_per_endpoint_and_ip() {
        assert_eq!(
            RateLimiter::key(&RatePolicy::LOGIN, "192.0.2.1"),
            "ratelimit:login:192.0.2.1"
        );
        assert_ne!(
            RateLimiter::key(&RatePolicy::LOGIN, "192.0.2.1"),
            RateLimiter::key(&RatePolicy::REGISTER, "192.0.2.1")
        );
    }

    #[tokio::test]
    async fn test_disconnected_limiter_admits() {
        let limiter = RateLimiter::new(crate::connect_lazy("redis://127.0.0.1:1").unwrap());
        assert!(limiter.check(&RatePolicy::LOGIN, "192.0.2.1").await.is_none());
    }
}
