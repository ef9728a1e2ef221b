//! JSON cache over the shared Redis client.
//!
//! Every operation swallows Redis failures after logging: reads degrade
//! to a miss, writes and invalidations to a no-op. Correctness never
//! depends on a cache write landing; it depends on invalidation running
//! after the owning transaction commits, which callers are responsible
//! for sequencing.

use fred::prelude::*;
use fred::types::scan::Scanner;
use futures::stream::TryStreamExt;
use serde::{Serialize, de::DeserializeOwned};

#[derive(Clone)]
pub struct Cache {
    client: Client,
}

impl Cache {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn ping(&self) -> bool {
        let result: Result<String, fred::error::Error> = self.client.ping(None).await;
        result.is_ok()
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw: Option<String> = match self.client.get(key).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };
        let raw = raw?;
        match serde_json::from_str(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key, error = %e, "cache payload failed to decode, treating as miss");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: i64) {
        let payload = match serde_json::to_string(value) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache payload failed to encode, skipping write");
                return;
            }
        };
        let result: Result<(), fred::error::Error> = self
            .client
            .set(key, payload, Some(fred::types::Expiration::EX(ttl_secs)), None, false)
            .await;
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "cache write failed");
        }
    }

    pub async fn delete(&self, key: &str) {
        let result: Result<i64, fred::error::Error> = self.client.del(key).await;
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "cache delete failed");
        }
    }

    /// SCAN + DEL every key matching the pattern. Non-blocking cursor
    /// iteration; a failure partway leaves the remaining keys to expire
    /// by TTL.
    pub async fn invalidate_pattern(&self, pattern: &str) {
        let mut scanner = self.client.scan(pattern, Some(100), None);
        loop {
            match scanner.try_next().await {
                Ok(Some(mut page)) => {
                    if let Some(keys) = page.take_results() {
                        if !keys.is_empty() {
                            let result: Result<i64, fred::error::Error> = self.client.del(keys).await;
                            if let Err(e) = result {
                                tracing::warn!(pattern, error = %e, "cache pattern delete failed");
                                return;
                            }
                        }
                    }
                    page.next();
                }
                Ok(None) => return,
                Err(e) => {
                    tracing::warn!(pattern, error = %e, "cache scan failed");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A client that was never connected: every operation must degrade
    /// rather than error or hang.
    #[tokio::test]
    async fn test_disconnected_cache_degrades_to_miss() {
        let client = crate::connect_lazy("redis://127.0.0.1:1").unwrap();
        let cache = Cache::new(client);

        assert!(!cache.ping().await);
        let miss: Option<String> = cache.get_json("client:detail:x").await;
        assert!(miss.is_none());
        // Writes and invalidations are silent no-ops.
        cache.set_json("client:detail:x", &"value", 300).await;
        cache.delete("client:detail:x").await;
        cache.invalidate_pattern("clients:list:*").await;
    }
}
