//! Access-token revocation list.
//!
//! Logout stores the raw access token under `blacklist:<token>` with a TTL
//! equal to the token's remaining life, so entries disappear exactly when
//! the token would have expired anyway. On Redis outage the check is
//! skipped and logged: availability of authentication wins over prompt
//! revocation, per the degradation policy.

use fred::prelude::{Client, KeysInterface};

#[derive(Clone)]
pub struct TokenBlacklist {
    client: Client,
}

impl TokenBlacklist {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn key(token: &str) -> String {
        format!("blacklist:{token}")
    }

    /// Revoke a token for `ttl_secs` (clamped to at least one second so a
    /// token at the edge of expiry is still rejected).
    pub async fn revoke(&self, token: &str, ttl_secs: i64) {
        let ttl = ttl_secs.max(1);
        let result: Result<(), fred::error::Error> = self
            .client
            .set(Self::key(token), "1", Some(fred::types::Expiration::EX(ttl)), None, false)
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "failed to blacklist access token");
        }
    }

    /// `true` when the token has been revoked. Degrades to `false` on
    /// Redis outage.
    pub async fn is_revoked(&self, token: &str) -> bool {
        match self.client.exists::<i64, _>(Self::key(token)).await {
            Ok(n) => n > 0,
            Err(e) => {
                tracing::error!(error = %e, "blacklist check failed, skipping");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shape() {
        assert_eq!(TokenBlacklist::key("abc.def.ghi"), "blacklist:abc.def.ghi");
    }

    #[tokio::test]
    async fn test_disconnected_blacklist_fails_open() {
        let blacklist = TokenBlacklist::new(crate::connect_lazy("redis://127.0.0.1:1").unwrap());
        blacklist.revoke("token", 60).await;
        assert!(!blacklist.is_revoked("token").await);
    }
}
