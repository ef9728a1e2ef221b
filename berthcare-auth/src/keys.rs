//! RSA key set for token signing and verification.
//!
//! A key set is `{active_kid, kid -> key pair}`. Sources are tried in
//! precedence order: inline JSON configuration, a PEM pair from the
//! environment, then a managed secret store fetched once at init. Startup
//! fails if no source yields a usable active key.
//!
//! Signing always uses the active key and stamps its `kid` into the token
//! header. Verification tries the header `kid` first and falls back to
//! every known public key, so rotated-out keys keep validating tokens
//! they signed until those tokens expire.
//!
//! Keys are held in memory and refreshed only at init or via an explicit
//! [`KeyStore::reload_from_json`]; request paths read them lock-free in
//! practice (the lock is uncontended outside reloads).

use std::collections::HashMap;
use std::sync::RwLock;

use jsonwebtoken::{DecodingKey, EncodingKey};
use serde::Deserialize;
use thiserror::Error;

use berthcare_core::config::JwtConfig;

/// `kid` assigned when the key pair comes from the bare
/// `JWT_PRIVATE_KEY`/`JWT_PUBLIC_KEY` pair without an explicit `JWT_KEY_ID`.
const DEFAULT_KID: &str = "primary";

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("no usable signing key found in any configured source")]
    NoUsableKey,

    #[error("key '{kid}' has invalid PEM material: {reason}")]
    InvalidPem { kid: String, reason: String },

    #[error("key set document is malformed: {0}")]
    InvalidJson(String),

    #[error("active kid '{0}' is not present in the key set")]
    UnknownActiveKid(String),

    #[error("failed to fetch key set from secret store: {0}")]
    SecretFetch(String),
}

/// On-disk / in-secret JSON shape of a key set.
#[derive(Deserialize)]
struct KeySetDoc {
    active_kid: String,
    keys: HashMap<String, KeyPairDoc>,
}

#[derive(Deserialize)]
struct KeyPairDoc {
    private: String,
    public: String,
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

struct KeySet {
    active_kid: String,
    keys: HashMap<String, KeyPair>,
}

impl KeySet {
    fn from_doc(doc: KeySetDoc) -> Result<Self, KeyError> {
        if !doc.keys.contains_key(&doc.active_kid) {
            return Err(KeyError::UnknownActiveKid(doc.active_kid));
        }
        let mut keys = HashMap::with_capacity(doc.keys.len());
        for (kid, pair) in doc.keys {
            let encoding = EncodingKey::from_rsa_pem(pair.private.as_bytes()).map_err(|e| {
                KeyError::InvalidPem { kid: kid.clone(), reason: e.to_string() }
            })?;
            let decoding = DecodingKey::from_rsa_pem(pair.public.as_bytes()).map_err(|e| {
                KeyError::InvalidPem { kid: kid.clone(), reason: e.to_string() }
            })?;
            keys.insert(kid, KeyPair { encoding, decoding });
        }
        Ok(Self { active_kid: doc.active_kid, keys })
    }
}

pub struct KeyStore {
    inner: RwLock<KeySet>,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore").finish_non_exhaustive()
    }
}

impl KeyStore {
    /// Resolve key material from configuration, trying sources in
    /// precedence order. This is the only async constructor because the
    /// secret-store source performs a network fetch at init.
    pub async fn from_config(cfg: &JwtConfig) -> Result<Self, KeyError> {
        if let Some(json) = &cfg.inline_keys_json {
            return Self::from_json(json);
        }
        if let (Some(private), Some(public)) = (&cfg.private_key_pem, &cfg.public_key_pem) {
            let kid = cfg.key_id.as_deref().unwrap_or(DEFAULT_KID);
            return Self::from_pem_pair(kid, private, public);
        }
        if let Some(arn) = &cfg.secret_arn {
            let json = fetch_secret_string(arn).await?;
            return Self::from_json(&json);
        }
        Err(KeyError::NoUsableKey)
    }

    /// Build a store from a key set JSON document.
    pub fn from_json(json: &str) -> Result<Self, KeyError> {
        let doc: KeySetDoc =
            serde_json::from_str(json).map_err(|e| KeyError::InvalidJson(e.to_string()))?;
        let set = KeySet::from_doc(doc)?;
        tracing::info!(active_kid = %set.active_kid, keys = set.keys.len(), "JWT key set loaded");
        Ok(Self { inner: RwLock::new(set) })
    }

    /// Build a single-key store from a PEM pair.
    pub fn from_pem_pair(kid: &str, private_pem: &str, public_pem: &str) -> Result<Self, KeyError> {
        let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| KeyError::InvalidPem { kid: kid.to_string(), reason: e.to_string() })?;
        let decoding = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| KeyError::InvalidPem { kid: kid.to_string(), reason: e.to_string() })?;
        let mut keys = HashMap::new();
        keys.insert(kid.to_string(), KeyPair { encoding, decoding });
        tracing::info!(active_kid = kid, "JWT key pair loaded");
        Ok(Self { inner: RwLock::new(KeySet { active_kid: kid.to_string(), keys }) })
    }

    /// Replace the whole key set. Used for explicit rotation; in-flight
    /// verifications keep the candidates they already cloned.
    pub fn reload_from_json(&self, json: &str) -> Result<(), KeyError> {
        let doc: KeySetDoc =
            serde_json::from_str(json).map_err(|e| KeyError::InvalidJson(e.to_string()))?;
        let set = KeySet::from_doc(doc)?;
        let mut inner = self.inner.write().expect("key store lock poisoned");
        tracing::info!(
            old_kid = %inner.active_kid,
            new_kid = %set.active_kid,
            "JWT key set rotated"
        );
        *inner = set;
        Ok(())
    }

    pub fn active_kid(&self) -> String {
        self.inner.read().expect("key store lock poisoned").active_kid.clone()
    }

    /// The `(kid, key)` signing pair. Always the active key.
    pub fn signing_key(&self) -> (String, EncodingKey) {
        let inner = self.inner.read().expect("key store lock poisoned");
        let pair = &inner.keys[&inner.active_kid];
        (inner.active_kid.clone(), pair.encoding.clone())
    }

    /// Public keys to try for a token carrying the given header `kid`.
    /// A known `kid` narrows to one candidate; an unknown or absent `kid`
    /// falls back to every key in the set.
    pub fn decoding_candidates(&self, kid: Option<&str>) -> Vec<DecodingKey> {
        let inner = self.inner.read().expect("key store lock poisoned");
        if let Some(kid) = kid {
            if let Some(pair) = inner.keys.get(kid) {
                return vec![pair.decoding.clone()];
            }
            tracing::debug!(kid, "token kid not in key set, trying all known keys");
        }
        inner.keys.values().map(|p| p.decoding.clone()).collect()
    }
}

async fn fetch_secret_string(arn: &str) -> Result<String, KeyError> {
    let aws_cfg = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let client = aws_sdk_secretsmanager::Client::new(&aws_cfg);
    let out = client
        .get_secret_value()
        .secret_id(arn)
        .send()
        .await
        .map_err(|e| KeyError::SecretFetch(e.to_string()))?;
    out.secret_string()
        .map(|s| s.to_string())
        .ok_or_else(|| KeyError::SecretFetch("secret has no string payload".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkeys::{TEST_PRIVATE_KEY, TEST_PUBLIC_KEY};

    fn key_set_json(active: &str, kids: &[&str]) -> String {
        let keys: HashMap<&str, serde_json::Value> = kids
            .iter()
            .map(|kid| {
                (*kid, serde_json::json!({ "private": TEST_PRIVATE_KEY, "public": TEST_PUBLIC_KEY }))
            })
            .collect();
        serde_json::json!({ "active_kid": active, "keys": keys }).to_string()
    }

    #[test]
    fn test_inline_json_key_set_loads() {
        let store = KeyStore::from_json(&key_set_json("2024-06", &["2024-06", "2023-11"])).unwrap();
        assert_eq!(store.active_kid(), "2024-06");
        assert_eq!(store.decoding_candidates(Some("2023-11")).len(), 1);
        assert_eq!(store.decoding_candidates(Some("never-issued")).len(), 2);
        assert_eq!(store.decoding_candidates(None).len(), 2);
    }

    #[test]
    fn test_active_kid_must_exist() {
        let err = KeyStore::from_json(&key_set_json("missing", &["2024-06"])).unwrap_err();
        assert!(matches!(err, KeyError::UnknownActiveKid(_)));
    }

    #[test]
    fn test_invalid_pem_is_rejected() {
        let json = serde_json::json!({
            "active_kid": "a",
            "keys": { "a": { "private": "garbage", "public": "garbage" } }
        })
        .to_string();
        assert!(matches!(KeyStore::from_json(&json).unwrap_err(), KeyError::InvalidPem { .. }));
    }

    #[tokio::test]
    async fn test_config_precedence_env_pair_gets_default_kid() {
        let cfg = JwtConfig {
            private_key_pem: Some(TEST_PRIVATE_KEY.to_string()),
            public_key_pem: Some(TEST_PUBLIC_KEY.to_string()),
            ..Default::default()
        };
        let store = KeyStore::from_config(&cfg).await.unwrap();
        assert_eq!(store.active_kid(), DEFAULT_KID);
    }

    #[tokio::test]
    async fn test_no_source_fails_startup() {
        let err = KeyStore::from_config(&JwtConfig::default()).await.unwrap_err();
        assert!(matches!(err, KeyError::NoUsableKey));
    }

    #[test]
    fn test_reload_switches_active_kid() {
        let store = KeyStore::from_json(&key_set_json("old", &["old"])).unwrap();
        store.reload_from_json(&key_set_json("new", &["old", "new"])).unwrap();
        assert_eq!(store.active_kid(), "new");
        // Old key still available for verification fallback.
        assert_eq!(store.decoding_candidates(Some("old")).len(), 1);
    }
}
