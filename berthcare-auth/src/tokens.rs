//! Access and refresh token issuance and verification.
//!
//! Both token kinds are RS256-signed JWTs carrying the principal. The raw
//! refresh token is returned to the client exactly once; the server keeps
//! only its SHA-256 digest (see [`hash_refresh_token`]), so a database
//! leak does not yield usable refresh tokens.
//!
//! Refresh verification collapses every failure cause into the generic
//! invalid-token error to prevent token enumeration; the real cause is
//! traced internally.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, Header, Validation, decode, decode_header, encode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use berthcare_core::{ApiError, Result, Role};

use crate::keys::KeyStore;

pub const ISSUER: &str = "berthcare-api";
pub const AUDIENCE: &str = "berthcare-app";

pub const ACCESS_TOKEN_TTL: Duration = Duration::hours(1);
pub const REFRESH_TOKEN_TTL: Duration = Duration::days(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub sub: String,
    pub user_id: Uuid,
    pub role: Role,
    pub zone_id: Option<Uuid>,
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshClaims {
    pub sub: String,
    pub user_id: Uuid,
    pub role: Role,
    pub zone_id: Option<Uuid>,
    pub device_id: String,
    pub token_id: Uuid,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// The identity a token is minted for.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: Uuid,
    pub role: Role,
    pub zone_id: Option<Uuid>,
    pub device_id: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MintedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenService {
    keys: Arc<KeyStore>,
}

impl TokenService {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self { keys }
    }

    pub fn mint_access(&self, subject: &TokenSubject) -> Result<MintedToken> {
        let now = Utc::now();
        let expires_at = now + ACCESS_TOKEN_TTL;
        let claims = AccessClaims {
            sub: subject.user_id.to_string(),
            user_id: subject.user_id,
            role: subject.role,
            zone_id: subject.zone_id,
            device_id: subject.device_id.clone(),
            email: subject.email.clone(),
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        Ok(MintedToken { token: self.sign(&claims)?, expires_at })
    }

    /// Mint a refresh token. The returned `token_id` is embedded in the
    /// claims; it identifies the issuance but is not used for rotation
    /// (refresh tokens are not rotated on use).
    pub fn mint_refresh(&self, subject: &TokenSubject) -> Result<(MintedToken, Uuid)> {
        let now = Utc::now();
        let expires_at = now + REFRESH_TOKEN_TTL;
        let token_id = Uuid::new_v4();
        let claims = RefreshClaims {
            sub: subject.user_id.to_string(),
            user_id: subject.user_id,
            role: subject.role,
            zone_id: subject.zone_id,
            device_id: subject.device_id.clone(),
            token_id,
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        Ok((MintedToken { token: self.sign(&claims)?, expires_at }, token_id))
    }

    /// Verify an access token's signature, issuer, audience and expiry.
    /// Expiry is reported distinctly; every other failure is the generic
    /// invalid-token error.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims> {
        self.decode_claims(token).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => ApiError::TokenExpired,
            kind => {
                tracing::debug!(?kind, "access token rejected");
                ApiError::InvalidToken
            }
        })
    }

    /// Verify a refresh token. All failure causes, including expiry,
    /// collapse into the generic invalid-token error.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims> {
        self.decode_claims(token).map_err(|e| {
            tracing::debug!(kind = ?e.kind(), "refresh token rejected");
            ApiError::InvalidToken
        })
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String> {
        let (kid, key) = self.keys.signing_key();
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid);
        encode(&header, claims, &key)
            .map_err(|e| ApiError::internal(format!("token signing failed: {e}")))
    }

    fn decode_claims<T: DeserializeOwned>(
        &self,
        token: &str,
    ) -> std::result::Result<T, jsonwebtoken::errors::Error> {
        let header = decode_header(token)?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);

        let mut last_err: Option<jsonwebtoken::errors::Error> = None;
        for key in self.keys.decoding_candidates(header.kid.as_deref()) {
            match decode::<T>(token, &key, &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            jsonwebtoken::errors::ErrorKind::InvalidToken.into()
        }))
    }
}

/// SHA-256 digest of a raw refresh token, hex-encoded. This is the only
/// form the server persists.
pub fn hash_refresh_token(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkeys::{TEST_PRIVATE_KEY, TEST_PUBLIC_KEY};

    fn service() -> TokenService {
        let store = KeyStore::from_pem_pair("2024-06", TEST_PRIVATE_KEY, TEST_PUBLIC_KEY).unwrap();
        TokenService::new(Arc::new(store))
    }

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: Uuid::new_v4(),
            role: Role::Caregiver,
            zone_id: Some(Uuid::new_v4()),
            device_id: "iphone-1".to_string(),
            email: Some("caregiver@example.com".to_string()),
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let svc = service();
        let sub = subject();
        let minted = svc.mint_access(&sub).unwrap();

        let claims = svc.verify_access(&minted.token).unwrap();
        assert_eq!(claims.user_id, sub.user_id);
        assert_eq!(claims.sub, sub.user_id.to_string());
        assert_eq!(claims.role, Role::Caregiver);
        assert_eq!(claims.zone_id, sub.zone_id);
        assert_eq!(claims.device_id, "iphone-1");
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.aud, AUDIENCE);
        assert_eq!(claims.exp - claims.iat, ACCESS_TOKEN_TTL.num_seconds());
    }

    #[test]
    fn test_refresh_token_carries_token_id() {
        let svc = service();
        let (minted, token_id) = svc.mint_refresh(&subject()).unwrap();
        let claims = svc.verify_refresh(&minted.token).unwrap();
        assert_eq!(claims.token_id, token_id);
        assert_eq!(claims.exp - claims.iat, REFRESH_TOKEN_TTL.num_seconds());
    }

    #[test]
    fn test_tampered_token_is_invalid() {
        let svc = service();
        let minted = svc.mint_access(&subject()).unwrap();
        let mut tampered = minted.token.clone();
        // Flip a character in the signature segment.
        let sig_start = tampered.rfind('.').unwrap() + 1;
        let replacement = if tampered.as_bytes()[sig_start] == b'A' { 'B' } else { 'A' };
        tampered.replace_range(sig_start..sig_start + 1, &replacement.to_string());

        let err = svc.verify_access(&tampered).unwrap_err();
        assert!(matches!(err, ApiError::InvalidToken));
    }

    #[test]
    fn test_expired_access_token_is_reported_as_expired() {
        let svc = service();
        let sub = subject();
        let now = Utc::now();
        let claims = AccessClaims {
            sub: sub.user_id.to_string(),
            user_id: sub.user_id,
            role: sub.role,
            zone_id: sub.zone_id,
            device_id: sub.device_id.clone(),
            email: None,
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            iat: (now - Duration::hours(2)).timestamp(),
            exp: (now - Duration::hours(1)).timestamp(),
        };
        let token = svc.sign(&claims).unwrap();
        assert!(matches!(svc.verify_access(&token).unwrap_err(), ApiError::TokenExpired));
    }

    #[test]
    fn test_expired_refresh_token_collapses_to_invalid() {
        let svc = service();
        let sub = subject();
        let now = Utc::now();
        let claims = RefreshClaims {
            sub: sub.user_id.to_string(),
            user_id: sub.user_id,
            role: sub.role,
            zone_id: sub.zone_id,
            device_id: sub.device_id.clone(),
            token_id: Uuid::new_v4(),
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            iat: (now - Duration::days(31)).timestamp(),
            exp: (now - Duration::days(1)).timestamp(),
        };
        let token = svc.sign(&claims).unwrap();
        assert!(matches!(svc.verify_refresh(&token).unwrap_err(), ApiError::InvalidToken));
    }

    #[test]
    fn test_wrong_audience_is_rejected() {
        let svc = service();
        let sub = subject();
        let now = Utc::now();
        let claims = AccessClaims {
            sub: sub.user_id.to_string(),
            user_id: sub.user_id,
            role: sub.role,
            zone_id: sub.zone_id,
            device_id: sub.device_id,
            email: None,
            iss: ISSUER.to_string(),
            aud: "some-other-app".to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };
        let token = svc.sign(&claims).unwrap();
        assert!(matches!(svc.verify_access(&token).unwrap_err(), ApiError::InvalidToken));
    }

    #[test]
    fn test_unknown_kid_falls_back_to_known_keys() {
        // Signed by a store whose kid differs from the verifier's set;
        // the verifier falls back to trying all of its public keys.
        let signer = TokenService::new(Arc::new(
            KeyStore::from_pem_pair("rotated-out", TEST_PRIVATE_KEY, TEST_PUBLIC_KEY).unwrap(),
        ));
        let verifier = service();
        let minted = signer.mint_access(&subject()).unwrap();
        assert!(verifier.verify_access(&minted.token).is_ok());
    }

    #[test]
    fn test_refresh_hash_is_stable_hex_sha256() {
        let a = hash_refresh_token("some-raw-token");
        let b = hash_refresh_token("some-raw-token");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, hash_refresh_token("some-raw-token2"));
    }
}
