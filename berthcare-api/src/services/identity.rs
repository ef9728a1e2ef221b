//! Identity service: register, login, refresh, logout.
//!
//! Login and register replace the `(user, device)` refresh token
//! atomically, so a device never holds two live refresh tokens. All
//! credential and token failures surface as a single generic code; the
//! internal log line carries the real reason.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use berthcare_auth::password;
use berthcare_auth::tokens::{TokenService, TokenSubject, hash_refresh_token};
use berthcare_cache::TokenBlacklist;
use berthcare_core::{ApiError, Principal, Result, Role};
use berthcare_db::models::User;
use berthcare_db::repos::{NewUser, RefreshTokenRepo, UserRepo, ZoneRepo};

use crate::middleware::AccessToken;

/// A structurally valid bcrypt hash no password maps to. Verified against
/// when the email is unknown so both failure paths cost one bcrypt run.
const TIMING_DUMMY_HASH: &str = "$2b$12$wV8SGdXGOUhpBCLVfTzg7ONVJXCOv9O1Lp7qbXBCqZ2RP6nbXAGxu";

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub zone_id: Option<Uuid>,
    pub device_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

#[derive(Clone)]
pub struct IdentityService {
    users: UserRepo,
    refresh_tokens: RefreshTokenRepo,
    zones: ZoneRepo,
    tokens: Arc<TokenService>,
    blacklist: TokenBlacklist,
}

impl IdentityService {
    pub fn new(
        users: UserRepo,
        refresh_tokens: RefreshTokenRepo,
        zones: ZoneRepo,
        tokens: Arc<TokenService>,
        blacklist: TokenBlacklist,
    ) -> Self {
        Self { users, refresh_tokens, zones, tokens, blacklist }
    }

    /// Admin-only registration. Input shape is validated by the handler;
    /// this enforces the semantic invariants (zone existence, email
    /// uniqueness) and issues the first token pair for the device.
    pub async fn register(&self, input: RegisterInput) -> Result<AuthTokens> {
        if let Some(zone_id) = input.zone_id {
            if self.zones.find_by_id(zone_id).await?.is_none() {
                return Err(ApiError::validation(
                    "unknown zone",
                    vec![berthcare_core::error::FieldError::new("zoneId", "zone does not exist")],
                ));
            }
        }

        if self.users.email_exists(&input.email).await? {
            return Err(ApiError::EmailExists);
        }

        let raw_password = input.password.clone();
        let password_hash =
            tokio::task::spawn_blocking(move || password::hash_password(&raw_password))
                .await
                .map_err(|e| ApiError::internal(format!("hashing task failed: {e}")))??;

        let user = self
            .users
            .insert(&NewUser {
                email: input.email.trim().to_lowercase(),
                password_hash,
                first_name: input.first_name,
                last_name: input.last_name,
                role: input.role,
                phone: input.phone,
                zone_id: input.zone_id,
            })
            .await?;

        self.issue_tokens(user, &input.device_id).await
    }

    pub async fn login(&self, email: &str, password: &str, device_id: &str) -> Result<AuthTokens> {
        let user = self.users.find_by_email(email.trim()).await?;

        let stored_hash = match &user {
            Some(u) => u.password_hash.clone(),
            None => TIMING_DUMMY_HASH.to_string(),
        };
        let candidate = password.to_string();
        let matches =
            tokio::task::spawn_blocking(move || password::verify_password(&candidate, &stored_hash))
                .await
                .map_err(|e| ApiError::internal(format!("verification task failed: {e}")))?
                .unwrap_or(false);

        let Some(user) = user else {
            tracing::info!(reason = "unknown_email", "login rejected");
            return Err(ApiError::InvalidCredentials);
        };
        if !matches {
            tracing::info!(user_id = %user.id, reason = "bad_password", "login rejected");
            return Err(ApiError::InvalidCredentials);
        }
        // Disabled accounts are indistinguishable from bad credentials on
        // the wire; only the log knows.
        if !user.is_active {
            tracing::info!(user_id = %user.id, reason = "account_disabled", "login rejected");
            return Err(ApiError::InvalidCredentials);
        }

        self.issue_tokens(user, device_id).await
    }

    /// Exchange a refresh token for a fresh access token. Claims in the
    /// new token come from the user's *current* row, not from the refresh
    /// token, so role or zone changes apply at the next refresh. The
    /// refresh token itself is not rotated.
    pub async fn refresh(&self, raw_refresh_token: &str) -> Result<String> {
        // Signature and expiry first: cheap, and no database probe for
        // forged tokens.
        self.tokens.verify_refresh(raw_refresh_token)?;

        let token_hash = hash_refresh_token(raw_refresh_token);
        let Some(record) = self.refresh_tokens.find_by_hash(&token_hash).await? else {
            tracing::info!(reason = "unknown_refresh_hash", "refresh rejected");
            return Err(ApiError::InvalidToken);
        };

        if record.revoked_at.is_some() {
            tracing::info!(user_id = %record.user_id, reason = "revoked", "refresh rejected");
            return Err(ApiError::InvalidToken);
        }
        if record.expires_at <= Utc::now() {
            self.refresh_tokens.delete(record.id).await?;
            tracing::info!(user_id = %record.user_id, reason = "expired_row", "refresh rejected");
            return Err(ApiError::InvalidToken);
        }

        let Some(user) = self.users.find_by_id(record.user_id).await? else {
            tracing::info!(user_id = %record.user_id, reason = "user_gone", "refresh rejected");
            return Err(ApiError::InvalidToken);
        };
        if !user.is_active {
            tracing::info!(user_id = %user.id, reason = "account_disabled", "refresh rejected");
            return Err(ApiError::InvalidToken);
        }

        let minted = self.tokens.mint_access(&TokenSubject {
            user_id: user.id,
            role: user.role,
            zone_id: user.zone_id,
            device_id: record.device_id,
            email: Some(user.email),
        })?;
        Ok(minted.token)
    }

    /// Blacklist the presented access token for its remaining life and
    /// revoke the device's refresh token. Safe to call twice.
    pub async fn logout(&self, principal: &Principal, access: &AccessToken) -> Result<()> {
        let remaining = access.expires_at - Utc::now().timestamp();
        self.blacklist.revoke(&access.raw, remaining).await;
        self.refresh_tokens.revoke_for_device(principal.user_id, &principal.device_id).await?;
        Ok(())
    }

    async fn issue_tokens(&self, user: User, device_id: &str) -> Result<AuthTokens> {
        let subject = TokenSubject {
            user_id: user.id,
            role: user.role,
            zone_id: user.zone_id,
            device_id: device_id.to_string(),
            email: Some(user.email.clone()),
        };
        let access = self.tokens.mint_access(&subject)?;
        let (refresh, _token_id) = self.tokens.mint_refresh(&subject)?;

        self.refresh_tokens
            .replace_for_device(
                user.id,
                device_id,
                &hash_refresh_token(&refresh.token),
                refresh.expires_at,
            )
            .await?;

        Ok(AuthTokens { access_token: access.token, refresh_token: refresh.token, user })
    }
}
