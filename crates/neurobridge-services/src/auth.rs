// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Accounts, sessions and bearer-token resolution.
//!
//! Access tokens are HS256 JWTs whose subject is the user id; refresh
//! tokens are 32 random bytes, hex encoded. Both are stored in a
//! `user_tokens` row, so logging out (deleting the row) revokes an access
//! token before its `exp`. Every failure surfaces as the same neutral
//! "invalid credentials" error; the precise reason is only logged.

use std::time::Duration;

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use neurobridge_config::model::AuthConfig;
use neurobridge_core::types::{User, UserToken, format_timestamp, now_timestamp};
use neurobridge_core::{Identity, NeuroError, RequestContext};
use neurobridge_storage::queries::users::ProfileUpdate;
use neurobridge_storage::queries::{tokens, users};
use neurobridge_storage::{Database, Executor};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::new_id;

/// Refresh tokens stay usable this long past `expires_at`.
pub const REFRESH_GRACE: Duration = Duration::from_secs(5 * 60);

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: u64,
    iat: u64,
    jti: String,
}

/// Tokens returned by login, register and refresh.
#[derive(Clone, Serialize)]
pub struct TokenPair {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires.
    pub expires_in: u64,
    /// When the refresh token stops being accepted (before grace).
    pub refresh_expires_at: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("user_id", &self.user_id)
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    secret: SecretString,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl AuthService {
    /// Build from config. A signing secret is required.
    pub fn from_config(db: Database, config: &AuthConfig) -> Result<Self, NeuroError> {
        let secret = config
            .jwt_secret
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| NeuroError::Config("auth.jwt_secret must be set".into()))?;
        Ok(Self::new(
            db,
            SecretString::from(secret),
            Duration::from_secs(config.access_ttl_secs),
            Duration::from_secs(config.refresh_ttl_secs),
        ))
    }

    pub fn new(db: Database, secret: SecretString, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            db,
            secret,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Create an account and log it in.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<(User, TokenPair), NeuroError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(NeuroError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let password_hash = hash_password(password)?;

        let now = now_timestamp();
        let user = User {
            id: new_id(),
            email: email.clone(),
            password_hash,
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            avatar_url: None,
            created_at: now.clone(),
            updated_at: now,
            deleted_at: None,
        };
        users::insert_user(&self.db, &user).await.map_err(|e| match e {
            NeuroError::Conflict(_) => NeuroError::Conflict("email already registered".into()),
            other => other,
        })?;
        info!(user_id = %user.id, "user registered");

        let pair = self.issue_session(&self.db, &user.id).await?;
        Ok((user, pair))
    }

    /// Verify credentials, reap the user's expired sessions, open a new one.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, NeuroError> {
        let email = email.trim().to_lowercase();
        let Some(user) = users::get_user_by_email(&self.db, &email).await? else {
            debug!("login for unknown email");
            return Err(NeuroError::unauthenticated("unknown email"));
        };
        if !verify_password(password, &user.password_hash) {
            debug!(user_id = %user.id, "login with wrong password");
            return Err(NeuroError::unauthenticated("password mismatch"));
        }

        let reaped = tokens::delete_expired_for_user(&self.db, &user.id, &now_timestamp()).await?;
        if reaped > 0 {
            debug!(user_id = %user.id, reaped, "purged expired sessions");
        }
        let pair = self.issue_session(&self.db, &user.id).await?;
        info!(user_id = %user.id, "user logged in");
        Ok(pair)
    }

    /// Rotate a refresh token: the old row is replaced by a new one.
    ///
    /// A token more than [`REFRESH_GRACE`] past its expiry is deleted and
    /// rejected.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, NeuroError> {
        let tx = self.db.begin().await?;
        let Some(row) = tokens::get_by_refresh_token(&tx, refresh_token).await? else {
            return Err(NeuroError::unauthenticated("unknown refresh token"));
        };

        let expires_at = parse_timestamp(&row.expires_at)?;
        let grace = chrono::Duration::from_std(REFRESH_GRACE)
            .map_err(|e| NeuroError::Internal(e.to_string()))?;
        if expires_at + grace < Utc::now() {
            tokens::delete_token(&tx, &row.id).await?;
            tx.commit().await?;
            warn!(user_id = %row.user_id, "refresh token expired");
            return Err(NeuroError::unauthenticated("refresh token expired"));
        }

        let pair = self.issue_session(&tx, &row.user_id).await?;
        tokens::delete_token(&tx, &row.id).await?;
        tx.commit().await?;
        debug!(user_id = %row.user_id, "session refreshed");
        Ok(pair)
    }

    /// Resolve a bearer token into a request context.
    ///
    /// `None` yields an anonymous context. A token that fails verification,
    /// has expired, or was logged out is an error.
    pub async fn context_from_token(&self, access_token: Option<&str>) -> Result<RequestContext, NeuroError> {
        let Some(access_token) = access_token.filter(|t| !t.is_empty()) else {
            return Ok(RequestContext::anonymous());
        };

        let key = DecodingKey::from_secret(self.secret.expose_secret().as_bytes());
        let claims = decode::<Claims>(access_token, &key, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                debug!(error = %e, "access token rejected");
                NeuroError::unauthenticated(format!("token verification failed: {e}"))
            })?
            .claims;

        let row = tokens::get_by_access_token(&self.db, access_token)
            .await?
            .ok_or_else(|| NeuroError::unauthenticated("session revoked"))?;
        if row.user_id != claims.sub {
            warn!(token_user = %row.user_id, claim_user = %claims.sub, "token subject mismatch");
            return Err(NeuroError::unauthenticated("subject mismatch"));
        }

        Ok(RequestContext::authenticated(Identity {
            user_id: row.user_id,
            session_id: row.id,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
        }))
    }

    /// Revoke the session behind `access_token`. Unknown tokens are fine.
    pub async fn logout(&self, access_token: &str) -> Result<(), NeuroError> {
        let removed = tokens::delete_by_access_token(&self.db, access_token).await?;
        debug!(removed, "logout");
        Ok(())
    }

    pub async fn get_me(&self, ctx: &RequestContext) -> Result<User, NeuroError> {
        let user_id = ctx.user_id()?;
        users::get_user(&self.db, user_id)
            .await?
            .ok_or_else(|| NeuroError::not_found("user", user_id))
    }

    pub async fn update_profile(&self, ctx: &RequestContext, update: &ProfileUpdate) -> Result<User, NeuroError> {
        let user_id = ctx.user_id()?;
        if !users::update_profile(&self.db, user_id, update, &now_timestamp()).await? {
            return Err(NeuroError::not_found("user", user_id));
        }
        self.get_me(ctx).await
    }

    /// Soft-delete the caller and revoke every session they hold.
    pub async fn soft_delete_user(&self, ctx: &RequestContext) -> Result<(), NeuroError> {
        let user_id = ctx.user_id()?;
        let tx = self.db.begin().await?;
        if !users::soft_delete_user(&tx, user_id, &now_timestamp()).await? {
            return Err(NeuroError::not_found("user", user_id));
        }
        let revoked = tokens::delete_all_for_user(&tx, user_id).await?;
        tx.commit().await?;
        info!(user_id, revoked, "user soft-deleted");
        Ok(())
    }

    /// Mint an access/refresh pair and store its session row.
    async fn issue_session(&self, db: &impl Executor, user_id: &str) -> Result<TokenPair, NeuroError> {
        let now = Utc::now();
        let iat = u64::try_from(now.timestamp()).unwrap_or_default();
        let claims = Claims {
            sub: user_id.to_string(),
            iat,
            exp: iat + self.access_ttl.as_secs(),
            jti: new_id(),
        };
        let access_token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )
        .map_err(|e| NeuroError::Internal(format!("failed to sign access token: {e}")))?;

        let refresh_ttl = chrono::Duration::from_std(self.refresh_ttl)
            .map_err(|e| NeuroError::Config(format!("refresh ttl out of range: {e}")))?;
        let row = UserToken {
            id: new_id(),
            user_id: user_id.to_string(),
            access_token,
            refresh_token: random_token(),
            expires_at: format_timestamp(now + refresh_ttl),
            created_at: format_timestamp(now),
        };
        tokens::insert_token(db, &row).await?;

        Ok(TokenPair {
            user_id: row.user_id,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            expires_in: self.access_ttl.as_secs(),
            refresh_expires_at: row.expires_at,
        })
    }
}

fn normalize_email(email: &str) -> Result<String, NeuroError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(NeuroError::Validation("email address is not valid".into())),
    }
}

fn hash_password(password: &str) -> Result<String, NeuroError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| NeuroError::Internal(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "stored password hash is unreadable");
            false
        }
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, NeuroError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| NeuroError::Internal(format!("unreadable timestamp {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    async fn service() -> (Database, AuthService) {
        let db = Database::open_in_memory().await.unwrap();
        let auth = AuthService::new(
            db.clone(),
            SecretString::from(SECRET.to_string()),
            Duration::from_secs(3600),
            Duration::from_secs(86_400),
        );
        (db, auth)
    }

    async fn registered() -> (Database, AuthService, User, TokenPair) {
        let (db, auth) = service().await;
        let (user, pair) = auth
            .register("  Ada@Example.COM ", "correct horse", "Ada", "Lovelace")
            .await
            .unwrap();
        (db, auth, user, pair)
    }

    async fn backdate(db: &Database, refresh_token: &str, by: chrono::Duration) {
        let token = refresh_token.to_string();
        let expires_at = format_timestamp(Utc::now() - by);
        db.call(move |conn| {
            conn.execute(
                "UPDATE user_tokens SET expires_at = ?1 WHERE refresh_token = ?2",
                rusqlite::params![expires_at, token],
            )
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn register_normalizes_email_and_rejects_duplicates() {
        let (_, auth, user, pair) = registered().await;
        assert_eq!(user.email, "ada@example.com");
        assert!(user.password_hash.starts_with("$argon2id$"));
        assert_eq!(pair.refresh_token.len(), 64);

        let err = auth
            .register("ada@example.com", "another pass", "A", "L")
            .await
            .unwrap_err();
        assert!(matches!(err, NeuroError::Conflict(_)));
    }

    #[tokio::test]
    async fn login_checks_password_neutrally() {
        let (_, auth, user, _) = registered().await;
        let pair = auth.login("ADA@example.com", "correct horse").await.unwrap();
        assert_eq!(pair.user_id, user.id);

        let wrong = auth.login("ada@example.com", "wrong horse").await.unwrap_err();
        let unknown = auth.login("bob@example.com", "correct horse").await.unwrap_err();
        assert_eq!(wrong.to_string(), "invalid credentials");
        assert_eq!(unknown.to_string(), "invalid credentials");
    }

    #[tokio::test]
    async fn access_token_resolves_to_context() {
        let (_, auth, user, pair) = registered().await;
        let ctx = auth
            .context_from_token(Some(&pair.access_token))
            .await
            .unwrap();
        assert_eq!(ctx.user_id().unwrap(), user.id);
        let identity = ctx.identity().unwrap();
        assert_eq!(identity.refresh_token, pair.refresh_token);

        let anonymous = auth.context_from_token(None).await.unwrap();
        assert!(anonymous.identity().is_none());

        let forged = auth.context_from_token(Some("not.a.jwt")).await.unwrap_err();
        assert!(matches!(forged, NeuroError::Unauthenticated { .. }));
    }

    #[tokio::test]
    async fn logout_revokes_and_is_idempotent() {
        let (_, auth, _, pair) = registered().await;
        auth.logout(&pair.access_token).await.unwrap();
        auth.logout(&pair.access_token).await.unwrap();
        let err = auth
            .context_from_token(Some(&pair.access_token))
            .await
            .unwrap_err();
        assert!(matches!(err, NeuroError::Unauthenticated { .. }));
    }

    #[tokio::test]
    async fn refresh_rotates_the_pair() {
        let (db, auth, _, pair) = registered().await;
        let rotated = auth.refresh(&pair.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, pair.refresh_token);
        assert_ne!(rotated.access_token, pair.access_token);

        assert!(tokens::get_by_refresh_token(&db, &pair.refresh_token).await.unwrap().is_none());
        assert!(tokens::get_by_refresh_token(&db, &rotated.refresh_token).await.unwrap().is_some());
        assert!(auth.refresh(&pair.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn refresh_within_grace_succeeds() {
        let (db, auth, _, pair) = registered().await;
        backdate(&db, &pair.refresh_token, chrono::Duration::minutes(3)).await;
        auth.refresh(&pair.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn refresh_past_grace_fails_and_deletes_row() {
        let (db, auth, _, pair) = registered().await;
        backdate(&db, &pair.refresh_token, chrono::Duration::minutes(6)).await;
        let err = auth.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, NeuroError::Unauthenticated { ref reason } if reason.contains("expired")));
        assert!(tokens::get_by_refresh_token(&db, &pair.refresh_token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn soft_delete_revokes_sessions() {
        let (_, auth, _, pair) = registered().await;
        let ctx = auth
            .context_from_token(Some(&pair.access_token))
            .await
            .unwrap();
        let updated = auth
            .update_profile(
                &ctx,
                &ProfileUpdate {
                    first_name: Some("Augusta".into()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.first_name, "Augusta");

        auth.soft_delete_user(&ctx).await.unwrap();
        assert!(auth.context_from_token(Some(&pair.access_token)).await.is_err());
        assert!(auth.login("ada@example.com", "correct horse").await.is_err());
    }

    #[test]
    fn invalid_emails_are_rejected() {
        assert!(normalize_email("nobody").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert_eq!(normalize_email(" X@Y.io ").unwrap(), "x@y.io");
    }
}
