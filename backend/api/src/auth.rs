//! Credential hashing and session tokens.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rewards_ledger::{LedgerError, PasswordHasher};
use serde::{Deserialize, Serialize};

use crate::api::ApiState;
use crate::errors::{ApiError, Result};

// ─────────────────────────────────────────────────────────
// Passwords
// ─────────────────────────────────────────────────────────

/// bcrypt-backed [`PasswordHasher`].
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        BcryptHasher { cost }
    }
}

/// bcrypt runs on the blocking pool so a hash never stalls a runtime worker.
impl PasswordHasher for BcryptHasher {
    async fn hash(&self, password: &str) -> rewards_ledger::Result<String> {
        let (password, cost) = (password.to_owned(), self.cost);
        blocking(move || bcrypt::hash(password, cost)).await
    }

    async fn verify(&self, password: &str, hash: &str) -> rewards_ledger::Result<bool> {
        let (password, hash) = (password.to_owned(), hash.to_owned());
        blocking(move || bcrypt::verify(password, &hash)).await
    }
}

async fn blocking<T, F>(work: F) -> rewards_ledger::Result<T>
where
    F: FnOnce() -> std::result::Result<T, bcrypt::BcryptError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| LedgerError::Credential(e.to_string()))?
        .map_err(|e| LedgerError::Credential(e.to_string()))
}

// ─────────────────────────────────────────────────────────
// Tokens
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Account id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 signing and verification keys plus the token lifetime.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl_days: i64) -> Self {
        TokenKeys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::days(ttl_days),
        }
    }

    pub fn issue(&self, account_id: &str, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            sub: account_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Any decoding failure, expiry included, is reported as [`ApiError::Unauthorized`].
    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|_| ApiError::Unauthorized)
    }
}

/// Token carried by an `Authorization` header value, with or without the
/// `Bearer ` scheme.
pub fn bearer_token(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
    (!token.is_empty()).then_some(token)
}

/// The authenticated account id, extracted from the request's token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

#[async_trait]
impl FromRequestParts<Arc<ApiState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ApiState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or(ApiError::Unauthorized)?;
        let claims = state.tokens.verify(token)?;
        Ok(AuthUser(claims.sub))
    }
}
