//! JWT encoding and verification for both token families.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{debug, info};
use uuid::Uuid;

use super::AuthError;
use crate::models::auth::{PrincipalId, TokenClaims, TokenKind};

/// Sign a token of `kind` for `principal_id`, valid for `ttl` from `now`.
pub fn encode_token(
    principal_id: PrincipalId,
    kind: TokenKind,
    ttl: Duration,
    secret: &[u8],
    now: DateTime<Utc>,
) -> Result<(String, TokenClaims), AuthError> {
    let claims = TokenClaims {
        sub: principal_id.to_string(),
        typ: kind,
        jti: Uuid::new_v4().to_string(),
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))?;
    Ok((token, claims))
}

/// Verify signature, expiry and token kind. Never consults any registry.
pub fn verify_token(
    token: &str,
    secret: &[u8],
    expected: TokenKind,
) -> Result<TokenClaims, AuthError> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::default();
    validation.validate_exp = true;
    let data = decode::<TokenClaims>(token, &key, &validation).map_err(|e| {
        match e.kind() {
            ErrorKind::ExpiredSignature => debug!(kind = ?expected, "token expired"),
            other => debug!(kind = ?expected, error = ?other, "token rejected"),
        }
        AuthError::InvalidToken
    })?;
    if data.claims.typ != expected {
        debug!(expected = ?expected, got = ?data.claims.typ, "token kind mismatch");
        return Err(AuthError::InvalidToken);
    }
    if data.claims.principal_id().is_none() {
        return Err(AuthError::InvalidToken);
    }
    Ok(data.claims)
}

/// Resolve the JWT secret: env var `JWT_SECRET` → `AUTH_SECRET` → persisted file.
pub fn resolve_jwt_secret() -> String {
    if let Ok(secret) = std::env::var("JWT_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    if let Ok(secret) = std::env::var("AUTH_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    let secret_path = jwt_secret_path();
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret = random_secret();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&secret_path, &secret);
    info!(path = %secret_path.display(), "generated new JWT secret");
    secret
}

/// Derive the refresh-token secret. Uses `JWT_REFRESH_SECRET` when set,
/// otherwise a value derived from the access secret so the two families
/// never verify against each other's key.
pub fn resolve_refresh_secret(access_secret: &str) -> String {
    match std::env::var("JWT_REFRESH_SECRET") {
        Ok(secret) if !secret.is_empty() => secret,
        _ => format!("{access_secret}:refresh"),
    }
}

/// 64 random alphanumeric characters.
pub fn random_secret() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskline")
        .join("jwt-secret")
}
