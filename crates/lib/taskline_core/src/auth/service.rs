//! Token service — issues, verifies, refreshes and revokes tokens.
//!
//! Access tokens are stateless: verification is signature + expiry only.
//! Refresh tokens are additionally tracked in a [`RefreshTokenStore`], and a
//! refresh token is only honoured while its registry entry is live.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::AuthError;
use super::duration::{DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS, resolve_ttl};
use super::jwt::{encode_token, verify_token};
use super::refresh_store::{RefreshLookup, RefreshRecord, RefreshTokenStore};
use crate::models::auth::{PrincipalId, TokenKind, TokenPair};
use crate::store::Persistence;

/// What a successful refresh does with the presented refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshRotation {
    /// Keep honouring the same refresh token until it expires or is revoked.
    #[default]
    Reuse,
    /// Revoke the presented token and hand out a new one.
    Rotate,
}

impl FromStr for RefreshRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reuse" => Ok(Self::Reuse),
            "rotate" => Ok(Self::Rotate),
            other => Err(format!("unknown refresh rotation policy: {other}")),
        }
    }
}

/// Token configuration, usually read from the environment.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    /// Lifetime string, e.g. `"15m"`.
    pub access_ttl: String,
    /// Lifetime string, e.g. `"7d"`.
    pub refresh_ttl: String,
    pub rotation: RefreshRotation,
}

#[derive(Debug)]
pub struct TokenService {
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    rotation: RefreshRotation,
    registry: Arc<RefreshTokenStore>,
}

impl TokenService {
    /// Malformed lifetimes fall back to 15 minutes / 7 days with a warning.
    pub fn new(settings: &TokenSettings, registry: Arc<RefreshTokenStore>) -> Self {
        Self {
            access_secret: settings.access_secret.as_bytes().to_vec(),
            refresh_secret: settings.refresh_secret.as_bytes().to_vec(),
            access_ttl: resolve_ttl("access_ttl", &settings.access_ttl, DEFAULT_ACCESS_TTL_SECS),
            refresh_ttl: resolve_ttl(
                "refresh_ttl",
                &settings.refresh_ttl,
                DEFAULT_REFRESH_TTL_SECS,
            ),
            rotation: settings.rotation,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<RefreshTokenStore> {
        &self.registry
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn rotation(&self) -> RefreshRotation {
        self.rotation
    }

    pub fn issue_access_token(&self, principal_id: PrincipalId) -> Result<String, AuthError> {
        let (token, _) = encode_token(
            principal_id,
            TokenKind::Access,
            self.access_ttl,
            &self.access_secret,
            Utc::now(),
        )?;
        Ok(token)
    }

    /// Issue a refresh token and record it in the registry.
    pub fn issue_refresh_token(&self, principal_id: PrincipalId) -> Result<String, AuthError> {
        self.issue_refresh_token_at(principal_id, Utc::now())
    }

    pub fn issue_refresh_token_at(
        &self,
        principal_id: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let (token, _) = encode_token(
            principal_id,
            TokenKind::Refresh,
            self.refresh_ttl,
            &self.refresh_secret,
            now,
        )?;
        self.registry.insert(
            &token,
            RefreshRecord {
                principal_id,
                expires_at: now + self.refresh_ttl,
            },
        );
        Ok(token)
    }

    /// Issue a fresh access + refresh pair (login, registration).
    pub fn issue_pair(&self, principal_id: PrincipalId) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(principal_id)?,
            refresh_token: self.issue_refresh_token(principal_id)?,
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    /// Stateless verification; the refresh registry is never consulted.
    pub fn verify_access_token(&self, token: &str) -> Result<PrincipalId, AuthError> {
        let claims = verify_token(token, &self.access_secret, TokenKind::Access)?;
        claims.principal_id().ok_or(AuthError::InvalidToken)
    }

    /// Verify a refresh token against both its signature and its registry
    /// entry. Any inconsistency purges the entry.
    pub fn verify_refresh_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshRecord, AuthError> {
        let record = match self.registry.lookup(token, now) {
            RefreshLookup::Valid(record) => record,
            RefreshLookup::Expired => {
                debug!("refresh token expired in registry");
                return Err(AuthError::InvalidRefreshToken);
            }
            RefreshLookup::Missing => return Err(AuthError::InvalidRefreshToken),
        };
        let claims = match verify_token(token, &self.refresh_secret, TokenKind::Refresh) {
            Ok(claims) => claims,
            Err(_) => {
                warn!(
                    principal_id = record.principal_id,
                    "registered refresh token failed verification, purging"
                );
                self.registry.remove(token);
                return Err(AuthError::InvalidRefreshToken);
            }
        };
        if claims.principal_id() != Some(record.principal_id) || claims.exp < now.timestamp() {
            warn!(
                principal_id = record.principal_id,
                "refresh token does not match its registry entry, purging"
            );
            self.registry.remove(token);
            return Err(AuthError::InvalidRefreshToken);
        }
        Ok(record)
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        store: &dyn Persistence,
    ) -> Result<TokenPair, AuthError> {
        self.refresh_at(refresh_token, store, Utc::now()).await
    }

    pub async fn refresh_at(
        &self,
        refresh_token: &str,
        store: &dyn Persistence,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let record = self.verify_refresh_token_at(refresh_token, now)?;

        let principal = match store.find_principal_by_id(record.principal_id).await? {
            Some(p) => p,
            None => {
                let purged = self.registry.remove_principal(record.principal_id);
                debug!(
                    principal_id = record.principal_id,
                    purged,
                    "refresh for deleted principal"
                );
                return Err(AuthError::InvalidRefreshToken);
            }
        };
        if !principal.is_active {
            let purged = self.registry.remove_principal(principal.id);
            debug!(principal_id = principal.id, purged, "refresh for inactive principal");
            return Err(AuthError::PrincipalInactive);
        }

        // Under rotation the presented token is redeemed exactly once: only
        // the caller whose remove succeeds gets a replacement.
        if self.rotation == RefreshRotation::Rotate && !self.registry.remove(refresh_token) {
            return Err(AuthError::InvalidRefreshToken);
        }
        let access_token = self.issue_access_token(principal.id)?;
        let refresh_token = match self.rotation {
            RefreshRotation::Reuse => refresh_token.to_string(),
            RefreshRotation::Rotate => self.issue_refresh_token_at(principal.id, now)?,
        };
        info!(principal_id = principal.id, rotation = ?self.rotation, "access token refreshed");

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    /// Drop a refresh token from the registry. Idempotent.
    pub fn revoke(&self, refresh_token: &str) {
        if self.registry.remove(refresh_token) {
            debug!("refresh token revoked");
        }
    }
}
