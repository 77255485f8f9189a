//! Authentication domain models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric principal (user) identifier.
pub type PrincipalId = i64;

/// Principal role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "member" => Ok(Self::Member),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: PrincipalId,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub is_online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Principal with password hash (for login).
#[derive(Debug, Clone)]
pub struct PrincipalCredentials {
    pub principal: Principal,
    pub password_hash: String,
}

/// Input for principal creation at registration.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub role: Role,
}

/// Presence fields written on connect/disconnect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresenceUpdate {
    pub online: bool,
    pub last_seen_at: DateTime<Utc>,
}

/// Which of the two token families a JWT belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims embedded in access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject — principal ID (standard JWT `sub` claim).
    pub sub: String,
    pub typ: TokenKind,
    /// Unique token id; makes refresh tokens issued in the same second distinct.
    pub jti: String,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
}

impl TokenClaims {
    /// Parse the subject back into a principal id.
    pub fn principal_id(&self) -> Option<PrincipalId> {
        self.sub.parse().ok()
    }
}

/// Access + refresh token pair returned by login, registration and refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::Admin, Role::Manager, Role::Member] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn claims_subject_parses_to_principal_id() {
        let claims = TokenClaims {
            sub: "42".into(),
            typ: TokenKind::Access,
            jti: "j".into(),
            exp: 0,
            iat: 0,
        };
        assert_eq!(claims.principal_id(), Some(42));
        let bad = TokenClaims { sub: "abc".into(), ..claims };
        assert_eq!(bad.principal_id(), None);
    }
}
