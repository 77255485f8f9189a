//! Authentication service — login/register/refresh/logout flows built on
//! `taskline_core::auth`.

use taskline_core::auth::AuthError;
use taskline_core::auth::password::{hash_password, validate_password, verify_password};
use taskline_core::models::auth::{NewPrincipal, Principal, Role, TokenPair};
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{AuthResponse, LogoutResponse, TokenResponse};

const TOKEN_TYPE: &str = "Bearer";

fn auth_response(tokens: TokenPair, user: Principal) -> AuthResponse {
    AuthResponse {
        tokens,
        token_type: TOKEN_TYPE.to_string(),
        user,
    }
}

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_ascii_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::Validation("Invalid email address".into())),
    }
}

/// Authenticate with email + password. Any mismatch yields the same
/// generic error.
pub async fn login(state: &AppState, email: &str, password: &str) -> AppResult<AuthResponse> {
    let email = email.trim();
    let Some(creds) = state.store.find_credentials_by_email(email).await? else {
        return Err(AuthError::CredentialError.into());
    };
    if !verify_password(password, &creds.password_hash) {
        return Err(AuthError::CredentialError.into());
    }
    if !creds.principal.is_active {
        return Err(AppError::PrincipalInactive);
    }

    let tokens = state.tokens.issue_pair(creds.principal.id)?;
    info!(principal_id = creds.principal.id, "principal logged in");
    Ok(auth_response(tokens, creds.principal))
}

/// Register a new principal. The first account becomes admin.
pub async fn register(
    state: &AppState,
    email: &str,
    password: &str,
    name: Option<&str>,
) -> AppResult<AuthResponse> {
    let email = normalize_email(email)?;
    validate_password(password)?;

    let principal = state
        .store
        .create_principal(NewPrincipal {
            email,
            name: name.map(str::trim).filter(|n| !n.is_empty()).map(String::from),
            password_hash: hash_password(password)?,
            role: Role::Member,
        })
        .await?;
    if principal.role == Role::Admin {
        info!(principal_id = principal.id, "first principal granted admin role");
    }

    let tokens = state.tokens.issue_pair(principal.id)?;
    info!(principal_id = principal.id, "principal registered");
    Ok(auth_response(tokens, principal))
}

/// Exchange a refresh token for a new access token.
pub async fn refresh(state: &AppState, refresh_token: &str) -> AppResult<TokenResponse> {
    let tokens = state
        .tokens
        .refresh(refresh_token, state.store.as_ref())
        .await?;
    Ok(TokenResponse {
        tokens,
        token_type: TOKEN_TYPE.to_string(),
    })
}

/// Revoke a refresh token. Succeeds whether or not it was live.
pub fn logout(state: &AppState, refresh_token: Option<&str>) -> LogoutResponse {
    if let Some(token) = refresh_token {
        state.tokens.revoke(token);
    }
    LogoutResponse { success: true }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_normalized() {
        assert_eq!(normalize_email("  Ann@Example.COM ").unwrap(), "ann@example.com");
        assert!(normalize_email("ann").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("ann@localhost").is_err());
    }
}
