//! Authentication middleware — Bearer token extraction, token verification
//! and principal resolution, plus the secondary role/ownership guards.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use taskline_core::auth::AuthError;
use taskline_core::models::auth::{Principal, PrincipalId, Role};
use tracing::debug;

use crate::AppState;
use crate::error::AppError;

/// The principal resolved for this request, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal(pub Principal);

/// Extract the token from `Authorization: Bearer <token>`.
///
/// A missing header, another scheme or an empty token all count as "no
/// credential supplied".
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::Unauthenticated)?;
    match header.strip_prefix("Bearer ").map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::Unauthenticated),
    }
}

/// Verify an access token and load the principal's current record, so that
/// a deactivation after issuance is caught.
pub async fn authenticate(state: &AppState, token: &str) -> Result<Principal, AuthError> {
    let principal_id = state.tokens.verify_access_token(token)?;
    let principal = state
        .store
        .find_principal_by_id(principal_id)
        .await?
        .ok_or(AuthError::InvalidToken)?;
    if !principal.is_active {
        return Err(AuthError::PrincipalInactive);
    }
    Ok(principal)
}

/// Axum middleware: authenticates the request and injects
/// [`AuthenticatedPrincipal`] into request extensions. Fails closed.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?;
    let principal = authenticate(&state, token).await?;
    request
        .extensions_mut()
        .insert(AuthenticatedPrincipal(principal));
    Ok(next.run(request).await)
}

/// Role gate, layered after [`require_auth`].
pub async fn require_role(
    allowed: &'static [Role],
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(AuthenticatedPrincipal(principal)) =
        request.extensions().get::<AuthenticatedPrincipal>()
    else {
        return Err(AppError::Unauthenticated("Authentication required".into()));
    };
    if !allowed.contains(&principal.role) {
        debug!(principal_id = principal.id, role = %principal.role, "role check failed");
        return Err(AppError::Forbidden(format!(
            "requires role: {}",
            allowed
                .iter()
                .map(Role::as_str)
                .collect::<Vec<_>>()
                .join(" or ")
        )));
    }
    Ok(next.run(request).await)
}

/// Ownership gate: admins pass, everyone else must own the resource.
pub fn require_admin_or_owner(
    principal: &Principal,
    owner_id: PrincipalId,
) -> Result<(), AppError> {
    if principal.role == Role::Admin || principal.id == owner_id {
        Ok(())
    } else {
        Err(AppError::Forbidden("not the owner of this resource".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn principal(id: PrincipalId, role: Role) -> Principal {
        Principal {
            id,
            email: format!("{id}@x.io"),
            name: None,
            role,
            is_active: true,
            is_online: false,
            last_seen_at: None,
        }
    }

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        let mut headers = HeaderMap::new();
        assert!(matches!(bearer_token(&headers), Err(AuthError::Unauthenticated)));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(bearer_token(&headers), Err(AuthError::Unauthenticated)));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(matches!(bearer_token(&headers), Err(AuthError::Unauthenticated)));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");
    }

    #[test]
    fn admin_or_owner_gate() {
        assert!(require_admin_or_owner(&principal(1, Role::Member), 1).is_ok());
        assert!(require_admin_or_owner(&principal(2, Role::Admin), 1).is_ok());
        assert!(require_admin_or_owner(&principal(3, Role::Manager), 1).is_err());
    }
}
