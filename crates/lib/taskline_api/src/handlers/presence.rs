//! Presence lookup.

use axum::Json;
use axum::extract::{Path, State};
use taskline_core::models::auth::PrincipalId;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::PresenceResponse;

/// `GET /presence/{principal_id}` — live connection state of a principal.
pub async fn presence_handler(
    State(state): State<AppState>,
    Path(principal_id): Path<PrincipalId>,
) -> AppResult<Json<PresenceResponse>> {
    let principal = state
        .store
        .find_principal_by_id(principal_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("principal {principal_id}")))?;
    let presence = state.presence();
    Ok(Json(PresenceResponse {
        principal_id,
        online: presence.is_online(principal_id).await,
        connections: presence.connections_of(principal_id).await,
        last_seen_at: principal.last_seen_at,
    }))
}
