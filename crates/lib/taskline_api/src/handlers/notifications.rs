//! Notification read API and admin broadcast.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use taskline_core::models::messaging::{NewNotification, Notification, NotificationKind};
use taskline_core::store::NotificationQuery;
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{AuthenticatedPrincipal, require_admin_or_owner};
use crate::models::{BroadcastRequest, BroadcastResponse, NotificationListQuery};

const MAX_LIST_LIMIT: i64 = 200;

/// `GET /notifications?unread=&limit=&principalId=` — stored notifications,
/// newest first. Reading another principal's list requires admin.
pub async fn list_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedPrincipal(caller)): Extension<AuthenticatedPrincipal>,
    Query(query): Query<NotificationListQuery>,
) -> AppResult<Json<Vec<Notification>>> {
    let owner = query.principal_id.unwrap_or(caller.id);
    require_admin_or_owner(&caller, owner)?;

    let limit = match query.limit {
        None => NotificationQuery::default().limit,
        Some(n) if (1..=MAX_LIST_LIMIT).contains(&n) => n,
        Some(_) => {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {MAX_LIST_LIMIT}"
            )));
        }
    };
    let items = state
        .store
        .list_notifications(
            owner,
            NotificationQuery {
                unread_only: query.unread,
                limit,
            },
        )
        .await?;
    Ok(Json(items))
}

/// `POST /notifications/broadcast` — system notification to every active
/// principal. Admin only.
pub async fn broadcast_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedPrincipal(caller)): Extension<AuthenticatedPrincipal>,
    Json(body): Json<BroadcastRequest>,
) -> AppResult<Json<BroadcastResponse>> {
    if body.title.trim().is_empty() {
        return Err(AppError::Validation("title must not be empty".into()));
    }
    let outcome = state
        .events
        .notifier()
        .broadcast_system(NewNotification {
            kind: NotificationKind::System,
            title: body.title,
            content: body.content,
            data: body.data,
        })
        .await?;
    info!(
        principal_id = caller.id,
        stored = outcome.stored,
        pushed = outcome.pushed,
        "system notification broadcast"
    );
    Ok(Json(BroadcastResponse {
        stored: outcome.stored,
        pushed: outcome.pushed,
    }))
}
