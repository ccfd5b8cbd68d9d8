//! `/notifications` routes.

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::extractors::{PathParam, QueryParams};
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use timebank_core::ids::NotificationId;
use timebank_core::notification::Notification;
use timebank_core::service;

/// Query of `GET /notifications`.
#[derive(Debug, Default, Deserialize)]
pub struct ListNotifications {
    /// Only unread ones.
    #[serde(default)]
    pub unread: bool,
    /// Page size.
    pub limit: Option<usize>,
}

/// Response of `POST /notifications/read-all`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MarkedRead {
    /// Notifications that were unread before the call.
    pub updated: u64,
}

/// `GET /notifications?unread=true&limit=`
///
/// # Errors
///
/// 500 on store failure.
pub async fn list(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    QueryParams(query): QueryParams<ListNotifications>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let env = state.service_env();
    Ok(Json(
        service::notifications::list(&env, me, query.unread, query.limit).await?,
    ))
}

/// `PATCH /notifications/:id/read`
///
/// # Errors
///
/// 404 for an unknown id, 403 for someone else's notification.
pub async fn mark_read(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    PathParam(id): PathParam<NotificationId>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(
        service::notifications::mark_read(&state.service_env(), me, id).await?,
    ))
}

/// `POST /notifications/read-all`
///
/// # Errors
///
/// 500 on store failure.
pub async fn mark_all_read(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> Result<Json<MarkedRead>, AppError> {
    let updated = service::notifications::mark_all_read(&state.service_env(), me).await?;
    Ok(Json(MarkedRead { updated }))
}
