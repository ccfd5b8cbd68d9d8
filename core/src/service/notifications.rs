//! Notification inbox.

use super::{ServiceEnvironment, page_limit};
use crate::error::DomainError;
use crate::ids::{NotificationId, UserId};
use crate::notification::Notification;
use crate::store::NotificationFilter;

/// The user's notifications, newest first.
///
/// # Errors
///
/// Propagates store failures.
pub async fn list(
    env: &ServiceEnvironment,
    user: UserId,
    unread_only: bool,
    limit: Option<usize>,
) -> Result<Vec<Notification>, DomainError> {
    let filter = NotificationFilter {
        user_id: user,
        unread_only,
        limit: page_limit(limit),
    };
    Ok(env.store.list_notifications(filter).await?)
}

/// Marks one notification read. Marking it again keeps the first `read_at`.
///
/// # Errors
///
/// [`DomainError::NotFound`] for an unknown id, [`DomainError::Forbidden`]
/// when the notification belongs to someone else.
pub async fn mark_read(
    env: &ServiceEnvironment,
    user: UserId,
    id: NotificationId,
) -> Result<Notification, DomainError> {
    let notification = env
        .store
        .get_notification(id)
        .await?
        .ok_or_else(|| DomainError::not_found("Notification", id))?;
    if notification.user_id != user {
        return Err(DomainError::forbidden("Not your notification"));
    }
    if notification.is_read() {
        return Ok(notification);
    }
    Ok(env.store.mark_notification_read(id, env.now()).await?)
}

/// Marks every unread notification of the user; returns how many changed.
///
/// # Errors
///
/// Propagates store failures.
pub async fn mark_all_read(env: &ServiceEnvironment, user: UserId) -> Result<u64, DomainError> {
    let count = env.store.mark_all_notifications_read(user, env.now()).await?;
    tracing::debug!(%user, count, "Notifications marked read");
    Ok(count)
}
