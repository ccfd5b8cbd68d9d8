//! Booking threads and direct messages.

use super::ServiceEnvironment;
use crate::error::DomainError;
use crate::ids::{BookingId, UserId};
use crate::message::Message;
use crate::notification::{Notification, NotificationPayload};
use crate::store::UnitOfWork;
use serde::Deserialize;

/// Client input for `POST /messages`.
#[derive(Clone, Debug, Deserialize)]
pub struct SendMessage {
    /// Booking thread; the recipient is then the counterpart.
    #[serde(default)]
    pub booking_id: Option<BookingId>,
    /// Addressee of a direct message.
    #[serde(default)]
    pub recipient_id: Option<UserId>,
    /// Text.
    pub body: String,
}

/// A committed message.
#[derive(Clone, Debug)]
pub struct MessageOutcome {
    /// Stored message.
    pub message: Message,
    /// `NEW_MESSAGE` notification for the recipient.
    pub notification: Notification,
}

/// Posts a message to a booking thread or directly to a user.
///
/// # Errors
///
/// - [`DomainError::Validation`]: empty or long body, missing or self recipient
/// - [`DomainError::NotFound`]: unknown booking or recipient
/// - [`DomainError::Forbidden`]: the sender is not a booking participant
#[tracing::instrument(skip(env, request))]
pub async fn send(
    env: &ServiceEnvironment,
    sender: UserId,
    request: SendMessage,
) -> Result<MessageOutcome, DomainError> {
    let recipient = match (request.booking_id, request.recipient_id) {
        (Some(booking_id), _) => {
            let booking = env
                .store
                .get_booking(booking_id)
                .await?
                .ok_or_else(|| DomainError::not_found("Booking", booking_id))?;
            booking
                .counterpart(sender)
                .ok_or_else(|| DomainError::forbidden("Not a participant of this booking"))?
        }
        (None, Some(recipient)) => {
            if recipient == sender {
                return Err(DomainError::validation(
                    "recipient_id",
                    "cannot message yourself",
                ));
            }
            if env.store.get_user(recipient).await?.is_none() {
                return Err(DomainError::not_found("User", recipient));
            }
            recipient
        }
        (None, None) => {
            return Err(DomainError::validation(
                "recipient_id",
                "is required without booking_id",
            ));
        }
    };

    let now = env.now();
    let message = Message::new(request.booking_id, sender, recipient, &request.body, now)?;
    let notification = Notification::new(
        recipient,
        NotificationPayload::new_message(message.id, sender, message.booking_id, &message.body),
        now,
    );
    let unit = UnitOfWork {
        messages: vec![message.clone()],
        notifications: vec![notification.clone()],
        ..UnitOfWork::new()
    };
    env.store.commit(unit).await?;
    Ok(MessageOutcome {
        message,
        notification,
    })
}

/// A booking's thread, oldest first, for a participant.
///
/// # Errors
///
/// [`DomainError::NotFound`] for an unknown booking,
/// [`DomainError::Forbidden`] for a non-participant.
pub async fn booking_thread(
    env: &ServiceEnvironment,
    caller: UserId,
    booking_id: BookingId,
) -> Result<Vec<Message>, DomainError> {
    super::booking::get(env, caller, booking_id).await?;
    Ok(env.store.booking_thread(booking_id).await?)
}

/// Direct messages between the caller and `other`, oldest first.
///
/// # Errors
///
/// Propagates store failures.
pub async fn direct_thread(
    env: &ServiceEnvironment,
    caller: UserId,
    other: UserId,
) -> Result<Vec<Message>, DomainError> {
    Ok(env.store.direct_thread(caller, other).await?)
}
