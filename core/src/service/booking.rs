//! Booking lifecycle operations.

use super::ServiceEnvironment;
use crate::booking::{Booking, BookingAction, BookingDraft, BookingReducer, BookingStatus};
use crate::error::DomainError;
use crate::ids::{BookingId, UserId};
use crate::message::Message;
use crate::notification::Notification;
use crate::store::{BookingFilter, BookingWrite, UnitOfWork};
use chrono::{DateTime, Utc};

/// Result of a committed booking operation.
#[derive(Clone, Debug)]
pub struct BookingOutcome {
    /// Booking as stored.
    pub booking: Booking,
    /// Status before the operation; `None` for a new booking.
    pub previous: Option<BookingStatus>,
    /// Notifications persisted in the same commit.
    pub notifications: Vec<Notification>,
    /// Messages persisted in the same commit.
    pub messages: Vec<Message>,
}

/// Opens a PENDING booking from `receiver` to the draft's provider.
///
/// # Errors
///
/// - [`DomainError::Validation`]: invalid draft or self-booking
/// - [`DomainError::NotFound`]: the provider does not exist
#[tracing::instrument(skip(env, draft), fields(provider = %draft.provider_id))]
pub async fn create(
    env: &ServiceEnvironment,
    receiver: UserId,
    draft: BookingDraft,
) -> Result<BookingOutcome, DomainError> {
    let (booking, effects) = BookingReducer::new().request(receiver, draft, &env.booking_env())?;
    if env.store.get_user(booking.provider_id).await?.is_none() {
        return Err(DomainError::not_found("User", booking.provider_id));
    }

    let unit = UnitOfWork::for_booking(BookingWrite::Insert(booking.clone()), effects);
    let outcome = BookingOutcome {
        booking,
        previous: None,
        notifications: unit.notifications.clone(),
        messages: unit.messages.clone(),
    };
    env.store.commit(unit).await?;
    tracing::info!(booking_id = %outcome.booking.id, "Booking requested");
    Ok(outcome)
}

/// Provider accepts a PENDING booking, optionally fixing the slot.
///
/// # Errors
///
/// See [`transition`].
pub async fn accept(
    env: &ServiceEnvironment,
    actor: UserId,
    id: BookingId,
    slot: Option<DateTime<Utc>>,
) -> Result<BookingOutcome, DomainError> {
    transition(env, id, BookingAction::Accept { actor, slot }).await
}

/// Provider declines a PENDING booking.
///
/// # Errors
///
/// See [`transition`].
pub async fn decline(
    env: &ServiceEnvironment,
    actor: UserId,
    id: BookingId,
) -> Result<BookingOutcome, DomainError> {
    transition(env, id, BookingAction::Decline { actor }).await
}

/// Either participant cancels a PENDING or ACCEPTED booking.
///
/// # Errors
///
/// See [`transition`].
pub async fn cancel(
    env: &ServiceEnvironment,
    actor: UserId,
    id: BookingId,
) -> Result<BookingOutcome, DomainError> {
    transition(env, id, BookingAction::Cancel { actor }).await
}

/// Either participant confirms an ACCEPTED booking; settles the hours.
///
/// # Errors
///
/// See [`transition`]; additionally [`DomainError::InsufficientBalance`]
/// when the receiver's ledger balance does not cover the hours.
pub async fn confirm_completion(
    env: &ServiceEnvironment,
    actor: UserId,
    id: BookingId,
) -> Result<BookingOutcome, DomainError> {
    transition(env, id, BookingAction::ConfirmCompletion { actor }).await
}

/// Loads, reduces and conditionally writes a booking.
///
/// The write only succeeds if the stored status still equals the status the
/// reducer saw, so of two concurrent transitions at most one commits.
///
/// # Errors
///
/// - [`DomainError::NotFound`]: unknown booking
/// - [`DomainError::Forbidden`]: the actor may not perform the action
/// - [`DomainError::Conflict`]: wrong status, or the status changed meanwhile
#[tracing::instrument(skip(env), fields(action = action.label()))]
pub async fn transition(
    env: &ServiceEnvironment,
    id: BookingId,
    action: BookingAction,
) -> Result<BookingOutcome, DomainError> {
    let mut booking = env
        .store
        .get_booking(id)
        .await?
        .ok_or_else(|| DomainError::not_found("Booking", id))?;
    let expected = booking.status;

    let effects = BookingReducer::new().reduce(&mut booking, action, &env.booking_env())?;
    let unit = UnitOfWork::for_booking(
        BookingWrite::Update {
            booking: booking.clone(),
            expected,
        },
        effects,
    );
    let outcome = BookingOutcome {
        booking,
        previous: Some(expected),
        notifications: unit.notifications.clone(),
        messages: unit.messages.clone(),
    };
    env.store.commit(unit).await?;
    tracing::info!(
        booking_id = %id,
        from = %expected,
        to = %outcome.booking.status,
        "Booking transitioned"
    );
    Ok(outcome)
}

/// Returns a booking to one of its participants.
///
/// # Errors
///
/// [`DomainError::NotFound`] for an unknown booking,
/// [`DomainError::Forbidden`] for a non-participant.
pub async fn get(
    env: &ServiceEnvironment,
    caller: UserId,
    id: BookingId,
) -> Result<Booking, DomainError> {
    let booking = env
        .store
        .get_booking(id)
        .await?
        .ok_or_else(|| DomainError::not_found("Booking", id))?;
    if booking.is_participant(caller) {
        Ok(booking)
    } else {
        Err(DomainError::forbidden("Not a participant of this booking"))
    }
}

/// The caller's bookings, newest first.
///
/// # Errors
///
/// Propagates store failures.
pub async fn list(env: &ServiceEnvironment, filter: BookingFilter) -> Result<Vec<Booking>, DomainError> {
    Ok(env.store.list_bookings(filter).await?)
}
