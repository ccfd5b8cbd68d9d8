//! Rating completed bookings.

use super::ServiceEnvironment;
use crate::booking::{BookingStatus, ReputationDelta};
use crate::error::DomainError;
use crate::ids::{BookingId, UserId};
use crate::notification::{Notification, NotificationPayload};
use crate::rating::Rating;
use crate::store::UnitOfWork;
use serde::Deserialize;

/// Client input for `POST /ratings`.
#[derive(Clone, Debug, Deserialize)]
pub struct RateRequest {
    /// Completed booking.
    pub booking_id: BookingId,
    /// Score, 1 to 5.
    pub score: u8,
    /// Optional comment.
    #[serde(default)]
    pub comment: Option<String>,
}

/// A committed rating.
#[derive(Clone, Debug)]
pub struct RatingOutcome {
    /// Stored rating.
    pub rating: Rating,
    /// `RATING_RECEIVED` notification for the ratee.
    pub notification: Notification,
}

/// Rates the counterpart of a completed booking.
///
/// The rating, the ratee's reputation increase and the recomputed average
/// are one commit.
///
/// # Errors
///
/// - [`DomainError::Validation`]: score outside 1-5 or long comment
/// - [`DomainError::NotFound`]: unknown booking
/// - [`DomainError::Forbidden`]: the rater is not a participant
/// - [`DomainError::Conflict`]: booking not completed, or already rated by the caller
#[tracing::instrument(skip(env, request), fields(booking_id = %request.booking_id))]
pub async fn rate(
    env: &ServiceEnvironment,
    rater: UserId,
    request: RateRequest,
) -> Result<RatingOutcome, DomainError> {
    let booking = super::booking::get(env, rater, request.booking_id).await?;
    if booking.status != BookingStatus::Completed {
        return Err(DomainError::conflict("Only completed bookings can be rated"));
    }
    let Some(ratee) = booking.counterpart(rater) else {
        return Err(DomainError::forbidden("Not a participant of this booking"));
    };

    let now = env.now();
    let rating = Rating::new(booking.id, rater, ratee, request.score, request.comment, now)?;
    let notification = Notification::new(
        ratee,
        NotificationPayload::RatingReceived {
            rating_id: rating.id,
            booking_id: booking.id,
            rater_id: rater,
            score: rating.score,
        },
        now,
    );
    let unit = UnitOfWork {
        reputation: vec![ReputationDelta {
            user_id: ratee,
            delta: rating.reputation_delta(),
        }],
        notifications: vec![notification.clone()],
        rating: Some(rating.clone()),
        ..UnitOfWork::new()
    };
    env.store.commit(unit).await?;
    tracing::info!(rating_id = %rating.id, score = rating.score, "Booking rated");
    Ok(RatingOutcome {
        rating,
        notification,
    })
}

/// Ratings received by a user, newest first.
///
/// # Errors
///
/// Propagates store failures.
pub async fn received(env: &ServiceEnvironment, user: UserId) -> Result<Vec<Rating>, DomainError> {
    Ok(env.store.ratings_for(user).await?)
}
