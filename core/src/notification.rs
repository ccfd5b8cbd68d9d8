//! Notifications and their typed payloads.
//!
//! Each notification kind has exactly one payload shape. On the wire and in
//! storage a notification is `{ "kind": "BOOKING_ACCEPTED", "payload": {...} }`.

use crate::hours::Hours;
use crate::ids::{BookingId, MessageId, NotificationId, RatingId, TransactionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of a message preview embedded in a notification.
const PREVIEW_CHARS: usize = 80;

/// Kind-specific notification content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationPayload {
    /// A receiver asked the provider for time.
    BookingRequested {
        /// Booking concerned.
        booking_id: BookingId,
        /// Who asked.
        receiver_id: UserId,
        /// Requested hours.
        hours: Hours,
        /// Service category.
        category: String,
    },
    /// The provider accepted.
    BookingAccepted {
        /// Booking concerned.
        booking_id: BookingId,
        /// Accepting provider.
        provider_id: UserId,
        /// Agreed slot, if one was proposed.
        start_at: Option<DateTime<Utc>>,
    },
    /// The provider declined.
    BookingDeclined {
        /// Booking concerned.
        booking_id: BookingId,
        /// Declining provider.
        provider_id: UserId,
    },
    /// A participant cancelled.
    BookingCancelled {
        /// Booking concerned.
        booking_id: BookingId,
        /// Participant who cancelled.
        cancelled_by: UserId,
    },
    /// The exchange was confirmed complete.
    BookingCompleted {
        /// Booking concerned.
        booking_id: BookingId,
        /// Hours exchanged.
        hours: Hours,
        /// The other participant.
        counterpart_id: UserId,
    },
    /// Hours credited for a completed booking.
    CreditsEarned {
        /// Booking concerned.
        booking_id: BookingId,
        /// Hours credited.
        hours: Hours,
        /// Who paid.
        from_user_id: UserId,
    },
    /// Hours debited for a completed booking.
    CreditsSpent {
        /// Booking concerned.
        booking_id: BookingId,
        /// Hours debited.
        hours: Hours,
        /// Who was paid.
        to_user_id: UserId,
    },
    /// A direct transfer arrived.
    CreditsReceived {
        /// Transfer record.
        transaction_id: TransactionId,
        /// Amount received.
        amount: Hours,
        /// Sender.
        sender_id: UserId,
    },
    /// The platform granted credits.
    BonusGranted {
        /// Bonus record.
        transaction_id: TransactionId,
        /// Amount granted.
        amount: Hours,
        /// Why.
        reason: String,
    },
    /// A chat message arrived.
    NewMessage {
        /// Message concerned.
        message_id: MessageId,
        /// Author.
        sender_id: UserId,
        /// Booking thread, `None` for direct messages.
        booking_id: Option<BookingId>,
        /// Start of the message body.
        preview: String,
    },
    /// Someone rated the user.
    RatingReceived {
        /// Rating concerned.
        rating_id: RatingId,
        /// Rated booking.
        booking_id: BookingId,
        /// Author of the rating.
        rater_id: UserId,
        /// Score given (1-5).
        score: u8,
    },
}

impl NotificationPayload {
    /// The `kind` discriminator as stored in the database.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BookingRequested { .. } => "BOOKING_REQUESTED",
            Self::BookingAccepted { .. } => "BOOKING_ACCEPTED",
            Self::BookingDeclined { .. } => "BOOKING_DECLINED",
            Self::BookingCancelled { .. } => "BOOKING_CANCELLED",
            Self::BookingCompleted { .. } => "BOOKING_COMPLETED",
            Self::CreditsEarned { .. } => "CREDITS_EARNED",
            Self::CreditsSpent { .. } => "CREDITS_SPENT",
            Self::CreditsReceived { .. } => "CREDITS_RECEIVED",
            Self::BonusGranted { .. } => "BONUS_GRANTED",
            Self::NewMessage { .. } => "NEW_MESSAGE",
            Self::RatingReceived { .. } => "RATING_RECEIVED",
        }
    }

    /// Builds a message notification, truncating the preview.
    #[must_use]
    pub fn new_message(
        message_id: MessageId,
        sender_id: UserId,
        booking_id: Option<BookingId>,
        body: &str,
    ) -> Self {
        Self::NewMessage {
            message_id,
            sender_id,
            booking_id,
            preview: body.chars().take(PREVIEW_CHARS).collect(),
        }
    }

    /// Splits the payload into `(kind, payload-json)` for storage.
    ///
    /// # Errors
    ///
    /// Returns a serde error if the payload cannot be encoded.
    pub fn to_parts(&self) -> Result<(&'static str, serde_json::Value), serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        let payload = value
            .get_mut("payload")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null);
        Ok((self.kind(), payload))
    }

    /// Reassembles a payload from its stored `(kind, payload-json)` parts.
    ///
    /// # Errors
    ///
    /// Returns a serde error if the kind is unknown or the JSON does not match
    /// the kind's shape.
    pub fn from_parts(kind: &str, payload: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::json!({ "kind": kind, "payload": payload }))
    }
}

/// A notification addressed to one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Identifier.
    pub id: NotificationId,
    /// Addressee.
    pub user_id: UserId,
    /// Kind and payload.
    #[serde(flatten)]
    pub payload: NotificationPayload,
    /// When the addressee marked it read.
    pub read_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// A new unread notification.
    #[must_use]
    pub fn new(user_id: UserId, payload: NotificationPayload, now: DateTime<Utc>) -> Self {
        Self {
            id: NotificationId::new(),
            user_id,
            payload,
            read_at: None,
            created_at: now,
        }
    }

    /// Whether the addressee has read it.
    #[must_use]
    pub const fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}
