//! WebSocket frames.
//!
//! Every frame is `{ "event": "<name>", "data": { ... } }` in both
//! directions.

use serde::{Deserialize, Serialize};
use timebank_core::booking::{Booking, BookingStatus};
use timebank_core::ids::{BookingId, UserId};
use timebank_core::message::Message;
use timebank_core::notification::Notification;

/// Self-reported availability of a connected user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// Connected and available.
    Online,
    /// Connected, idle.
    Away,
    /// Connected, do not disturb.
    Busy,
    /// Last connection closed.
    Offline,
}

/// Frames sent by clients.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Start receiving a booking's events.
    JoinRequest {
        /// Booking to watch.
        booking_id: BookingId,
    },
    /// Stop receiving a booking's events.
    LeaveRequest {
        /// Booking to stop watching.
        booking_id: BookingId,
    },
    /// Post to a booking thread.
    SendMessage {
        /// Thread.
        booking_id: BookingId,
        /// Text.
        body: String,
    },
    /// Post a direct message.
    SendDirectMessage {
        /// Addressee.
        recipient_id: UserId,
        /// Text.
        body: String,
    },
    /// The user started typing in a booking thread.
    TypingStart {
        /// Thread.
        booking_id: BookingId,
    },
    /// The user stopped typing.
    TypingStop {
        /// Thread.
        booking_id: BookingId,
    },
    /// Move a booking to a new status (accept, decline, cancel, complete).
    RequestStatusUpdate {
        /// Booking to transition.
        booking_id: BookingId,
        /// Target status.
        status: BookingStatus,
    },
    /// Change the user's presence.
    UpdateStatus {
        /// New presence.
        status: PresenceStatus,
    },
}

/// Frames pushed to clients.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// A message was posted to a thread the client follows.
    NewMessage(Message),
    /// A notification for the connected user.
    Notification(Notification),
    /// Someone is typing in a booking thread.
    UserTyping {
        /// Thread.
        booking_id: BookingId,
        /// Who is typing.
        user_id: UserId,
        /// `false` once they stop.
        typing: bool,
    },
    /// A booking changed status.
    RequestStatusChanged {
        /// Booking as stored after the change.
        booking: Booking,
        /// Status before the change.
        previous: Option<BookingStatus>,
    },
    /// A user's presence changed.
    UserStatusChanged {
        /// User concerned.
        user_id: UserId,
        /// New presence.
        status: PresenceStatus,
    },
    /// A client frame could not be processed.
    Error {
        /// Machine readable code, as in HTTP error bodies.
        code: String,
        /// Human readable reason.
        message: String,
    },
}

impl ServerEvent {
    /// An `error` frame.
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}
