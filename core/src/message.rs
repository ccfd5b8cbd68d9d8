//! Chat messages: booking threads and direct conversations.

use crate::error::DomainError;
use crate::ids::{BookingId, MessageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum message length in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// A chat message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier.
    pub id: MessageId,
    /// Booking thread, `None` for a direct message.
    pub booking_id: Option<BookingId>,
    /// Author.
    pub sender_id: UserId,
    /// Addressee.
    pub recipient_id: UserId,
    /// Text.
    pub body: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Builds a message after validating the body.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] if the trimmed body is empty or
    /// longer than [`MAX_MESSAGE_CHARS`].
    pub fn new(
        booking_id: Option<BookingId>,
        sender_id: UserId,
        recipient_id: UserId,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let body = validate_body(body)?;
        Ok(Self {
            id: MessageId::new(),
            booking_id,
            sender_id,
            recipient_id,
            body,
            created_at: now,
        })
    }
}

fn validate_body(body: &str) -> Result<String, DomainError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("body", "is required"));
    }
    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        return Err(DomainError::validation(
            "body",
            format!("must be at most {MAX_MESSAGE_CHARS} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_is_trimmed_and_bounded() {
        let (a, b) = (UserId::new(), UserId::new());
        let now = Utc::now();
        assert!(Message::new(None, a, b, "   ", now).is_err());
        assert!(Message::new(None, a, b, &"y".repeat(MAX_MESSAGE_CHARS + 1), now).is_err());
        let ok = Message::new(None, a, b, "  hello ", now);
        assert!(matches!(ok, Ok(ref m) if m.body == "hello"));
    }
}
