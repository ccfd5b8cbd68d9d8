//! Ratings left after a completed booking.

use crate::error::DomainError;
use crate::ids::{BookingId, RatingId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum comment length in characters.
const MAX_COMMENT_CHARS: usize = 1000;

/// A 1-5 score given by one participant to the other.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    /// Identifier.
    pub id: RatingId,
    /// Rated booking.
    pub booking_id: BookingId,
    /// Author.
    pub rater_id: UserId,
    /// Subject.
    pub ratee_id: UserId,
    /// Score, 1 to 5.
    pub score: u8,
    /// Optional comment.
    pub comment: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Rating {
    /// Builds a rating after validating score and comment.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] for a score outside 1-5 or an
    /// overlong comment.
    pub fn new(
        booking_id: BookingId,
        rater_id: UserId,
        ratee_id: UserId,
        score: u8,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if !(1..=5).contains(&score) {
            return Err(DomainError::validation("score", "must be between 1 and 5"));
        }
        let comment = comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if comment
            .as_ref()
            .is_some_and(|c| c.chars().count() > MAX_COMMENT_CHARS)
        {
            return Err(DomainError::validation(
                "comment",
                format!("must be at most {MAX_COMMENT_CHARS} characters"),
            ));
        }
        Ok(Self {
            id: RatingId::new(),
            booking_id,
            rater_id,
            ratee_id,
            score,
            comment,
            created_at: now,
        })
    }

    /// Reputation gained by the ratee.
    #[must_use]
    pub fn reputation_delta(&self) -> i64 {
        i64::from(self.score)
    }
}

/// Average of a set of scores, 0 when empty.
#[must_use]
pub fn average_score(scores: impl IntoIterator<Item = u8>) -> f64 {
    let (sum, count) = scores
        .into_iter()
        .fold((0u64, 0u32), |(sum, n), s| (sum + u64::from(s), n + 1));
    if count == 0 {
        0.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let sum = sum as f64;
        sum / f64::from(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_bounds() {
        let now = Utc::now();
        let (b, r, e) = (BookingId::new(), UserId::new(), UserId::new());
        assert!(Rating::new(b, r, e, 0, None, now).is_err());
        assert!(Rating::new(b, r, e, 6, None, now).is_err());
        assert!(Rating::new(b, r, e, 5, Some("  ".into()), now).is_ok_and(|r| r.comment.is_none()));
    }

    #[test]
    fn averages() {
        assert!((average_score([]) - 0.0).abs() < f64::EPSILON);
        assert!((average_score([5, 4, 3]) - 4.0).abs() < f64::EPSILON);
    }
}
