//! Display-oriented records of credit movements.
//!
//! For bookings these duplicate the ledger; for transfers and bonuses they are
//! the human-facing record next to the ledger rows written in the same commit.

use crate::hours::Hours;
use crate::ids::{BookingId, TransactionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What kind of movement a transaction records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Provider side of a completed booking.
    Earned,
    /// Receiver side of a completed booking.
    Spent,
    /// Direct user-to-user transfer.
    Transfer,
    /// Credits granted by the platform.
    Bonus,
}

impl TransactionType {
    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Earned => "EARNED",
            Self::Spent => "SPENT",
            Self::Transfer => "TRANSFER",
            Self::Bonus => "BONUS",
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EARNED" => Ok(Self::Earned),
            "SPENT" => Ok(Self::Spent),
            "TRANSFER" => Ok(Self::Transfer),
            "BONUS" => Ok(Self::Bonus),
            other => Err(format!("unknown transaction type: {other}")),
        }
    }
}

/// Settlement state of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Settled.
    Completed,
    /// Recorded but not settled.
    Pending,
    /// Rejected.
    Failed,
}

impl TransactionStatus {
    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "COMPLETED",
            Self::Pending => "PENDING",
            Self::Failed => "FAILED",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMPLETED" => Ok(Self::Completed),
            "PENDING" => Ok(Self::Pending),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

/// A credit movement between two users (or from the platform).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Identifier.
    pub id: TransactionId,
    /// Paying user; `None` for platform bonuses.
    pub sender_id: Option<UserId>,
    /// Credited user.
    pub receiver_id: UserId,
    /// Amount moved.
    pub amount: Hours,
    /// Movement kind.
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    /// Settlement state.
    pub status: TransactionStatus,
    /// Booking that produced the movement, if any.
    pub ref_booking_id: Option<BookingId>,
    /// Free-form description.
    pub description: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// A settled transaction.
    #[must_use]
    pub fn completed(
        tx_type: TransactionType,
        sender_id: Option<UserId>,
        receiver_id: UserId,
        amount: Hours,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            sender_id,
            receiver_id,
            amount,
            tx_type,
            status: TransactionStatus::Completed,
            ref_booking_id: None,
            description: None,
            created_at: now,
        }
    }

    /// Links the transaction to a booking.
    #[must_use]
    pub const fn for_booking(mut self, booking_id: BookingId) -> Self {
        self.ref_booking_id = Some(booking_id);
        self
    }

    /// Attaches a description.
    #[must_use]
    pub fn described(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Whether this record belongs in `user`'s history.
    ///
    /// Booking completions write one EARNED and one SPENT record with the
    /// same parties; each is shown only to the side it describes.
    #[must_use]
    pub fn visible_to(&self, user: UserId) -> bool {
        match self.tx_type {
            TransactionType::Earned => self.receiver_id == user,
            TransactionType::Spent => self.sender_id == Some(user),
            TransactionType::Transfer | TransactionType::Bonus => {
                self.receiver_id == user || self.sender_id == Some(user)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_records_are_shown_to_one_side_each() {
        let payer = UserId::new();
        let provider = UserId::new();
        let now = Utc::now();
        let earned = Transaction::completed(
            TransactionType::Earned,
            Some(payer),
            provider,
            Hours::whole(3),
            now,
        );
        let spent = Transaction::completed(
            TransactionType::Spent,
            Some(payer),
            provider,
            Hours::whole(3),
            now,
        );
        assert!(earned.visible_to(provider) && !earned.visible_to(payer));
        assert!(spent.visible_to(payer) && !spent.visible_to(provider));
    }

    #[test]
    fn transfers_are_shown_to_both_parties() {
        let (a, b) = (UserId::new(), UserId::new());
        let t = Transaction::completed(TransactionType::Transfer, Some(a), b, Hours::whole(1), Utc::now());
        assert!(t.visible_to(a) && t.visible_to(b));
        assert!(!t.visible_to(UserId::new()));
    }
}
