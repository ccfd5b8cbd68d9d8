//! Append-only ledger and the derived balance.
//!
//! The ledger is the single source of truth for how many hours a user holds:
//!
//! ```text
//! balance(user) = Σ hours(EARNED) − Σ hours(SPENT)
//! ```
//!
//! Entries are inserted and never updated or deleted. `User::credits` is only
//! a projection of this sum.

use crate::hours::Hours;
use crate::ids::{BookingId, LedgerEntryId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of a ledger entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    /// Hours credited to the user.
    Earned,
    /// Hours debited from the user.
    Spent,
}

impl EntryType {
    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Earned => "EARNED",
            Self::Spent => "SPENT",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EARNED" => Ok(Self::Earned),
            "SPENT" => Ok(Self::Spent),
            other => Err(format!("unknown ledger entry type: {other}")),
        }
    }
}

/// One immutable ledger row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Entry identifier.
    pub id: LedgerEntryId,
    /// Account holder.
    pub user_id: UserId,
    /// Always positive; direction is carried by `entry_type`.
    pub hours: Hours,
    /// Earned or spent.
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Booking that produced the entry, if any.
    pub ref_booking_id: Option<BookingId>,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// A credit for `user_id`.
    #[must_use]
    pub fn earned(
        user_id: UserId,
        hours: Hours,
        ref_booking_id: Option<BookingId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(user_id, hours, EntryType::Earned, ref_booking_id, now)
    }

    /// A debit for `user_id`.
    #[must_use]
    pub fn spent(
        user_id: UserId,
        hours: Hours,
        ref_booking_id: Option<BookingId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(user_id, hours, EntryType::Spent, ref_booking_id, now)
    }

    fn new(
        user_id: UserId,
        hours: Hours,
        entry_type: EntryType,
        ref_booking_id: Option<BookingId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LedgerEntryId::new(),
            user_id,
            hours,
            entry_type,
            ref_booking_id,
            created_at: now,
        }
    }

    /// Signed contribution of this entry to the owner's balance.
    #[must_use]
    pub fn signed_hours(&self) -> Hours {
        match self.entry_type {
            EntryType::Earned => self.hours,
            EntryType::Spent => -self.hours,
        }
    }
}

/// Aggregated ledger sums for one user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    /// Σ hours of EARNED entries.
    pub earned: Hours,
    /// Σ hours of SPENT entries.
    pub spent: Hours,
}

impl LedgerTotals {
    /// Totals from raw sums.
    #[must_use]
    pub const fn new(earned: Hours, spent: Hours) -> Self {
        Self { earned, spent }
    }

    /// Folds a sequence of entries belonging to one user.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Self {
        entries
            .into_iter()
            .fold(Self::default(), |mut totals, entry| {
                match entry.entry_type {
                    EntryType::Earned => totals.earned += entry.hours,
                    EntryType::Spent => totals.spent += entry.hours,
                }
                totals
            })
    }

    /// `earned − spent`.
    #[must_use]
    pub fn balance(&self) -> Hours {
        self.earned - self.spent
    }
}
