//! Users and the read-only profile data used for matching.

use crate::hours::Hours;
use crate::ids::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A marketplace member.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Identifier (also the `sub` claim of the user's tokens).
    pub id: UserId,
    /// Contact address, used for best-effort email.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Cached projection of the ledger balance, refreshed whenever ledger
    /// rows for this user are written.
    pub credits: Hours,
    /// Reputation score; grows with completed bookings and ratings.
    pub reputation: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Creates a user with zero credits and reputation.
    #[must_use]
    pub fn new(email: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: UserId::new(),
            email: email.into(),
            name: name.into(),
            credits: Hours::ZERO,
            reputation: 0,
            created_at: now,
        }
    }
}

/// Skills and categories a user offers, with their rating average.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Owner of the profile.
    pub user_id: UserId,
    /// Offered skills, lower-case.
    pub skills: Vec<String>,
    /// Service categories, lower-case.
    pub categories: Vec<String>,
    /// Average received rating, 0 when unrated.
    pub avg_rating: f64,
}

/// A profile joined with the user fields matching needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Provider identifier.
    pub user_id: UserId,
    /// Display name.
    pub name: String,
    /// Current reputation.
    pub reputation: i64,
    /// Offered skills.
    pub skills: Vec<String>,
    /// Offered categories.
    pub categories: Vec<String>,
    /// Average received rating.
    pub avg_rating: f64,
}
