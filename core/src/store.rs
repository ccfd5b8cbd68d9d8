//! Storage abstraction.
//!
//! All persistent state goes through [`TimebankStore`]. Reads are individual
//! queries; every write goes through [`TimebankStore::commit`], which applies
//! a [`UnitOfWork`] atomically: either every row in it is persisted or none
//! is.
//!
//! # Implementations
//!
//! - `PostgresStore` (in `timebank-postgres`): production, one SQL
//!   transaction per commit.
//! - `InMemoryStore` (in `timebank-testing`): validates the whole unit before
//!   applying any of it.
//!
//! # Dyn Compatibility
//!
//! Methods return boxed futures instead of using `async fn` so that services
//! and handlers can share one `Arc<dyn TimebankStore>`.

use crate::booking::{BalanceGuard, Booking, BookingEffect, BookingStatus, ReputationDelta};
use crate::hours::Hours;
use crate::ids::{BookingId, NotificationId, UserId};
use crate::ledger::{LedgerEntry, LedgerTotals};
use crate::message::Message;
use crate::notification::Notification;
use crate::rating::Rating;
use crate::transaction::Transaction;
use crate::user::{Profile, ProviderProfile, User};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use thiserror::Error;

/// Boxed future returned by store methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors raised by store implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A [`BalanceGuard`] in the unit of work was not satisfied.
    #[error("Insufficient balance for user {user_id}: available {available}, required {required}")]
    InsufficientBalance {
        /// Payer.
        user_id: UserId,
        /// Ledger balance at commit time.
        available: Hours,
        /// Amount the guard required.
        required: Hours,
    },

    /// A conditional booking update found the booking in another state.
    #[error("{0}")]
    StaleWrite(String),

    /// A uniqueness constraint was violated.
    #[error("{0}")]
    Duplicate(String),

    /// A row the unit of work depends on does not exist.
    #[error("{entity} with id {id} not found")]
    NotFound {
        /// Kind of row.
        entity: &'static str,
        /// Identifier.
        id: String,
    },

    /// Connection or query failure.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored value could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Which side of the booking the caller is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingRole {
    /// Bookings where the caller provides the service.
    Provider,
    /// Bookings where the caller receives the service.
    Receiver,
}

impl FromStr for BookingRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "provider" => Ok(Self::Provider),
            "receiver" => Ok(Self::Receiver),
            other => Err(format!("unknown booking role: {other}")),
        }
    }
}

/// Criteria for [`TimebankStore::list_bookings`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BookingFilter {
    /// Participant whose bookings are listed.
    pub user_id: UserId,
    /// Restrict to one side; both when `None`.
    pub role: Option<BookingRole>,
    /// Restrict to one status.
    pub status: Option<BookingStatus>,
}

impl BookingFilter {
    /// Whether `booking` satisfies the filter.
    #[must_use]
    pub fn matches(&self, booking: &Booking) -> bool {
        let side = match self.role {
            Some(BookingRole::Provider) => booking.provider_id == self.user_id,
            Some(BookingRole::Receiver) => booking.receiver_id == self.user_id,
            None => booking.is_participant(self.user_id),
        };
        side && self.status.is_none_or(|s| s == booking.status)
    }
}

/// Criteria for [`TimebankStore::list_notifications`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NotificationFilter {
    /// Addressee.
    pub user_id: UserId,
    /// Only notifications without `read_at`.
    pub unread_only: bool,
    /// Maximum number returned, newest first.
    pub limit: usize,
}

/// How the booking row of a unit of work is written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingWrite {
    /// Insert a new booking.
    Insert(Booking),
    /// Overwrite the booking only if its stored status is still `expected`.
    Update {
        /// New row contents.
        booking: Booking,
        /// Status the caller read before reducing.
        expected: BookingStatus,
    },
}

impl BookingWrite {
    /// The booking being written.
    #[must_use]
    pub const fn booking(&self) -> &Booking {
        match self {
            Self::Insert(booking) | Self::Update { booking, .. } => booking,
        }
    }
}

/// Everything one operation writes, applied atomically by
/// [`TimebankStore::commit`].
///
/// Commit order: balance guards, booking write, rating insert, ledger rows,
/// transactions, reputation deltas, messages, notifications, then the
/// `credits` projection of every user touched by a ledger row and the
/// `avg_rating` of a rated user.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnitOfWork {
    /// Booking insert or conditional update.
    pub booking: Option<BookingWrite>,
    /// Preconditions on ledger balances.
    pub balance_guards: Vec<BalanceGuard>,
    /// Ledger rows to append.
    pub ledger: Vec<LedgerEntry>,
    /// Transaction records to insert.
    pub transactions: Vec<Transaction>,
    /// Reputation changes.
    pub reputation: Vec<ReputationDelta>,
    /// Messages to insert.
    pub messages: Vec<Message>,
    /// Notifications to insert.
    pub notifications: Vec<Notification>,
    /// Rating to insert; unique per (booking, rater).
    pub rating: Option<Rating>,
}

impl UnitOfWork {
    /// An empty unit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A unit writing `booking` along with the reducer's effects.
    #[must_use]
    pub fn for_booking(write: BookingWrite, effects: impl IntoIterator<Item = BookingEffect>) -> Self {
        let mut unit = Self {
            booking: Some(write),
            ..Self::default()
        };
        unit.extend(effects);
        unit
    }

    /// Routes each effect into the matching write list.
    pub fn extend(&mut self, effects: impl IntoIterator<Item = BookingEffect>) {
        for effect in effects {
            match effect {
                BookingEffect::Notify(n) => self.notifications.push(n),
                BookingEffect::RequireBalance(g) => self.balance_guards.push(g),
                BookingEffect::AppendLedger(e) => self.ledger.push(e),
                BookingEffect::RecordTransaction(t) => self.transactions.push(t),
                BookingEffect::AdjustReputation(d) => self.reputation.push(d),
                BookingEffect::PostMessage(m) => self.messages.push(m),
            }
        }
    }

    /// Users whose ledger changes in this unit, in a stable order.
    #[must_use]
    pub fn ledger_users(&self) -> BTreeSet<UserId> {
        self.ledger.iter().map(|e| e.user_id).collect()
    }
}

/// Persistent state of the marketplace.
pub trait TimebankStore: Send + Sync {
    /// Inserts a user. Used by provisioning and tests.
    ///
    /// # Errors
    ///
    /// [`StoreError::Duplicate`] if the id or email is taken.
    fn insert_user(&self, user: User) -> StoreFuture<'_, ()>;

    /// Inserts or replaces a user's skills and categories. `avg_rating` is
    /// kept as stored.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the user does not exist.
    fn upsert_profile(&self, profile: Profile) -> StoreFuture<'_, ()>;

    /// Loads a user.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    fn get_user(&self, id: UserId) -> StoreFuture<'_, Option<User>>;

    /// Loads a profile.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    fn get_profile(&self, user_id: UserId) -> StoreFuture<'_, Option<Profile>>;

    /// Every provider profile, in a stable order (oldest user first).
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    fn list_profiles(&self) -> StoreFuture<'_, Vec<ProviderProfile>>;

    /// Loads a booking.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    fn get_booking(&self, id: BookingId) -> StoreFuture<'_, Option<Booking>>;

    /// Bookings matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    fn list_bookings(&self, filter: BookingFilter) -> StoreFuture<'_, Vec<Booking>>;

    /// A user's ledger rows, newest first.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    fn ledger_entries(&self, user_id: UserId, limit: usize) -> StoreFuture<'_, Vec<LedgerEntry>>;

    /// Ledger rows referencing a booking.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    fn ledger_entries_for_booking(&self, booking_id: BookingId) -> StoreFuture<'_, Vec<LedgerEntry>>;

    /// Σ EARNED and Σ SPENT for a user.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    fn ledger_totals(&self, user_id: UserId) -> StoreFuture<'_, LedgerTotals>;

    /// Transactions visible to a user, newest first.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    fn list_transactions(&self, user_id: UserId, limit: usize) -> StoreFuture<'_, Vec<Transaction>>;

    /// Transactions referencing a booking.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    fn transactions_for_booking(&self, booking_id: BookingId) -> StoreFuture<'_, Vec<Transaction>>;

    /// Notifications matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    fn list_notifications(&self, filter: NotificationFilter) -> StoreFuture<'_, Vec<Notification>>;

    /// Loads a notification.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    fn get_notification(&self, id: NotificationId) -> StoreFuture<'_, Option<Notification>>;

    /// Sets `read_at` unless already set; returns the stored notification.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the notification does not exist.
    fn mark_notification_read(
        &self,
        id: NotificationId,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Notification>;

    /// Marks every unread notification of a user; returns how many changed.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    fn mark_all_notifications_read(&self, user_id: UserId, at: DateTime<Utc>) -> StoreFuture<'_, u64>;

    /// A booking's thread, oldest first.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    fn booking_thread(&self, booking_id: BookingId) -> StoreFuture<'_, Vec<Message>>;

    /// Direct messages between two users, oldest first.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    fn direct_thread(&self, a: UserId, b: UserId) -> StoreFuture<'_, Vec<Message>>;

    /// Ratings received by a user, newest first.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    fn ratings_for(&self, ratee_id: UserId) -> StoreFuture<'_, Vec<Rating>>;

    /// Applies a unit of work atomically.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InsufficientBalance`]: a balance guard failed
    /// - [`StoreError::StaleWrite`]: the booking's status changed concurrently
    /// - [`StoreError::Duplicate`]: the rating already exists
    /// - [`StoreError::NotFound`]: a referenced user does not exist
    /// - [`StoreError::Database`]: query failure
    ///
    /// Nothing is persisted when any error is returned.
    fn commit(&self, unit: UnitOfWork) -> StoreFuture<'_, ()>;

    /// Connectivity check for health probes.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] when the backend is unreachable.
    fn ping(&self) -> StoreFuture<'_, ()>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::booking::{BookingDraft, BookingEnvironment, BookingReducer};
    use crate::environment::SystemClock;
    use std::sync::Arc;

    #[test]
    fn effects_are_routed_into_the_unit() {
        let (provider, receiver) = (UserId::new(), UserId::new());
        let env = BookingEnvironment::new(Arc::new(SystemClock));
        let (booking, effects) = BookingReducer
            .request(
                receiver,
                BookingDraft {
                    provider_id: provider,
                    hours: Hours::whole(2),
                    category: "music".into(),
                    note: Some("Guitar lesson?".into()),
                },
                &env,
            )
            .unwrap();
        let unit = UnitOfWork::for_booking(BookingWrite::Insert(booking.clone()), effects);
        assert_eq!(unit.booking.as_ref().map(BookingWrite::booking), Some(&booking));
        assert_eq!(unit.messages.len(), 1);
        assert_eq!(unit.messages[0].body, "Guitar lesson?");
        assert_eq!(unit.notifications.len(), 1);
        assert!(unit.ledger_users().is_empty());
    }

    #[test]
    fn filter_respects_role_and_status() {
        let (provider, receiver) = (UserId::new(), UserId::new());
        let env = BookingEnvironment::new(Arc::new(SystemClock));
        let (booking, _) = BookingReducer
            .request(
                receiver,
                BookingDraft {
                    provider_id: provider,
                    hours: Hours::whole(1),
                    category: "music".into(),
                    note: None,
                },
                &env,
            )
            .unwrap();
        let filter = |user_id, role, status| BookingFilter {
            user_id,
            role,
            status,
        };
        assert!(filter(provider, None, None).matches(&booking));
        assert!(filter(provider, Some(BookingRole::Provider), None).matches(&booking));
        assert!(!filter(provider, Some(BookingRole::Receiver), None).matches(&booking));
        assert!(!filter(receiver, None, Some(BookingStatus::Accepted)).matches(&booking));
        assert!(!filter(UserId::new(), None, None).matches(&booking));
        assert_eq!("Provider".parse::<BookingRole>(), Ok(BookingRole::Provider));
    }
}
