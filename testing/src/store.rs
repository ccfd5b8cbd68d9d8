//! In-memory [`TimebankStore`].
//!
//! Rows live in insertion-ordered vectors behind one `tokio` lock. A commit
//! takes the write lock, validates the whole unit of work and only then
//! applies it, so a failed commit leaves no trace and concurrent commits are
//! serialized exactly like conflicting SQL transactions.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use timebank_core::booking::Booking;
use timebank_core::ids::{BookingId, NotificationId, UserId};
use timebank_core::ledger::{LedgerEntry, LedgerTotals};
use timebank_core::message::Message;
use timebank_core::notification::Notification;
use timebank_core::rating::{Rating, average_score};
use timebank_core::store::{
    BookingFilter, BookingWrite, NotificationFilter, StoreError, StoreFuture, TimebankStore,
    UnitOfWork,
};
use timebank_core::transaction::Transaction;
use timebank_core::user::{Profile, ProviderProfile, User};
use tokio::sync::RwLock;

/// Every row held by an [`InMemoryStore`], in insertion order.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// Users.
    pub users: Vec<User>,
    /// Profiles.
    pub profiles: Vec<Profile>,
    /// Bookings.
    pub bookings: Vec<Booking>,
    /// Ledger rows.
    pub ledger: Vec<LedgerEntry>,
    /// Transactions.
    pub transactions: Vec<Transaction>,
    /// Notifications.
    pub notifications: Vec<Notification>,
    /// Messages.
    pub messages: Vec<Message>,
    /// Ratings.
    pub ratings: Vec<Rating>,
}

impl Snapshot {
    fn user(&self, id: UserId) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    fn user_mut(&mut self, id: UserId) -> Result<&mut User, StoreError> {
        self.users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| user_not_found(id))
    }

    fn totals(&self, user_id: UserId) -> LedgerTotals {
        LedgerTotals::from_entries(self.ledger.iter().filter(|e| e.user_id == user_id))
    }

    /// Ledger rows of one user.
    #[must_use]
    pub fn ledger_of(&self, user_id: UserId) -> Vec<&LedgerEntry> {
        self.ledger.iter().filter(|e| e.user_id == user_id).collect()
    }

    /// Notifications addressed to one user, oldest first.
    #[must_use]
    pub fn notifications_of(&self, user_id: UserId) -> Vec<&Notification> {
        self.notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .collect()
    }

    fn validate(&self, unit: &UnitOfWork) -> Result<(), StoreError> {
        for guard in &unit.balance_guards {
            if self.user(guard.user_id).is_none() {
                return Err(user_not_found(guard.user_id));
            }
            let available = self.totals(guard.user_id).balance();
            if available < guard.required {
                return Err(StoreError::InsufficientBalance {
                    user_id: guard.user_id,
                    available,
                    required: guard.required,
                });
            }
        }

        match &unit.booking {
            Some(BookingWrite::Insert(booking)) => {
                if self.bookings.iter().any(|b| b.id == booking.id) {
                    return Err(StoreError::Duplicate(format!(
                        "Booking {} already exists",
                        booking.id
                    )));
                }
                for user in [booking.provider_id, booking.receiver_id] {
                    if self.user(user).is_none() {
                        return Err(user_not_found(user));
                    }
                }
            }
            Some(BookingWrite::Update { booking, expected }) => {
                let stored = self
                    .bookings
                    .iter()
                    .find(|b| b.id == booking.id)
                    .ok_or_else(|| StoreError::NotFound {
                        entity: "Booking",
                        id: booking.id.to_string(),
                    })?;
                if stored.status != *expected {
                    return Err(StoreError::StaleWrite(format!(
                        "Booking is no longer {expected}; it is now {}",
                        stored.status
                    )));
                }
            }
            None => {}
        }

        if let Some(rating) = &unit.rating {
            if self
                .ratings
                .iter()
                .any(|r| r.booking_id == rating.booking_id && r.rater_id == rating.rater_id)
            {
                return Err(StoreError::Duplicate(
                    "You have already rated this booking".to_string(),
                ));
            }
        }

        let referenced = unit
            .ledger
            .iter()
            .map(|e| e.user_id)
            .chain(unit.reputation.iter().map(|d| d.user_id))
            .chain(unit.notifications.iter().map(|n| n.user_id));
        for user in referenced {
            if self.user(user).is_none() {
                return Err(user_not_found(user));
            }
        }
        Ok(())
    }

    fn apply(&mut self, unit: UnitOfWork) -> Result<(), StoreError> {
        let ledger_users = unit.ledger_users();
        let rated = unit.rating.as_ref().map(|r| r.ratee_id);

        match unit.booking {
            Some(BookingWrite::Insert(booking)) => self.bookings.push(booking),
            Some(BookingWrite::Update { booking, .. }) => {
                if let Some(stored) = self.bookings.iter_mut().find(|b| b.id == booking.id) {
                    *stored = booking;
                }
            }
            None => {}
        }
        self.ratings.extend(unit.rating);
        self.ledger.extend(unit.ledger);
        self.transactions.extend(unit.transactions);
        for delta in unit.reputation {
            self.user_mut(delta.user_id)?.reputation += delta.delta;
        }
        self.messages.extend(unit.messages);
        self.notifications.extend(unit.notifications);

        for user in ledger_users {
            let balance = self.totals(user).balance();
            self.user_mut(user)?.credits = balance;
        }
        if let Some(ratee) = rated {
            let avg = average_score(
                self.ratings
                    .iter()
                    .filter(|r| r.ratee_id == ratee)
                    .map(|r| r.score),
            );
            match self.profiles.iter_mut().find(|p| p.user_id == ratee) {
                Some(profile) => profile.avg_rating = avg,
                None => self.profiles.push(Profile {
                    user_id: ratee,
                    avg_rating: avg,
                    ..Profile::default()
                }),
            }
        }
        Ok(())
    }
}

fn user_not_found(id: UserId) -> StoreError {
    StoreError::NotFound {
        entity: "User",
        id: id.to_string(),
    }
}

fn newest<T>(rows: impl DoubleEndedIterator<Item = T>, limit: usize) -> Vec<T> {
    rows.rev().take(limit).collect()
}

/// Thread-safe in-memory store. Cloning shares the underlying rows.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<Snapshot>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every row, for assertions.
    pub async fn snapshot(&self) -> Snapshot {
        self.state.read().await.clone()
    }
}

impl TimebankStore for InMemoryStore {
    fn insert_user(&self, user: User) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            if state
                .users
                .iter()
                .any(|u| u.id == user.id || u.email.eq_ignore_ascii_case(&user.email))
            {
                return Err(StoreError::Duplicate(format!(
                    "User {} already exists",
                    user.email
                )));
            }
            state.users.push(user);
            Ok(())
        })
    }

    fn upsert_profile(&self, profile: Profile) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            if state.user(profile.user_id).is_none() {
                return Err(user_not_found(profile.user_id));
            }
            match state.profiles.iter_mut().find(|p| p.user_id == profile.user_id) {
                Some(stored) => {
                    stored.skills = profile.skills;
                    stored.categories = profile.categories;
                }
                None => state.profiles.push(profile),
            }
            Ok(())
        })
    }

    fn get_user(&self, id: UserId) -> StoreFuture<'_, Option<User>> {
        Box::pin(async move { Ok(self.state.read().await.user(id).cloned()) })
    }

    fn get_profile(&self, user_id: UserId) -> StoreFuture<'_, Option<Profile>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state.profiles.iter().find(|p| p.user_id == user_id).cloned())
        })
    }

    fn list_profiles(&self) -> StoreFuture<'_, Vec<ProviderProfile>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .users
                .iter()
                .filter_map(|u| {
                    let p = state.profiles.iter().find(|p| p.user_id == u.id)?;
                    Some(ProviderProfile {
                        user_id: u.id,
                        name: u.name.clone(),
                        reputation: u.reputation,
                        skills: p.skills.clone(),
                        categories: p.categories.clone(),
                        avg_rating: p.avg_rating,
                    })
                })
                .collect())
        })
    }

    fn get_booking(&self, id: BookingId) -> StoreFuture<'_, Option<Booking>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state.bookings.iter().find(|b| b.id == id).cloned())
        })
    }

    fn list_bookings(&self, filter: BookingFilter) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(newest(
                state.bookings.iter().filter(|b| filter.matches(b)).cloned(),
                usize::MAX,
            ))
        })
    }

    fn ledger_entries(&self, user_id: UserId, limit: usize) -> StoreFuture<'_, Vec<LedgerEntry>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(newest(
                state.ledger.iter().filter(|e| e.user_id == user_id).cloned(),
                limit,
            ))
        })
    }

    fn ledger_entries_for_booking(&self, booking_id: BookingId) -> StoreFuture<'_, Vec<LedgerEntry>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .ledger
                .iter()
                .filter(|e| e.ref_booking_id == Some(booking_id))
                .cloned()
                .collect())
        })
    }

    fn ledger_totals(&self, user_id: UserId) -> StoreFuture<'_, LedgerTotals> {
        Box::pin(async move { Ok(self.state.read().await.totals(user_id)) })
    }

    fn list_transactions(&self, user_id: UserId, limit: usize) -> StoreFuture<'_, Vec<Transaction>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(newest(
                state
                    .transactions
                    .iter()
                    .filter(|t| t.visible_to(user_id))
                    .cloned(),
                limit,
            ))
        })
    }

    fn transactions_for_booking(&self, booking_id: BookingId) -> StoreFuture<'_, Vec<Transaction>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .transactions
                .iter()
                .filter(|t| t.ref_booking_id == Some(booking_id))
                .cloned()
                .collect())
        })
    }

    fn list_notifications(&self, filter: NotificationFilter) -> StoreFuture<'_, Vec<Notification>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(newest(
                state
                    .notifications
                    .iter()
                    .filter(|n| n.user_id == filter.user_id && !(filter.unread_only && n.is_read()))
                    .cloned(),
                filter.limit,
            ))
        })
    }

    fn get_notification(&self, id: NotificationId) -> StoreFuture<'_, Option<Notification>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state.notifications.iter().find(|n| n.id == id).cloned())
        })
    }

    fn mark_notification_read(
        &self,
        id: NotificationId,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Notification> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let notification = state
                .notifications
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or_else(|| StoreError::NotFound {
                    entity: "Notification",
                    id: id.to_string(),
                })?;
            notification.read_at.get_or_insert(at);
            Ok(notification.clone())
        })
    }

    fn mark_all_notifications_read(&self, user_id: UserId, at: DateTime<Utc>) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let mut count = 0;
            for n in state
                .notifications
                .iter_mut()
                .filter(|n| n.user_id == user_id && n.read_at.is_none())
            {
                n.read_at = Some(at);
                count += 1;
            }
            Ok(count)
        })
    }

    fn booking_thread(&self, booking_id: BookingId) -> StoreFuture<'_, Vec<Message>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .messages
                .iter()
                .filter(|m| m.booking_id == Some(booking_id))
                .cloned()
                .collect())
        })
    }

    fn direct_thread(&self, a: UserId, b: UserId) -> StoreFuture<'_, Vec<Message>> {
        Box::pin(async move {
            let pair: HashSet<UserId> = [a, b].into_iter().collect();
            let state = self.state.read().await;
            Ok(state
                .messages
                .iter()
                .filter(|m| {
                    m.booking_id.is_none()
                        && pair.contains(&m.sender_id)
                        && pair.contains(&m.recipient_id)
                        && m.sender_id != m.recipient_id
                })
                .cloned()
                .collect())
        })
    }

    fn ratings_for(&self, ratee_id: UserId) -> StoreFuture<'_, Vec<Rating>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(newest(
                state.ratings.iter().filter(|r| r.ratee_id == ratee_id).cloned(),
                usize::MAX,
            ))
        })
    }

    fn commit(&self, unit: UnitOfWork) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.validate(&unit)?;
            state.apply(unit)
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use timebank_core::booking::BalanceGuard;
    use timebank_core::hours::Hours;

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio_test::block_on(f)
    }

    #[test]
    fn failed_guard_persists_nothing() {
        block_on(async {
            let store = InMemoryStore::new();
            let user = User::new("a@example.com", "A", Utc::now());
            store.insert_user(user.clone()).await.unwrap();

            let unit = UnitOfWork {
                balance_guards: vec![BalanceGuard {
                    user_id: user.id,
                    required: Hours::whole(1),
                }],
                ledger: vec![LedgerEntry::spent(user.id, Hours::whole(1), None, Utc::now())],
                ..UnitOfWork::new()
            };
            let err = store.commit(unit).await.unwrap_err();
            assert!(matches!(err, StoreError::InsufficientBalance { .. }));
            assert!(store.snapshot().await.ledger.is_empty());
        });
    }

    #[test]
    fn ledger_rows_refresh_credits() {
        block_on(async {
            let store = InMemoryStore::new();
            let user = User::new("a@example.com", "A", Utc::now());
            store.insert_user(user.clone()).await.unwrap();
            let unit = UnitOfWork {
                ledger: vec![LedgerEntry::earned(user.id, Hours::whole(4), None, Utc::now())],
                ..UnitOfWork::new()
            };
            store.commit(unit).await.unwrap();
            let stored = store.get_user(user.id).await.unwrap().unwrap();
            assert_eq!(stored.credits, Hours::whole(4));
        });
    }

    #[test]
    fn unknown_user_in_unit_is_rejected_atomically() {
        block_on(async {
            let store = InMemoryStore::new();
            let known = User::new("a@example.com", "A", Utc::now());
            store.insert_user(known.clone()).await.unwrap();
            let unit = UnitOfWork {
                ledger: vec![
                    LedgerEntry::earned(known.id, Hours::whole(1), None, Utc::now()),
                    LedgerEntry::earned(UserId::new(), Hours::whole(1), None, Utc::now()),
                ],
                ..UnitOfWork::new()
            };
            assert!(matches!(
                store.commit(unit).await,
                Err(StoreError::NotFound { entity: "User", .. })
            ));
            assert!(store.snapshot().await.ledger.is_empty());
        });
    }

    #[test]
    fn duplicate_email_is_rejected() {
        block_on(async {
            let store = InMemoryStore::new();
            store
                .insert_user(User::new("a@example.com", "A", Utc::now()))
                .await
                .unwrap();
            let again = store
                .insert_user(User::new("A@example.com", "Other", Utc::now()))
                .await;
            assert!(matches!(again, Err(StoreError::Duplicate(_))));
        });
    }
}
