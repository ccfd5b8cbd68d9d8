//! `PostgreSQL` storage for TimeBank.
//!
//! [`PostgresStore`] implements [`TimebankStore`] on top of a `sqlx` pool.
//! Reads are single queries against the pool; [`TimebankStore::commit`] runs
//! the whole unit of work in one SQL transaction (see [`commit`]).
//!
//! # Example
//!
//! ```ignore
//! use timebank_postgres::PostgresStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresStore::connect("postgres://localhost/timebank", 10).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod commit;
mod decode;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use timebank_core::booking::Booking;
use timebank_core::ids::{BookingId, NotificationId, UserId};
use timebank_core::ledger::{LedgerEntry, LedgerTotals};
use timebank_core::message::Message;
use timebank_core::notification::Notification;
use timebank_core::rating::Rating;
use timebank_core::store::{
    BookingFilter, BookingRole, NotificationFilter, StoreError, StoreFuture, TimebankStore,
    UnitOfWork,
};
use timebank_core::transaction::Transaction;
use timebank_core::user::{Profile, ProviderProfile, User};
use tracing::Instrument;

/// Maps a `sqlx` error to [`StoreError::Database`] with some context.
pub(crate) fn db(context: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| StoreError::Database(format!("Failed to {context}: {e}"))
}

/// Whether the error is a unique-constraint violation.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Whether the error is a foreign-key violation.
pub(crate) fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

/// Boxes a store operation inside a `store` span named after it.
fn traced<'a, T>(
    op: &'static str,
    future: impl std::future::Future<Output = Result<T, StoreError>> + Send + 'a,
) -> StoreFuture<'a, T> {
    Box::pin(future.instrument(tracing::debug_span!("store", op)))
}

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

const USER_COLUMNS: &str = "id, email, name, credits, reputation, created_at";
const BOOKING_COLUMNS: &str = "id, provider_id, receiver_id, hours, category, note, status, \
     start_at, accepted_at, cancelled_at, completed_at, created_at, updated_at";
const LEDGER_COLUMNS: &str = "id, user_id, hours, entry_type, ref_booking_id, created_at";
const TRANSACTION_COLUMNS: &str = "id, sender_id, receiver_id, amount, tx_type, status, \
     ref_booking_id, description, created_at";
const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, payload, read_at, created_at";
const MESSAGE_COLUMNS: &str = "id, booking_id, sender_id, recipient_id, body, created_at";
const RATING_COLUMNS: &str = "id, booking_id, rater_id, ratee_id, score, comment, created_at";

/// `PostgreSQL`-backed [`TimebankStore`].
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] if the database is unreachable.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(db("connect to database"))?;
        Ok(Self::from_pool(pool))
    }

    /// Runs the embedded migrations.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl TimebankStore for PostgresStore {
    fn insert_user(&self, user: User) -> StoreFuture<'_, ()> {
        traced("insert_user", async move {
            sqlx::query(
                "INSERT INTO users (id, email, name, credits, reputation, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(*user.id.as_uuid())
            .bind(&user.email)
            .bind(&user.name)
            .bind(user.credits.as_decimal())
            .bind(user.reputation)
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Duplicate(format!("User {} already exists", user.email))
                } else {
                    db("insert user")(e)
                }
            })?;
            Ok(())
        })
    }

    fn upsert_profile(&self, profile: Profile) -> StoreFuture<'_, ()> {
        traced("upsert_profile", async move {
            sqlx::query(
                "INSERT INTO profiles (user_id, skills, categories) VALUES ($1, $2, $3) \
                 ON CONFLICT (user_id) DO UPDATE \
                 SET skills = EXCLUDED.skills, categories = EXCLUDED.categories",
            )
            .bind(*profile.user_id.as_uuid())
            .bind(&profile.skills)
            .bind(&profile.categories)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StoreError::NotFound {
                        entity: "User",
                        id: profile.user_id.to_string(),
                    }
                } else {
                    db("upsert profile")(e)
                }
            })?;
            Ok(())
        })
    }

    fn get_user(&self, id: UserId) -> StoreFuture<'_, Option<User>> {
        traced("get_user", async move {
            let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(*id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db("get user"))?;
            row.as_ref().map(decode::user).transpose()
        })
    }

    fn get_profile(&self, user_id: UserId) -> StoreFuture<'_, Option<Profile>> {
        traced("get_profile", async move {
            let row = sqlx::query(
                "SELECT user_id, skills, categories, avg_rating FROM profiles WHERE user_id = $1",
            )
            .bind(*user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db("get profile"))?;
            row.as_ref().map(decode::profile).transpose()
        })
    }

    fn list_profiles(&self) -> StoreFuture<'_, Vec<ProviderProfile>> {
        traced("list_profiles", async move {
            let rows = sqlx::query(
                "SELECT p.user_id, u.name, u.reputation, p.skills, p.categories, p.avg_rating \
                 FROM profiles p JOIN users u ON u.id = p.user_id \
                 ORDER BY u.seq",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(db("list profiles"))?;
            decode::all(&rows, decode::provider_profile)
        })
    }

    fn get_booking(&self, id: BookingId) -> StoreFuture<'_, Option<Booking>> {
        traced("get_booking", async move {
            let row = sqlx::query(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
                .bind(*id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db("get booking"))?;
            row.as_ref().map(decode::booking).transpose()
        })
    }

    fn list_bookings(&self, filter: BookingFilter) -> StoreFuture<'_, Vec<Booking>> {
        traced("list_bookings", async move {
            let side = match filter.role {
                Some(BookingRole::Provider) => "provider_id = $1",
                Some(BookingRole::Receiver) => "receiver_id = $1",
                None => "(provider_id = $1 OR receiver_id = $1)",
            };
            let rows = sqlx::query(&format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings \
                 WHERE {side} AND ($2::TEXT IS NULL OR status = $2) \
                 ORDER BY created_at DESC, seq DESC"
            ))
            .bind(*filter.user_id.as_uuid())
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(db("list bookings"))?;
            decode::all(&rows, decode::booking)
        })
    }

    fn ledger_entries(&self, user_id: UserId, n: usize) -> StoreFuture<'_, Vec<LedgerEntry>> {
        traced("ledger_entries", async move {
            let rows = sqlx::query(&format!(
                "SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE user_id = $1 \
                 ORDER BY created_at DESC, seq DESC LIMIT $2"
            ))
            .bind(*user_id.as_uuid())
            .bind(limit(n))
            .fetch_all(&self.pool)
            .await
            .map_err(db("load ledger"))?;
            decode::all(&rows, decode::ledger_entry)
        })
    }

    fn ledger_entries_for_booking(&self, booking_id: BookingId) -> StoreFuture<'_, Vec<LedgerEntry>> {
        traced("ledger_entries_for_booking", async move {
            let rows = sqlx::query(&format!(
                "SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE ref_booking_id = $1 ORDER BY seq"
            ))
            .bind(*booking_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db("load booking ledger"))?;
            decode::all(&rows, decode::ledger_entry)
        })
    }

    fn ledger_totals(&self, user_id: UserId) -> StoreFuture<'_, LedgerTotals> {
        traced("ledger_totals", async move {
            let (earned, spent): (Decimal, Decimal) = sqlx::query_as(
                "SELECT \
                   COALESCE(SUM(hours) FILTER (WHERE entry_type = 'EARNED'), 0), \
                   COALESCE(SUM(hours) FILTER (WHERE entry_type = 'SPENT'), 0) \
                 FROM ledger_entries WHERE user_id = $1",
            )
            .bind(*user_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(db("sum ledger"))?;
            Ok(LedgerTotals::new(decode::normalized(earned), decode::normalized(spent)))
        })
    }

    fn list_transactions(&self, user_id: UserId, n: usize) -> StoreFuture<'_, Vec<Transaction>> {
        traced("list_transactions", async move {
            let rows = sqlx::query(&format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions \
                 WHERE (tx_type IN ('TRANSFER', 'BONUS') AND (sender_id = $1 OR receiver_id = $1)) \
                    OR (tx_type = 'EARNED' AND receiver_id = $1) \
                    OR (tx_type = 'SPENT' AND sender_id = $1) \
                 ORDER BY created_at DESC, seq DESC LIMIT $2"
            ))
            .bind(*user_id.as_uuid())
            .bind(limit(n))
            .fetch_all(&self.pool)
            .await
            .map_err(db("list transactions"))?;
            decode::all(&rows, decode::transaction)
        })
    }

    fn transactions_for_booking(&self, booking_id: BookingId) -> StoreFuture<'_, Vec<Transaction>> {
        traced("transactions_for_booking", async move {
            let rows = sqlx::query(&format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE ref_booking_id = $1 ORDER BY seq"
            ))
            .bind(*booking_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db("load booking transactions"))?;
            decode::all(&rows, decode::transaction)
        })
    }

    fn list_notifications(&self, filter: NotificationFilter) -> StoreFuture<'_, Vec<Notification>> {
        traced("list_notifications", async move {
            let rows = sqlx::query(&format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
                 WHERE user_id = $1 AND (NOT $2 OR read_at IS NULL) \
                 ORDER BY created_at DESC, seq DESC LIMIT $3"
            ))
            .bind(*filter.user_id.as_uuid())
            .bind(filter.unread_only)
            .bind(limit(filter.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db("list notifications"))?;
            decode::all(&rows, decode::notification)
        })
    }

    fn get_notification(&self, id: NotificationId) -> StoreFuture<'_, Option<Notification>> {
        traced("get_notification", async move {
            let row = sqlx::query(&format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1"
            ))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db("get notification"))?;
            row.as_ref().map(decode::notification).transpose()
        })
    }

    fn mark_notification_read(
        &self,
        id: NotificationId,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Notification> {
        traced("mark_notification_read", async move {
            let row = sqlx::query(&format!(
                "UPDATE notifications SET read_at = COALESCE(read_at, $2) WHERE id = $1 \
                 RETURNING {NOTIFICATION_COLUMNS}"
            ))
            .bind(*id.as_uuid())
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(db("mark notification read"))?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Notification",
                id: id.to_string(),
            })?;
            decode::notification(&row)
        })
    }

    fn mark_all_notifications_read(&self, user_id: UserId, at: DateTime<Utc>) -> StoreFuture<'_, u64> {
        traced("mark_all_notifications_read", async move {
            let result = sqlx::query(
                "UPDATE notifications SET read_at = $2 WHERE user_id = $1 AND read_at IS NULL",
            )
            .bind(*user_id.as_uuid())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(db("mark notifications read"))?;
            Ok(result.rows_affected())
        })
    }

    fn booking_thread(&self, booking_id: BookingId) -> StoreFuture<'_, Vec<Message>> {
        traced("booking_thread", async move {
            let rows = sqlx::query(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE booking_id = $1 \
                 ORDER BY created_at, seq"
            ))
            .bind(*booking_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db("load booking thread"))?;
            decode::all(&rows, decode::message)
        })
    }

    fn direct_thread(&self, a: UserId, b: UserId) -> StoreFuture<'_, Vec<Message>> {
        traced("direct_thread", async move {
            let rows = sqlx::query(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages \
                 WHERE booking_id IS NULL \
                   AND ((sender_id = $1 AND recipient_id = $2) \
                     OR (sender_id = $2 AND recipient_id = $1)) \
                 ORDER BY created_at, seq"
            ))
            .bind(*a.as_uuid())
            .bind(*b.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db("load direct thread"))?;
            decode::all(&rows, decode::message)
        })
    }

    fn ratings_for(&self, ratee_id: UserId) -> StoreFuture<'_, Vec<Rating>> {
        traced("ratings_for", async move {
            let rows = sqlx::query(&format!(
                "SELECT {RATING_COLUMNS} FROM ratings WHERE ratee_id = $1 \
                 ORDER BY created_at DESC, seq DESC"
            ))
            .bind(*ratee_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db("list ratings"))?;
            decode::all(&rows, decode::rating)
        })
    }

    fn commit(&self, unit: UnitOfWork) -> StoreFuture<'_, ()> {
        let span = tracing::debug_span!(
            "commit",
            booking = ?unit.booking.as_ref().map(|w| w.booking().id),
            ledger_rows = unit.ledger.len(),
        );
        Box::pin(
            async move {
                let started = std::time::Instant::now();
                let mut tx = self.pool.begin().await.map_err(db("begin transaction"))?;
                let outcome = match commit::apply(&mut tx, &unit).await {
                    Ok(()) => tx.commit().await.map_err(db("commit transaction")),
                    Err(e) => {
                        if let Err(rollback) = tx.rollback().await {
                            tracing::warn!(error = %rollback, "rollback failed");
                        }
                        Err(e)
                    }
                };
                metrics::histogram!(
                    "timebank_store_commit_duration_seconds",
                    "outcome" => if outcome.is_ok() { "ok" } else { "error" }
                )
                .record(started.elapsed().as_secs_f64());
                outcome
            }
            .instrument(span),
        )
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        traced("ping", async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(db("ping database"))?;
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn operations_run_inside_a_store_span() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let span = traced("get_user", async {
            let current = tracing::Span::current();
            Ok(current.metadata().map(|m| (m.name(), m.fields().field("op").is_some())))
        })
        .await
        .unwrap();

        assert_eq!(span, Some(("store", true)));
    }
}
