//! Transactional application of a [`UnitOfWork`].
//!
//! Every user the unit references is locked first (`FOR UPDATE`, in id order)
//! so that concurrent commits touching the same accounts serialize instead of
//! deadlocking. Balance guards are then checked against the ledger sum under
//! that lock. The booking update is conditional on the status the caller
//! read, so of two racing transitions only one matches a row.

use crate::{db, is_unique_violation};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use std::collections::BTreeSet;
use timebank_core::hours::Hours;
use timebank_core::ids::UserId;
use timebank_core::store::{BookingWrite, StoreError, UnitOfWork};
use uuid::Uuid;

/// Every user a unit of work writes or references.
#[must_use]
pub fn referenced_users(unit: &UnitOfWork) -> BTreeSet<UserId> {
    let mut users = unit.ledger_users();
    users.extend(unit.balance_guards.iter().map(|g| g.user_id));
    users.extend(unit.reputation.iter().map(|r| r.user_id));
    users.extend(unit.notifications.iter().map(|n| n.user_id));
    users.extend(
        unit.messages
            .iter()
            .flat_map(|m| [m.sender_id, m.recipient_id]),
    );
    for tx in &unit.transactions {
        users.insert(tx.receiver_id);
        users.extend(tx.sender_id);
    }
    if let Some(write) = &unit.booking {
        let booking = write.booking();
        users.extend([booking.provider_id, booking.receiver_id]);
    }
    if let Some(rating) = &unit.rating {
        users.extend([rating.rater_id, rating.ratee_id]);
    }
    users
}

/// Applies `unit` on `conn`, which must be inside a transaction.
///
/// # Errors
///
/// See [`TimebankStore::commit`](timebank_core::store::TimebankStore::commit).
pub async fn apply(conn: &mut PgConnection, unit: &UnitOfWork) -> Result<(), StoreError> {
    lock_users(conn, &referenced_users(unit)).await?;

    for guard in &unit.balance_guards {
        let available = ledger_balance(conn, guard.user_id).await?;
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
            sqlx::query(
                "INSERT INTO bookings (id, provider_id, receiver_id, hours, category, note, \
                 status, start_at, accepted_at, cancelled_at, completed_at, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            )
            .bind(*booking.id.as_uuid())
            .bind(*booking.provider_id.as_uuid())
            .bind(*booking.receiver_id.as_uuid())
            .bind(booking.hours.as_decimal())
            .bind(&booking.category)
            .bind(&booking.note)
            .bind(booking.status.as_str())
            .bind(booking.start_at)
            .bind(booking.accepted_at)
            .bind(booking.cancelled_at)
            .bind(booking.completed_at)
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Duplicate(format!("Booking {} already exists", booking.id))
                } else {
                    db("insert booking")(e)
                }
            })?;
        }
        Some(BookingWrite::Update { booking, expected }) => {
            let updated = sqlx::query(
                "UPDATE bookings SET status = $2, start_at = $3, accepted_at = $4, \
                 cancelled_at = $5, completed_at = $6, updated_at = $7 \
                 WHERE id = $1 AND status = $8",
            )
            .bind(*booking.id.as_uuid())
            .bind(booking.status.as_str())
            .bind(booking.start_at)
            .bind(booking.accepted_at)
            .bind(booking.cancelled_at)
            .bind(booking.completed_at)
            .bind(booking.updated_at)
            .bind(expected.as_str())
            .execute(&mut *conn)
            .await
            .map_err(db("update booking"))?;

            if updated.rows_affected() == 0 {
                let current: Option<String> =
                    sqlx::query_scalar("SELECT status FROM bookings WHERE id = $1")
                        .bind(*booking.id.as_uuid())
                        .fetch_optional(&mut *conn)
                        .await
                        .map_err(db("load booking status"))?;
                return Err(match current {
                    Some(status) => StoreError::StaleWrite(format!(
                        "Booking is no longer {expected}; it is now {status}"
                    )),
                    None => StoreError::NotFound {
                        entity: "Booking",
                        id: booking.id.to_string(),
                    },
                });
            }
        }
        None => {}
    }

    if let Some(rating) = &unit.rating {
        sqlx::query(
            "INSERT INTO ratings (id, booking_id, rater_id, ratee_id, score, comment, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(*rating.id.as_uuid())
        .bind(*rating.booking_id.as_uuid())
        .bind(*rating.rater_id.as_uuid())
        .bind(*rating.ratee_id.as_uuid())
        .bind(i16::from(rating.score))
        .bind(&rating.comment)
        .bind(rating.created_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate("You have already rated this booking".to_string())
            } else {
                db("insert rating")(e)
            }
        })?;
    }

    for entry in &unit.ledger {
        sqlx::query(
            "INSERT INTO ledger_entries (id, user_id, hours, entry_type, ref_booking_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(*entry.id.as_uuid())
        .bind(*entry.user_id.as_uuid())
        .bind(entry.hours.as_decimal())
        .bind(entry.entry_type.as_str())
        .bind(entry.ref_booking_id.map(|id| *id.as_uuid()))
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await
        .map_err(db("append ledger entry"))?;
    }

    for tx in &unit.transactions {
        sqlx::query(
            "INSERT INTO transactions (id, sender_id, receiver_id, amount, tx_type, status, \
             ref_booking_id, description, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(*tx.id.as_uuid())
        .bind(tx.sender_id.map(|id| *id.as_uuid()))
        .bind(*tx.receiver_id.as_uuid())
        .bind(tx.amount.as_decimal())
        .bind(tx.tx_type.as_str())
        .bind(tx.status.as_str())
        .bind(tx.ref_booking_id.map(|id| *id.as_uuid()))
        .bind(&tx.description)
        .bind(tx.created_at)
        .execute(&mut *conn)
        .await
        .map_err(db("insert transaction"))?;
    }

    for delta in &unit.reputation {
        sqlx::query("UPDATE users SET reputation = reputation + $2 WHERE id = $1")
            .bind(*delta.user_id.as_uuid())
            .bind(delta.delta)
            .execute(&mut *conn)
            .await
            .map_err(db("adjust reputation"))?;
    }

    for message in &unit.messages {
        sqlx::query(
            "INSERT INTO messages (id, booking_id, sender_id, recipient_id, body, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(*message.id.as_uuid())
        .bind(message.booking_id.map(|id| *id.as_uuid()))
        .bind(*message.sender_id.as_uuid())
        .bind(*message.recipient_id.as_uuid())
        .bind(&message.body)
        .bind(message.created_at)
        .execute(&mut *conn)
        .await
        .map_err(db("insert message"))?;
    }

    for notification in &unit.notifications {
        let (kind, payload) = notification
            .payload
            .to_parts()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        sqlx::query(
            "INSERT INTO notifications (id, user_id, kind, payload, read_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(*notification.id.as_uuid())
        .bind(*notification.user_id.as_uuid())
        .bind(kind)
        .bind(payload)
        .bind(notification.read_at)
        .bind(notification.created_at)
        .execute(&mut *conn)
        .await
        .map_err(db("insert notification"))?;
    }

    for user in unit.ledger_users() {
        sqlx::query(
            "UPDATE users SET credits = (\
               SELECT COALESCE(SUM(CASE WHEN entry_type = 'EARNED' THEN hours ELSE -hours END), 0) \
               FROM ledger_entries WHERE user_id = $1) \
             WHERE id = $1",
        )
        .bind(*user.as_uuid())
        .execute(&mut *conn)
        .await
        .map_err(db("refresh credits"))?;
    }

    if let Some(rating) = &unit.rating {
        sqlx::query(
            "INSERT INTO profiles (user_id, avg_rating) \
             SELECT $1, AVG(score)::DOUBLE PRECISION FROM ratings WHERE ratee_id = $1 \
             ON CONFLICT (user_id) DO UPDATE SET avg_rating = EXCLUDED.avg_rating",
        )
        .bind(*rating.ratee_id.as_uuid())
        .execute(&mut *conn)
        .await
        .map_err(db("refresh average rating"))?;
    }

    Ok(())
}

async fn lock_users(conn: &mut PgConnection, users: &BTreeSet<UserId>) -> Result<(), StoreError> {
    if users.is_empty() {
        return Ok(());
    }
    let ids: Vec<Uuid> = users.iter().map(|u| *u.as_uuid()).collect();
    let locked: Vec<Uuid> =
        sqlx::query_scalar("SELECT id FROM users WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(&ids)
            .fetch_all(&mut *conn)
            .await
            .map_err(db("lock users"))?;
    match users.iter().find(|u| !locked.contains(u.as_uuid())) {
        Some(missing) => Err(StoreError::NotFound {
            entity: "User",
            id: missing.to_string(),
        }),
        None => Ok(()),
    }
}

async fn ledger_balance(conn: &mut PgConnection, user: UserId) -> Result<Hours, StoreError> {
    let balance: Decimal = sqlx::query_scalar(
        "SELECT COALESCE(SUM(CASE WHEN entry_type = 'EARNED' THEN hours ELSE -hours END), 0) \
         FROM ledger_entries WHERE user_id = $1",
    )
    .bind(*user.as_uuid())
    .fetch_one(&mut *conn)
    .await
    .map_err(db("sum ledger"))?;
    Ok(crate::decode::normalized(balance))
}
