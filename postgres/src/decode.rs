//! Decoding of result rows into domain records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row};
use std::str::FromStr;
use timebank_core::booking::Booking;
use timebank_core::hours::Hours;
use timebank_core::ids::{
    BookingId, LedgerEntryId, MessageId, NotificationId, RatingId, TransactionId, UserId,
};
use timebank_core::ledger::LedgerEntry;
use timebank_core::message::Message;
use timebank_core::notification::{Notification, NotificationPayload};
use timebank_core::rating::Rating;
use timebank_core::store::StoreError;
use timebank_core::transaction::Transaction;
use timebank_core::user::{Profile, ProviderProfile, User};
use uuid::Uuid;

fn col<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Serialization(format!("column {name}: {e}")))
}

fn parsed<T>(row: &PgRow, name: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = String>,
{
    let text: String = col(row, name)?;
    text.parse().map_err(StoreError::Serialization)
}

/// `NUMERIC(12,2)` comes back as e.g. `5.00`; strip the scale so values
/// serialize the same as the ones that were written.
pub(crate) fn normalized(value: Decimal) -> Hours {
    Hours::new(value.normalize())
}

fn hours(row: &PgRow, name: &str) -> Result<Hours, StoreError> {
    col::<Decimal>(row, name).map(normalized)
}

fn id<T: From<Uuid>>(row: &PgRow, name: &str) -> Result<T, StoreError> {
    col::<Uuid>(row, name).map(T::from)
}

fn optional_id<T: From<Uuid>>(row: &PgRow, name: &str) -> Result<Option<T>, StoreError> {
    col::<Option<Uuid>>(row, name).map(|v| v.map(T::from))
}

pub(crate) fn user(row: &PgRow) -> Result<User, StoreError> {
    Ok(User {
        id: id::<UserId>(row, "id")?,
        email: col(row, "email")?,
        name: col(row, "name")?,
        credits: hours(row, "credits")?,
        reputation: col(row, "reputation")?,
        created_at: col(row, "created_at")?,
    })
}

pub(crate) fn profile(row: &PgRow) -> Result<Profile, StoreError> {
    Ok(Profile {
        user_id: id::<UserId>(row, "user_id")?,
        skills: col(row, "skills")?,
        categories: col(row, "categories")?,
        avg_rating: col(row, "avg_rating")?,
    })
}

pub(crate) fn provider_profile(row: &PgRow) -> Result<ProviderProfile, StoreError> {
    Ok(ProviderProfile {
        user_id: id::<UserId>(row, "user_id")?,
        name: col(row, "name")?,
        reputation: col(row, "reputation")?,
        skills: col(row, "skills")?,
        categories: col(row, "categories")?,
        avg_rating: col(row, "avg_rating")?,
    })
}

pub(crate) fn booking(row: &PgRow) -> Result<Booking, StoreError> {
    Ok(Booking {
        id: id::<BookingId>(row, "id")?,
        provider_id: id::<UserId>(row, "provider_id")?,
        receiver_id: id::<UserId>(row, "receiver_id")?,
        hours: hours(row, "hours")?,
        category: col(row, "category")?,
        note: col(row, "note")?,
        status: parsed(row, "status")?,
        start_at: col(row, "start_at")?,
        accepted_at: col(row, "accepted_at")?,
        cancelled_at: col(row, "cancelled_at")?,
        completed_at: col(row, "completed_at")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

pub(crate) fn ledger_entry(row: &PgRow) -> Result<LedgerEntry, StoreError> {
    Ok(LedgerEntry {
        id: id::<LedgerEntryId>(row, "id")?,
        user_id: id::<UserId>(row, "user_id")?,
        hours: hours(row, "hours")?,
        entry_type: parsed(row, "entry_type")?,
        ref_booking_id: optional_id(row, "ref_booking_id")?,
        created_at: col(row, "created_at")?,
    })
}

pub(crate) fn transaction(row: &PgRow) -> Result<Transaction, StoreError> {
    Ok(Transaction {
        id: id::<TransactionId>(row, "id")?,
        sender_id: optional_id(row, "sender_id")?,
        receiver_id: id::<UserId>(row, "receiver_id")?,
        amount: hours(row, "amount")?,
        tx_type: parsed(row, "tx_type")?,
        status: parsed(row, "status")?,
        ref_booking_id: optional_id(row, "ref_booking_id")?,
        description: col(row, "description")?,
        created_at: col(row, "created_at")?,
    })
}

pub(crate) fn notification(row: &PgRow) -> Result<Notification, StoreError> {
    let kind: String = col(row, "kind")?;
    let payload: serde_json::Value = col(row, "payload")?;
    let payload = NotificationPayload::from_parts(&kind, payload)
        .map_err(|e| StoreError::Serialization(format!("notification payload {kind}: {e}")))?;
    Ok(Notification {
        id: id::<NotificationId>(row, "id")?,
        user_id: id::<UserId>(row, "user_id")?,
        payload,
        read_at: col::<Option<DateTime<Utc>>>(row, "read_at")?,
        created_at: col(row, "created_at")?,
    })
}

pub(crate) fn message(row: &PgRow) -> Result<Message, StoreError> {
    Ok(Message {
        id: id::<MessageId>(row, "id")?,
        booking_id: optional_id(row, "booking_id")?,
        sender_id: id::<UserId>(row, "sender_id")?,
        recipient_id: id::<UserId>(row, "recipient_id")?,
        body: col(row, "body")?,
        created_at: col(row, "created_at")?,
    })
}

pub(crate) fn rating(row: &PgRow) -> Result<Rating, StoreError> {
    let score: i16 = col(row, "score")?;
    Ok(Rating {
        id: id::<RatingId>(row, "id")?,
        booking_id: id::<BookingId>(row, "booking_id")?,
        rater_id: id::<UserId>(row, "rater_id")?,
        ratee_id: id::<UserId>(row, "ratee_id")?,
        score: u8::try_from(score)
            .map_err(|_| StoreError::Serialization(format!("rating score out of range: {score}")))?,
        comment: col(row, "comment")?,
        created_at: col(row, "created_at")?,
    })
}

/// Decodes every row, failing on the first bad one.
pub(crate) fn all<T>(
    rows: &[PgRow],
    decode: fn(&PgRow) -> Result<T, StoreError>,
) -> Result<Vec<T>, StoreError> {
    rows.iter().map(decode).collect()
}
