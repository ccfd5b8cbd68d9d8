//! `/booking` routes.

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::extractors::{JsonBody, PathParam, QueryParams};
use crate::mail;
use crate::state::AppState;
use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use timebank_core::booking::{Booking, BookingDraft, BookingStatus};
use timebank_core::error::Validator;
use timebank_core::ids::BookingId;
use timebank_core::service::{self, booking::BookingOutcome};
use timebank_core::store::{BookingFilter, BookingRole};

/// Query of `GET /booking`.
#[derive(Debug, Default, Deserialize)]
pub struct ListBookings {
    /// `provider` or `receiver`.
    pub role: Option<String>,
    /// Any booking status, case-insensitive.
    pub status: Option<String>,
}

/// Optional body of `PATCH /booking/:id/accept`.
#[derive(Debug, Default, Deserialize)]
pub struct AcceptBooking {
    /// Agreed slot (RFC 3339).
    pub slot: Option<DateTime<Utc>>,
}

/// `POST /booking`
///
/// # Errors
///
/// 400 for an invalid draft or self-booking, 404 for an unknown provider.
pub async fn create(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    JsonBody(draft): JsonBody<BookingDraft>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let outcome = service::booking::create(&state.service_env(), me, draft).await?;
    state.booking_committed(&outcome).await;
    email_provider(&state, &outcome.booking);
    Ok((StatusCode::CREATED, Json(outcome.booking)))
}

/// `GET /booking?role=&status=`
///
/// # Errors
///
/// 400 for an unknown role or status.
pub async fn list(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    QueryParams(query): QueryParams<ListBookings>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let mut v = Validator::new();
    let role = parse_optional::<BookingRole>(query.role.as_deref(), "role", &mut v);
    let status = parse_optional::<BookingStatus>(query.status.as_deref(), "status", &mut v);
    v.finish()?;

    let filter = BookingFilter {
        user_id: me,
        role,
        status,
    };
    Ok(Json(service::booking::list(&state.service_env(), filter).await?))
}

/// `GET /booking/:id`
///
/// # Errors
///
/// 404 for an unknown booking, 403 for a non-participant.
pub async fn get(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    PathParam(id): PathParam<BookingId>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(service::booking::get(&state.service_env(), me, id).await?))
}

/// `PATCH /booking/:id/accept` with an optional `{ "slot": "<RFC 3339>" }`.
///
/// # Errors
///
/// 403 unless the caller is the provider, 400 unless the booking is PENDING.
pub async fn accept(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    PathParam(id): PathParam<BookingId>,
    body: Bytes,
) -> Result<Json<Booking>, AppError> {
    let request: AcceptBooking = if body.iter().all(u8::is_ascii_whitespace) {
        AcceptBooking::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::invalid_field("slot", e.to_string()))?
    };
    let outcome = service::booking::accept(&state.service_env(), me, id, request.slot).await?;
    Ok(committed(&state, outcome).await)
}

/// `PATCH /booking/:id/decline`
///
/// # Errors
///
/// 403 unless the caller is the provider, 400 unless the booking is PENDING.
pub async fn decline(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    PathParam(id): PathParam<BookingId>,
) -> Result<Json<Booking>, AppError> {
    let outcome = service::booking::decline(&state.service_env(), me, id).await?;
    Ok(committed(&state, outcome).await)
}

/// `PATCH /booking/:id/cancel`
///
/// # Errors
///
/// 403 for a non-participant, 400 once the booking is terminal.
pub async fn cancel(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    PathParam(id): PathParam<BookingId>,
) -> Result<Json<Booking>, AppError> {
    let outcome = service::booking::cancel(&state.service_env(), me, id).await?;
    Ok(committed(&state, outcome).await)
}

/// `POST /booking/:id/complete-confirm`
///
/// # Errors
///
/// 403 for a non-participant; 400 unless the booking is ACCEPTED or when the
/// receiver's balance does not cover the hours.
pub async fn complete_confirm(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    PathParam(id): PathParam<BookingId>,
) -> Result<Json<Booking>, AppError> {
    let outcome = service::booking::confirm_completion(&state.service_env(), me, id).await?;
    Ok(committed(&state, outcome).await)
}

async fn committed(state: &AppState, outcome: BookingOutcome) -> Json<Booking> {
    state.booking_committed(&outcome).await;
    Json(outcome.booking)
}

fn parse_optional<T: std::str::FromStr<Err = String>>(
    raw: Option<&str>,
    field: &str,
    v: &mut Validator,
) -> Option<T> {
    match raw.map(str::parse::<T>) {
        Some(Ok(value)) => Some(value),
        Some(Err(message)) => {
            v.check(false, field, &message);
            None
        }
        None => None,
    }
}

/// Emails the provider about a new request without holding up the response.
fn email_provider(state: &AppState, booking: &Booking) {
    let store = state.store.clone();
    let mailer = state.mailer.clone();
    let booking = booking.clone();
    tokio::spawn(async move {
        let (provider, receiver) = match (
            store.get_user(booking.provider_id).await,
            store.get_user(booking.receiver_id).await,
        ) {
            (Ok(Some(provider)), Ok(Some(receiver))) => (provider, receiver),
            _ => {
                tracing::warn!(booking_id = %booking.id, "Skipping booking email; users not loaded");
                return;
            }
        };
        let email = mail::booking_requested(
            &provider.email,
            &receiver.name,
            &booking.hours.to_string(),
            &booking.category,
        );
        if let Err(e) = mailer.send(email).await {
            tracing::warn!(booking_id = %booking.id, error = %e, "Booking email failed");
        }
    });
}
