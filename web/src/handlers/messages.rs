//! `/messages` routes.

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::extractors::{JsonBody, PathParam};
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use timebank_core::ids::{BookingId, UserId};
use timebank_core::message::Message;
use timebank_core::service::{self, messaging::SendMessage};

/// `POST /messages`: to a booking thread or, without `booking_id`, directly
/// to `recipient_id`.
///
/// # Errors
///
/// 400 for an empty body or a missing recipient, 403 for a non-participant,
/// 404 for an unknown booking or recipient.
pub async fn send(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    JsonBody(request): JsonBody<SendMessage>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let outcome = service::messaging::send(&state.service_env(), me, request).await?;
    state.message_committed(&outcome).await;
    Ok((StatusCode::CREATED, Json(outcome.message)))
}

/// `GET /messages/booking/:id`
///
/// # Errors
///
/// 404 for an unknown booking, 403 for a non-participant.
pub async fn booking_thread(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    PathParam(id): PathParam<BookingId>,
) -> Result<Json<Vec<Message>>, AppError> {
    Ok(Json(
        service::messaging::booking_thread(&state.service_env(), me, id).await?,
    ))
}

/// `GET /messages/direct/:user_id`
///
/// # Errors
///
/// 500 on store failure.
pub async fn direct_thread(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    PathParam(other): PathParam<UserId>,
) -> Result<Json<Vec<Message>>, AppError> {
    Ok(Json(
        service::messaging::direct_thread(&state.service_env(), me, other).await?,
    ))
}
