//! `/ratings` routes.

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::extractors::{JsonBody, PathParam};
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use timebank_core::ids::UserId;
use timebank_core::rating::Rating;
use timebank_core::service::{self, ratings::RateRequest};

/// `POST /ratings`
///
/// # Errors
///
/// 400 for a bad score, an unfinished booking or a second rating; 403 for a
/// non-participant; 404 for an unknown booking.
pub async fn rate(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    JsonBody(request): JsonBody<RateRequest>,
) -> Result<(StatusCode, Json<Rating>), AppError> {
    let outcome = service::ratings::rate(&state.service_env(), me, request).await?;
    state
        .notify(std::slice::from_ref(&outcome.notification))
        .await;
    Ok((StatusCode::CREATED, Json(outcome.rating)))
}

/// `GET /ratings/user/:id`: ratings the user received.
///
/// # Errors
///
/// 500 on store failure.
pub async fn received(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    PathParam(user): PathParam<UserId>,
) -> Result<Json<Vec<Rating>>, AppError> {
    Ok(Json(service::ratings::received(&state.service_env(), user).await?))
}
