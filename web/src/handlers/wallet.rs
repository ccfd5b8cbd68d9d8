//! `/wallet` and `/transactions` routes.

use super::Page;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::extractors::{JsonBody, QueryParams};
use crate::metrics;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use timebank_core::ledger::LedgerEntry;
use timebank_core::service::{
    self,
    wallet::{TransferRequest, WalletBalance},
};
use timebank_core::transaction::Transaction;

/// `GET /wallet/balance`: `{ balance, earned, spent }` from the ledger.
///
/// # Errors
///
/// 500 on store failure.
pub async fn balance(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> Result<Json<WalletBalance>, AppError> {
    Ok(Json(service::wallet::balance(&state.service_env(), me).await?))
}

/// `GET /wallet/history?limit=`
///
/// # Errors
///
/// 500 on store failure.
pub async fn history(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    QueryParams(page): QueryParams<Page>,
) -> Result<Json<Vec<LedgerEntry>>, AppError> {
    Ok(Json(
        service::wallet::history(&state.service_env(), me, page.limit).await?,
    ))
}

/// `POST /transactions/transfer`
///
/// # Errors
///
/// 400 for a bad amount, a self-transfer or an insufficient balance; 404
/// for an unknown receiver.
pub async fn transfer(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    JsonBody(request): JsonBody<TransferRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let outcome = service::wallet::transfer(&state.service_env(), me, request).await?;
    metrics::transfer(outcome.transaction.amount);
    state
        .notify(std::slice::from_ref(&outcome.notification))
        .await;
    Ok((StatusCode::CREATED, Json(outcome.transaction)))
}

/// `GET /transactions?limit=`: where the caller is sender or receiver.
///
/// # Errors
///
/// 500 on store failure.
pub async fn transactions(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    QueryParams(page): QueryParams<Page>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    Ok(Json(
        service::wallet::transactions(&state.service_env(), me, page.limit).await?,
    ))
}
