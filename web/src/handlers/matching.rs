//! `/matching` and `/recommendations`.

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::extractors::QueryParams;
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::Deserialize;
use timebank_core::scoring::{MatchQuery, ScoredProfile};
use timebank_core::service;

/// Comma separated wanted skills and categories.
#[derive(Debug, Default, Deserialize)]
pub struct MatchParams {
    /// e.g. `rust,sql`
    pub skills: Option<String>,
    /// e.g. `tech`
    pub categories: Option<String>,
    /// Top-N (default 10, at most 50).
    pub limit: Option<usize>,
}

impl MatchParams {
    fn query(&self) -> MatchQuery {
        MatchQuery::from_csv(self.skills.as_deref(), self.categories.as_deref())
    }
}

/// `GET /matching?skills=&categories=&limit=`
///
/// # Errors
///
/// 500 on store failure.
pub async fn auto_match(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    QueryParams(params): QueryParams<MatchParams>,
) -> Result<Json<Vec<ScoredProfile>>, AppError> {
    let env = state.service_env();
    let ranked = service::matching::auto_match(&env, me, &params.query(), params.limit).await?;
    Ok(Json(ranked))
}

/// `GET /recommendations?skills=&categories=&limit=`; without a query the
/// caller's own profile is used.
///
/// # Errors
///
/// 500 on store failure.
pub async fn recommendations(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    QueryParams(params): QueryParams<MatchParams>,
) -> Result<Json<Vec<ScoredProfile>>, AppError> {
    let env = state.service_env();
    let ranked = service::matching::recommend(&env, me, params.query(), params.limit).await?;
    Ok(Json(ranked))
}
