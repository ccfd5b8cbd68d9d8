//! Auto-match and recommendations.

use super::ServiceEnvironment;
use crate::error::DomainError;
use crate::ids::UserId;
use crate::scoring::{MatchQuery, ScoredProfile, Weights, rank};

/// Providers ranked for an explicit query with the auto-match weights.
///
/// # Errors
///
/// Propagates store failures.
pub async fn auto_match(
    env: &ServiceEnvironment,
    caller: UserId,
    query: &MatchQuery,
    limit: Option<usize>,
) -> Result<Vec<ScoredProfile>, DomainError> {
    let candidates = env.store.list_profiles().await?;
    Ok(rank(caller, query, candidates, Weights::AUTO_MATCH, limit))
}

/// Providers ranked with the recommendation weights.
///
/// An empty query falls back to the caller's own skills and categories.
///
/// # Errors
///
/// Propagates store failures.
pub async fn recommend(
    env: &ServiceEnvironment,
    caller: UserId,
    query: MatchQuery,
    limit: Option<usize>,
) -> Result<Vec<ScoredProfile>, DomainError> {
    let query = if query.skills.is_empty() && query.categories.is_empty() {
        env.store
            .get_profile(caller)
            .await?
            .map(|p| MatchQuery {
                skills: p.skills,
                categories: p.categories,
            })
            .unwrap_or_default()
    } else {
        query
    };
    let candidates = env.store.list_profiles().await?;
    Ok(rank(caller, &query, candidates, Weights::RECOMMENDATION, limit))
}
