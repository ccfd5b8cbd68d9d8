//! Matching and recommendation scoring.
//!
//! Both rankings are weighted linear sums over the same normalized signals.
//! Sorting is stable, so candidates with equal scores keep the order the
//! store returned them in.

use crate::ids::UserId;
use crate::user::ProviderProfile;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default number of results.
pub const DEFAULT_LIMIT: usize = 10;
/// Largest accepted `limit`.
pub const MAX_LIMIT: usize = 50;
/// Reputation at which the reputation signal saturates.
const REPUTATION_CAP: i64 = 100;

/// Coefficients of one ranking.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Weights {
    /// Weight of skill overlap.
    pub skill: f64,
    /// Weight of category overlap.
    pub category: f64,
    /// Weight of normalized reputation.
    pub reputation: f64,
    /// Weight of normalized average rating.
    pub rating: f64,
}

impl Weights {
    /// Auto-match: `0.6 skill + 0.3 category + 0.1 reputation`.
    pub const AUTO_MATCH: Self = Self {
        skill: 0.6,
        category: 0.3,
        reputation: 0.1,
        rating: 0.0,
    };

    /// Recommendations: `0.5 skill + 0.3 category + 0.15 reputation + 0.05 rating`.
    pub const RECOMMENDATION: Self = Self {
        skill: 0.5,
        category: 0.3,
        reputation: 0.15,
        rating: 0.05,
    };
}

/// What the caller is looking for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchQuery {
    /// Wanted skills.
    pub skills: Vec<String>,
    /// Wanted categories.
    pub categories: Vec<String>,
}

impl MatchQuery {
    /// Builds a query from comma separated lists, lower-casing and
    /// de-duplicating terms.
    #[must_use]
    pub fn from_csv(skills: Option<&str>, categories: Option<&str>) -> Self {
        Self {
            skills: split_terms(skills),
            categories: split_terms(categories),
        }
    }
}

fn split_terms(raw: Option<&str>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.unwrap_or_default()
        .split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

/// A scored candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredProfile {
    /// The candidate.
    #[serde(flatten)]
    pub profile: ProviderProfile,
    /// Weighted score in `[0, 1]`.
    pub score: f64,
}

/// `|wanted ∩ offered| / |wanted|`, 0 when nothing is wanted.
#[must_use]
pub fn overlap(wanted: &[String], offered: &[String]) -> f64 {
    if wanted.is_empty() {
        return 0.0;
    }
    let offered: HashSet<String> = offered.iter().map(|s| s.to_lowercase()).collect();
    let hits = wanted
        .iter()
        .filter(|w| offered.contains(&w.to_lowercase()))
        .count();
    ratio(hits, wanted.len())
}

#[allow(clippy::cast_precision_loss)]
fn ratio(hits: usize, total: usize) -> f64 {
    hits as f64 / total as f64
}

/// Reputation mapped onto `[0, 1]`, saturating at 100.
#[must_use]
pub fn reputation_norm(reputation: i64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let capped = reputation.clamp(0, REPUTATION_CAP) as f64;
    capped / 100.0
}

/// Average rating mapped onto `[0, 1]`.
#[must_use]
pub fn rating_norm(avg_rating: f64) -> f64 {
    (avg_rating / 5.0).clamp(0.0, 1.0)
}

/// Score of one candidate.
#[must_use]
pub fn score(query: &MatchQuery, profile: &ProviderProfile, weights: Weights) -> f64 {
    weights.skill * overlap(&query.skills, &profile.skills)
        + weights.category * overlap(&query.categories, &profile.categories)
        + weights.reputation * reputation_norm(profile.reputation)
        + weights.rating * rating_norm(profile.avg_rating)
}

/// Scores every candidate except `caller`, sorts descending and keeps the
/// top `limit` (default 10, capped at 50).
#[must_use]
pub fn rank(
    caller: UserId,
    query: &MatchQuery,
    candidates: Vec<ProviderProfile>,
    weights: Weights,
    limit: Option<usize>,
) -> Vec<ScoredProfile> {
    let limit = clamp_limit(limit);
    let mut scored: Vec<ScoredProfile> = candidates
        .into_iter()
        .filter(|p| p.user_id != caller)
        .map(|profile| ScoredProfile {
            score: score(query, &profile, weights),
            profile,
        })
        .collect();
    // `sort_by` is stable; ties keep store order.
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(limit);
    scored
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}
