//! Route handlers.

use serde::Deserialize;

pub mod bookings;
pub mod health;
pub mod matching;
pub mod messages;
pub mod notifications;
pub mod ratings;
pub mod wallet;

/// `?limit=` of history listings.
#[derive(Debug, Default, Deserialize)]
pub struct Page {
    /// Page size; the service applies the default and upper bound.
    pub limit: Option<usize>,
}
