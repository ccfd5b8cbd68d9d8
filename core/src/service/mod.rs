//! Application services.
//!
//! Each operation loads what it needs through the store, runs the pure
//! domain logic, and persists the result with a single
//! [`TimebankStore::commit`](crate::store::TimebankStore::commit). Outcomes
//! carry the notifications and messages that were persisted so the caller
//! can push them to connected clients.

use crate::booking::BookingEnvironment;
use crate::environment::Clock;
use crate::store::TimebankStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub mod booking;
pub mod matching;
pub mod messaging;
pub mod notifications;
pub mod ratings;
pub mod wallet;

/// Default page size of history listings.
pub const DEFAULT_PAGE: usize = 50;
/// Largest page size of history listings.
pub const MAX_PAGE: usize = 200;

/// Dependencies shared by every service operation.
#[derive(Clone)]
pub struct ServiceEnvironment {
    /// Persistent state.
    pub store: Arc<dyn TimebankStore>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

impl ServiceEnvironment {
    /// Creates an environment.
    #[must_use]
    pub fn new(store: Arc<dyn TimebankStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Current time.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn booking_env(&self) -> BookingEnvironment {
        BookingEnvironment::new(Arc::clone(&self.clock))
    }
}

/// Applies the default page size and upper bound to a client `limit`.
#[must_use]
pub fn page_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE)
}
