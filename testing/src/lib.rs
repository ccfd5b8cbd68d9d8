//! # TimeBank Testing
//!
//! Testing utilities for TimeBank.
//!
//! This crate provides:
//! - [`InMemoryStore`]: a `TimebankStore` with the same contract as the
//!   Postgres store, including atomic commits
//! - [`FixedClock`] and [`test_clock`] for deterministic timestamps
//! - Fixture helpers that seed and fund users
//! - [`BookingTest`], a Given-When-Then harness for the booking reducer
//!
//! ## Example
//!
//! ```ignore
//! use timebank_testing::{fixtures, InMemoryStore};
//!
//! #[tokio::test]
//! async fn completion_pays_the_provider() {
//!     let (env, store) = fixtures::environment();
//!     let alice = fixtures::funded_user(&env, "alice", 10).await;
//!     let bob = fixtures::user(&env, "bob").await;
//!     // ...
//!     assert_eq!(store.snapshot().await.ledger.len(), 3);
//! }
//! ```

use chrono::{DateTime, Utc};
use timebank_core::environment::Clock;

pub mod fixtures;
pub mod store;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use timebank_testing::mocks::FixedClock;
    /// use timebank_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which cannot happen.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Installs a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; output is captured by the test harness.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub use mocks::{FixedClock, test_clock};
pub use reducer_test::BookingTest;
pub use store::{InMemoryStore, Snapshot};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }
}
