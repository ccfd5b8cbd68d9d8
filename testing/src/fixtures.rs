//! Seed data for service and HTTP tests.
//!
//! Fixture helpers panic on failure; they only run inside tests.

#![allow(clippy::expect_used)]
#![allow(clippy::missing_panics_doc)]

use crate::{InMemoryStore, test_clock};
use std::sync::Arc;
use timebank_core::booking::{Booking, BookingDraft};
use timebank_core::hours::Hours;
use timebank_core::ids::UserId;
use timebank_core::service::{self, ServiceEnvironment};
use timebank_core::store::TimebankStore;
use timebank_core::user::{Profile, User};

/// A service environment over a fresh [`InMemoryStore`] and the fixed test
/// clock. The store handle is returned too for snapshot assertions.
#[must_use]
pub fn environment() -> (ServiceEnvironment, InMemoryStore) {
    let store = InMemoryStore::new();
    let env = ServiceEnvironment::new(Arc::new(store.clone()), Arc::new(test_clock()));
    (env, store)
}

/// Inserts a user named `name` with address `<name>@example.com`.
pub async fn user(env: &ServiceEnvironment, name: &str) -> User {
    let user = User::new(format!("{name}@example.com"), name, env.now());
    env.store
        .insert_user(user.clone())
        .await
        .expect("fixture user should insert");
    user
}

/// Inserts a user and grants them `hours` through a bonus.
pub async fn funded_user(env: &ServiceEnvironment, name: &str, hours: i64) -> User {
    let user = user(env, name).await;
    if hours > 0 {
        service::wallet::grant_bonus(env, user.id, Hours::whole(hours), "Welcome credits")
            .await
            .expect("fixture bonus should commit");
    }
    user
}

/// Inserts a user with a matching profile.
pub async fn provider(
    env: &ServiceEnvironment,
    name: &str,
    skills: &[&str],
    categories: &[&str],
) -> User {
    let user = user(env, name).await;
    env.store
        .upsert_profile(Profile {
            user_id: user.id,
            skills: skills.iter().map(ToString::to_string).collect(),
            categories: categories.iter().map(ToString::to_string).collect(),
            avg_rating: 0.0,
        })
        .await
        .expect("fixture profile should upsert");
    user
}

/// A draft asking `provider` for `hours` of gardening.
#[must_use]
pub fn draft(provider: UserId, hours: i64) -> BookingDraft {
    BookingDraft {
        provider_id: provider,
        hours: Hours::whole(hours),
        category: "gardening".to_string(),
        note: None,
    }
}

/// Creates a PENDING booking.
pub async fn pending_booking(
    env: &ServiceEnvironment,
    receiver: UserId,
    provider: UserId,
    hours: i64,
) -> Booking {
    service::booking::create(env, receiver, draft(provider, hours))
        .await
        .expect("fixture booking should be created")
        .booking
}

/// Creates a booking and has the provider accept it.
pub async fn accepted_booking(
    env: &ServiceEnvironment,
    receiver: UserId,
    provider: UserId,
    hours: i64,
) -> Booking {
    let booking = pending_booking(env, receiver, provider, hours).await;
    service::booking::accept(env, provider, booking.id, None)
        .await
        .expect("fixture booking should be accepted")
        .booking
}

/// Creates, accepts and completes a booking.
pub async fn completed_booking(
    env: &ServiceEnvironment,
    receiver: UserId,
    provider: UserId,
    hours: i64,
) -> Booking {
    let booking = accepted_booking(env, receiver, provider, hours).await;
    service::booking::confirm_completion(env, receiver, booking.id)
        .await
        .expect("fixture booking should complete")
        .booking
}
