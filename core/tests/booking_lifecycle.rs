//! Booking lifecycle through the service layer and the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use timebank_core::booking::{BookingAction, BookingEffect, BookingStatus};
use timebank_core::hours::Hours;
use timebank_core::ids::BookingId;
use timebank_core::ledger::EntryType;
use timebank_core::notification::NotificationPayload;
use timebank_core::service;
use timebank_core::store::{BookingFilter, BookingRole, TimebankStore};
use timebank_core::transaction::TransactionType;
use timebank_core::DomainError;
use timebank_testing::{BookingTest, fixtures};

#[tokio::test]
async fn completion_with_enough_balance_settles_both_sides() {
    // Given: A holds 10h, B provides 5h
    let (env, store) = fixtures::environment();
    let a = fixtures::funded_user(&env, "alice", 10).await;
    let b = fixtures::user(&env, "bob").await;
    let booking = fixtures::accepted_booking(&env, a.id, b.id, 5).await;

    // When: A confirms
    let outcome = service::booking::confirm_completion(&env, a.id, booking.id)
        .await
        .unwrap();

    // Then
    assert_eq!(outcome.booking.status, BookingStatus::Completed);
    assert!(outcome.booking.completed_at.is_some());
    assert_eq!(service::wallet::balance(&env, a.id).await.unwrap().balance, Hours::whole(5));
    assert_eq!(service::wallet::balance(&env, b.id).await.unwrap().balance, Hours::whole(5));

    let ledger = env.store.ledger_entries_for_booking(booking.id).await.unwrap();
    assert_eq!(ledger.len(), 2);
    assert!(ledger.iter().any(|e| e.user_id == b.id && e.entry_type == EntryType::Earned));
    assert!(ledger.iter().any(|e| e.user_id == a.id && e.entry_type == EntryType::Spent));

    let txs = env.store.transactions_for_booking(booking.id).await.unwrap();
    let mut kinds: Vec<_> = txs.iter().map(|t| t.tx_type).collect();
    kinds.sort_by_key(TransactionType::as_str);
    assert_eq!(kinds, [TransactionType::Earned, TransactionType::Spent]);

    let snapshot = store.snapshot().await;
    let alice = snapshot.users.iter().find(|u| u.id == a.id).unwrap();
    let bob = snapshot.users.iter().find(|u| u.id == b.id).unwrap();
    assert_eq!((alice.reputation, bob.reputation), (5, 10));
    assert_eq!(alice.credits, Hours::whole(5));
    assert_eq!(bob.credits, Hours::whole(5));

    assert_eq!(outcome.notifications.len(), 4);
    let kinds: Vec<_> = outcome.notifications.iter().map(|n| n.payload.kind()).collect();
    assert_eq!(kinds.iter().filter(|k| **k == "BOOKING_COMPLETED").count(), 2);
    assert!(kinds.contains(&"CREDITS_EARNED") && kinds.contains(&"CREDITS_SPENT"));
}

#[tokio::test]
async fn completion_with_insufficient_balance_writes_nothing() {
    let (env, store) = fixtures::environment();
    let a = fixtures::funded_user(&env, "alice", 2).await;
    let b = fixtures::user(&env, "bob").await;
    let booking = fixtures::accepted_booking(&env, a.id, b.id, 5).await;
    let before = store.snapshot().await;

    let err = service::booking::confirm_completion(&env, b.id, booking.id)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Insufficient balance");
    let after = store.snapshot().await;
    assert_eq!(after.ledger.len(), before.ledger.len());
    assert_eq!(after.transactions.len(), before.transactions.len());
    assert_eq!(after.notifications.len(), before.notifications.len());
    let stored = env.store.get_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Accepted);
    assert!(after.users.iter().all(|u| u.reputation == 0));
}

#[tokio::test]
async fn decline_notifies_receiver_without_ledger_rows() {
    let (env, store) = fixtures::environment();
    let a = fixtures::funded_user(&env, "alice", 3).await;
    let b = fixtures::user(&env, "bob").await;
    let booking = fixtures::pending_booking(&env, a.id, b.id, 2).await;
    let ledger_before = store.snapshot().await.ledger.len();

    let outcome = service::booking::decline(&env, b.id, booking.id).await.unwrap();

    assert_eq!(outcome.booking.status, BookingStatus::Declined);
    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.ledger.len(), ledger_before);
    assert!(snapshot.notifications_of(a.id).iter().any(|n| matches!(
        &n.payload,
        NotificationPayload::BookingDeclined { booking_id, .. } if *booking_id == booking.id
    )));
}

#[tokio::test]
async fn only_the_provider_can_accept_or_decline() {
    let (env, _) = fixtures::environment();
    let a = fixtures::user(&env, "alice").await;
    let b = fixtures::user(&env, "bob").await;
    let c = fixtures::user(&env, "carol").await;
    let booking = fixtures::pending_booking(&env, a.id, b.id, 1).await;

    for actor in [a.id, c.id] {
        let err = service::booking::accept(&env, actor, booking.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
        let err = service::booking::decline(&env, actor, booking.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }
}

#[tokio::test]
async fn illegal_edges_are_conflicts() {
    let (env, _) = fixtures::environment();
    let a = fixtures::funded_user(&env, "alice", 5).await;
    let b = fixtures::user(&env, "bob").await;

    let cancelled = fixtures::pending_booking(&env, a.id, b.id, 1).await;
    service::booking::cancel(&env, a.id, cancelled.id).await.unwrap();
    let err = service::booking::accept(&env, b.id, cancelled.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));

    let pending = fixtures::pending_booking(&env, a.id, b.id, 1).await;
    let err = service::booking::confirm_completion(&env, a.id, pending.id)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));

    let completed = fixtures::completed_booking(&env, a.id, b.id, 1).await;
    let err = service::booking::cancel(&env, a.id, completed.id).await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));
}

#[tokio::test]
async fn create_validates_and_requires_an_existing_provider() {
    let (env, store) = fixtures::environment();
    let a = fixtures::user(&env, "alice").await;

    let err = service::booking::create(&env, a.id, fixtures::draft(a.id, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let err = service::booking::create(&env, a.id, fixtures::draft(timebank_core::ids::UserId::new(), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound { resource: "User", .. }));
    assert!(store.snapshot().await.bookings.is_empty());
}

#[tokio::test]
async fn create_opens_the_thread_with_the_note() {
    let (env, _) = fixtures::environment();
    let a = fixtures::user(&env, "alice").await;
    let b = fixtures::user(&env, "bob").await;
    let mut draft = fixtures::draft(b.id, 2);
    draft.note = Some("Could you help with the hedges?".into());

    let outcome = service::booking::create(&env, a.id, draft).await.unwrap();

    let thread = service::messaging::booking_thread(&env, b.id, outcome.booking.id)
        .await
        .unwrap();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].body, "Could you help with the hedges?");
    assert_eq!(thread[0].sender_id, a.id);
    assert_eq!(outcome.notifications[0].user_id, b.id);
}

#[tokio::test]
async fn unknown_booking_is_not_found() {
    let (env, _) = fixtures::environment();
    let a = fixtures::user(&env, "alice").await;
    let err = service::booking::cancel(&env, a.id, BookingId::new()).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound { resource: "Booking", .. }));
}

#[tokio::test]
async fn listing_filters_by_role_and_status() {
    let (env, _) = fixtures::environment();
    let a = fixtures::user(&env, "alice").await;
    let b = fixtures::user(&env, "bob").await;
    let first = fixtures::pending_booking(&env, a.id, b.id, 1).await;
    let second = fixtures::accepted_booking(&env, b.id, a.id, 1).await;

    let all = service::booking::list(
        &env,
        BookingFilter {
            user_id: a.id,
            role: None,
            status: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(all.iter().map(|b| b.id).collect::<Vec<_>>(), [second.id, first.id]);

    let providing = service::booking::list(
        &env,
        BookingFilter {
            user_id: a.id,
            role: Some(BookingRole::Provider),
            status: Some(BookingStatus::Accepted),
        },
    )
    .await
    .unwrap();
    assert_eq!(providing.len(), 1);
    assert_eq!(providing[0].id, second.id);

    let stranger = fixtures::user(&env, "carol").await;
    let err = service::booking::get(&env, stranger.id, first.id).await.unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_completions_succeed_exactly_once() {
    let (env, store) = fixtures::environment();
    let a = fixtures::funded_user(&env, "alice", 50).await;
    let b = fixtures::user(&env, "bob").await;
    let booking = fixtures::accepted_booking(&env, a.id, b.id, 5).await;

    let attempts: Vec<_> = (0..8)
        .map(|i| {
            let env = env.clone();
            let actor = if i % 2 == 0 { a.id } else { b.id };
            tokio::spawn(async move {
                service::booking::confirm_completion(&env, actor, booking.id).await
            })
        })
        .collect();

    let mut successes = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => successes += 1,
            Err(DomainError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(env.store.ledger_entries_for_booking(booking.id).await.unwrap().len(), 2);
    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.ledger_of(a.id).len(), 2);
}

#[test]
fn reducer_rejects_decline_after_accept() {
    let booking = tokio_block_on_pending();
    let provider = booking.provider_id;
    BookingTest::new()
        .given_booking(accepted(booking))
        .when_action(BookingAction::Decline { actor: provider })
        .then_error(|err| assert!(matches!(err, DomainError::Conflict(_))))
        .then_booking(|b| assert_eq!(b.status, BookingStatus::Accepted))
        .run();
}

#[test]
fn reducer_accept_emits_single_notification() {
    let booking = tokio_block_on_pending();
    let provider = booking.provider_id;
    let receiver = booking.receiver_id;
    BookingTest::new()
        .given_booking(booking)
        .when_action(BookingAction::Accept {
            actor: provider,
            slot: None,
        })
        .then_effects(move |effects| {
            assert!(matches!(effects, [BookingEffect::Notify(n)] if n.user_id == receiver));
        })
        .then_booking(|b| assert_eq!(b.status, BookingStatus::Accepted))
        .run();
}

fn tokio_block_on_pending() -> timebank_core::Booking {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    runtime.block_on(async {
        let (env, _) = fixtures::environment();
        let a = fixtures::user(&env, "alice").await;
        let b = fixtures::user(&env, "bob").await;
        fixtures::pending_booking(&env, a.id, b.id, 2).await
    })
}

fn accepted(mut booking: timebank_core::Booking) -> timebank_core::Booking {
    booking.status = BookingStatus::Accepted;
    booking
}
