//! Wallet, transfers and bonuses.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use timebank_core::hours::Hours;
use timebank_core::ids::UserId;
use timebank_core::notification::NotificationPayload;
use timebank_core::service::{self, wallet::TransferRequest};
use timebank_core::transaction::TransactionType;
use timebank_core::DomainError;
use timebank_testing::fixtures;

fn transfer(to: UserId, hours: i64) -> TransferRequest {
    TransferRequest {
        receiver_id: to,
        amount: Hours::whole(hours),
        description: Some("Thanks for the help".into()),
    }
}

#[tokio::test]
async fn bonus_funds_the_wallet() {
    let (env, store) = fixtures::environment();
    let a = fixtures::user(&env, "alice").await;

    let outcome = service::wallet::grant_bonus(&env, a.id, Hours::whole(3), "Welcome")
        .await
        .unwrap();

    assert_eq!(outcome.transaction.tx_type, TransactionType::Bonus);
    assert_eq!(outcome.transaction.sender_id, None);
    let balance = service::wallet::balance(&env, a.id).await.unwrap();
    assert_eq!((balance.balance, balance.earned, balance.spent), (Hours::whole(3), Hours::whole(3), Hours::ZERO));
    assert!(matches!(
        store.snapshot().await.notifications_of(a.id)[0].payload,
        NotificationPayload::BonusGranted { .. }
    ));
}

#[tokio::test]
async fn transfer_moves_ledger_balance_and_refreshes_credits() {
    let (env, store) = fixtures::environment();
    let a = fixtures::funded_user(&env, "alice", 10).await;
    let b = fixtures::user(&env, "bob").await;

    let outcome = service::wallet::transfer(&env, a.id, transfer(b.id, 4)).await.unwrap();

    assert_eq!(outcome.transaction.tx_type, TransactionType::Transfer);
    assert_eq!(outcome.transaction.description.as_deref(), Some("Thanks for the help"));
    assert_eq!(outcome.notification.user_id, b.id);
    assert_eq!(service::wallet::balance(&env, a.id).await.unwrap().balance, Hours::whole(6));
    assert_eq!(service::wallet::balance(&env, b.id).await.unwrap().balance, Hours::whole(4));

    let snapshot = store.snapshot().await;
    let credits = |id: UserId| snapshot.users.iter().find(|u| u.id == id).unwrap().credits;
    assert_eq!(credits(a.id), Hours::whole(6));
    assert_eq!(credits(b.id), Hours::whole(4));

    let history = service::wallet::transactions(&env, b.id, None).await.unwrap();
    assert_eq!(history.len(), 1);
    let sender_history = service::wallet::transactions(&env, a.id, None).await.unwrap();
    assert_eq!(sender_history.len(), 2);
    assert_eq!(sender_history[0].tx_type, TransactionType::Transfer);
}

#[tokio::test]
async fn transfer_rejects_overdraft_and_self() {
    let (env, store) = fixtures::environment();
    let a = fixtures::funded_user(&env, "alice", 1).await;
    let b = fixtures::user(&env, "bob").await;
    let before = store.snapshot().await.ledger.len();

    let err = service::wallet::transfer(&env, a.id, transfer(b.id, 2)).await.unwrap_err();
    assert!(matches!(err, DomainError::InsufficientBalance { .. }));

    let err = service::wallet::transfer(&env, a.id, transfer(a.id, 1)).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let err = service::wallet::transfer(&env, a.id, transfer(UserId::new(), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound { .. }));

    let mut zero = transfer(b.id, 0);
    zero.amount = Hours::ZERO;
    let err = service::wallet::transfer(&env, a.id, zero).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    assert_eq!(store.snapshot().await.ledger.len(), before);
}

#[tokio::test]
async fn history_is_newest_first_and_limited() {
    let (env, _) = fixtures::environment();
    let a = fixtures::funded_user(&env, "alice", 10).await;
    let b = fixtures::user(&env, "bob").await;
    for _ in 0..3 {
        service::wallet::transfer(&env, a.id, transfer(b.id, 1)).await.unwrap();
    }

    let history = service::wallet::history(&env, a.id, Some(2)).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|e| e.hours == Hours::whole(1)));

    let all = service::wallet::history(&env, a.id, None).await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all.last().unwrap().hours, Hours::whole(10));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn transfers_conserve_total_balance(amounts in prop::collection::vec(1i64..6, 1..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let (env, _) = fixtures::environment();
            let a = fixtures::funded_user(&env, "alice", 20).await;
            let b = fixtures::funded_user(&env, "bob", 5).await;

            for (i, amount) in amounts.iter().enumerate() {
                let (from, to) = if i % 2 == 0 { (a.id, b.id) } else { (b.id, a.id) };
                // Overdrafts are rejected; either way the total stays put.
                let _ = service::wallet::transfer(&env, from, transfer(to, *amount)).await;
                let total = service::wallet::balance(&env, a.id).await.unwrap().balance
                    + service::wallet::balance(&env, b.id).await.unwrap().balance;
                assert_eq!(total, Hours::whole(25));
                assert!(!service::wallet::balance(&env, from).await.unwrap().balance.is_negative());
            }
        });
    }
}
