//! Wallet reads, transfers and bonuses.
//!
//! The ledger is authoritative: balances are always derived from ledger rows
//! and every credit movement appends rows in the same commit as its
//! transaction record.

use super::{ServiceEnvironment, page_limit};
use crate::booking::BalanceGuard;
use crate::error::{DomainError, Validator};
use crate::hours::Hours;
use crate::ids::UserId;
use crate::ledger::{LedgerEntry, LedgerTotals};
use crate::notification::{Notification, NotificationPayload};
use crate::store::UnitOfWork;
use crate::transaction::{Transaction, TransactionType};
use serde::{Deserialize, Serialize};

/// Maximum description length in characters.
const MAX_DESCRIPTION_CHARS: usize = 255;

/// Wallet summary returned by `GET /wallet/balance`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalance {
    /// `earned − spent`.
    pub balance: Hours,
    /// Σ EARNED.
    pub earned: Hours,
    /// Σ SPENT.
    pub spent: Hours,
}

impl From<LedgerTotals> for WalletBalance {
    fn from(totals: LedgerTotals) -> Self {
        Self {
            balance: totals.balance(),
            earned: totals.earned,
            spent: totals.spent,
        }
    }
}

/// Client input for a direct transfer.
#[derive(Clone, Debug, Deserialize)]
pub struct TransferRequest {
    /// Credited user.
    pub receiver_id: UserId,
    /// Amount to move.
    pub amount: Hours,
    /// Optional description shown in both histories.
    #[serde(default)]
    pub description: Option<String>,
}

/// A committed transfer or bonus.
#[derive(Clone, Debug)]
pub struct CreditOutcome {
    /// The transaction record.
    pub transaction: Transaction,
    /// Notification sent to the credited user.
    pub notification: Notification,
}

/// Ledger-derived balance of a user.
///
/// # Errors
///
/// Propagates store failures.
pub async fn balance(env: &ServiceEnvironment, user: UserId) -> Result<WalletBalance, DomainError> {
    Ok(env.store.ledger_totals(user).await?.into())
}

/// A user's ledger rows, newest first (default 50, at most 200).
///
/// # Errors
///
/// Propagates store failures.
pub async fn history(
    env: &ServiceEnvironment,
    user: UserId,
    limit: Option<usize>,
) -> Result<Vec<LedgerEntry>, DomainError> {
    Ok(env.store.ledger_entries(user, page_limit(limit)).await?)
}

/// Transactions where the user is sender or receiver, newest first.
///
/// # Errors
///
/// Propagates store failures.
pub async fn transactions(
    env: &ServiceEnvironment,
    user: UserId,
    limit: Option<usize>,
) -> Result<Vec<Transaction>, DomainError> {
    Ok(env.store.list_transactions(user, page_limit(limit)).await?)
}

/// Moves `amount` hours from `sender` to the request's receiver.
///
/// # Errors
///
/// - [`DomainError::Validation`]: non-positive amount, self-transfer, long description
/// - [`DomainError::NotFound`]: unknown receiver
/// - [`DomainError::InsufficientBalance`]: the sender's ledger balance is too low
#[tracing::instrument(skip(env, request), fields(receiver = %request.receiver_id))]
pub async fn transfer(
    env: &ServiceEnvironment,
    sender: UserId,
    request: TransferRequest,
) -> Result<CreditOutcome, DomainError> {
    let mut v = Validator::new();
    let amount = v.absorb(request.amount.positive("amount"));
    v.check(
        request.receiver_id != sender,
        "receiver_id",
        "cannot transfer to yourself",
    );
    let description = clean_description(request.description, &mut v);
    v.finish()?;
    let Some(amount) = amount else {
        return Err(DomainError::validation("amount", "is invalid"));
    };

    let receiver = request.receiver_id;
    if env.store.get_user(receiver).await?.is_none() {
        return Err(DomainError::not_found("User", receiver));
    }

    let now = env.now();
    let transaction = Transaction::completed(TransactionType::Transfer, Some(sender), receiver, amount, now)
        .described(description);
    let notification = Notification::new(
        receiver,
        NotificationPayload::CreditsReceived {
            transaction_id: transaction.id,
            amount,
            sender_id: sender,
        },
        now,
    );
    let unit = UnitOfWork {
        balance_guards: vec![BalanceGuard {
            user_id: sender,
            required: amount,
        }],
        ledger: vec![
            LedgerEntry::spent(sender, amount, None, now),
            LedgerEntry::earned(receiver, amount, None, now),
        ],
        transactions: vec![transaction.clone()],
        notifications: vec![notification.clone()],
        ..UnitOfWork::new()
    };
    env.store.commit(unit).await?;
    tracing::info!(transaction_id = %transaction.id, %amount, "Credits transferred");
    Ok(CreditOutcome {
        transaction,
        notification,
    })
}

/// Credits `amount` hours to `user` from the platform.
///
/// # Errors
///
/// - [`DomainError::Validation`]: non-positive amount
/// - [`DomainError::NotFound`]: unknown user
#[tracing::instrument(skip(env, reason))]
pub async fn grant_bonus(
    env: &ServiceEnvironment,
    user: UserId,
    amount: Hours,
    reason: &str,
) -> Result<CreditOutcome, DomainError> {
    let amount = amount.positive("amount")?;
    if env.store.get_user(user).await?.is_none() {
        return Err(DomainError::not_found("User", user));
    }

    let now = env.now();
    let reason = reason.trim().to_string();
    let transaction = Transaction::completed(TransactionType::Bonus, None, user, amount, now)
        .described(Some(reason.clone()).filter(|r| !r.is_empty()));
    let notification = Notification::new(
        user,
        NotificationPayload::BonusGranted {
            transaction_id: transaction.id,
            amount,
            reason,
        },
        now,
    );
    let unit = UnitOfWork {
        ledger: vec![LedgerEntry::earned(user, amount, None, now)],
        transactions: vec![transaction.clone()],
        notifications: vec![notification.clone()],
        ..UnitOfWork::new()
    };
    env.store.commit(unit).await?;
    tracing::info!(transaction_id = %transaction.id, %amount, "Bonus granted");
    Ok(CreditOutcome {
        transaction,
        notification,
    })
}

fn clean_description(description: Option<String>, v: &mut Validator) -> Option<String> {
    let description = description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    v.check(
        description
            .as_ref()
            .is_none_or(|d| d.chars().count() <= MAX_DESCRIPTION_CHARS),
        "description",
        "must be at most 255 characters",
    );
    description
}
