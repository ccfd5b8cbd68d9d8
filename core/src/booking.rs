//! Booking state machine.
//!
//! ```text
//! PENDING ──accept──▶ ACCEPTED ──confirm──▶ COMPLETED
//!    │                   │
//!    ├──decline──▶ DECLINED
//!    └──cancel───▶ CANCELLED ◀──cancel──┘
//! ```
//!
//! [`BookingReducer`] is pure: it validates an action against the current
//! booking, mutates the booking in place and returns [`BookingEffect`]s that
//! the service layer commits atomically through the store. On error the
//! booking is left untouched and no effects are produced.

use crate::environment::Clock;
use crate::error::{DomainError, Validator};
use crate::hours::Hours;
use crate::ids::{BookingId, UserId};
use crate::ledger::LedgerEntry;
use crate::message::Message;
use crate::notification::{Notification, NotificationPayload};
use crate::transaction::{Transaction, TransactionType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Reputation granted to the provider when a booking completes.
pub const PROVIDER_REPUTATION_BONUS: i64 = 10;
/// Reputation granted to the receiver when a booking completes.
pub const RECEIVER_REPUTATION_BONUS: i64 = 5;
/// Maximum category length in characters.
pub const MAX_CATEGORY_CHARS: usize = 64;
/// Thread opener used when the receiver leaves no note.
pub const DEFAULT_REQUEST_MESSAGE: &str = "Booking requested";

/// Lifecycle state of a booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Awaiting the provider's answer.
    Pending,
    /// Provider agreed; waiting for the exchange to happen.
    Accepted,
    /// Provider refused (terminal).
    Declined,
    /// A participant withdrew (terminal).
    Cancelled,
    /// Hours have been exchanged (terminal).
    Completed,
}

impl BookingStatus {
    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Declined => "DECLINED",
            Self::Cancelled => "CANCELLED",
            Self::Completed => "COMPLETED",
        }
    }

    /// No transition leaves a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Declined | Self::Cancelled | Self::Completed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "ACCEPTED" => Ok(Self::Accepted),
            "DECLINED" => Ok(Self::Declined),
            "CANCELLED" => Ok(Self::Cancelled),
            "COMPLETED" => Ok(Self::Completed),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

/// A time-exchange agreement between a provider and a receiver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Identifier.
    pub id: BookingId,
    /// User giving their time.
    pub provider_id: UserId,
    /// User receiving the service and paying the hours.
    pub receiver_id: UserId,
    /// Hours to exchange.
    pub hours: Hours,
    /// Service category.
    pub category: String,
    /// Note left by the receiver.
    pub note: Option<String>,
    /// Current state.
    pub status: BookingStatus,
    /// Agreed slot, set on accept.
    pub start_at: Option<DateTime<Utc>>,
    /// When the provider accepted.
    pub accepted_at: Option<DateTime<Utc>>,
    /// When a participant cancelled.
    pub cancelled_at: Option<DateTime<Utc>>,
    /// When the exchange was confirmed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Whether `user` is the provider or the receiver.
    #[must_use]
    pub fn is_participant(&self, user: UserId) -> bool {
        self.provider_id == user || self.receiver_id == user
    }

    /// The other participant, or `None` if `user` is not a participant.
    #[must_use]
    pub fn counterpart(&self, user: UserId) -> Option<UserId> {
        if user == self.provider_id {
            Some(self.receiver_id)
        } else if user == self.receiver_id {
            Some(self.provider_id)
        } else {
            None
        }
    }
}

/// Client input for a new booking.
#[derive(Clone, Debug, Deserialize)]
pub struct BookingDraft {
    /// Requested provider.
    pub provider_id: UserId,
    /// Requested hours.
    pub hours: Hours,
    /// Service category.
    pub category: String,
    /// Optional note, posted as the first thread message.
    #[serde(default)]
    pub note: Option<String>,
}

/// Transitions a participant can request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingAction {
    /// Provider agrees, optionally fixing a slot.
    Accept {
        /// Caller.
        actor: UserId,
        /// Proposed start time.
        slot: Option<DateTime<Utc>>,
    },
    /// Provider refuses.
    Decline {
        /// Caller.
        actor: UserId,
    },
    /// Either participant withdraws.
    Cancel {
        /// Caller.
        actor: UserId,
    },
    /// Either participant confirms the exchange happened.
    ConfirmCompletion {
        /// Caller.
        actor: UserId,
    },
}

impl BookingAction {
    /// The user requesting the transition.
    #[must_use]
    pub const fn actor(&self) -> UserId {
        match self {
            Self::Accept { actor, .. }
            | Self::Decline { actor }
            | Self::Cancel { actor }
            | Self::ConfirmCompletion { actor } => *actor,
        }
    }

    /// Metric label for the transition.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Accept { .. } => "accept",
            Self::Decline { .. } => "decline",
            Self::Cancel { .. } => "cancel",
            Self::ConfirmCompletion { .. } => "complete",
        }
    }
}

/// Precondition checked inside the commit: `user_id`'s ledger balance must
/// cover `required`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BalanceGuard {
    /// Payer.
    pub user_id: UserId,
    /// Amount that must be available.
    pub required: Hours,
}

/// Reputation change applied inside the commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReputationDelta {
    /// User whose reputation changes.
    pub user_id: UserId,
    /// Amount added.
    pub delta: i64,
}

/// Writes requested by the reducer.
#[derive(Clone, Debug, PartialEq)]
pub enum BookingEffect {
    /// Insert a notification.
    Notify(Notification),
    /// Abort the commit unless the balance covers the amount.
    RequireBalance(BalanceGuard),
    /// Insert a ledger row.
    AppendLedger(LedgerEntry),
    /// Insert a transaction record.
    RecordTransaction(Transaction),
    /// Adjust a user's reputation.
    AdjustReputation(ReputationDelta),
    /// Insert a thread message.
    PostMessage(Message),
}

/// Dependencies of the reducer.
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Time source for timestamps.
    pub clock: Arc<dyn Clock>,
}

impl BookingEnvironment {
    /// Creates an environment.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Effects produced by a single transition.
pub type Effects = SmallVec<[BookingEffect; 4]>;

/// The booking transition function.
#[derive(Clone, Copy, Debug, Default)]
pub struct BookingReducer;

impl BookingReducer {
    /// Creates a reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a draft and opens a PENDING booking.
    ///
    /// Returns the booking with the thread-opening message and the
    /// provider's notification. Whether the provider exists is checked by
    /// the caller.
    ///
    /// # Errors
    ///
    /// [`DomainError::Validation`] for bad hours, category or note, and for
    /// a receiver booking themselves.
    pub fn request(
        &self,
        receiver_id: UserId,
        draft: BookingDraft,
        env: &BookingEnvironment,
    ) -> Result<(Booking, Effects), DomainError> {
        let mut v = Validator::new();
        let hours = v.absorb(draft.hours.booking_hours());
        let category = draft.category.trim().to_lowercase();
        v.check(!category.is_empty(), "category", "is required");
        v.check(
            category.chars().count() <= MAX_CATEGORY_CHARS,
            "category",
            "must be at most 64 characters",
        );
        v.check(
            draft.provider_id != receiver_id,
            "provider_id",
            "cannot book yourself",
        );
        let note = draft
            .note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let opener = note.as_deref().unwrap_or(DEFAULT_REQUEST_MESSAGE);
        let now = env.clock.now();
        let id = BookingId::new();
        let message = v.absorb(Message::new(
            Some(id),
            receiver_id,
            draft.provider_id,
            opener,
            now,
        ));
        v.finish()?;

        let (Some(hours), Some(message)) = (hours, message) else {
            return Err(DomainError::validation("request", "is invalid"));
        };

        let booking = Booking {
            id,
            provider_id: draft.provider_id,
            receiver_id,
            hours,
            category: category.clone(),
            note,
            status: BookingStatus::Pending,
            start_at: None,
            accepted_at: None,
            cancelled_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        let effects = smallvec![
            BookingEffect::PostMessage(message),
            BookingEffect::Notify(Notification::new(
                booking.provider_id,
                NotificationPayload::BookingRequested {
                    booking_id: id,
                    receiver_id,
                    hours,
                    category,
                },
                now,
            )),
        ];
        Ok((booking, effects))
    }

    /// Applies `action` to `booking`.
    ///
    /// Authorization is checked before the current status, so a stranger
    /// always gets [`DomainError::Forbidden`] regardless of state.
    ///
    /// # Errors
    ///
    /// [`DomainError::Forbidden`] when the actor may not perform the action,
    /// [`DomainError::Conflict`] when the current status does not allow it.
    pub fn reduce(
        &self,
        booking: &mut Booking,
        action: BookingAction,
        env: &BookingEnvironment,
    ) -> Result<Effects, DomainError> {
        authorize(booking, &action)?;
        let now = env.clock.now();
        match action {
            BookingAction::Accept { actor, slot } => {
                require_status(booking, &[BookingStatus::Pending], "accepted")?;
                booking.status = BookingStatus::Accepted;
                booking.accepted_at = Some(now);
                booking.start_at = slot;
                booking.updated_at = now;
                Ok(smallvec![BookingEffect::Notify(Notification::new(
                    booking.receiver_id,
                    NotificationPayload::BookingAccepted {
                        booking_id: booking.id,
                        provider_id: actor,
                        start_at: slot,
                    },
                    now,
                ))])
            }
            BookingAction::Decline { actor } => {
                require_status(booking, &[BookingStatus::Pending], "declined")?;
                booking.status = BookingStatus::Declined;
                booking.updated_at = now;
                Ok(smallvec![BookingEffect::Notify(Notification::new(
                    booking.receiver_id,
                    NotificationPayload::BookingDeclined {
                        booking_id: booking.id,
                        provider_id: actor,
                    },
                    now,
                ))])
            }
            BookingAction::Cancel { actor } => {
                require_status(
                    booking,
                    &[BookingStatus::Pending, BookingStatus::Accepted],
                    "cancelled",
                )?;
                let Some(counterpart) = booking.counterpart(actor) else {
                    return Err(not_participant());
                };
                booking.status = BookingStatus::Cancelled;
                booking.cancelled_at = Some(now);
                booking.updated_at = now;
                Ok(smallvec![BookingEffect::Notify(Notification::new(
                    counterpart,
                    NotificationPayload::BookingCancelled {
                        booking_id: booking.id,
                        cancelled_by: actor,
                    },
                    now,
                ))])
            }
            BookingAction::ConfirmCompletion { .. } => {
                require_status(booking, &[BookingStatus::Accepted], "completed")?;
                booking.status = BookingStatus::Completed;
                booking.completed_at = Some(now);
                booking.updated_at = now;
                Ok(completion_effects(booking, now))
            }
        }
    }
}

fn completion_effects(booking: &Booking, now: DateTime<Utc>) -> Effects {
    let (id, hours) = (booking.id, booking.hours);
    let (provider, receiver) = (booking.provider_id, booking.receiver_id);
    let notify = |user, payload| BookingEffect::Notify(Notification::new(user, payload, now));

    let mut effects = Effects::new();
    effects.push(BookingEffect::RequireBalance(BalanceGuard {
        user_id: receiver,
        required: hours,
    }));
    effects.extend([
        BookingEffect::AppendLedger(LedgerEntry::earned(provider, hours, Some(id), now)),
        BookingEffect::AppendLedger(LedgerEntry::spent(receiver, hours, Some(id), now)),
        BookingEffect::RecordTransaction(
            Transaction::completed(TransactionType::Earned, Some(receiver), provider, hours, now)
                .for_booking(id),
        ),
        BookingEffect::RecordTransaction(
            Transaction::completed(TransactionType::Spent, Some(receiver), provider, hours, now)
                .for_booking(id),
        ),
        BookingEffect::AdjustReputation(ReputationDelta {
            user_id: provider,
            delta: PROVIDER_REPUTATION_BONUS,
        }),
        BookingEffect::AdjustReputation(ReputationDelta {
            user_id: receiver,
            delta: RECEIVER_REPUTATION_BONUS,
        }),
        notify(
            provider,
            NotificationPayload::BookingCompleted {
                booking_id: id,
                hours,
                counterpart_id: receiver,
            },
        ),
        notify(
            receiver,
            NotificationPayload::BookingCompleted {
                booking_id: id,
                hours,
                counterpart_id: provider,
            },
        ),
        notify(
            provider,
            NotificationPayload::CreditsEarned {
                booking_id: id,
                hours,
                from_user_id: receiver,
            },
        ),
        notify(
            receiver,
            NotificationPayload::CreditsSpent {
                booking_id: id,
                hours,
                to_user_id: provider,
            },
        ),
    ]);
    effects
}

fn authorize(booking: &Booking, action: &BookingAction) -> Result<(), DomainError> {
    let actor = action.actor();
    match action {
        BookingAction::Accept { .. } | BookingAction::Decline { .. } => {
            if actor == booking.provider_id {
                Ok(())
            } else {
                Err(DomainError::forbidden(format!(
                    "Only the provider can {} this booking",
                    action.label()
                )))
            }
        }
        BookingAction::Cancel { .. } | BookingAction::ConfirmCompletion { .. } => {
            if booking.is_participant(actor) {
                Ok(())
            } else {
                Err(not_participant())
            }
        }
    }
}

fn not_participant() -> DomainError {
    DomainError::forbidden("Not a participant of this booking")
}

fn require_status(
    booking: &Booking,
    allowed: &[BookingStatus],
    verb: &str,
) -> Result<(), DomainError> {
    if allowed.contains(&booking.status) {
        Ok(())
    } else {
        Err(DomainError::conflict(format!(
            "Booking cannot be {verb} from status {}",
            booking.status
        )))
    }
}
