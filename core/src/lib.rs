//! # TimeBank Core
//!
//! Domain types and rules for a time-exchange marketplace where members trade
//! services priced in hours.
//!
//! ## Core Concepts
//!
//! - **Booking**: an agreement for a provider to give hours to a receiver,
//!   driven through its lifecycle by the pure [`BookingReducer`]
//! - **Ledger**: append-only EARNED/SPENT rows; a balance is always
//!   `Σ EARNED − Σ SPENT`
//! - **Effects**: the reducer describes writes, the service layer commits
//!   them through a [`TimebankStore`] as one [`UnitOfWork`]
//! - **Environment**: time and storage are injected (`Clock`, `TimebankStore`)
//!
//! ## Example
//!
//! ```ignore
//! use timebank_core::prelude::*;
//!
//! let env = ServiceEnvironment::new(store, Arc::new(SystemClock));
//! let outcome = service::booking::create(&env, receiver, draft).await?;
//! service::booking::accept(&env, provider, outcome.booking.id, None).await?;
//! service::booking::confirm_completion(&env, receiver, outcome.booking.id).await?;
//! ```

pub mod booking;
pub mod environment;
pub mod error;
pub mod hours;
pub mod ids;
pub mod ledger;
pub mod message;
pub mod notification;
pub mod rating;
pub mod scoring;
pub mod service;
pub mod store;
pub mod transaction;
pub mod user;

pub use booking::{Booking, BookingAction, BookingEffect, BookingReducer, BookingStatus};
pub use error::{DomainError, FieldError};
pub use hours::Hours;
pub use store::{StoreError, TimebankStore, UnitOfWork};

/// Prelude of the types most callers need.
pub mod prelude {
    pub use crate::booking::{
        Booking, BookingAction, BookingDraft, BookingEffect, BookingEnvironment, BookingReducer,
        BookingStatus,
    };
    pub use crate::environment::{Clock, SystemClock};
    pub use crate::error::{DomainError, FieldError};
    pub use crate::hours::Hours;
    pub use crate::ids::{
        BookingId, LedgerEntryId, MessageId, NotificationId, RatingId, TransactionId, UserId,
    };
    pub use crate::ledger::{EntryType, LedgerEntry, LedgerTotals};
    pub use crate::message::Message;
    pub use crate::notification::{Notification, NotificationPayload};
    pub use crate::rating::Rating;
    pub use crate::service::{self, ServiceEnvironment};
    pub use crate::store::{
        BookingFilter, BookingRole, BookingWrite, NotificationFilter, StoreError, StoreFuture,
        TimebankStore, UnitOfWork,
    };
    pub use crate::transaction::{Transaction, TransactionStatus, TransactionType};
    pub use crate::user::{Profile, ProviderProfile, User};
}
