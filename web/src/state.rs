//! Shared application state.

use crate::auth::JwtKeys;
use crate::mail::Mailer;
use crate::metrics;
use crate::rate_limit::RateLimiter;
use crate::realtime::{Room, RoomHub, ServerEvent};
use axum::extract::FromRef;
use std::sync::Arc;
use timebank_core::booking::BookingStatus;
use timebank_core::environment::Clock;
use timebank_core::notification::Notification;
use timebank_core::service::booking::BookingOutcome;
use timebank_core::service::messaging::MessageOutcome;
use timebank_core::service::ServiceEnvironment;
use timebank_core::store::TimebankStore;

/// Everything a handler or socket needs.
///
/// Cloning is cheap; every field is shared.
#[derive(Clone)]
pub struct AppState {
    /// Persistent state.
    pub store: Arc<dyn TimebankStore>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// WebSocket rooms.
    pub hub: RoomHub,
    /// Outgoing email.
    pub mailer: Arc<dyn Mailer>,
    /// Token verification.
    pub jwt: JwtKeys,
    /// Per-IP request budget.
    pub limiter: RateLimiter,
}

impl AppState {
    /// Dependencies for the service layer.
    #[must_use]
    pub fn service_env(&self) -> ServiceEnvironment {
        ServiceEnvironment::new(Arc::clone(&self.store), Arc::clone(&self.clock))
    }

    /// Pushes a committed booking operation to connected clients and
    /// records it in the business metrics.
    pub async fn booking_committed(&self, outcome: &BookingOutcome) {
        let booking = &outcome.booking;
        metrics::booking_transition(booking.status);
        if booking.status == BookingStatus::Completed {
            metrics::hours_exchanged(booking.hours);
        }

        self.notify(&outcome.notifications).await;
        for message in &outcome.messages {
            self.hub
                .publish(Room::Booking(booking.id), ServerEvent::NewMessage(message.clone()))
                .await;
        }
        if outcome.previous.is_some() {
            self.hub
                .publish(
                    Room::Booking(booking.id),
                    ServerEvent::RequestStatusChanged {
                        booking: booking.clone(),
                        previous: outcome.previous,
                    },
                )
                .await;
        }
    }

    /// Pushes a new chat message: booking threads go to the booking room,
    /// direct messages to both users' rooms.
    pub async fn message_committed(&self, outcome: &MessageOutcome) {
        let message = &outcome.message;
        let event = ServerEvent::NewMessage(message.clone());
        match message.booking_id {
            Some(booking) => {
                self.hub.publish(Room::Booking(booking), event).await;
            }
            None => {
                self.hub
                    .publish(Room::User(message.recipient_id), event.clone())
                    .await;
                self.hub.publish(Room::User(message.sender_id), event).await;
            }
        }
        self.notify(std::slice::from_ref(&outcome.notification)).await;
    }

    /// Delivers notifications to their addressees' rooms.
    pub async fn notify(&self, notifications: &[Notification]) {
        for notification in notifications {
            self.hub
                .publish(
                    Room::User(notification.user_id),
                    ServerEvent::Notification(notification.clone()),
                )
                .await;
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

impl FromRef<AppState> for RateLimiter {
    fn from_ref(state: &AppState) -> Self {
        state.limiter.clone()
    }
}
