//! Room-based broadcast hub.
//!
//! Each room is a `tokio::sync::broadcast` channel created on first
//! subscription. Publishing to a room nobody has joined is a no-op. Rooms
//! whose last receiver went away are dropped by [`RoomHub::prune`].

use super::events::ServerEvent;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use timebank_core::ids::{BookingId, UserId};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Buffered events per room before slow receivers start lagging.
pub const ROOM_CAPACITY: usize = 256;

/// A broadcast scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Room {
    /// `user:<id>`: every connection of one user.
    User(UserId),
    /// `request:<id>`: participants watching one booking.
    Booking(BookingId),
    /// `presence`: every connection; carries online status changes.
    Presence,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Booking(id) => write!(f, "request:{id}"),
            Self::Presence => f.write_str("presence"),
        }
    }
}

/// Identifies one socket, so a client's own typing events are not echoed.
pub type ConnectionId = Uuid;

/// What travels through a room channel.
#[derive(Clone, Debug)]
pub struct Envelope {
    /// Connection that must not receive the event (its own typing signal).
    pub except: Option<ConnectionId>,
    /// Event to deliver.
    pub event: Arc<ServerEvent>,
}

/// Shared registry of rooms.
#[derive(Clone, Debug, Default)]
pub struct RoomHub {
    rooms: Arc<RwLock<HashMap<Room, broadcast::Sender<Envelope>>>>,
}

impl RoomHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins `room`, creating its channel if needed.
    pub async fn subscribe(&self, room: Room) -> broadcast::Receiver<Envelope> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Sends `event` to everyone in `room`; returns how many receivers got it.
    pub async fn publish(&self, room: Room, event: ServerEvent) -> usize {
        self.publish_except(room, None, event).await
    }

    /// Like [`publish`](Self::publish), skipping connection `except`.
    pub async fn publish_except(
        &self,
        room: Room,
        except: Option<ConnectionId>,
        event: ServerEvent,
    ) -> usize {
        let rooms = self.rooms.read().await;
        let Some(sender) = rooms.get(&room) else {
            return 0;
        };
        let delivered = sender
            .send(Envelope {
                except,
                event: Arc::new(event),
            })
            .unwrap_or(0);
        tracing::trace!(%room, delivered, "Published room event");
        delivered
    }

    /// Drops rooms without receivers.
    pub async fn prune(&self) {
        self.rooms
            .write()
            .await
            .retain(|_, sender| sender.receiver_count() > 0);
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::realtime::events::PresenceStatus;

    fn status(user: UserId) -> ServerEvent {
        ServerEvent::UserStatusChanged {
            user_id: user,
            status: PresenceStatus::Online,
        }
    }

    #[test]
    fn room_names() {
        let user = UserId::new();
        let booking = BookingId::new();
        assert_eq!(Room::User(user).to_string(), format!("user:{user}"));
        assert_eq!(Room::Booking(booking).to_string(), format!("request:{booking}"));
    }

    #[tokio::test]
    async fn events_reach_only_their_room() {
        let hub = RoomHub::new();
        let (alice, bob) = (UserId::new(), UserId::new());
        let mut alice_rx = hub.subscribe(Room::User(alice)).await;
        let mut bob_rx = hub.subscribe(Room::User(bob)).await;

        assert_eq!(hub.publish(Room::User(alice), status(alice)).await, 1);

        let envelope = alice_rx.recv().await.unwrap();
        assert!(matches!(*envelope.event, ServerEvent::UserStatusChanged { user_id, .. } if user_id == alice));
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publishing_to_an_empty_room_creates_nothing() {
        let hub = RoomHub::new();
        assert_eq!(hub.publish(Room::Presence, status(UserId::new())).await, 0);
        assert_eq!(hub.room_count().await, 0);
    }

    #[tokio::test]
    async fn prune_drops_abandoned_rooms() {
        let hub = RoomHub::new();
        let kept = hub.subscribe(Room::Presence).await;
        let dropped = hub.subscribe(Room::Booking(BookingId::new())).await;
        drop(dropped);

        hub.prune().await;
        assert_eq!(hub.room_count().await, 1);
        drop(kept);
    }

    #[tokio::test]
    async fn slow_receivers_lag_instead_of_blocking() {
        let hub = RoomHub::new();
        let user = UserId::new();
        let mut rx = hub.subscribe(Room::User(user)).await;
        for _ in 0..ROOM_CAPACITY + 10 {
            hub.publish(Room::User(user), status(user)).await;
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(10))
        ));
    }
}
