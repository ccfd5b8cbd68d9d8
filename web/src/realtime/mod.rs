//! Real-time layer: rooms, frames and the socket handler.

pub mod events;
pub mod hub;
pub mod socket;

pub use events::{ClientEvent, PresenceStatus, ServerEvent};
pub use hub::{ConnectionId, Envelope, Room, RoomHub, ROOM_CAPACITY};
pub use socket::ws_handler;
