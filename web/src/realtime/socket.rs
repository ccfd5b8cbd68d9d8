//! WebSocket connections.
//!
//! A connection authenticates during the handshake (bearer header or
//! `?token=`), joins `user:<id>` and `presence`, then processes client
//! frames until the socket closes. Each joined room gets a forwarding task
//! that copies room events into the connection's outbound queue; a single
//! writer task drains that queue into the socket.

use super::events::{ClientEvent, PresenceStatus, ServerEvent};
use super::hub::{ConnectionId, Room, ROOM_CAPACITY};
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::metrics;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use timebank_core::booking::BookingStatus;
use timebank_core::ids::{BookingId, UserId};
use timebank_core::service::{self, messaging::SendMessage};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// `GET /ws`: upgrades an authenticated request.
#[allow(clippy::unused_async)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Response {
    ws.on_upgrade(move |socket| serve(socket, state, user))
}

async fn serve(socket: WebSocket, state: AppState, user: UserId) {
    let (mut sink, mut stream) = socket.split();
    let (mut connection, mut outbound) = Connection::open(state, user).await;

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match serde_json::to_string(&*event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize socket event");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => connection.on_text(&text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "Socket read failed");
                    break;
                }
            },
            _ = &mut send_task => break,
        }
    }

    send_task.abort();
    connection.close().await;
}

/// Per-socket state.
pub(crate) struct Connection {
    id: ConnectionId,
    user: UserId,
    state: AppState,
    outbound: mpsc::Sender<Arc<ServerEvent>>,
    rooms: HashMap<Room, JoinHandle<()>>,
}

impl Connection {
    /// Registers a connection for `user` and announces it as online.
    pub(crate) async fn open(
        state: AppState,
        user: UserId,
    ) -> (Self, mpsc::Receiver<Arc<ServerEvent>>) {
        let (outbound, rx) = mpsc::channel(ROOM_CAPACITY);
        let mut connection = Self {
            id: Uuid::new_v4(),
            user,
            state,
            outbound,
            rooms: HashMap::new(),
        };
        connection.join(Room::User(user)).await;
        connection.join(Room::Presence).await;
        connection.announce(PresenceStatus::Online).await;
        metrics::ws_connected();
        info!(user_id = %user, connection_id = %connection.id, "Socket connected");
        (connection, rx)
    }

    /// Leaves every room and announces the user as offline.
    pub(crate) async fn close(mut self) {
        let forwarders: Vec<_> = self.rooms.drain().map(|(_, task)| task).collect();
        for task in forwarders {
            stop(task).await;
        }
        self.announce(PresenceStatus::Offline).await;
        self.state.hub.prune().await;
        metrics::ws_disconnected();
        info!(user_id = %self.user, connection_id = %self.id, "Socket closed");
    }

    /// Parses and handles one text frame; failures become `error` frames.
    pub(crate) async fn on_text(&mut self, text: &str) {
        let result = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle(event).await,
            Err(e) => Err(AppError::invalid_field("frame", e.to_string())),
        };
        if let Err(err) = result {
            debug!(user_id = %self.user, error = %err, "Socket frame rejected");
            self.push(ServerEvent::error(err.code(), err.message())).await;
        }
    }

    async fn handle(&mut self, event: ClientEvent) -> Result<(), AppError> {
        let env = self.state.service_env();
        match event {
            ClientEvent::JoinRequest { booking_id } => {
                service::booking::get(&env, self.user, booking_id).await?;
                self.join(Room::Booking(booking_id)).await;
            }
            ClientEvent::LeaveRequest { booking_id } => {
                if let Some(task) = self.rooms.remove(&Room::Booking(booking_id)) {
                    stop(task).await;
                    self.state.hub.prune().await;
                }
            }
            ClientEvent::SendMessage { booking_id, body } => {
                let request = SendMessage {
                    booking_id: Some(booking_id),
                    recipient_id: None,
                    body,
                };
                let outcome = service::messaging::send(&env, self.user, request).await?;
                self.state.message_committed(&outcome).await;
            }
            ClientEvent::SendDirectMessage { recipient_id, body } => {
                let request = SendMessage {
                    booking_id: None,
                    recipient_id: Some(recipient_id),
                    body,
                };
                let outcome = service::messaging::send(&env, self.user, request).await?;
                self.state.message_committed(&outcome).await;
            }
            ClientEvent::TypingStart { booking_id } => self.typing(booking_id, true).await?,
            ClientEvent::TypingStop { booking_id } => self.typing(booking_id, false).await?,
            ClientEvent::RequestStatusUpdate { booking_id, status } => {
                let outcome = match status {
                    BookingStatus::Accepted => {
                        service::booking::accept(&env, self.user, booking_id, None).await?
                    }
                    BookingStatus::Declined => {
                        service::booking::decline(&env, self.user, booking_id).await?
                    }
                    BookingStatus::Cancelled => {
                        service::booking::cancel(&env, self.user, booking_id).await?
                    }
                    BookingStatus::Completed => {
                        service::booking::confirm_completion(&env, self.user, booking_id).await?
                    }
                    BookingStatus::Pending => {
                        return Err(AppError::invalid_field(
                            "status",
                            "a booking cannot be moved back to PENDING",
                        ));
                    }
                };
                self.state.booking_committed(&outcome).await;
            }
            ClientEvent::UpdateStatus { status } => self.announce(status).await,
        }
        Ok(())
    }

    async fn typing(&self, booking_id: BookingId, typing: bool) -> Result<(), AppError> {
        let room = Room::Booking(booking_id);
        if !self.rooms.contains_key(&room) {
            return Err(AppError::forbidden("Join the request before typing in it"));
        }
        self.state
            .hub
            .publish_except(
                room,
                Some(self.id),
                ServerEvent::UserTyping {
                    booking_id,
                    user_id: self.user,
                    typing,
                },
            )
            .await;
        Ok(())
    }

    async fn announce(&self, status: PresenceStatus) {
        self.state
            .hub
            .publish(
                Room::Presence,
                ServerEvent::UserStatusChanged {
                    user_id: self.user,
                    status,
                },
            )
            .await;
    }

    async fn join(&mut self, room: Room) {
        if self.rooms.contains_key(&room) {
            return;
        }
        let mut rx = self.state.hub.subscribe(room).await;
        let outbound = self.outbound.clone();
        let me = self.id;
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) if envelope.except == Some(me) => {}
                    Ok(envelope) => {
                        if outbound.send(envelope.event).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%room, skipped, "Socket lagging behind room; events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        self.rooms.insert(room, task);
    }

    async fn push(&self, event: ServerEvent) {
        let _ = self.outbound.send(Arc::new(event)).await;
    }
}

/// Aborts a room forwarder and waits until its receiver is dropped.
async fn stop(task: JoinHandle<()>) {
    task.abort();
    let _ = task.await;
}
