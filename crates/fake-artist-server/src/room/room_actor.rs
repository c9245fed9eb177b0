use fake_artist_lib::net::{Inbound, RoomEvent};
use fake_artist_lib::{ClientId, RoomId, MAX_PLAYERS};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::instrument;

use crate::state::OwnedId;

use super::{RoomError, RoomResult, ROOM_EVENT_CAPACITY};

/// Owns the membership of one room and fans room events out to its members.
///
/// The relay knows nothing about the game being played. Members' events are
/// forwarded untouched apart from being tagged with the sender's id.
pub struct RoomActor {
    receiver: mpsc::Receiver<RoomAction>,
    room_id: OwnedId<RoomId>,
    /// In join order.
    members: Vec<ClientId>,
    sender: broadcast::Sender<Inbound>,
}

#[derive(Debug)]
pub enum RoomAction {
    AddMember {
        respond_to: oneshot::Sender<RoomResult<broadcast::Receiver<Inbound>>>,
        id: ClientId,
        name: Option<String>,
    },
    RemoveMember {
        id: ClientId,
    },
    Relay {
        respond_to: oneshot::Sender<RoomResult<()>>,
        id: ClientId,
        event: RoomEvent,
    },
}

impl RoomActor {
    pub fn new(receiver: mpsc::Receiver<RoomAction>, room_id: OwnedId<RoomId>) -> Self {
        let (sender, _) = broadcast::channel(ROOM_EVENT_CAPACITY);

        Self {
            receiver,
            room_id,
            members: Vec::new(),
            sender,
        }
    }

    #[instrument(skip_all, fields(room_id = %self.room_id))]
    pub async fn run(mut self) {
        tracing::info!("Room opened");
        while let Some(msg) = self.receiver.recv().await {
            match msg {
                RoomAction::AddMember {
                    respond_to,
                    id,
                    name,
                } => {
                    let _ = respond_to.send(self.add_member(id, name));
                }
                RoomAction::RemoveMember { id } => self.rem_member(id),
                RoomAction::Relay {
                    respond_to,
                    id,
                    event,
                } => {
                    let _ = respond_to.send(self.relay(id, event));
                }
            }
        }
        // Dropping `room_id` removes this room from the server
    }

    fn broadcast(&self, inbound: Inbound) {
        if self.sender.send(inbound).is_err() {
            tracing::debug!("Room event dropped, nobody is listening");
        }
    }
}

// ----------------------------------------------------------------------------
// Message Handlers
// ----------------------------------------------------------------------------
impl RoomActor {
    /// Adds a new member to this room and announces them to everyone, themselves included.
    /// The returned `[broadcast::Receiver]` is sent all future events of this room.
    ///
    /// # Errors
    ///
    /// This function will return an error if the room is already full
    #[instrument(skip(self, name))]
    fn add_member(
        &mut self,
        client_id: ClientId,
        name: Option<String>,
    ) -> RoomResult<broadcast::Receiver<Inbound>> {
        if self.members.len() >= MAX_PLAYERS {
            return Err(RoomError::RoomFull((*self.room_id).clone()));
        }
        self.members.push(client_id);
        tracing::info!("Client joined room");

        // Subscribe early so that this member will receive their own join
        let recv = self.sender.subscribe();
        self.broadcast(Inbound::from_relay(RoomEvent::PlayerJoined { client_id, name }));

        Ok(recv)
    }

    #[instrument(skip(self))]
    fn rem_member(&mut self, client_id: ClientId) {
        let Some(index) = self.members.iter().position(|&id| id == client_id) else {
            tracing::warn!("Attempted to remove client from room who isn't in it");
            return;
        };
        self.members.remove(index);
        tracing::info!("Client left room");

        self.broadcast(Inbound::from_relay(RoomEvent::PlayerLeft {
            player_id: None,
            client_id: Some(client_id),
        }));

        // Close the room after the last member leaves by closing our receiver.
        // The run loop drains whatever is left and then exits.
        if self.members.is_empty() {
            self.receiver.close();
        }
    }

    #[instrument(skip(self, event), fields(event = event.name()))]
    fn relay(&mut self, client_id: ClientId, event: RoomEvent) -> RoomResult<()> {
        if !self.members.contains(&client_id) {
            return Err(RoomError::ClientInvalid(client_id));
        }
        if event.is_presence() {
            return Err(RoomError::PresenceForged(client_id));
        }

        tracing::debug!("Relaying room event");
        self.broadcast(Inbound::from_client(client_id, event));
        Ok(())
    }
}
