use fake_artist_lib::{net::ProtocolError, ClientId, RoomId};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::state::OwnedId;

use self::{
    room_actor::RoomActor,
    room_handle::{RoomHandle, RoomHandleProvider},
};

mod room_actor;
pub mod room_handle;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room {0} is full")]
    RoomFull(RoomId),
    #[error("Action attempted by client {0:#} who is not in this room")]
    ClientInvalid(ClientId),
    #[error("Client {0:#} attempted to send a presence event")]
    PresenceForged(ClientId),
    #[error("The Room Handle is no longer connected to a room.")]
    HandleInvalid,
}

impl From<RoomError> for ProtocolError {
    fn from(v: RoomError) -> Self {
        match v {
            RoomError::RoomFull(room_id) => Self::RoomFull(room_id),
            RoomError::PresenceForged(_) => Self::InvalidMessage,
            v => Self::Message(v.to_string()),
        }
    }
}

pub type RoomResult<T> = Result<T, RoomError>;

/// Events a room buffers per member. A member further behind than this is disconnected.
pub const ROOM_EVENT_CAPACITY: usize = 100;

/// Spawn the actor for a new room and return a handle for the client that opened it.
pub fn start_new_room(id: OwnedId<RoomId>, host_id: ClientId) -> (RoomHandleProvider, RoomHandle) {
    let (sender, receiver) = mpsc::channel(64);
    let weak_sender = sender.downgrade();
    let actor = RoomActor::new(receiver, id);
    let handle = RoomHandle {
        sender,
        client_id: host_id,
    };
    tokio::spawn(actor.run());

    (
        RoomHandleProvider {
            sender: weak_sender,
        },
        handle,
    )
}
