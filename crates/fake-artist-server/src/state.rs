use fake_artist_lib::net::ProtocolError;
use fake_artist_lib::{ClientId, RoomId};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::room;
use crate::room::room_handle::{RoomHandle, RoomHandleProvider};

const ROOM_CODE_LEN: usize = 6;

#[derive(Clone, Debug, Default)]
pub struct ServerState {
    clients: Arc<Mutex<HashSet<ClientId>>>,
    rooms: Arc<Mutex<HashMap<RoomId, RoomHandleProvider>>>,
}

impl ServerState {
    pub fn add_client(&self) -> OwnedId<ClientId> {
        let client_id = self.gen_client_id();
        self.clients().insert(client_id);
        OwnedId::<ClientId>::new(self.clone(), client_id)
    }

    /// Open a new room with the client represented by `host_id` as its first member.
    ///
    /// This will add a [`RoomHandleProvider`] to [`ServerState`]'s room list and return a
    /// concrete `RoomHandle` for the client who opened the room.
    pub fn open_room(&self, host_id: ClientId) -> (RoomId, RoomHandle) {
        let room_id = self.gen_room_id();
        let (handle_provider, handle) = room::start_new_room(
            OwnedId::<RoomId>::new(self.clone(), room_id.clone()),
            host_id,
        );
        tracing::info!("Room {room_id} opened");
        self.rooms().insert(room_id.clone(), handle_provider);
        (room_id, handle)
    }

    /// Get a [`RoomHandleProvider`] instance for the specified `room_id`
    ///
    /// # Errors
    ///
    /// Will return a [`ProtocolError::InvalidRoomId`] if the given room id does
    /// not correspond to an open room.
    pub fn get_room_handle_provider(
        &self,
        room_id: &RoomId,
    ) -> Result<RoomHandleProvider, ProtocolError> {
        let provider = self
            .rooms()
            .get(room_id)
            .ok_or_else(|| ProtocolError::InvalidRoomId(room_id.clone()))?
            .clone();
        Ok(provider)
    }

    fn clients(&self) -> MutexGuard<HashSet<ClientId>> {
        self.clients.lock().unwrap()
    }

    fn rooms(&self) -> MutexGuard<HashMap<RoomId, RoomHandleProvider>> {
        self.rooms.lock().unwrap()
    }

    fn gen_client_id(&self) -> ClientId {
        let mut client_id: ClientId;
        loop {
            client_id = thread_rng().gen::<u32>().into();
            if !self.clients().contains(&client_id) {
                break;
            };
        }
        client_id
    }

    /// Room codes are short enough to read aloud.
    fn gen_room_id(&self) -> RoomId {
        let mut room_id: RoomId;
        loop {
            room_id = thread_rng()
                .sample_iter(&Alphanumeric)
                .take(ROOM_CODE_LEN)
                .map(|c| char::from(c).to_ascii_uppercase())
                .collect::<String>()
                .into();
            if !self.rooms().contains_key(&room_id) {
                break;
            };
        }
        room_id
    }
}

/// Wrapper around Id types that is handed out when an Id is stored in the state
/// and when dropped will remove that id from the state.
#[derive(Debug)]
pub struct OwnedId<Id: Clone> {
    state: ServerState,
    id: Id,
    cleanup: fn(ServerState, Id),
}

impl<Id: Display + Clone> Display for OwnedId<Id> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.id.fmt(f)
    }
}

/// Workaround for testing RoomActor
#[cfg(test)]
impl From<RoomId> for OwnedId<RoomId> {
    fn from(v: RoomId) -> Self {
        Self {
            state: ServerState::default(),
            id: v,
            cleanup: |_, _| {},
        }
    }
}

impl OwnedId<ClientId> {
    fn new(state: ServerState, id: ClientId) -> Self {
        Self {
            state,
            id,
            cleanup: |state, id| {
                tracing::info!("Client {id} disconnected");
                state.clients().remove(&id);
            },
        }
    }
}

impl OwnedId<RoomId> {
    fn new(state: ServerState, id: RoomId) -> Self {
        Self {
            state,
            id,
            cleanup: |state, id| {
                tracing::info!("Closing room {id}");
                state.rooms().remove(&id);
            },
        }
    }
}

impl<Id: Clone> Deref for OwnedId<Id> {
    type Target = Id;

    fn deref(&self) -> &Self::Target {
        &self.id
    }
}

impl<Id: Clone> Drop for OwnedId<Id> {
    fn drop(&mut self) {
        // This will crash the program if we're dropping due to a previous panic caused by a poisoned lock,
        // and that's fine for now.
        (self.cleanup)(self.state.clone(), self.id.clone());
    }
}
