use abort_on_drop::ChildTask;
use fake_artist_lib::net::connection::{self, ConnectionRx, ConnectionTx};
use fake_artist_lib::net::{Inbound, Message, ProtocolError};
use fake_artist_lib::{ClientId, RoomId};
use tokio::net::TcpStream;
use tokio::select;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::instrument;

use crate::room::room_handle::RoomHandle;
use crate::state::{OwnedId, ServerState};

/// Take a socket for a newly connected client and begin serving it.
pub async fn handle_new_connection(state: ServerState, socket: TcpStream) {
    let Some(client) = ConnectingClient::new(state, socket).handshake().await else {
        return;
    };
    client.run().await;
}

/// Represents a client who just connected and still needs to tell the server which room they want.
struct ConnectingClient {
    state: ServerState,
    client_id: OwnedId<ClientId>,
    conn_tx: ConnectionTx,
    conn_rx: ConnectionRx,
}

/// Everything a client gets out of a successful handshake.
struct JoinedRoom {
    room_id: RoomId,
    handle: RoomHandle,
    events: broadcast::Receiver<Inbound>,
}

impl ConnectingClient {
    fn new(state: ServerState, socket: TcpStream) -> Self {
        let client_id = state.add_client();
        let (conn_tx, conn_rx) = connection::from_socket(socket);
        Self {
            state,
            client_id,
            conn_tx,
            conn_rx,
        }
    }

    #[instrument(skip_all, fields(client_id = %self.client_id))]
    async fn handshake(mut self) -> Option<ConnectedClient> {
        match self.try_handshake().await {
            Ok(joined) => Some(ConnectedClient::from_connecting(self, joined)),
            Err(error) => {
                tracing::error!(%error);
                let _ = self.conn_tx.write_frame(Message::Error { error }).await;
                None
            }
        }
    }

    async fn try_handshake(&mut self) -> Result<JoinedRoom, ProtocolError> {
        let version = match self.conn_rx.read_frame().await? {
            Some(Message::Version { version }) => version,
            Some(_) => return Err(ProtocolError::InvalidMessage),
            None => return Err(ProtocolError::Disconnected),
        };

        if version != crate::VERSION {
            return Err(ProtocolError::VersionMismatch(
                version,
                crate::VERSION.to_owned(),
            ));
        }

        // Inform client of their ClientId
        self.conn_tx
            .write_frame(Message::ConnectionAccept {
                client_id: *self.client_id,
            })
            .await?;
        tracing::info!("New connection opened");

        let (room_id, handle, name) = match self.conn_rx.read_frame().await? {
            Some(Message::RoomHost { name }) => {
                let (room_id, handle) = self.state.open_room(*self.client_id);
                (room_id, handle, name)
            }
            Some(Message::RoomJoin { room_id, name }) => {
                let handle = self
                    .state
                    .get_room_handle_provider(&room_id)?
                    .into_handle(*self.client_id)
                    // The room closed since we looked it up
                    .map_err(|_| ProtocolError::InvalidRoomId(room_id.clone()))?;
                (room_id, handle, name)
            }
            Some(_) => return Err(ProtocolError::InvalidMessage),
            None => return Err(ProtocolError::Disconnected),
        };

        let events = handle.join_room(name).await?;
        // Must reach the client before any room traffic does
        self.conn_tx
            .write_frame(Message::RoomJoined {
                room_id: room_id.clone(),
            })
            .await?;
        tracing::info!("Joined room {room_id}");

        Ok(JoinedRoom {
            room_id,
            handle,
            events,
        })
    }
}

async fn send_task(
    client_id: ClientId,
    mut conn_tx: ConnectionTx,
    mut room_rx: broadcast::Receiver<Inbound>,
    mut local_rx: mpsc::Receiver<Message>,
) {
    loop {
        let m = select! {
            r = room_rx.recv() => match r {
                // Members don't hear their own events back
                Ok(inbound) if inbound.sender == Some(client_id) => None,
                Ok(inbound) => Some(Message::Room(inbound)),
                Err(RecvError::Lagged(n)) => {
                    // Missed events can't be replayed, so the client has to reconnect
                    tracing::error!("Client {client_id} fell behind and missed {n} room events. Disconnecting.");
                    return;
                }
                Err(RecvError::Closed) => return,
            },
            Some(m) = local_rx.recv() => Some(m),
            else => return,
        };

        let Some(m) = m else {
            continue;
        };
        if conn_tx.write_frame(m).await.is_err() {
            return;
        }
    }
}

/// Used to represent a client who is in a room.
struct ConnectedClient {
    client_id: OwnedId<ClientId>,
    room_id: RoomId,
    conn_rx: ConnectionRx,
    local_tx: mpsc::Sender<Message>,
    room_handle: RoomHandle,
    _send_task: ChildTask<()>,
}

impl ConnectedClient {
    fn from_connecting(client: ConnectingClient, joined: JoinedRoom) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let send_task = tokio::spawn(send_task(
            *client.client_id,
            client.conn_tx,
            joined.events,
            rx,
        ));

        Self {
            client_id: client.client_id,
            room_id: joined.room_id,
            conn_rx: client.conn_rx,
            local_tx: tx,
            room_handle: joined.handle,
            _send_task: send_task.into(),
        }
    }

    /// Takes ownership of self to guarantee that client will be dropped when it's
    /// message loop ends. Dropping leaves the room.
    #[instrument(skip_all, fields(client_id = %self.client_id, room_id = %self.room_id))]
    async fn run(mut self) {
        loop {
            let frame = select! {
                frame = self.conn_rx.read_frame() => frame,
                // The send task quit, nothing more can reach this client
                _ = self.local_tx.closed() => break,
            };
            let event = match frame {
                // The relay decides who the sender is
                Ok(Some(Message::Room(Inbound { event, .. }))) => event,
                Ok(Some(m)) => {
                    tracing::error!("Invalid message received: {m:?}");
                    self.send_error(ProtocolError::InvalidMessage).await;
                    continue;
                }
                Ok(None) => {
                    break;
                }
                Err(e) => {
                    tracing::error!("Error reading message, Closing connection\n{e:?}",);
                    break;
                }
            };

            tracing::debug!("Received '{}'", event.name());
            if let Err(e) = self.room_handle.relay(event).await {
                tracing::error!("Encountered error relaying event: {e:?}");
                self.send_error(e.into()).await;
            }
        }
        tracing::info!("Client disconnected");
    }

    async fn send_error(&self, error: ProtocolError) {
        let _ = self.local_tx.send(Message::Error { error }).await;
    }
}
