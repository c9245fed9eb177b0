//! Client side of a relay connection.
//!
//! [`connect`] performs the handshake and spawns a task that owns the socket.
//! The session talks to that task through [`NetTransport`] and receives room
//! events from [`Connection::inbound`].

use anyhow::{anyhow, Context};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::connection::{self, ConnectionRx, ConnectionTx};
use super::{Inbound, Message, ProtocolError, RoomEvent, Transport};
use crate::{ClientId, RoomId};

pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:42932";
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

pub type NetCommandReceiver = mpsc::Receiver<NetCommand>;
pub type NetCommandSender = mpsc::Sender<NetCommand>;

#[derive(Clone, Debug)]
pub enum NetCommand {
    Disconnect,
    Send(RoomEvent),
}

/// What to do once connected.
#[derive(Clone, Debug)]
pub enum RoomRequest {
    Host { name: Option<String> },
    Join { room_id: RoomId, name: Option<String> },
}

impl From<RoomRequest> for Message {
    fn from(request: RoomRequest) -> Self {
        match request {
            RoomRequest::Host { name } => Message::RoomHost { name },
            RoomRequest::Join { room_id, name } => Message::RoomJoin { room_id, name },
        }
    }
}

/// [`Transport`] backed by a running connection task.
#[derive(Clone, Debug)]
pub struct NetTransport {
    sender: NetCommandSender,
}

impl NetTransport {
    pub fn new(sender: NetCommandSender) -> Self {
        Self { sender }
    }
}

impl Transport for NetTransport {
    fn emit(&mut self, event: RoomEvent) {
        if let Err(e) = self.sender.try_send(NetCommand::Send(event)) {
            tracing::error!("Failed to queue room event: {e}");
        }
    }

    fn leave_room(&mut self) {
        // The connection task may already be gone, in which case we've left anyway
        let _ = self.sender.try_send(NetCommand::Disconnect);
    }
}

#[derive(Debug)]
pub struct Connection {
    pub client_id: ClientId,
    pub room_id: RoomId,
    pub transport: NetTransport,
    pub inbound: mpsc::Receiver<Inbound>,
    pub task: JoinHandle<()>,
}

/// Connect to the relay at `addr`, then host or join a room.
///
/// # Errors
///
/// Fails if the relay can't be reached, rejects our version, or refuses the room request.
pub async fn connect(addr: impl ToSocketAddrs, request: RoomRequest) -> anyhow::Result<Connection> {
    let sock = TcpStream::connect(addr)
        .await
        .context("Failed to connect to server")?;
    let (mut conn_tx, mut conn_rx) = connection::from_socket(sock);

    conn_tx
        .write_frame(Message::Version {
            version: PROTOCOL_VERSION.to_owned(),
        })
        .await?;
    let client_id = match expect_frame(&mut conn_rx).await? {
        Message::ConnectionAccept { client_id } => client_id,
        m => return Err(anyhow!("Unexpected handshake message {m:?}")),
    };
    tracing::info!("Connected as client {client_id}");

    conn_tx.write_frame(request).await?;
    let room_id = match expect_frame(&mut conn_rx).await? {
        Message::RoomJoined { room_id } => room_id,
        m => return Err(anyhow!("Unexpected handshake message {m:?}")),
    };
    tracing::info!("Joined room {room_id}");

    let (command_tx, command_rx) = mpsc::channel(64);
    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let task = tokio::spawn(run(conn_tx, conn_rx, command_rx, inbound_tx));

    Ok(Connection {
        client_id,
        room_id,
        transport: NetTransport::new(command_tx),
        inbound: inbound_rx,
        task,
    })
}

/// Read the next frame, turning a relay `Error` or a closed socket into an error.
async fn expect_frame(conn_rx: &mut ConnectionRx) -> anyhow::Result<Message> {
    match conn_rx.read_frame().await? {
        Some(Message::Error { error }) => Err(error.into()),
        Some(m) => Ok(m),
        None => Err(ProtocolError::Disconnected.into()),
    }
}

async fn run(
    mut conn_tx: ConnectionTx,
    conn_rx: ConnectionRx,
    mut receiver: NetCommandReceiver,
    inbound: mpsc::Sender<Inbound>,
) {
    let recv_task = tokio::spawn(recv_task(conn_rx, inbound));
    while let Some(command) = receiver.recv().await {
        let event = match command {
            NetCommand::Disconnect => break,
            NetCommand::Send(event) => event,
        };
        tracing::debug!("Sending '{}'", event.name());
        if let Err(e) = conn_tx.write_frame(event).await {
            tracing::error!("Error sending message to server. Disconnecting. {e}");
            break;
        }
    }
    recv_task.abort();
    tracing::info!("Disconnected from server.")
}

async fn recv_task(mut conn_rx: ConnectionRx, inbound: mpsc::Sender<Inbound>) {
    loop {
        let incoming = match conn_rx.read_frame().await {
            Ok(Some(Message::Room(x))) => x,
            Ok(Some(Message::Error { error })) => {
                tracing::error!("Error from server:\n{error}");
                continue;
            }
            Ok(Some(m)) => {
                tracing::error!("Invalid message received from server: {m:?}");
                continue;
            }
            Ok(None) => {
                tracing::info!("Server closed connection. Disconnecting.");
                break;
            }
            Err(e) => {
                tracing::error!("Error reading message from server. Disconnecting.\n{e}");
                break;
            }
        };

        tracing::debug!("Received '{}'", incoming.event.name());
        if inbound.send(incoming).await.is_err() {
            // Nobody is listening anymore
            break;
        }
    }
}

/// Server address from an `ipaddress` file next to the executable, if there is one.
pub fn load_server_address() -> String {
    if let Ok(mut exe_path) = std::env::current_exe() {
        exe_path.pop();
        exe_path.push("ipaddress");
        if let Ok(ip) = std::fs::read_to_string(exe_path) {
            return ip.trim().to_string();
        }
    }

    DEFAULT_SERVER_ADDRESS.into()
}
