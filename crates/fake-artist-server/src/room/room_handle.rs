use fake_artist_lib::net::{Inbound, RoomEvent};
use fake_artist_lib::ClientId;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::RoomError;
use super::{room_actor::RoomAction, RoomResult};

/// Held by the server's room list. Doesn't keep the room alive on its own.
#[derive(Clone, Debug)]
pub struct RoomHandleProvider {
    pub(super) sender: mpsc::WeakSender<RoomAction>,
}

impl RoomHandleProvider {
    pub fn into_handle(self, client_id: impl Into<ClientId>) -> RoomResult<RoomHandle> {
        Ok(RoomHandle {
            sender: self.sender.upgrade().ok_or(RoomError::HandleInvalid)?,
            client_id: client_id.into(),
        })
    }
}

/// One member's connection to a room. Dropping it removes the member.
#[derive(Debug)]
pub struct RoomHandle {
    pub(super) sender: mpsc::Sender<RoomAction>,
    pub(super) client_id: ClientId,
}

impl RoomHandle {
    async fn execute<T>(
        &self,
        msg: RoomAction,
        rx: oneshot::Receiver<Result<T, RoomError>>,
    ) -> Result<T, RoomError> {
        // Ignore first error, if there is an error, rx.await will fail as well since it's sender
        // will have been dropped
        let _ = self.sender.send(msg).await;
        rx.await.unwrap_or(Err(RoomError::HandleInvalid))
    }

    /// Adds this handle's client to the room.
    pub async fn join_room(
        &self,
        name: Option<String>,
    ) -> Result<broadcast::Receiver<Inbound>, RoomError> {
        let (tx, rx) = oneshot::channel();
        let msg = RoomAction::AddMember {
            respond_to: tx,
            id: self.client_id,
            name,
        };
        self.execute(msg, rx).await
    }

    pub async fn relay(&self, event: RoomEvent) -> Result<(), RoomError> {
        let (tx, rx) = oneshot::channel();
        let msg = RoomAction::Relay {
            respond_to: tx,
            id: self.client_id,
            event,
        };
        self.execute(msg, rx).await
    }
}

impl Drop for RoomHandle {
    fn drop(&mut self) {
        let tx = self.sender.clone();
        let id = self.client_id;
        tokio::spawn(async move {
            if let Err(e) = tx.send(RoomAction::RemoveMember { id }).await {
                tracing::warn!(%e, "Failed to remove client from their room.");
            }
        });
    }
}
