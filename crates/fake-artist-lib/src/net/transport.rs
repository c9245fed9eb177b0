use super::RoomEvent;

/// Outbound half of a room connection.
///
/// Emission is fire-and-forget: implementations queue the event and return
/// without waiting for delivery. Inbound events are handed to
/// [`GameSession::receive`](crate::session::GameSession::receive) by whoever
/// owns the receiving half.
pub trait Transport {
    fn emit(&mut self, event: RoomEvent);

    /// Leave the current room. Further emits are dropped.
    fn leave_room(&mut self);
}

/// Transport for single-device games. Nothing is ever sent.
#[derive(Debug, Default, Clone, Copy)]
pub struct Offline;

impl Transport for Offline {
    fn emit(&mut self, event: RoomEvent) {
        tracing::warn!("Dropping '{}' emitted by an offline game", event.name());
    }

    fn leave_room(&mut self) {}
}
