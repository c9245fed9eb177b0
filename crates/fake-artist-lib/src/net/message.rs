use serde::{Deserialize, Serialize};

use crate::config::GameConfig;
use crate::game_state::{GamePhase, GameStateUpdate, Votes};
use crate::player::{Player, Stroke};
use crate::{ClientId, PlayerId, RoomId};

use super::ProtocolError;

/// Everything that travels over a relay connection.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub enum Message {
    Error { error: ProtocolError },
    Version { version: String },
    ConnectionAccept { client_id: ClientId },
    /// Open a new room with the sender as its first member.
    RoomHost { name: Option<String> },
    RoomJoin { room_id: RoomId, name: Option<String> },
    RoomJoined { room_id: RoomId },
    Room(Inbound),
}

impl From<RoomEvent> for Message {
    fn from(event: RoomEvent) -> Self {
        Self::Room(Inbound {
            sender: None,
            event,
        })
    }
}

impl From<Inbound> for Message {
    fn from(inbound: Inbound) -> Self {
        Self::Room(inbound)
    }
}

/// A room event as received by a participant.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Inbound {
    /// The member that emitted the event. `None` for events raised by the relay itself.
    pub sender: Option<ClientId>,
    pub event: RoomEvent,
}

impl Inbound {
    pub fn from_client(sender: impl Into<ClientId>, event: RoomEvent) -> Self {
        Self {
            sender: Some(sender.into()),
            event,
        }
    }

    pub fn from_relay(event: RoomEvent) -> Self {
        Self {
            sender: None,
            event,
        }
    }
}

/// Named events broadcast within a room.
///
/// Every variant but `PlayerJoined` and `PlayerLeft` is emitted by the host only.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum RoomEvent {
    GameConfig {
        room_id: RoomId,
        config: GameConfig,
        host_client_id: Option<ClientId>,
    },
    PlayersConfigured {
        room_id: RoomId,
        players: Vec<Player>,
        starting_player_offset: usize,
    },
    SetSecretWord {
        room_id: RoomId,
        secret_word: String,
    },
    PhaseChange {
        room_id: RoomId,
        phase: GamePhase,
    },
    RoundComplete {
        room_id: RoomId,
        strokes: Vec<Stroke>,
        current_round: u32,
    },
    NextRound {
        room_id: RoomId,
        round: u32,
    },
    VotingComplete {
        room_id: RoomId,
        votes: Votes,
    },
    PlayAgain {
        room_id: RoomId,
        players: Vec<Player>,
        secret_word: String,
        starting_player_offset: usize,
    },
    GameStateUpdate {
        room_id: RoomId,
        update: GameStateUpdate,
    },
    PlayerJoined {
        client_id: ClientId,
        name: Option<String>,
    },
    PlayerLeft {
        player_id: Option<PlayerId>,
        client_id: Option<ClientId>,
    },
}

impl RoomEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::GameConfig { .. } => "game-config",
            RoomEvent::PlayersConfigured { .. } => "players-configured",
            RoomEvent::SetSecretWord { .. } => "set-secret-word",
            RoomEvent::PhaseChange { .. } => "phase-change",
            RoomEvent::RoundComplete { .. } => "round-complete",
            RoomEvent::NextRound { .. } => "next-round",
            RoomEvent::VotingComplete { .. } => "voting-complete",
            RoomEvent::PlayAgain { .. } => "play-again",
            RoomEvent::GameStateUpdate { .. } => "game-state-update",
            RoomEvent::PlayerJoined { .. } => "player-joined",
            RoomEvent::PlayerLeft { .. } => "player-left",
        }
    }

    /// The room a host event is addressed to. Presence events are scoped by the relay instead.
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            RoomEvent::GameConfig { room_id, .. }
            | RoomEvent::PlayersConfigured { room_id, .. }
            | RoomEvent::SetSecretWord { room_id, .. }
            | RoomEvent::PhaseChange { room_id, .. }
            | RoomEvent::RoundComplete { room_id, .. }
            | RoomEvent::NextRound { room_id, .. }
            | RoomEvent::VotingComplete { room_id, .. }
            | RoomEvent::PlayAgain { room_id, .. }
            | RoomEvent::GameStateUpdate { room_id, .. } => Some(room_id),
            RoomEvent::PlayerJoined { .. } | RoomEvent::PlayerLeft { .. } => None,
        }
    }

    pub fn is_presence(&self) -> bool {
        matches!(
            self,
            RoomEvent::PlayerJoined { .. } | RoomEvent::PlayerLeft { .. }
        )
    }
}
