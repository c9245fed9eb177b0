use thiserror::Error;

use crate::game_state::GamePhase;
use crate::{ClientId, PlayerId};

/// Conditions a session recovers from by leaving its state untouched.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Only the host can perform this action")]
    MissingAuthority,
    #[error("No player matches id {player_id:?} or client {client_id:?}")]
    IncompleteRoster {
        player_id: Option<PlayerId>,
        client_id: Option<ClientId>,
    },
    #[error("Action expects phase {expected} but the game is in {actual}")]
    OutOfOrderPhase {
        expected: GamePhase,
        actual: GamePhase,
    },
    #[error("The game has not been configured yet")]
    ConfigAbsent,
    #[error("Cannot start a game without players")]
    EmptyRoster,
}

pub type SessionResult<T> = Result<T, SessionError>;
