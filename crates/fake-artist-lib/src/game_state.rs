use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_TIMER_DURATION;
use crate::player::{Player, Stroke};
use crate::PlayerId;

/// Mapping from voter to the player they accused.
pub type Votes = BTreeMap<PlayerId, PlayerId>;

#[derive(Debug, Default, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum GamePhase {
    #[default]
    Setup,
    PlayerConfig,
    WordReveal,
    Drawing,
    Voting,
    Results,
}

impl GamePhase {
    /// Phases during which exactly one player must be the imposter.
    pub fn has_imposter(self) -> bool {
        matches!(
            self,
            GamePhase::WordReveal | GamePhase::Drawing | GamePhase::Voting | GamePhase::Results
        )
    }
}

impl Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GamePhase::Setup => "setup",
            GamePhase::PlayerConfig => "playerConfig",
            GamePhase::WordReveal => "wordReveal",
            GamePhase::Drawing => "drawing",
            GamePhase::Voting => "voting",
            GamePhase::Results => "results",
        };
        f.write_str(name)
    }
}

/// The replicated state of one game session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub phase: GamePhase,
    pub players: Vec<Player>,
    pub secret_word: String,
    pub current_round: u32,
    /// Append-only within a game.
    pub strokes: Vec<Stroke>,
    pub votes: Votes,
    /// Seconds per turn.
    pub timer_duration: u32,
    pub timer_enabled: bool,
    pub starting_player_offset: usize,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            phase: GamePhase::Setup,
            players: Vec::new(),
            secret_word: String::new(),
            current_round: 1,
            strokes: Vec::new(),
            votes: Votes::new(),
            timer_duration: DEFAULT_TIMER_DURATION,
            timer_enabled: false,
            starting_player_offset: 0,
        }
    }
}

impl GameState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn imposter(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_imposter)
    }

    /// Overwrite every field that is present in `update`, leaving the rest untouched.
    pub fn merge(&mut self, update: GameStateUpdate) {
        let GameStateUpdate {
            version: _,
            phase,
            players,
            secret_word,
            current_round,
            strokes,
            votes,
            timer_duration,
            timer_enabled,
            starting_player_offset,
        } = update;

        if let Some(phase) = phase {
            self.phase = phase;
        }
        if let Some(players) = players {
            self.players = players;
        }
        if let Some(secret_word) = secret_word {
            self.secret_word = secret_word;
        }
        if let Some(current_round) = current_round {
            self.current_round = current_round;
        }
        if let Some(strokes) = strokes {
            self.strokes = strokes;
        }
        if let Some(votes) = votes {
            self.votes = votes;
        }
        if let Some(timer_duration) = timer_duration {
            self.timer_duration = timer_duration;
        }
        if let Some(timer_enabled) = timer_enabled {
            self.timer_enabled = timer_enabled;
        }
        if let Some(offset) = starting_player_offset {
            self.starting_player_offset = offset;
        }
    }

    /// An update carrying every field of this state.
    pub fn snapshot(&self) -> GameStateUpdate {
        GameStateUpdate {
            version: None,
            phase: Some(self.phase),
            players: Some(self.players.clone()),
            secret_word: Some(self.secret_word.clone()),
            current_round: Some(self.current_round),
            strokes: Some(self.strokes.clone()),
            votes: Some(self.votes.clone()),
            timer_duration: Some(self.timer_duration),
            timer_enabled: Some(self.timer_enabled),
            starting_player_offset: Some(self.starting_player_offset),
        }
    }
}

/// Any subset of [`GameState`]. Absent fields mean "unchanged".
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameStateUpdate {
    /// Increasing number stamped by the host. Unversioned updates are always applied.
    pub version: Option<u64>,
    pub phase: Option<GamePhase>,
    pub players: Option<Vec<Player>>,
    pub secret_word: Option<String>,
    pub current_round: Option<u32>,
    pub strokes: Option<Vec<Stroke>>,
    pub votes: Option<Votes>,
    pub timer_duration: Option<u32>,
    pub timer_enabled: Option<bool>,
    pub starting_player_offset: Option<usize>,
}

impl GameStateUpdate {
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }
}
