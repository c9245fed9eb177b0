use serde::{Deserialize, Serialize};

use crate::{ClientId, PlayerId};

pub const PLAYER_COLORS: [&str; 8] = [
    "#E53935", "#1E88E5", "#43A047", "#FDD835", "#8E24AA", "#FB8C00", "#00ACC1", "#6D4C41",
];

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub color_index: u8,
    pub is_imposter: bool,
    pub is_online: bool,
    /// Connection that announced this player. Only used to match join/leave events.
    pub client_id: Option<ClientId>,
}

impl Player {
    /// Create a player whose color is picked from the palette slot `color_index` (mod 8).
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>, color_index: usize) -> Self {
        let color_index = color_index % PLAYER_COLORS.len();
        Self {
            id: id.into(),
            name: name.into(),
            color: PLAYER_COLORS[color_index].to_owned(),
            color_index: color_index as u8,
            is_imposter: false,
            is_online: false,
            client_id: None,
        }
    }

    /// True when either the player id or the connection it joined on matches.
    pub fn is_identified_by(&self, player_id: Option<PlayerId>, client_id: Option<ClientId>) -> bool {
        player_id.map_or(false, |id| id == self.id)
            || client_id.map_or(false, |id| Some(id) == self.client_id)
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// A single pen stroke. Strokes are never edited once drawn, only appended to the game's log.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    pub player_id: PlayerId,
    pub round: u32,
    pub color: String,
    pub points: Vec<Point>,
}
