use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::{RoomId, MAX_PLAYERS};

pub const DEFAULT_TIMER_DURATION: u32 = 30;
/// Local games only. Multiplayer games have whoever joins the room.
pub const PLAYER_COUNT_RANGE: RangeInclusive<u32> = 3..=MAX_PLAYERS as u32;
pub const ROUND_COUNT_RANGE: RangeInclusive<u32> = 1..=5;
/// Seconds per turn.
pub const TIMER_DURATION_RANGE: RangeInclusive<u32> = 10..=120;

fn clamp(value: u32, range: RangeInclusive<u32>) -> u32 {
    value.clamp(*range.start(), *range.end())
}

/// Settings chosen on the setup screen. Fixed for the rest of the session once submitted.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    /// Advisory in multiplayer, where the roster is whoever joins the room.
    pub player_count: u32,
    pub round_count: u32,
    pub is_multiplayer: bool,
    pub is_host: Option<bool>,
    pub room_id: Option<RoomId>,
    pub timer_enabled: bool,
    /// Seconds per turn.
    pub timer_duration: Option<u32>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            player_count: 4,
            round_count: 3,
            is_multiplayer: false,
            is_host: None,
            room_id: None,
            timer_enabled: false,
            timer_duration: None,
        }
    }
}

impl GameConfig {
    pub fn local(player_count: u32, round_count: u32) -> Self {
        Self {
            player_count: clamp(player_count, PLAYER_COUNT_RANGE),
            round_count: clamp(round_count, ROUND_COUNT_RANGE),
            ..Default::default()
        }
    }

    pub fn multiplayer(room_id: impl Into<RoomId>, is_host: bool, round_count: u32) -> Self {
        Self {
            // Counted as players join
            player_count: 0,
            round_count: clamp(round_count, ROUND_COUNT_RANGE),
            is_multiplayer: true,
            is_host: Some(is_host),
            room_id: Some(room_id.into()),
            ..Default::default()
        }
    }

    pub fn with_timer(mut self, seconds: u32) -> Self {
        self.timer_enabled = true;
        self.timer_duration = Some(clamp(seconds, TIMER_DURATION_RANGE));
        self
    }

    /// True for the participant whose state is authoritative: the host of a
    /// multiplayer game, or the only participant of a local one.
    pub fn is_authority(&self) -> bool {
        !self.is_multiplayer || self.is_host()
    }

    pub fn is_host(&self) -> bool {
        self.is_multiplayer && self.is_host == Some(true)
    }

    /// Timer settings to use for this game, `None` when the timer is off.
    ///
    /// A timer switched on without a duration counts as switched off.
    pub fn timer(&self) -> Option<u32> {
        match (self.timer_enabled, self.timer_duration) {
            (true, Some(seconds)) => Some(seconds),
            _ => None,
        }
    }
}
