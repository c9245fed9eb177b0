//! Join, leave and rename operations over a game's player list.

use crate::player::Player;
use crate::{ClientId, PlayerId};

/// Mutable view over an ordered player list.
///
/// New players get the next free sequential id and a color derived from the
/// roster length at the time they were added.
#[derive(Debug)]
pub struct PlayerRoster<'a> {
    players: &'a mut Vec<Player>,
}

impl<'a> PlayerRoster<'a> {
    pub fn new(players: &'a mut Vec<Player>) -> Self {
        Self { players }
    }

    fn next_id(&self) -> PlayerId {
        let max = self.players.iter().map(|p| p.id.0).max().unwrap_or(0);
        PlayerId(max + 1)
    }

    /// Add a player who shares this device.
    pub fn add_local(&mut self, name: impl Into<String>) -> &Player {
        let player = Player::new(self.next_id(), name, self.players.len());
        self.players.push(player);
        &self.players[self.players.len() - 1]
    }

    /// Add a player announced by the transport. Returns `None` when a player
    /// for `client_id` is already present, so repeated or late announcements
    /// merge instead of duplicating.
    pub fn join(&mut self, client_id: ClientId, name: Option<String>) -> Option<&Player> {
        if self.players.iter().any(|p| p.client_id == Some(client_id)) {
            return None;
        }

        let id = self.next_id();
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Player {}", self.players.len() + 1));
        let mut player = Player::new(id, name, self.players.len());
        player.is_online = true;
        player.client_id = Some(client_id);
        self.players.push(player);
        self.players.last()
    }

    /// Remove the player matching either identifier. Leave events may carry
    /// either one, so both are tried.
    pub fn remove(
        &mut self,
        player_id: Option<PlayerId>,
        client_id: Option<ClientId>,
    ) -> Option<Player> {
        let index = self
            .players
            .iter()
            .position(|p| p.is_identified_by(player_id, client_id))?;
        Some(self.players.remove(index))
    }

    /// Returns the previous name, or `None` if no such player exists.
    pub fn rename(&mut self, player_id: PlayerId, name: impl Into<String>) -> Option<String> {
        let player = self.players.iter_mut().find(|p| p.id == player_id)?;
        Some(std::mem::replace(&mut player.name, name.into()))
    }
}
