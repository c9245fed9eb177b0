//! Randomized role assignment and turn-order rotation.
//!
//! Only the authoritative participant calls into this module. The resulting
//! roster is what gets replicated, never the random source, so every
//! participant sees the same imposter.

use rand::Rng;

use crate::player::Player;

/// Returns a copy of `players` where exactly one entry, chosen uniformly at
/// random, is the imposter. An empty roster is returned unchanged.
pub fn assign_imposter<R: Rng + ?Sized>(players: &[Player], rng: &mut R) -> Vec<Player> {
    if players.is_empty() {
        return Vec::new();
    }

    let imposter = rng.gen_range(0..players.len());
    tracing::debug!("Imposter index {imposter}");
    players
        .iter()
        .enumerate()
        .map(|(i, player)| Player {
            is_imposter: i == imposter,
            ..player.clone()
        })
        .collect()
}

/// Returns a copy of `players` rotated left `offset` times, so the player at
/// `offset` now draws first.
pub fn rotate(players: &[Player], offset: usize) -> Vec<Player> {
    let mut rotated = players.to_vec();
    if !rotated.is_empty() {
        rotated.rotate_left(offset % players.len());
    }
    rotated
}

/// Offset for the next game, wrapping around the roster.
pub fn next_offset(offset: usize, player_count: usize) -> usize {
    if player_count == 0 {
        0
    } else {
        (offset + 1) % player_count
    }
}
