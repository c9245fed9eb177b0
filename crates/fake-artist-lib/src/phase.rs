//! Phase transitions for the authoritative participant.
//!
//! `setup → playerConfig → wordReveal → drawing (× rounds) → voting → results`,
//! then either back to `wordReveal` (play again) or to `setup` (return home).
//! Mirrors never run these; they copy the host's results instead.

use rand::Rng;

use crate::assignment::{assign_imposter, next_offset, rotate};
use crate::config::GameConfig;
use crate::error::{SessionError, SessionResult};
use crate::game_state::{GamePhase, GameState, Votes};
use crate::player::{Player, Stroke};

/// What finishing a drawing round led to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Drawing continues with this round number.
    NextRound(u32),
    Voting,
}

#[derive(Debug)]
pub struct PhaseMachine<'a> {
    state: &'a mut GameState,
}

impl<'a> PhaseMachine<'a> {
    pub fn new(state: &'a mut GameState) -> Self {
        Self { state }
    }

    fn expect(&self, expected: GamePhase) -> SessionResult<()> {
        if self.state.phase != expected {
            return Err(SessionError::OutOfOrderPhase {
                expected,
                actual: self.state.phase,
            });
        }
        Ok(())
    }

    fn enter(&mut self, phase: GamePhase) {
        tracing::info!("Phase {} -> {phase}", self.state.phase);
        self.state.phase = phase;
    }

    /// `setup → playerConfig`
    pub fn submit_config(&mut self, config: &GameConfig) -> SessionResult<()> {
        self.expect(GamePhase::Setup)?;
        match config.timer() {
            Some(seconds) => {
                self.state.timer_duration = seconds;
                self.state.timer_enabled = true;
            }
            None => self.state.timer_enabled = false,
        }
        self.enter(GamePhase::PlayerConfig);
        Ok(())
    }

    /// `playerConfig → wordReveal`. Picks the imposter and resets the turn order.
    pub fn configure_players<R: Rng + ?Sized>(
        &mut self,
        players: &[Player],
        online: bool,
        rng: &mut R,
    ) -> SessionResult<()> {
        self.expect(GamePhase::PlayerConfig)?;
        let mut players = assign_imposter(players, rng);
        players.iter_mut().for_each(|p| p.is_online = online);
        self.state.players = players;
        self.state.starting_player_offset = 0;
        self.enter(GamePhase::WordReveal);
        Ok(())
    }

    /// `wordReveal → drawing`
    pub fn reveal_complete(&mut self) -> SessionResult<()> {
        self.expect(GamePhase::WordReveal)?;
        self.enter(GamePhase::Drawing);
        Ok(())
    }

    /// `drawing → drawing | voting`. The round count is checked before the
    /// round number is incremented, so the last round is never skipped.
    pub fn round_complete(
        &mut self,
        strokes: Vec<Stroke>,
        round_count: u32,
    ) -> SessionResult<RoundOutcome> {
        self.expect(GamePhase::Drawing)?;
        self.state.strokes.extend(strokes);

        if self.state.current_round < round_count.max(1) {
            self.state.current_round += 1;
            tracing::info!("Starting round {} of {round_count}", self.state.current_round);
            Ok(RoundOutcome::NextRound(self.state.current_round))
        } else {
            self.enter(GamePhase::Voting);
            Ok(RoundOutcome::Voting)
        }
    }

    /// `voting → results`
    pub fn voting_complete(&mut self, votes: Votes) -> SessionResult<()> {
        self.expect(GamePhase::Voting)?;
        self.state.votes = votes;
        self.enter(GamePhase::Results);
        Ok(())
    }

    /// `results → wordReveal`. Rotates the turn order by the advanced offset and
    /// draws a fresh imposter for the rotated roster.
    pub fn play_again<R: Rng + ?Sized>(
        &mut self,
        secret_word: String,
        rng: &mut R,
    ) -> SessionResult<()> {
        self.expect(GamePhase::Results)?;
        let state = &mut *self.state;
        state.secret_word = secret_word;
        state.current_round = 1;
        state.strokes.clear();
        state.votes.clear();

        state.starting_player_offset =
            next_offset(state.starting_player_offset, state.players.len());
        let rotated = rotate(&state.players, state.starting_player_offset);
        state.players = assign_imposter(&rotated, rng);

        self.enter(GamePhase::WordReveal);
        Ok(())
    }

    /// `results → setup`. Allowed from any phase, since leaving is always possible.
    pub fn return_home(&mut self) {
        tracing::info!("Returning home from {}", self.state.phase);
        self.state.reset();
    }
}
