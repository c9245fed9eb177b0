//! The game session: owns the [`GameState`] and routes local commands and
//! inbound room events through it.
//!
//! In a multiplayer game the host is the only writer. It runs every
//! transition locally and then broadcasts the outcome. Every other
//! participant is a mirror that copies the host's broadcasts field by field
//! and never runs a randomized decision of its own.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::instrument;

use crate::assignment::assign_imposter;
use crate::config::GameConfig;
use crate::error::{SessionError, SessionResult};
use crate::game_state::{GamePhase, GameState, Votes};
use crate::net::{Inbound, RoomEvent, Transport};
use crate::notify::{Notification, Notifier};
use crate::phase::{PhaseMachine, RoundOutcome};
use crate::player::{Player, Stroke};
use crate::roster::PlayerRoster;
use crate::words::WordList;
use crate::{ClientId, PlayerId, RoomId};

/// Local user actions.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SubmitConfig(GameConfig),
    ConfigurePlayers(Vec<Player>),
    RevealComplete,
    RoundComplete(Vec<Stroke>),
    VotingComplete(Votes),
    PlayAgain,
    ReturnHome,
    RenamePlayer { player_id: PlayerId, name: String },
}

pub struct GameSession<T, N, R = StdRng> {
    state: GameState,
    config: Option<GameConfig>,
    transport: T,
    notifier: N,
    rng: R,
    words: WordList,
    /// Our own connection, if the transport told us.
    client_id: Option<ClientId>,
    host_client_id: Option<ClientId>,
    /// Last `game-state-update` version sent (host) or applied (mirror).
    version: u64,
}

impl<T, N, R> std::fmt::Debug for GameSession<T, N, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("phase", &self.state.phase)
            .field("client_id", &self.client_id)
            .field("is_host", &self.config.as_ref().map_or(false, GameConfig::is_host))
            .finish_non_exhaustive()
    }
}

impl<T: Transport, N: Notifier> GameSession<T, N> {
    pub fn new(transport: T, notifier: N) -> Self {
        Self::with_rng(transport, notifier, StdRng::from_entropy())
    }
}

impl<T: Transport, N: Notifier, R: Rng> GameSession<T, N, R> {
    pub fn with_rng(transport: T, notifier: N, rng: R) -> Self {
        Self {
            state: GameState::default(),
            config: None,
            transport,
            notifier,
            rng,
            words: WordList::default(),
            client_id: None,
            host_client_id: None,
            version: 0,
        }
    }

    pub fn with_words(mut self, words: WordList) -> Self {
        self.words = words;
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<ClientId>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn config(&self) -> Option<&GameConfig> {
        self.config.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn is_host(&self) -> bool {
        self.config.as_ref().map_or(false, GameConfig::is_host)
    }

    fn is_multiplayer(&self) -> bool {
        self.config.as_ref().map_or(false, |c| c.is_multiplayer)
    }

    /// Whether the current phase has what it needs to be shown.
    ///
    /// # Errors
    ///
    /// [`SessionError::ConfigAbsent`] before a config is set, and
    /// [`SessionError::EmptyRoster`] for phases that need players before any exist.
    pub fn check_ready(&self) -> SessionResult<()> {
        let phase = self.state.phase;
        if matches!(phase, GamePhase::PlayerConfig | GamePhase::Drawing) && self.config.is_none() {
            return Err(SessionError::ConfigAbsent);
        }
        if phase.has_imposter() && self.state.players.is_empty() {
            return Err(SessionError::EmptyRoster);
        }
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.check_ready().is_ok()
    }

    fn authority(&self) -> SessionResult<&GameConfig> {
        let config = self.config.as_ref().ok_or(SessionError::ConfigAbsent)?;
        if !config.is_authority() {
            return Err(SessionError::MissingAuthority);
        }
        Ok(config)
    }

    /// Send `event` to the room if we are hosting one. Always called after the
    /// local state already reflects the change.
    fn broadcast(&mut self, sent: &mut Vec<RoomEvent>, event: RoomEvent) {
        if !self.is_host() {
            return;
        }
        tracing::debug!("Broadcasting '{}'", event.name());
        self.transport.emit(event.clone());
        sent.push(event);
    }

    fn room_id(&self) -> RoomId {
        self.config
            .as_ref()
            .and_then(|c| c.room_id.clone())
            .unwrap_or_default()
    }

    /// Send the whole state, stamped with the next version, after a roster change.
    fn broadcast_snapshot(&mut self, sent: &mut Vec<RoomEvent>) {
        if !self.is_host() {
            return;
        }
        self.version += 1;
        let update = self.state.snapshot().with_version(self.version);
        let event = RoomEvent::GameStateUpdate {
            room_id: self.room_id(),
            update,
        };
        self.broadcast(sent, event);
    }

    /// Run a local action. Returns the events broadcast to the room, in order.
    ///
    /// # Errors
    ///
    /// Errors leave the session untouched. Mirrors get
    /// [`SessionError::MissingAuthority`] for anything but joining and leaving.
    #[instrument(skip_all, fields(session = ?self))]
    pub fn execute(&mut self, command: Command) -> SessionResult<Vec<RoomEvent>> {
        let result = match command {
            Command::SubmitConfig(config) => self.submit_config(config),
            Command::ConfigurePlayers(players) => self.configure_players(players),
            Command::RevealComplete => self.reveal_complete(),
            Command::RoundComplete(strokes) => self.round_complete(strokes),
            Command::VotingComplete(votes) => self.voting_complete(votes),
            Command::PlayAgain => self.play_again(),
            Command::ReturnHome => Ok(self.return_home()),
            Command::RenamePlayer { player_id, name } => self.rename_player(player_id, name),
        };
        if let Err(e) = &result {
            tracing::warn!("Ignoring command: {e}");
        }
        result
    }

    fn submit_config(&mut self, config: GameConfig) -> SessionResult<Vec<RoomEvent>> {
        PhaseMachine::new(&mut self.state).submit_config(&config)?;
        tracing::info!("Configured {config:?}");
        if config.is_host() {
            self.host_client_id = self.client_id;
        }
        self.config = Some(config.clone());

        let mut sent = Vec::new();
        let event = RoomEvent::GameConfig {
            room_id: self.room_id(),
            config,
            host_client_id: self.client_id,
        };
        self.broadcast(&mut sent, event);
        Ok(sent)
    }

    fn configure_players(&mut self, players: Vec<Player>) -> SessionResult<Vec<RoomEvent>> {
        let online = self.authority()?.is_multiplayer;
        if players.is_empty() {
            return Err(SessionError::EmptyRoster);
        }
        PhaseMachine::new(&mut self.state).configure_players(&players, online, &mut self.rng)?;
        if let Some(imposter) = self.state.imposter() {
            tracing::info!("Imposter assigned to player {}", imposter.id);
        }
        self.notifier.notify(Notification::new(
            "Game starting!",
            format!("{} players ready to play.", players.len()),
        ));

        let mut sent = Vec::new();
        let event = RoomEvent::PlayersConfigured {
            room_id: self.room_id(),
            players: self.state.players.clone(),
            starting_player_offset: self.state.starting_player_offset,
        };
        self.broadcast(&mut sent, event);

        if self.state.secret_word.is_empty() {
            self.state.secret_word = self.words.choose(&mut self.rng);
            let event = RoomEvent::SetSecretWord {
                room_id: self.room_id(),
                secret_word: self.state.secret_word.clone(),
            };
            self.broadcast(&mut sent, event);
        }
        Ok(sent)
    }

    fn reveal_complete(&mut self) -> SessionResult<Vec<RoomEvent>> {
        self.authority()?;
        PhaseMachine::new(&mut self.state).reveal_complete()?;

        let mut sent = Vec::new();
        let event = RoomEvent::PhaseChange {
            room_id: self.room_id(),
            phase: GamePhase::Drawing,
        };
        self.broadcast(&mut sent, event);
        Ok(sent)
    }

    fn round_complete(&mut self, strokes: Vec<Stroke>) -> SessionResult<Vec<RoomEvent>> {
        let round_count = self.authority()?.round_count;
        let finished_round = self.state.current_round;
        let outcome = PhaseMachine::new(&mut self.state).round_complete(strokes, round_count)?;

        let mut sent = Vec::new();
        let event = RoomEvent::RoundComplete {
            room_id: self.room_id(),
            strokes: self.state.strokes.clone(),
            current_round: finished_round,
        };
        self.broadcast(&mut sent, event);

        let event = match outcome {
            RoundOutcome::NextRound(round) => {
                self.notifier.notify(Notification::new(
                    "Round complete!",
                    format!("Starting round {round} of {round_count}"),
                ));
                RoomEvent::NextRound {
                    room_id: self.room_id(),
                    round,
                }
            }
            RoundOutcome::Voting => RoomEvent::PhaseChange {
                room_id: self.room_id(),
                phase: GamePhase::Voting,
            },
        };
        self.broadcast(&mut sent, event);
        Ok(sent)
    }

    fn voting_complete(&mut self, votes: Votes) -> SessionResult<Vec<RoomEvent>> {
        self.authority()?;
        PhaseMachine::new(&mut self.state).voting_complete(votes)?;

        let mut sent = Vec::new();
        let event = RoomEvent::VotingComplete {
            room_id: self.room_id(),
            votes: self.state.votes.clone(),
        };
        self.broadcast(&mut sent, event);
        let event = RoomEvent::PhaseChange {
            room_id: self.room_id(),
            phase: GamePhase::Results,
        };
        self.broadcast(&mut sent, event);
        Ok(sent)
    }

    fn play_again(&mut self) -> SessionResult<Vec<RoomEvent>> {
        self.authority()?;
        let word = self.words.choose(&mut self.rng);
        PhaseMachine::new(&mut self.state).play_again(word, &mut self.rng)?;
        self.notifier.notify(Notification::new(
            "New game starting!",
            "New word and roles assigned. Player order has been rotated.",
        ));

        let mut sent = Vec::new();
        let event = RoomEvent::PlayAgain {
            room_id: self.room_id(),
            players: self.state.players.clone(),
            secret_word: self.state.secret_word.clone(),
            starting_player_offset: self.state.starting_player_offset,
        };
        self.broadcast(&mut sent, event);
        Ok(sent)
    }

    /// Leave the room (if any) and forget everything about this game.
    fn return_home(&mut self) -> Vec<RoomEvent> {
        if self.is_multiplayer() {
            self.transport.leave_room();
        }
        PhaseMachine::new(&mut self.state).return_home();
        self.config = None;
        self.host_client_id = None;
        self.version = 0;
        Vec::new()
    }

    fn rename_player(&mut self, player_id: PlayerId, name: String) -> SessionResult<Vec<RoomEvent>> {
        self.authority()?;
        PlayerRoster::new(&mut self.state.players)
            .rename(player_id, name)
            .ok_or(SessionError::IncompleteRoster {
                player_id: Some(player_id),
                client_id: None,
            })?;

        let mut sent = Vec::new();
        self.broadcast_snapshot(&mut sent);
        Ok(sent)
    }

    /// Apply an event delivered by the transport.
    ///
    /// Returns the events this session broadcast in response (the host
    /// re-broadcasts its roster after joins and leaves).
    ///
    /// # Errors
    ///
    /// [`SessionError::IncompleteRoster`] for a leave naming nobody we know.
    /// The state is unchanged in that case.
    #[instrument(skip_all, fields(session = ?self, event = inbound.event.name()))]
    pub fn receive(&mut self, inbound: Inbound) -> SessionResult<Vec<RoomEvent>> {
        if !self.is_multiplayer() {
            tracing::debug!("Not in a multiplayer game, ignoring event");
            return Ok(Vec::new());
        }
        if let Some(room_id) = inbound.event.room_id() {
            if Some(room_id) != self.config.as_ref().and_then(|c| c.room_id.as_ref()) {
                tracing::warn!("Ignoring event for room {room_id}");
                return Ok(Vec::new());
            }
        }

        let Inbound { sender, event } = inbound;
        match event {
            RoomEvent::PlayerJoined { client_id, name } => Ok(self.player_joined(client_id, name)),
            RoomEvent::PlayerLeft {
                player_id,
                client_id,
            } => self.player_left(player_id, client_id),
            _ if self.is_host() => {
                // Our own state already has this change
                tracing::debug!("Host ignoring host event");
                Ok(Vec::new())
            }
            event => {
                self.apply(sender, event);
                Ok(Vec::new())
            }
        }
    }

    fn player_joined(&mut self, client_id: ClientId, name: Option<String>) -> Vec<RoomEvent> {
        let mut sent = Vec::new();
        let description = format!(
            "{} has joined the game",
            name.as_deref().unwrap_or("A new player")
        );
        let joined = PlayerRoster::new(&mut self.state.players)
            .join(client_id, name)
            .map(|p| p.id);
        let Some(player_id) = joined else {
            tracing::debug!("Client {client_id} is already in the roster");
            return sent;
        };
        tracing::info!("Player {player_id} joined on client {client_id}");
        self.notifier.notify(Notification::new("Player joined", description));

        // Joiners have missed the config and need to know who the host is
        if self.is_host() {
            if let Some(config) = self.config.clone() {
                let event = RoomEvent::GameConfig {
                    room_id: self.room_id(),
                    config,
                    host_client_id: self.host_client_id,
                };
                self.broadcast(&mut sent, event);
            }
        }
        self.broadcast_snapshot(&mut sent);
        sent
    }

    fn player_left(
        &mut self,
        player_id: Option<PlayerId>,
        client_id: Option<ClientId>,
    ) -> SessionResult<Vec<RoomEvent>> {
        if !self.is_host() && client_id.is_some() && client_id == self.host_client_id {
            tracing::warn!("Host disconnected, ending session");
            self.notifier.notify(Notification::new(
                "Host left",
                "The host has left. The game has ended.",
            ));
            return Ok(self.return_home());
        }

        let Some(player) = PlayerRoster::new(&mut self.state.players).remove(player_id, client_id)
        else {
            tracing::debug!("Unknown player left");
            return Err(SessionError::IncompleteRoster {
                player_id,
                client_id,
            });
        };
        tracing::info!("Player {} left", player.id);
        let remaining = self.state.players.len();
        self.state.starting_player_offset = match remaining {
            0 => 0,
            len => self.state.starting_player_offset % len,
        };
        if self.is_host() && player.is_imposter && self.state.phase.has_imposter() && remaining > 0 {
            self.state.players = assign_imposter(&self.state.players, &mut self.rng);
            if let Some(imposter) = self.state.imposter() {
                tracing::info!("Imposter left, reassigned to player {}", imposter.id);
            }
        }
        self.notifier.notify(Notification::new(
            "Player left",
            format!("{} has left the game", player.name),
        ));

        let mut sent = Vec::new();
        self.broadcast_snapshot(&mut sent);
        Ok(sent)
    }

    /// Copy a host event onto our mirror. Phases are taken as given even when
    /// they skip ahead of us, since the host is always right.
    fn apply(&mut self, sender: Option<ClientId>, event: RoomEvent) {
        let state = &mut self.state;
        match event {
            RoomEvent::GameConfig {
                config,
                host_client_id,
                ..
            } => {
                self.host_client_id = host_client_id.or(sender);
                if let Some(local) = self.config.as_mut() {
                    // Keep our own role and room
                    local.player_count = config.player_count;
                    local.round_count = config.round_count;
                    local.timer_enabled = config.timer_enabled;
                    local.timer_duration = config.timer_duration;
                }
                match config.timer() {
                    Some(seconds) => {
                        state.timer_duration = seconds;
                        state.timer_enabled = true;
                    }
                    None => state.timer_enabled = false,
                }
                // Late joiners get this mid-game, the snapshot after it carries the phase
                if state.phase == GamePhase::Setup {
                    set_phase(state, GamePhase::PlayerConfig);
                }
            }
            RoomEvent::PlayersConfigured {
                players,
                starting_player_offset,
                ..
            } => {
                state.players = players;
                state.starting_player_offset = starting_player_offset;
                set_phase(state, GamePhase::WordReveal);
            }
            RoomEvent::SetSecretWord { secret_word, .. } => state.secret_word = secret_word,
            RoomEvent::PhaseChange { phase, .. } => set_phase(state, phase),
            RoomEvent::RoundComplete {
                strokes,
                current_round,
                ..
            } => {
                state.strokes = strokes;
                state.current_round = current_round;
            }
            RoomEvent::NextRound { round, .. } => state.current_round = round,
            RoomEvent::VotingComplete { votes, .. } => state.votes = votes,
            RoomEvent::PlayAgain {
                players,
                secret_word,
                starting_player_offset,
                ..
            } => {
                state.players = players;
                state.secret_word = secret_word;
                state.starting_player_offset = starting_player_offset;
                state.current_round = 1;
                state.strokes.clear();
                state.votes.clear();
                set_phase(state, GamePhase::WordReveal);
            }
            RoomEvent::GameStateUpdate { update, .. } => {
                if let Some(version) = update.version {
                    if version <= self.version {
                        tracing::debug!("Discarding stale update {version} <= {}", self.version);
                        return;
                    }
                    self.version = version;
                }
                state.merge(update);
            }
            // Handled by `receive`
            RoomEvent::PlayerJoined { .. } | RoomEvent::PlayerLeft { .. } => {}
        }
    }
}

fn set_phase(state: &mut GameState, phase: GamePhase) {
    if state.phase != phase {
        tracing::debug!("Mirroring phase {} -> {phase}", state.phase);
    }
    state.phase = phase;
}

#[cfg(test)]
mod tests {
    use rand::rngs::mock::StepRng;

    use super::{Command, GameSession};
    use crate::config::GameConfig;
    use crate::error::SessionError;
    use crate::game_state::{GamePhase, GameState, GameStateUpdate, Votes};
    use crate::net::{Inbound, RoomEvent, Transport};
    use crate::net::Offline;
    use crate::notify::{Notification, TracingNotifier};
    use crate::player::{Player, Point, Stroke};
    use crate::words::WordList;
    use crate::ClientId;

    const ROOM: &str = "ROOM01";

    #[derive(Debug, Default)]
    struct RecordingTransport {
        sent: Vec<RoomEvent>,
        left: bool,
    }

    impl Transport for RecordingTransport {
        fn emit(&mut self, event: RoomEvent) {
            self.sent.push(event);
        }

        fn leave_room(&mut self) {
            self.left = true;
        }
    }

    type TestSession = GameSession<RecordingTransport, Vec<Notification>, StepRng>;

    fn session(client_id: u32) -> TestSession {
        GameSession::with_rng(RecordingTransport::default(), Vec::new(), StepRng::new(0, 0))
            .with_words(WordList::new(["Kite", "Lantern"]))
            .with_client_id(client_id)
    }

    fn host(round_count: u32) -> TestSession {
        let mut host = session(1);
        host.execute(Command::SubmitConfig(GameConfig::multiplayer(
            ROOM,
            true,
            round_count,
        )))
        .unwrap();
        host
    }

    fn mirror(client_id: u32) -> TestSession {
        let mut mirror = session(client_id);
        mirror
            .execute(Command::SubmitConfig(GameConfig::multiplayer(ROOM, false, 3)))
            .unwrap();
        mirror
    }

    fn local_players(len: u32) -> Vec<Player> {
        (1..=len)
            .map(|i| Player::new(i, format!("P{i}"), i as usize - 1))
            .collect()
    }

    fn stroke(player: u32, round: u32) -> Stroke {
        Stroke {
            player_id: player.into(),
            round,
            color: "#123456".to_owned(),
            points: vec![Point { x: 0.5, y: 0.5 }, Point { x: 0.6, y: 0.7 }],
        }
    }

    fn joined(client_id: u32, name: &str) -> Inbound {
        Inbound::from_relay(RoomEvent::PlayerJoined {
            client_id: client_id.into(),
            name: Some(name.to_owned()),
        })
    }

    /// Deliver host broadcasts to a mirror, recording each phase it passes through.
    fn deliver(events: Vec<RoomEvent>, to: &mut TestSession, phases: &mut Vec<GamePhase>) {
        for event in events {
            to.receive(Inbound::from_client(1, event)).unwrap();
            if phases.last() != Some(&to.state().phase) {
                phases.push(to.state().phase);
            }
        }
    }

    #[test]
    fn local_game_cycle() {
        let mut game = session(0);
        assert!(game
            .execute(Command::SubmitConfig(GameConfig::local(4, 2)))
            .unwrap()
            .is_empty());
        game.execute(Command::ConfigurePlayers(local_players(4)))
            .unwrap();

        let state = game.state();
        assert_eq!(state.phase, GamePhase::WordReveal);
        assert_eq!(state.secret_word, "Kite");
        assert_eq!(state.players.iter().filter(|p| p.is_imposter).count(), 1);
        assert!(state.players.iter().all(|p| !p.is_online));

        game.execute(Command::RevealComplete).unwrap();
        game.execute(Command::RoundComplete(vec![stroke(1, 1)]))
            .unwrap();
        assert_eq!(game.state().phase, GamePhase::Drawing);
        assert_eq!(game.state().current_round, 2);
        game.execute(Command::RoundComplete(vec![stroke(2, 2)]))
            .unwrap();
        assert_eq!(game.state().phase, GamePhase::Voting);

        let votes = Votes::from([(1.into(), 2.into()), (2.into(), 1.into())]);
        game.execute(Command::VotingComplete(votes.clone())).unwrap();
        assert_eq!(game.state().phase, GamePhase::Results);
        assert_eq!(game.state().votes, votes);

        game.execute(Command::PlayAgain).unwrap();
        assert_eq!(game.state().phase, GamePhase::WordReveal);
        assert_eq!(game.state().starting_player_offset, 1);
        assert!(game.state().strokes.is_empty());

        game.execute(Command::ReturnHome).unwrap();
        assert_eq!(*game.state(), GameState::default());
        assert!(game.config().is_none());
        // Local games never touch the network
        assert!(game.transport().sent.is_empty());
        assert!(!game.transport().left);

        let titles: Vec<&str> = game.notifier().iter().map(|n| n.title.as_str()).collect();
        assert_eq!(
            titles,
            ["Game starting!", "Round complete!", "New game starting!"]
        );
    }

    #[test]
    fn three_rounds_reach_voting_once() {
        let mut game = session(0);
        game.execute(Command::SubmitConfig(GameConfig::local(3, 3)))
            .unwrap();
        game.execute(Command::ConfigurePlayers(local_players(3)))
            .unwrap();
        game.execute(Command::RevealComplete).unwrap();

        let mut seen = Vec::new();
        for round in 1..=3 {
            game.execute(Command::RoundComplete(vec![stroke(round, round)]))
                .unwrap();
            seen.push((game.state().phase, game.state().current_round));
        }
        assert_eq!(
            seen,
            [
                (GamePhase::Drawing, 2),
                (GamePhase::Drawing, 3),
                (GamePhase::Voting, 3)
            ]
        );

        // Another round completion is out of order and changes nothing
        let before = game.state().clone();
        assert!(matches!(
            game.execute(Command::RoundComplete(vec![stroke(1, 4)])),
            Err(SessionError::OutOfOrderPhase { .. })
        ));
        assert_eq!(*game.state(), before);
    }

    #[test]
    fn commands_before_config() {
        let mut game = session(0);
        assert_eq!(
            game.execute(Command::RevealComplete),
            Err(SessionError::ConfigAbsent)
        );
        assert_eq!(
            game.execute(Command::ConfigurePlayers(local_players(3))),
            Err(SessionError::ConfigAbsent)
        );
        assert_eq!(*game.state(), GameState::default());
    }

    #[test]
    fn empty_roster_is_rejected() {
        let mut game = session(0);
        game.execute(Command::SubmitConfig(GameConfig::local(3, 1)))
            .unwrap();
        assert_eq!(
            game.execute(Command::ConfigurePlayers(Vec::new())),
            Err(SessionError::EmptyRoster)
        );
        assert_eq!(game.state().phase, GamePhase::PlayerConfig);
    }

    #[test]
    fn mirrors_lack_authority() {
        let mut mirror = mirror(2);
        let before = mirror.state().clone();

        for command in [
            Command::ConfigurePlayers(local_players(4)),
            Command::RevealComplete,
            Command::RoundComplete(vec![stroke(1, 1)]),
            Command::VotingComplete(Votes::new()),
            Command::PlayAgain,
        ] {
            assert_eq!(mirror.execute(command), Err(SessionError::MissingAuthority));
        }
        assert_eq!(*mirror.state(), before);
        assert!(mirror.transport().sent.is_empty());
    }

    #[test]
    fn host_broadcasts_what_it_applied() {
        let mut host = host(2);
        assert_eq!(host.transport().sent.len(), 1);
        let RoomEvent::GameConfig {
            room_id,
            config,
            host_client_id,
        } = &host.transport().sent[0]
        else {
            panic!("Expected the config to be broadcast first");
        };
        assert_eq!(room_id.0, ROOM);
        assert_eq!(config.round_count, 2);
        assert_eq!(*host_client_id, Some(ClientId(1)));

        host.receive(joined(1, "Host")).unwrap();
        host.receive(joined(2, "Bea")).unwrap();
        host.receive(joined(3, "Cy")).unwrap();
        let sent = host
            .execute(Command::ConfigurePlayers(host.state().players.clone()))
            .unwrap();

        assert_eq!(sent.len(), 2);
        let RoomEvent::PlayersConfigured {
            players,
            starting_player_offset,
            ..
        } = &sent[0]
        else {
            panic!("Expected players-configured");
        };
        assert_eq!(*players, host.state().players);
        assert_eq!(*starting_player_offset, 0);
        assert!(players.iter().all(|p| p.is_online));
        assert!(matches!(
            &sent[1],
            RoomEvent::SetSecretWord { secret_word, .. } if *secret_word == host.state().secret_word
        ));

        // Everything returned was also handed to the transport, in the same order
        let transport = &host.transport().sent;
        assert_eq!(transport[transport.len() - 2..], sent[..]);
    }

    #[test]
    fn four_player_room() {
        let mut host = host(1);
        let mut mirror = mirror(2);
        let mut phases = vec![mirror.state().phase];

        for (client, name) in [(1, "Host"), (2, "Bea"), (3, "Cy"), (4, "Dee")] {
            // The relay announces joins to every member
            let sent = host.receive(joined(client, name)).unwrap();
            mirror.receive(joined(client, name)).unwrap();
            deliver(sent, &mut mirror, &mut phases);
        }
        assert_eq!(host.state().players.len(), 4);
        assert_eq!(mirror.state().players, host.state().players);
        assert_eq!(mirror.config().map(|c| c.round_count), Some(1));
        assert!(!mirror.is_host());

        let sent = host
            .execute(Command::ConfigurePlayers(host.state().players.clone()))
            .unwrap();
        deliver(sent, &mut mirror, &mut phases);
        assert_eq!(
            host.state().players.iter().filter(|p| p.is_imposter).count(),
            1
        );
        assert_eq!(mirror.state().imposter(), host.state().imposter());
        assert_eq!(mirror.state().secret_word, host.state().secret_word);

        let sent = host.execute(Command::RevealComplete).unwrap();
        deliver(sent, &mut mirror, &mut phases);

        let sent = host
            .execute(Command::RoundComplete(vec![stroke(1, 1), stroke(2, 1)]))
            .unwrap();
        deliver(sent, &mut mirror, &mut phases);
        assert_eq!(mirror.state().strokes.len(), 2);

        let votes = Votes::from([
            (1.into(), 3.into()),
            (2.into(), 3.into()),
            (3.into(), 1.into()),
            (4.into(), 3.into()),
        ]);
        let sent = host
            .execute(Command::VotingComplete(votes.clone()))
            .unwrap();
        let payload = sent.iter().find_map(|e| match e {
            RoomEvent::VotingComplete { votes, .. } => Some(votes.clone()),
            _ => None,
        });
        deliver(sent, &mut mirror, &mut phases);

        assert_eq!(
            phases,
            [
                GamePhase::PlayerConfig,
                GamePhase::WordReveal,
                GamePhase::Drawing,
                GamePhase::Voting,
                GamePhase::Results
            ]
        );
        assert_eq!(Some(mirror.state().votes.clone()), payload);
        assert_eq!(mirror.state().votes, votes);
        assert_eq!(mirror.state(), host.state());

        // Replays stay in lockstep without the mirror drawing anything itself
        let sent = host.execute(Command::PlayAgain).unwrap();
        deliver(sent, &mut mirror, &mut phases);
        assert_eq!(mirror.state(), host.state());
        assert_eq!(mirror.state().starting_player_offset, 1);
        assert_eq!(mirror.state().players[0].name, "Bea");
    }

    #[test]
    fn host_ignores_echoes() {
        let mut host = host(2);
        host.receive(joined(1, "Host")).unwrap();
        let before = host.state().clone();

        let echo = Inbound::from_client(
            1,
            RoomEvent::PhaseChange {
                room_id: ROOM.into(),
                phase: GamePhase::Results,
            },
        );
        assert!(host.receive(echo).unwrap().is_empty());
        assert_eq!(*host.state(), before);
    }

    #[test]
    fn out_of_order_phase_is_applied() {
        let mut mirror = mirror(2);
        mirror
            .receive(Inbound::from_client(
                1,
                RoomEvent::PhaseChange {
                    room_id: ROOM.into(),
                    phase: GamePhase::Voting,
                },
            ))
            .unwrap();
        assert_eq!(mirror.state().phase, GamePhase::Voting);
        // No roster has arrived yet
        assert_eq!(mirror.check_ready(), Err(SessionError::EmptyRoster));
    }

    #[test]
    fn other_rooms_are_ignored() {
        let mut mirror = mirror(2);
        mirror
            .receive(Inbound::from_client(
                1,
                RoomEvent::SetSecretWord {
                    room_id: "ELSEWHERE".into(),
                    secret_word: "Kite".to_owned(),
                },
            ))
            .unwrap();
        assert!(mirror.state().secret_word.is_empty());
    }

    #[test]
    fn local_games_ignore_the_network() {
        let mut game = session(0);
        game.execute(Command::SubmitConfig(GameConfig::local(4, 1)))
            .unwrap();
        game.receive(joined(9, "Stranger")).unwrap();
        assert!(game.state().players.is_empty());
    }

    #[test]
    fn partial_update_is_merged() {
        let mut host = host(3);
        let mut mirror = mirror(2);
        let mut phases = Vec::new();
        for client in 1..=3 {
            let sent = host.receive(joined(client, "x")).unwrap();
            deliver(sent, &mut mirror, &mut phases);
        }
        let sent = host
            .execute(Command::ConfigurePlayers(host.state().players.clone()))
            .unwrap();
        deliver(sent, &mut mirror, &mut phases);
        let before = mirror.state().clone();

        let update = Inbound::from_client(
            1,
            RoomEvent::GameStateUpdate {
                room_id: ROOM.into(),
                update: GameStateUpdate {
                    current_round: Some(2),
                    ..Default::default()
                },
            },
        );
        mirror.receive(update.clone()).unwrap();
        let once = mirror.state().clone();
        mirror.receive(update).unwrap();

        assert_eq!(*mirror.state(), once);
        assert_eq!(once.current_round, 2);
        assert_eq!(once.players, before.players);
        assert_eq!(once.strokes, before.strokes);
        assert_eq!(once.votes, before.votes);
    }

    #[test]
    fn stale_versions_are_discarded() {
        let mut mirror = mirror(2);
        let versioned = |version, round| {
            Inbound::from_client(
                1,
                RoomEvent::GameStateUpdate {
                    room_id: ROOM.into(),
                    update: GameStateUpdate {
                        current_round: Some(round),
                        ..Default::default()
                    }
                    .with_version(version),
                },
            )
        };

        mirror.receive(versioned(2, 3)).unwrap();
        mirror.receive(versioned(1, 2)).unwrap();
        assert_eq!(mirror.state().current_round, 3);
        mirror.receive(versioned(2, 2)).unwrap();
        assert_eq!(mirror.state().current_round, 3);
        mirror.receive(versioned(3, 2)).unwrap();
        assert_eq!(mirror.state().current_round, 2);
    }

    #[test]
    fn duplicate_joins_merge() {
        let mut host = host(1);
        host.receive(joined(5, "Eve")).unwrap();
        let sent = host.receive(joined(5, "Eve")).unwrap();

        assert!(sent.is_empty());
        assert_eq!(host.state().players.len(), 1);
        assert_eq!(
            host.notifier().last(),
            Some(&Notification::new("Player joined", "Eve has joined the game"))
        );
        assert_eq!(host.notifier().len(), 1);
    }

    #[test]
    fn late_join_resends_config() {
        let mut host = host(2);
        let sent = host.receive(joined(7, "Late")).unwrap();
        let names: Vec<&str> = sent.iter().map(RoomEvent::name).collect();
        assert_eq!(names, ["game-config", "game-state-update"]);

        let RoomEvent::GameStateUpdate { update, .. } = &sent[1] else {
            panic!("Expected a state update");
        };
        assert_eq!(update.version, Some(1));
        assert_eq!(update.players.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn player_left() {
        let mut host = host(1);
        host.receive(joined(2, "Bea")).unwrap();
        host.receive(joined(3, "Cy")).unwrap();

        let unknown = Inbound::from_relay(RoomEvent::PlayerLeft {
            player_id: None,
            client_id: Some(99.into()),
        });
        assert_eq!(
            host.receive(unknown),
            Err(SessionError::IncompleteRoster {
                player_id: None,
                client_id: Some(99.into()),
            })
        );
        assert_eq!(host.state().players.len(), 2);

        let left = Inbound::from_relay(RoomEvent::PlayerLeft {
            player_id: None,
            client_id: Some(2.into()),
        });
        let sent = host.receive(left).unwrap();
        assert_eq!(host.state().players.len(), 1);
        assert_eq!(host.state().players[0].name, "Cy");
        assert_eq!(
            host.notifier().last(),
            Some(&Notification::new("Player left", "Bea has left the game"))
        );
        assert!(matches!(
            &sent[..],
            [RoomEvent::GameStateUpdate { update, .. }] if update.players.as_ref().map(Vec::len) == Some(1)
        ));
    }

    #[test]
    fn host_leaving_ends_the_session() {
        let mut host = host(1);
        let mut mirror = mirror(2);
        let mut phases = Vec::new();
        let sent = host.receive(joined(2, "Bea")).unwrap();
        deliver(sent, &mut mirror, &mut phases);

        mirror
            .receive(Inbound::from_relay(RoomEvent::PlayerLeft {
                player_id: None,
                client_id: Some(1.into()),
            }))
            .unwrap();
        assert_eq!(*mirror.state(), GameState::default());
        assert!(mirror.config().is_none());
        assert!(mirror.transport().left);
        assert_eq!(
            mirror.notifier().last().map(|n| n.title.as_str()),
            Some("Host left")
        );
    }

    /// Host with four joined players, configured so that client 2 is the imposter.
    fn host_in_drawing(round_count: u32) -> (TestSession, Vec<RoomEvent>) {
        let mut host = host(round_count);
        let mut sent = Vec::new();
        for (client, name) in [(1, "Host"), (2, "Bea"), (3, "Cy"), (4, "Dee")] {
            sent.extend(host.receive(joined(client, name)).unwrap());
        }
        let mut players = host.state().players.clone();
        players.rotate_left(1);
        sent.extend(host.execute(Command::ConfigurePlayers(players)).unwrap());
        sent.extend(host.execute(Command::RevealComplete).unwrap());
        assert_eq!(host.state().imposter().and_then(|p| p.client_id), Some(ClientId(2)));
        (host, sent)
    }

    fn left(client_id: u32) -> Inbound {
        Inbound::from_relay(RoomEvent::PlayerLeft {
            player_id: None,
            client_id: Some(client_id.into()),
        })
    }

    #[test]
    fn late_joiner_learns_the_host() {
        let (mut host, _) = host_in_drawing(2);
        let mut late = mirror(9);

        let sent = host.receive(joined(9, "Late")).unwrap();
        let names: Vec<&str> = sent.iter().map(RoomEvent::name).collect();
        assert_eq!(names, ["game-config", "game-state-update"]);
        let mut phases = Vec::new();
        deliver(sent, &mut late, &mut phases);
        assert_eq!(late.state(), host.state());
        assert_eq!(late.config().map(|c| c.round_count), Some(2));

        // A config re-sent for the next joiner doesn't drag us back to player setup
        let mut phases = Vec::new();
        let sent = host.receive(joined(10, "Later")).unwrap();
        deliver(sent, &mut late, &mut phases);
        assert_eq!(phases, [GamePhase::Drawing]);

        late.receive(left(1)).unwrap();
        assert_eq!(late.state().phase, GamePhase::Setup);
        assert!(late.config().is_none());
        assert!(late.transport().left);
    }

    #[test]
    fn imposter_leaving_is_replaced() {
        let (mut host, sent) = host_in_drawing(1);
        let mut mirror = mirror(3);
        let mut phases = Vec::new();
        deliver(sent, &mut mirror, &mut phases);

        let sent = host.receive(left(2)).unwrap();
        let state = host.state();
        assert_eq!(state.phase, GamePhase::Drawing);
        assert_eq!(state.players.len(), 3);
        assert_eq!(state.players.iter().filter(|p| p.is_imposter).count(), 1);
        let imposter = state.imposter().map(|p| p.id);
        assert!(imposter.is_some());

        deliver(sent, &mut mirror, &mut phases);
        assert_eq!(mirror.state(), host.state());

        // Anyone else leaving keeps the imposter in place
        host.receive(left(4)).unwrap();
        assert_eq!(host.state().imposter().map(|p| p.id), imposter);
    }

    #[test]
    fn leaving_keeps_starting_offset_in_range() {
        let (mut host, _) = host_in_drawing(1);
        host.execute(Command::RoundComplete(Vec::new())).unwrap();
        host.execute(Command::VotingComplete(Votes::new())).unwrap();
        for _ in 0..3 {
            host.execute(Command::PlayAgain).unwrap();
            host.execute(Command::RevealComplete).unwrap();
            host.execute(Command::RoundComplete(Vec::new())).unwrap();
            host.execute(Command::VotingComplete(Votes::new())).unwrap();
        }
        assert_eq!(host.state().starting_player_offset, 3);

        let sent = host.receive(left(3)).unwrap();
        assert_eq!(host.state().players.len(), 3);
        assert_eq!(host.state().starting_player_offset, 0);
        assert!(matches!(
            &sent[..],
            [RoomEvent::GameStateUpdate { update, .. }] if update.starting_player_offset == Some(0)
        ));
    }

    #[test]
    fn rename_is_replicated() {
        let mut host = host(1);
        let mut mirror = mirror(2);
        let mut phases = Vec::new();
        let sent = host.receive(joined(2, "Bea")).unwrap();
        deliver(sent, &mut mirror, &mut phases);

        let player_id = host.state().players[0].id;
        let sent = host
            .execute(Command::RenamePlayer {
                player_id,
                name: "Beatrice".to_owned(),
            })
            .unwrap();
        deliver(sent, &mut mirror, &mut phases);
        assert_eq!(mirror.state().players[0].name, "Beatrice");

        assert!(matches!(
            host.execute(Command::RenamePlayer {
                player_id: 42.into(),
                name: "Nobody".to_owned(),
            }),
            Err(SessionError::IncompleteRoster { .. })
        ));
        assert_eq!(
            mirror.execute(Command::RenamePlayer {
                player_id,
                name: "Sneaky".to_owned(),
            }),
            Err(SessionError::MissingAuthority)
        );
    }

    #[test]
    fn return_home_leaves_the_room() {
        let mut host = host(1);
        host.receive(joined(1, "Host")).unwrap();
        host.execute(Command::ReturnHome).unwrap();

        assert!(host.transport().left);
        assert_eq!(*host.state(), GameState::default());
        assert!(!host.is_host());
    }

    #[test]
    fn readiness() {
        let mut game = session(0);
        assert!(game.is_ready());

        game.execute(Command::SubmitConfig(GameConfig::local(3, 1)))
            .unwrap();
        assert!(game.is_ready());

        game.execute(Command::ConfigurePlayers(local_players(3)))
            .unwrap();
        assert!(game.is_ready());
    }

    #[test]
    fn offline_game_with_logged_notifications() {
        let mut game = GameSession::new(Offline, TracingNotifier);
        game.execute(Command::SubmitConfig(GameConfig::local(4, 1)))
            .unwrap();
        game.execute(Command::ConfigurePlayers(local_players(4)))
            .unwrap();

        assert_eq!(game.state().phase, GamePhase::WordReveal);
        assert!(!game.state().secret_word.is_empty());
        assert_eq!(
            game.state().players.iter().filter(|p| p.is_imposter).count(),
            1
        );
    }
}
