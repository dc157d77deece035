//! Room Management
//!
//! A room owns its member list, the match that runs inside it, and the
//! tokio task that ticks that match. Every mutation goes through the room's
//! write lock, so the tick task and client commands never interleave within
//! a tick.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::core::rng::DeterministicRng;
use crate::game::bomb::{place_bomb, PlaceBombError};
use crate::game::events::MatchOutcome;
use crate::game::grid::GridPos;
use crate::game::input::Direction;
use crate::game::map;
use crate::game::state::{MatchState, PlayerId};
use crate::game::tick::{new_match, tick, MatchConfig};
use crate::network::protocol::ServerMessage;
use crate::{ticks_from_millis, MAX_ROOM_PLAYERS, TICK_MILLIS};

/// Outbound channel to one client.
pub type Outbox = mpsc::Sender<ServerMessage>;

/// Room settings.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Members allowed at once.
    pub max_players: usize,
    /// Tick period.
    pub tick_period: Duration,
    /// Ticks between a decided match and `GAME_OVER`.
    pub game_over_delay_ticks: u32,
    /// How long a stopping room task may take before it is aborted.
    pub stop_grace: Duration,
    /// Simulation settings.
    pub match_config: MatchConfig,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_players: MAX_ROOM_PLAYERS,
            tick_period: Duration::from_millis(TICK_MILLIS),
            game_over_delay_ticks: ticks_from_millis(1_000),
            stop_grace: Duration::from_millis(500),
            match_config: MatchConfig::default(),
        }
    }
}

/// Room lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomPhase {
    /// Waiting for the host to start.
    Lobby,
    /// Match running.
    Playing,
    /// Match decided; frames still flow until the result is announced.
    GameOverPending {
        /// Ticks until `GAME_OVER`.
        ticks_left: u32,
        /// Result to announce.
        outcome: MatchOutcome,
    },
    /// Waiting for rematch votes.
    GameOver,
}

/// Room errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// Capacity reached.
    #[error("Room Full")]
    Full,

    /// Password mismatch.
    #[error("Wrong Password")]
    WrongPassword,

    /// Host-only action.
    #[error("player {0} is not the host")]
    NotHost(PlayerId),

    /// Start requested while a match is running.
    #[error("match already in progress")]
    InProgress,

    /// Vote outside the game-over phase.
    #[error("no rematch vote is open")]
    VoteClosed,

    /// Match action with no match running.
    #[error("no match in progress")]
    NotPlaying,

    /// Target is not a member.
    #[error("player {0} is not in the room")]
    UnknownPlayer(PlayerId),

    /// The host tried to kick themselves.
    #[error("host cannot kick themselves")]
    KickSelf,

    /// Bomb placement refused.
    #[error(transparent)]
    PlaceBomb(#[from] PlaceBombError),
}

impl RoomError {
    /// Text for an `ERROR;` reply, if the client should be told.
    pub fn client_reason(&self) -> Option<&'static str> {
        match self {
            RoomError::Full => Some("Room Full"),
            RoomError::WrongPassword => Some("Wrong Password"),
            _ => None,
        }
    }
}

/// A connected member.
#[derive(Debug, Clone)]
pub struct RoomMember {
    /// Player id within this room.
    pub id: PlayerId,
    /// Outbound channel.
    pub sender: Outbox,
}

/// A game room.
pub struct Room {
    name: String,
    password: Option<String>,
    config: RoomConfig,
    phase: RoomPhase,
    members: Vec<RoomMember>,
    host: Option<PlayerId>,
    next_id: u32,
    votes: BTreeSet<PlayerId>,
    game: Option<MatchState>,
    rng: DeterministicRng,
}

impl Room {
    /// Create an empty room. A blank password makes the room public.
    pub fn new(name: impl Into<String>, password: Option<String>, config: RoomConfig, rng: DeterministicRng) -> Self {
        Self {
            name: name.into(),
            password: password.filter(|p| !p.is_empty()),
            config,
            phase: RoomPhase::Lobby,
            members: Vec::new(),
            host: None,
            next_id: 0,
            votes: BTreeSet::new(),
            game: None,
            rng,
        }
    }

    /// Room name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Password protected.
    pub fn is_private(&self) -> bool {
        self.password.is_some()
    }

    /// Current phase.
    pub fn phase(&self) -> &RoomPhase {
        &self.phase
    }

    /// Shown in `ROOM_LIST`.
    pub fn is_listed(&self) -> bool {
        self.phase == RoomPhase::Lobby
    }

    /// Current host.
    pub fn host(&self) -> Option<PlayerId> {
        self.host
    }

    /// Member ids in join order.
    pub fn member_ids(&self) -> Vec<PlayerId> {
        self.members.iter().map(|m| m.id).collect()
    }

    /// Number of members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// No members left.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Running or frozen match state.
    pub fn game(&self) -> Option<&MatchState> {
        self.game.as_ref()
    }

    /// Current rematch votes.
    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    /// Check a join password. Public rooms accept anything.
    pub fn check_password(&self, attempt: &str) -> Result<(), RoomError> {
        match &self.password {
            Some(expected) if expected != attempt => Err(RoomError::WrongPassword),
            _ => Ok(()),
        }
    }

    /// Fails if the room cannot take another member.
    pub fn check_capacity(&self) -> Result<(), RoomError> {
        if self.members.len() >= self.config.max_players {
            return Err(RoomError::Full);
        }
        Ok(())
    }

    // =========================================================================
    // MEMBERSHIP
    // =========================================================================

    /// Add a member. Sends `YOUR_ID` to them, then `ROOM_UPDATE` to everyone.
    ///
    /// Joining a running match drops the newcomer on the first free spawn corner.
    pub fn join(&mut self, sender: Outbox) -> Result<PlayerId, RoomError> {
        self.check_capacity()?;

        let id = PlayerId(self.next_id);
        self.next_id += 1;
        self.members.push(RoomMember { id, sender: sender.clone() });
        if self.host.is_none() {
            self.host = Some(id);
        }

        if let Some(game) = self.game.as_mut() {
            if matches!(self.phase, RoomPhase::Playing | RoomPhase::GameOverPending { .. }) {
                let slot = self.members.len() - 1;
                let cfg = &self.config.match_config;
                let occupied: Vec<GridPos> = game.players.values().filter(|p| p.alive).map(|p| p.cell()).collect();
                let spawn = map::free_spawn_point(&occupied, cfg.cols, cfg.rows)
                    .unwrap_or_else(|| map::spawn_point(slot, cfg.cols, cfg.rows));
                game.add_player(id, spawn);
            }
        }

        info!(room = %self.name, player = %id, "Player joined");
        send(&sender, ServerMessage::YourId(id));
        self.broadcast_room_update();
        Ok(id)
    }

    /// Remove a member. Migrates the host role if needed.
    pub fn leave(&mut self, id: PlayerId) -> Option<RoomMember> {
        let index = self.members.iter().position(|m| m.id == id)?;
        let member = self.members.remove(index);
        self.votes.remove(&id);
        if let Some(game) = self.game.as_mut() {
            game.remove_player(id);
        }

        if self.host == Some(id) {
            self.host = self.members.iter().map(|m| m.id).min();
            if let Some(new_host) = self.host {
                info!(room = %self.name, host = %new_host, "Host migrated");
            }
        }

        info!(room = %self.name, player = %id, remaining = self.members.len(), "Player left");
        if !self.members.is_empty() {
            self.broadcast_room_update();
            if self.phase == RoomPhase::GameOver && !self.votes.is_empty() {
                self.broadcast_rematch_tally();
                self.restart_if_unanimous();
            }
        }
        Some(member)
    }

    /// Host removes another member. The target is told `KICKED`.
    pub fn kick(&mut self, requester: PlayerId, target: PlayerId) -> Result<RoomMember, RoomError> {
        self.require_host(requester)?;
        if requester == target {
            return Err(RoomError::KickSelf);
        }
        let member = self.leave(target).ok_or(RoomError::UnknownPlayer(target))?;
        send(&member.sender, ServerMessage::Kicked);
        Ok(member)
    }

    fn require_host(&self, id: PlayerId) -> Result<(), RoomError> {
        if self.host != Some(id) {
            return Err(RoomError::NotHost(id));
        }
        Ok(())
    }

    // =========================================================================
    // MATCH CONTROL
    // =========================================================================

    /// Host starts the match, or forces a rematch after game over.
    pub fn start(&mut self, requester: PlayerId) -> Result<(), RoomError> {
        self.require_host(requester)?;
        match self.phase {
            RoomPhase::Lobby | RoomPhase::GameOver => {
                self.begin_match();
                Ok(())
            }
            RoomPhase::Playing | RoomPhase::GameOverPending { .. } => Err(RoomError::InProgress),
        }
    }

    /// Record a rematch vote. Restarts once everyone has voted.
    pub fn vote_rematch(&mut self, id: PlayerId) -> Result<(), RoomError> {
        if self.phase != RoomPhase::GameOver {
            return Err(RoomError::VoteClosed);
        }
        if !self.members.iter().any(|m| m.id == id) {
            return Err(RoomError::UnknownPlayer(id));
        }
        self.votes.insert(id);
        self.broadcast_rematch_tally();
        self.restart_if_unanimous();
        Ok(())
    }

    fn broadcast_rematch_tally(&self) {
        self.broadcast(ServerMessage::RematchUpdate {
            votes: self.votes.len(),
            total: self.members.len(),
        });
    }

    fn restart_if_unanimous(&mut self) {
        if !self.members.is_empty() && self.members.iter().all(|m| self.votes.contains(&m.id)) {
            info!(room = %self.name, "Rematch agreed");
            self.begin_match();
        }
    }

    fn begin_match(&mut self) {
        let restarting = self.game.is_some();
        let roster = self.member_ids();
        let seed = DeterministicRng::new(self.rng.next_u64());
        let game = new_match(&roster, &self.config.match_config, seed);
        let map = ServerMessage::map(&game.grid);

        self.game = Some(game);
        self.votes.clear();
        self.phase = RoomPhase::Playing;

        info!(room = %self.name, players = roster.len(), restarting, "Match started");
        if restarting {
            self.broadcast(ServerMessage::ResetGameState);
        }
        self.broadcast(ServerMessage::GameStarted);
        self.broadcast(map);
        self.broadcast_room_update();
    }

    /// Update a held movement key.
    pub fn set_input(&mut self, id: PlayerId, key: Direction, pressed: bool) -> Result<(), RoomError> {
        let game = self.game.as_mut().ok_or(RoomError::NotPlaying)?;
        let player = game.get_player_mut(&id).ok_or(RoomError::UnknownPlayer(id))?;
        if player.alive {
            player.intent.set(key, pressed);
        }
        Ok(())
    }

    /// Place a bomb under a player. The `BOMB_PLACED` line goes out with the next tick.
    pub fn place_bomb(&mut self, id: PlayerId) -> Result<GridPos, RoomError> {
        if self.phase != RoomPhase::Playing {
            return Err(RoomError::NotPlaying);
        }
        let game = self.game.as_mut().ok_or(RoomError::NotPlaying)?;
        Ok(place_bomb(game, id, &self.config.match_config.bomb)?)
    }

    // =========================================================================
    // TICK
    // =========================================================================

    /// Advance the room by one tick and send the resulting lines.
    pub fn advance(&mut self) {
        match self.phase.clone() {
            RoomPhase::Lobby | RoomPhase::GameOver => {}
            RoomPhase::Playing => self.advance_match(),
            RoomPhase::GameOverPending { ticks_left, outcome } => {
                self.broadcast_state();
                if ticks_left <= 1 {
                    info!(room = %self.name, ?outcome, "Match over");
                    self.phase = RoomPhase::GameOver;
                    self.votes.clear();
                    self.broadcast(ServerMessage::GameOver(outcome));
                } else {
                    self.phase = RoomPhase::GameOverPending {
                        ticks_left: ticks_left - 1,
                        outcome,
                    };
                }
            }
        }
    }

    fn advance_match(&mut self) {
        let corpse_ticks = self.config.match_config.corpse_ticks;
        let Some(game) = self.game.as_mut() else {
            warn!(room = %self.name, "Playing without a match, returning to lobby");
            self.phase = RoomPhase::Lobby;
            return;
        };

        // Frame reflects the state this tick started from
        let frame = game.snapshot(corpse_ticks);
        // Placements since the last tick are queued on the match
        let mut lines: Vec<ServerMessage> = game
            .take_events()
            .iter()
            .filter_map(|e| ServerMessage::from_event(&e.data, &game.grid))
            .collect();

        let result = tick(game, &self.config.match_config);
        lines.extend(
            result
                .events
                .iter()
                .filter_map(|e| ServerMessage::from_event(&e.data, &game.grid)),
        );

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(room = %self.name, tick = game.tick, events = result.events.len(), "Tick");

        for line in lines {
            self.broadcast(line);
        }
        self.broadcast(ServerMessage::State(frame));

        if let Some(outcome) = result.outcome {
            debug!(room = %self.name, ?outcome, "Match decided");
            self.phase = RoomPhase::GameOverPending {
                ticks_left: self.config.game_over_delay_ticks.max(1),
                outcome,
            };
        }
    }

    // =========================================================================
    // BROADCAST
    // =========================================================================

    /// Send a line to every member. Full or closed channels drop it.
    pub fn broadcast(&self, msg: ServerMessage) {
        for member in &self.members {
            send(&member.sender, msg.clone());
        }
    }

    fn broadcast_state(&self) {
        if let Some(game) = &self.game {
            self.broadcast(ServerMessage::State(game.snapshot(self.config.match_config.corpse_ticks)));
        }
    }

    fn broadcast_room_update(&self) {
        self.broadcast(ServerMessage::RoomUpdate {
            host: self.host,
            members: self.member_ids(),
        });
    }
}

/// Best-effort send.
pub(crate) fn send(sender: &Outbox, msg: ServerMessage) {
    if let Err(e) = sender.try_send(msg) {
        debug!("Dropping outbound line: {}", e);
    }
}

// =============================================================================
// ROOM TASK
// =============================================================================

/// A room plus the task ticking it.
pub struct RoomHandle {
    /// Shared room state.
    pub room: Arc<RwLock<Room>>,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
    stop_grace: Duration,
}

impl RoomHandle {
    /// Spawn the tick task for a room.
    pub fn spawn(room: Room) -> Self {
        let tick_period = room.config.tick_period;
        let stop_grace = room.config.stop_grace;
        let name = room.name.clone();
        let room = Arc::new(RwLock::new(room));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(run_room_loop(room.clone(), name, tick_period, shutdown_rx));

        Self {
            room,
            shutdown_tx,
            task,
            stop_grace,
        }
    }

    /// Signal the task, wait out the grace period, then abort.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let mut task = self.task;
        if tokio::time::timeout(self.stop_grace, &mut task).await.is_err() {
            warn!("Room task did not stop in time, aborting");
            task.abort();
        }
    }
}

/// Tick a room until told to stop.
async fn run_room_loop(
    room: Arc<RwLock<Room>>,
    name: String,
    tick_period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = interval(tick_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!(room = %name, "Room loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut guard = room.write().await;
                let room_ref = &mut *guard;
                if std::panic::catch_unwind(AssertUnwindSafe(|| room_ref.advance())).is_err() {
                    error!(room = %name, "Tick panicked, continuing with next tick");
                }
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }

    info!(room = %name, "Room closed");
}

// =============================================================================
// TESTS
// =============================================================================
