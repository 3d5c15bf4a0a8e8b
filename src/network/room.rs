//! Room Actor
//!
//! Each room runs in its own task and is the only owner of its
//! [`RoomSimulationState`]. Connections talk to it through a
//! [`RoomHandle`]; joins, leaves and inputs are applied between ticks,
//! never during one.
//!
//! ```text
//!  connection ──RoomCommand──► mpsc ──► room task ──tick (20 Hz)──► try_send ──► connections
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn, debug};

use crate::game::events::{GameEvent, GameEventData};
use crate::game::input::{InputBuffer, InputFrame};
use crate::game::scene::SceneDescriptor;
use crate::game::snapshot::TickBroadcast;
use crate::game::state::{PlayerId, PlayerState, RoomSimulationState};
use crate::game::tick::{tick, RoomConfig, TickResult};
use crate::network::protocol::ServerMessage;

/// Capacity of a room's command queue.
const COMMAND_BUFFER: usize = 256;

/// Room identity: one room per game/scene pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoomKey {
    pub game: String,
    pub scene: String,
}

impl RoomKey {
    pub fn new(game: impl Into<String>, scene: impl Into<String>) -> Self {
        Self {
            game: game.into(),
            scene: scene.into(),
        }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.game, self.scene)
    }
}

/// Room errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// Room task has stopped.
    #[error("Room closed")]
    Closed,

    /// Player already in this room.
    #[error("Player already in room")]
    AlreadyJoined,

    /// Player not in this room.
    #[error("Player not in room")]
    UnknownPlayer,
}

/// Returned to a connection on a successful join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinInfo {
    pub player_id: PlayerId,
    pub tick: u64,
}

/// Commands accepted by a room task.
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        player_id: PlayerId,
        sender: mpsc::Sender<ServerMessage>,
        reply: oneshot::Sender<Result<JoinInfo, RoomError>>,
    },
    Leave {
        player_id: PlayerId,
    },
    Input {
        player_id: PlayerId,
        seq: u64,
        frame: InputFrame,
    },
    Close,
}

// =============================================================================
// ROOM
// =============================================================================

/// A room: simulation state, input slots and member channels.
///
/// Synchronous; the task in [`spawn_room`] drives it.
pub struct Room {
    key: RoomKey,
    config: RoomConfig,
    state: RoomSimulationState,
    inputs: InputBuffer,
    members: BTreeMap<PlayerId, mpsc::Sender<ServerMessage>>,
}

impl Room {
    /// Build a room from its scene.
    pub fn new(key: RoomKey, scene: &SceneDescriptor, config: RoomConfig) -> Self {
        let state = RoomSimulationState::new(scene, &config);
        Self {
            key,
            config,
            state,
            inputs: InputBuffer::new(),
            members: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &RoomKey {
        &self.key
    }

    /// Read-only view of the simulation.
    pub fn state(&self) -> &RoomSimulationState {
        &self.state
    }

    pub fn player_count(&self) -> usize {
        self.members.len()
    }

    /// Spawn a player and open their input slot.
    pub fn join(
        &mut self,
        player_id: PlayerId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<JoinInfo, RoomError> {
        if self.members.contains_key(&player_id) || !self.state.add_player(player_id) {
            return Err(RoomError::AlreadyJoined);
        }
        self.inputs.open(player_id);
        self.members.insert(player_id, sender);

        info!(room = %self.key, player = %player_id.short(), players = self.members.len(), "Player joined");
        Ok(JoinInfo {
            player_id,
            tick: self.state.tick,
        })
    }

    /// Remove a player with their input slot and timers.
    pub fn leave(&mut self, player_id: &PlayerId) -> Result<PlayerState, RoomError> {
        self.members.remove(player_id);
        self.inputs.close(player_id);
        let player = self.state.remove_player(player_id).ok_or(RoomError::UnknownPlayer)?;

        info!(room = %self.key, player = %player_id.short(), players = self.members.len(), "Player left");
        Ok(player)
    }

    /// Offer an input; stale sequences and unknown players are ignored.
    pub fn offer_input(&mut self, player_id: &PlayerId, seq: u64, frame: InputFrame) -> bool {
        let accepted = self.inputs.offer(player_id, seq, frame);
        if !accepted {
            debug!(room = %self.key, player = %player_id.short(), seq, "Dropped input");
        }
        accepted
    }

    /// Run one tick and send its broadcasts to every member.
    pub fn step(&mut self) -> TickResult {
        let result = tick(&mut self.state, &self.inputs, &self.config);
        for event in &result.events {
            log_event(&self.key, event);
        }
        self.broadcast(&result.broadcast);
        result
    }

    /// Queue the three tick broadcasts for every member.
    ///
    /// Never waits: a member whose queue is full misses this tick.
    fn broadcast(&self, broadcast: &TickBroadcast) {
        let messages = [
            ServerMessage::Snapshot(broadcast.snapshot.clone()),
            ServerMessage::Crowd(broadcast.crowd.clone()),
            ServerMessage::Obstacles(broadcast.obstacles.clone()),
        ];
        for (player_id, sender) in &self.members {
            for message in &messages {
                if sender.try_send(message.clone()).is_err() {
                    warn!(room = %self.key, player = %player_id.short(), "Outbound queue full, dropping tick");
                    break;
                }
            }
        }
    }

    /// Tell every member the room is going away.
    pub fn shutdown(&mut self, reason: &str) {
        for sender in self.members.values() {
            let _ = sender.try_send(ServerMessage::Shutdown {
                reason: reason.to_string(),
            });
        }
        self.members.clear();
    }
}

fn log_event(key: &RoomKey, event: &GameEvent) {
    match &event.data {
        GameEventData::PhaseChanged { old_phase, new_phase } => {
            info!(room = %key, tick = event.tick, old_phase, new_phase, "Phase changed");
        }
        GameEventData::PlayerJoined { .. } | GameEventData::PlayerLeft { .. } => {}
        data => {
            debug!(room = %key, tick = event.tick, ?data, "Game event");
        }
    }
}

// =============================================================================
// HANDLE
// =============================================================================

/// Cloneable address of a running room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    key: RoomKey,
    tx: mpsc::Sender<RoomCommand>,
    player_count: Arc<AtomicUsize>,
}

impl RoomHandle {
    pub fn key(&self) -> &RoomKey {
        &self.key
    }

    /// Players in the room as of the last join/leave.
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    /// Whether the room task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Join the room; resolves once the room has spawned the player.
    pub async fn join(
        &self,
        player_id: PlayerId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<JoinInfo, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RoomCommand::Join { player_id, sender, reply })
            .await
            .map_err(|_| RoomError::Closed)?;
        rx.await.map_err(|_| RoomError::Closed)?
    }

    /// Leave the room.
    pub async fn leave(&self, player_id: PlayerId) -> Result<(), RoomError> {
        self.tx
            .send(RoomCommand::Leave { player_id })
            .await
            .map_err(|_| RoomError::Closed)
    }

    /// Forward an input to the room.
    pub async fn input(&self, player_id: PlayerId, seq: u64, frame: InputFrame) -> Result<(), RoomError> {
        self.tx
            .send(RoomCommand::Input { player_id, seq, frame })
            .await
            .map_err(|_| RoomError::Closed)
    }

    /// Ask the room to stop after its current tick.
    pub async fn close(&self) {
        let _ = self.tx.send(RoomCommand::Close).await;
    }
}

/// Start a room task ticking at `tick_rate` Hz.
pub fn spawn_room(room: Room, tick_rate: u32) -> (RoomHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let player_count = Arc::new(AtomicUsize::new(room.player_count()));
    let handle = RoomHandle {
        key: room.key().clone(),
        tx,
        player_count: player_count.clone(),
    };

    let task = tokio::spawn(run_room(room, rx, tick_rate, player_count));
    (handle, task)
}

async fn run_room(
    mut room: Room,
    mut rx: mpsc::Receiver<RoomCommand>,
    tick_rate: u32,
    player_count: Arc<AtomicUsize>,
) {
    let tick_duration = Duration::from_micros(1_000_000 / tick_rate.max(1) as u64);
    let mut tick_interval = interval(tick_duration);
    tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(room = %room.key(), tick_rate, "Room started");

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                room.step();
            }
            command = rx.recv() => {
                match command {
                    Some(RoomCommand::Join { player_id, sender, reply }) => {
                        let result = room.join(player_id, sender);
                        player_count.store(room.player_count(), Ordering::Relaxed);
                        let _ = reply.send(result);
                    }
                    Some(RoomCommand::Leave { player_id }) => {
                        if room.leave(&player_id).is_err() {
                            debug!(room = %room.key(), player = %player_id.short(), "Leave for unknown player");
                        }
                        player_count.store(room.player_count(), Ordering::Relaxed);
                    }
                    Some(RoomCommand::Input { player_id, seq, frame }) => {
                        room.offer_input(&player_id, seq, frame);
                    }
                    Some(RoomCommand::Close) | None => break,
                }
            }
        }
    }

    room.shutdown("Room closed");
    player_count.store(0, Ordering::Relaxed);
    info!(room = %room.key(), tick = room.state().tick, "Room closed");
}

// =============================================================================
// TESTS
// =============================================================================
