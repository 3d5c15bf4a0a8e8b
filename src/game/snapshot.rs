//! Snapshot Assembly
//!
//! Builds the three per-tick broadcasts: player snapshot (with heat and
//! phase), interest-filtered crowd roster, and the full obstacle list.
//! Filtering only affects what is sent; the room keeps every agent.

use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Serialize, Deserialize};

use crate::game::collision::distance_xz;
use crate::game::state::{CrowdAgent, CrowdAnim, PlayerId, PlayerState, RoomSimulationState};

/// Public view of one player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub position: Vec3,
    pub velocity: Vec3,
    pub health: f32,
    pub stamina: f32,
    pub look_yaw: f32,
    pub look_pitch: f32,
    pub anim_state: String,
    pub anim_time: f32,
    pub yaw: f32,
    pub ragdoll: bool,
}

impl From<&PlayerState> for PlayerSnapshot {
    fn from(p: &PlayerState) -> Self {
        Self {
            position: p.position,
            velocity: p.velocity,
            health: p.health,
            stamina: p.stamina,
            look_yaw: p.look_yaw,
            look_pitch: p.look_pitch,
            anim_state: p.anim_state.clone(),
            anim_time: p.anim_time,
            yaw: p.yaw,
            ragdoll: p.ragdoll,
        }
    }
}

/// Player broadcast, keyed by player UUID string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub tick: u64,
    pub players: BTreeMap<String, PlayerSnapshot>,
    pub heat: f32,
    pub phase: u8,
}

/// Public view of one crowd agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrowdAgentSnapshot {
    pub id: u32,
    pub position: Vec3,
    pub velocity: Vec3,
    pub state: CrowdAnim,
    pub state_time: f32,
}

impl From<&CrowdAgent> for CrowdAgentSnapshot {
    fn from(a: &CrowdAgent) -> Self {
        Self {
            id: a.id,
            position: a.position,
            velocity: a.velocity,
            state: a.anim,
            state_time: a.state_time,
        }
    }
}

/// Crowd broadcast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrowdSnapshot {
    pub tick: u64,
    pub agents: Vec<CrowdAgentSnapshot>,
}

/// Public view of one obstacle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObstacleSnapshot {
    pub id: String,
    pub position: Vec3,
    pub size: Vec3,
}

/// Obstacle broadcast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObstaclesSnapshot {
    pub tick: u64,
    pub obstacles: Vec<ObstacleSnapshot>,
}

/// Everything sent to clients after a tick.
#[derive(Clone, Debug, PartialEq)]
pub struct TickBroadcast {
    pub snapshot: RoomSnapshot,
    pub crowd: CrowdSnapshot,
    pub obstacles: ObstaclesSnapshot,
}

/// Whether `position` is within `radius` (XZ) of any player.
pub fn in_interest(position: Vec3, players: &BTreeMap<PlayerId, PlayerState>, radius: f32) -> bool {
    players
        .values()
        .any(|p| distance_xz(position, p.position) <= radius)
}

/// Assemble this tick's broadcasts.
pub fn build_broadcast(state: &RoomSimulationState, interest_radius: f32) -> TickBroadcast {
    let players = state
        .players
        .iter()
        .map(|(id, p)| (id.to_uuid_string(), PlayerSnapshot::from(p)))
        .collect();

    let agents = state
        .crowd
        .iter()
        .filter(|a| in_interest(a.position, &state.players, interest_radius))
        .map(CrowdAgentSnapshot::from)
        .collect();

    let obstacles = state
        .obstacles
        .iter()
        .map(|o| ObstacleSnapshot {
            id: o.id.clone(),
            position: o.position,
            size: o.size,
        })
        .collect();

    TickBroadcast {
        snapshot: RoomSnapshot {
            tick: state.tick,
            players,
            heat: state.meta.heat,
            phase: state.meta.phase,
        },
        crowd: CrowdSnapshot {
            tick: state.tick,
            agents,
        },
        obstacles: ObstaclesSnapshot {
            tick: state.tick,
            obstacles,
        },
    }
}

// =============================================================================
// TESTS
// =============================================================================
