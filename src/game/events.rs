//! Game Events
//!
//! Events generated during simulation for logging and verification.
//! They are emitted in simulation order, which is deterministic for a
//! given seed and input sequence.

use glam::Vec3;
use serde::{Serialize, Deserialize};

use crate::game::state::{CrowdBehavior, PlayerId};

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameEventData {
    /// Player entered the room
    PlayerJoined {
        player_id: PlayerId,
        position: Vec3,
    },

    /// Player left the room
    PlayerLeft {
        player_id: PlayerId,
    },

    /// Player landed a melee hit on another player
    PlayerHit {
        attacker_id: PlayerId,
        victim_id: PlayerId,
        damage: f32,
        remaining_health: f32,
    },

    /// Player landed a melee hit on a crowd agent
    CrowdHit {
        attacker_id: PlayerId,
        agent_id: u32,
        damage: f32,
        remaining_health: f32,
    },

    /// Crowd agent attacked a player
    CrowdAttack {
        agent_id: u32,
        victim_id: PlayerId,
        damage: f32,
        remaining_health: f32,
    },

    /// Crowd agent switched behavior
    BehaviorChanged {
        agent_id: u32,
        old_behavior: CrowdBehavior,
        new_behavior: CrowdBehavior,
    },

    /// Room phase changed
    PhaseChanged {
        old_phase: u8,
        new_phase: u8,
    },

    /// Player was knocked out and respawned
    PlayerRespawned {
        player_id: PlayerId,
        position: Vec3,
    },

    /// Crowd agent was knocked out and respawned
    CrowdRespawned {
        agent_id: u32,
        position: Vec3,
    },
}

/// A game event with timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when event occurred
    pub tick: u64,

    /// Player involved, if any
    pub player_id: Option<PlayerId>,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tick: u64, data: GameEventData) -> Self {
        let player_id = match &data {
            GameEventData::PlayerJoined { player_id, .. } => Some(*player_id),
            GameEventData::PlayerLeft { player_id } => Some(*player_id),
            GameEventData::PlayerHit { attacker_id, .. } => Some(*attacker_id),
            GameEventData::CrowdHit { attacker_id, .. } => Some(*attacker_id),
            GameEventData::CrowdAttack { victim_id, .. } => Some(*victim_id),
            GameEventData::PlayerRespawned { player_id, .. } => Some(*player_id),
            GameEventData::BehaviorChanged { .. }
            | GameEventData::PhaseChanged { .. }
            | GameEventData::CrowdRespawned { .. } => None,
        };

        Self { tick, player_id, data }
    }

    pub fn player_joined(tick: u64, player_id: PlayerId, position: Vec3) -> Self {
        Self::new(tick, GameEventData::PlayerJoined { player_id, position })
    }

    pub fn player_left(tick: u64, player_id: PlayerId) -> Self {
        Self::new(tick, GameEventData::PlayerLeft { player_id })
    }

    pub fn player_hit(
        tick: u64,
        attacker_id: PlayerId,
        victim_id: PlayerId,
        damage: f32,
        remaining_health: f32,
    ) -> Self {
        Self::new(
            tick,
            GameEventData::PlayerHit {
                attacker_id,
                victim_id,
                damage,
                remaining_health,
            },
        )
    }

    pub fn crowd_hit(
        tick: u64,
        attacker_id: PlayerId,
        agent_id: u32,
        damage: f32,
        remaining_health: f32,
    ) -> Self {
        Self::new(
            tick,
            GameEventData::CrowdHit {
                attacker_id,
                agent_id,
                damage,
                remaining_health,
            },
        )
    }

    pub fn crowd_attack(
        tick: u64,
        agent_id: u32,
        victim_id: PlayerId,
        damage: f32,
        remaining_health: f32,
    ) -> Self {
        Self::new(
            tick,
            GameEventData::CrowdAttack {
                agent_id,
                victim_id,
                damage,
                remaining_health,
            },
        )
    }

    pub fn behavior_changed(
        tick: u64,
        agent_id: u32,
        old_behavior: CrowdBehavior,
        new_behavior: CrowdBehavior,
    ) -> Self {
        Self::new(
            tick,
            GameEventData::BehaviorChanged {
                agent_id,
                old_behavior,
                new_behavior,
            },
        )
    }

    pub fn phase_changed(tick: u64, old_phase: u8, new_phase: u8) -> Self {
        Self::new(tick, GameEventData::PhaseChanged { old_phase, new_phase })
    }

    pub fn player_respawned(tick: u64, player_id: PlayerId, position: Vec3) -> Self {
        Self::new(tick, GameEventData::PlayerRespawned { player_id, position })
    }

    pub fn crowd_respawned(tick: u64, agent_id: u32, position: Vec3) -> Self {
        Self::new(tick, GameEventData::CrowdRespawned { agent_id, position })
    }
}

// =============================================================================
// TESTS
// =============================================================================
