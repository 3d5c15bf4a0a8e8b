//! Game State Definitions
//!
//! All state types for room simulation.
//! Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use std::f32::consts::TAU;

use glam::Vec3;
use serde::{Serialize, Deserialize};

use crate::core::constants::{
    MAX_HEALTH, MAX_STAMINA, SPAWN_HALF_EXTENT, CROWD_RADIUS, MIN_OBSTACLE_MASS,
};
use crate::core::rng::DeterministicRng;
use crate::core::hash::{StateHash, StateHasher, compute_state_hash};
use crate::game::collision::Aabb;
use crate::game::events::GameEvent;
use crate::game::nav::NavGrid;
use crate::game::scene::{GroundModel, ObstacleDescriptor, ObstaclePhysicsConfig, SceneDescriptor};
use crate::game::tick::RoomConfig;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Unique player identifier (UUID as bytes).
///
/// Doubles as the connection id. Implements Ord for deterministic
/// BTreeMap ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Fresh random id.
    pub fn random() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Short hex prefix for logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

// =============================================================================
// PLAYER STATE
// =============================================================================

/// State of a single player in the room.
///
/// `position` is the player's feet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Unique player ID
    pub id: PlayerId,

    pub position: Vec3,
    pub velocity: Vec3,

    /// 0 to MAX_HEALTH
    pub health: f32,

    /// 0 to MAX_STAMINA
    pub stamina: f32,

    /// Camera angles echoed from input
    pub look_yaw: f32,
    pub look_pitch: f32,

    /// Client animation tag and clock, echoed from input
    pub anim_state: String,
    pub anim_time: f32,

    /// Body facing, derived from horizontal velocity
    pub yaw: f32,

    pub ragdoll: bool,

    /// Seconds until the next attack is allowed
    pub attack_cooldown: f32,

    /// Jump grace remaining after leaving the ground
    pub coyote_timer: f32,

    /// Grounded at the end of the last movement step
    pub grounded: bool,

    /// Decaying horizontal impulse from hits
    pub knockback: Vec3,
}

impl PlayerState {
    /// Create a new player standing at `position`.
    pub fn new(id: PlayerId, position: Vec3) -> Self {
        Self {
            id,
            position,
            velocity: Vec3::ZERO,
            health: MAX_HEALTH,
            stamina: MAX_STAMINA,
            look_yaw: 0.0,
            look_pitch: 0.0,
            anim_state: String::new(),
            anim_time: 0.0,
            yaw: 0.0,
            ragdoll: false,
            attack_cooldown: 0.0,
            coyote_timer: 0.0,
            grounded: true,
            knockback: Vec3::ZERO,
        }
    }

    /// Reset to a fresh spawn at `position`, keeping the id.
    pub fn respawn(&mut self, position: Vec3) {
        *self = Self::new(self.id, position);
    }

    /// Apply damage, clamping health at 0.
    pub fn take_damage(&mut self, damage: f32) {
        self.health = (self.health - damage).max(0.0);
    }

    /// Hash player state into hasher.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_uuid(self.id.as_bytes());
        hasher.update_vec3(self.position);
        hasher.update_vec3(self.velocity);
        hasher.update_f32(self.health);
        hasher.update_f32(self.stamina);
        hasher.update_f32(self.yaw);
        hasher.update_bool(self.ragdoll);
        hasher.update_f32(self.attack_cooldown);
        hasher.update_f32(self.coyote_timer);
        hasher.update_bool(self.grounded);
        hasher.update_vec3(self.knockback);
    }
}

// =============================================================================
// CROWD AGENT
// =============================================================================

/// Crowd animation state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CrowdAnim {
    #[default]
    Idle = 0,
    Walk = 1,
    Run = 2,
    /// One-shot, locked by the state timer
    Hit = 3,
    /// One-shot, locked by the state timer
    Attack = 4,
}

/// Crowd behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CrowdBehavior {
    #[default]
    Wander = 0,
    Flee = 1,
    Fight = 2,
}

/// A pooled crowd NPC.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrowdAgent {
    /// Pool slot, fixed for the room's lifetime
    pub id: u32,

    pub position: Vec3,
    pub velocity: Vec3,

    /// Final point of the current path
    pub target: Option<Vec3>,
    pub path: Vec<Vec3>,
    pub path_index: usize,

    pub health: f32,

    pub anim: CrowdAnim,
    /// Lock countdown for one-shot anims
    pub state_timer: f32,
    /// Seconds spent in the current anim
    pub state_time: f32,

    pub behavior: CrowdBehavior,
    /// Countdown until a non-wander behavior reverts
    pub behavior_timer: f32,

    /// Room time of the last attack, in seconds
    pub last_attack_at: Option<f32>,

    /// Player who last hit this agent
    pub threat: Option<PlayerId>,

    /// Per-agent offset for the smooth wander heading
    pub wander_phase: f32,

    /// Wait before the next path request after a failed one
    pub repath_timer: f32,
}

impl CrowdAgent {
    /// Create a wandering agent.
    pub fn new(id: u32, position: Vec3, wander_phase: f32) -> Self {
        Self {
            id,
            position,
            velocity: Vec3::ZERO,
            target: None,
            path: Vec::new(),
            path_index: 0,
            health: MAX_HEALTH,
            anim: CrowdAnim::Idle,
            state_timer: 0.0,
            state_time: 0.0,
            behavior: CrowdBehavior::Wander,
            behavior_timer: 0.0,
            last_attack_at: None,
            threat: None,
            wander_phase,
            repath_timer: 0.0,
        }
    }

    /// Reuse this pool slot: full health, wandering, no path.
    pub fn respawn(&mut self, position: Vec3) {
        *self = Self::new(self.id, position, self.wander_phase);
    }

    /// Whether the agent is following an unfinished path.
    #[inline]
    pub fn has_path(&self) -> bool {
        self.path_index < self.path.len()
    }

    /// Current waypoint, if any.
    #[inline]
    pub fn current_waypoint(&self) -> Option<Vec3> {
        self.path.get(self.path_index).copied()
    }

    /// Whether the anim is locked by a one-shot.
    #[inline]
    pub fn anim_locked(&self) -> bool {
        self.state_timer > 0.0
    }

    /// Change anim, restarting its clock when it differs.
    pub fn set_anim(&mut self, anim: CrowdAnim) {
        if self.anim != anim {
            self.anim = anim;
            self.state_time = 0.0;
        }
    }

    /// Play a one-shot anim for `duration` seconds.
    pub fn lock_anim(&mut self, anim: CrowdAnim, duration: f32) {
        self.anim = anim;
        self.state_time = 0.0;
        self.state_timer = duration;
    }

    /// Apply damage, clamping health at 0.
    pub fn take_damage(&mut self, damage: f32) {
        self.health = (self.health - damage).max(0.0);
    }

    /// Hash agent state into hasher.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u32(self.id);
        hasher.update_vec3(self.position);
        hasher.update_vec3(self.velocity);
        hasher.update_u32(self.path.len() as u32);
        hasher.update_u32(self.path_index as u32);
        hasher.update_f32(self.health);
        hasher.update_u8(self.anim as u8);
        hasher.update_f32(self.state_timer);
        hasher.update_u8(self.behavior as u8);
        hasher.update_f32(self.behavior_timer);
        hasher.update_bool(self.threat.is_some());
        if let Some(threat) = &self.threat {
            hasher.update_uuid(threat.as_bytes());
        }
    }
}

// =============================================================================
// OBSTACLE
// =============================================================================

/// Scene obstacle with its physics settings.
///
/// `position` is the box centre; `size` the full extents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub id: String,
    pub position: Vec3,
    pub size: Vec3,
    pub velocity: Vec3,
    pub physics: ObstaclePhysicsConfig,
}

impl Obstacle {
    /// Create an obstacle at rest.
    pub fn new(
        id: impl Into<String>,
        position: Vec3,
        size: Vec3,
        physics: ObstaclePhysicsConfig,
    ) -> Self {
        Self {
            id: id.into(),
            position,
            size: size.abs(),
            velocity: Vec3::ZERO,
            physics,
        }
    }

    /// Create from a scene entry; dynamic bodies spawn raised and moving.
    pub fn from_descriptor(descriptor: &ObstacleDescriptor, physics: ObstaclePhysicsConfig) -> Self {
        let mut obstacle = Self::new(descriptor.id.clone(), descriptor.position, descriptor.size, physics);
        if obstacle.is_dynamic() {
            obstacle.position.y += obstacle.physics.spawn_height_offset;
            obstacle.velocity = obstacle.physics.initial_velocity;
        }
        obstacle
    }

    /// World-space bounds.
    #[inline]
    pub fn aabb(&self) -> Aabb {
        Aabb::from_center_size(self.position, self.size)
    }

    /// Top surface height.
    #[inline]
    pub fn top(&self) -> f32 {
        self.position.y + self.size.y * 0.5
    }

    /// Bottom surface height.
    #[inline]
    pub fn bottom(&self) -> f32 {
        self.position.y - self.size.y * 0.5
    }

    /// Collides and acts as ground.
    #[inline]
    pub fn is_solid(&self) -> bool {
        !self.physics.is_trigger
    }

    /// Simulated by the dynamic obstacle solver.
    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.physics.is_simulated()
    }

    /// Baked into the navigation grid.
    #[inline]
    pub fn blocks_navigation(&self) -> bool {
        self.is_solid() && !self.is_dynamic()
    }

    /// 1 / mass, with mass floored.
    #[inline]
    pub fn inverse_mass(&self) -> f32 {
        1.0 / self.physics.mass.max(MIN_OBSTACLE_MASS)
    }

    /// Hash obstacle state into hasher.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_bytes(self.id.as_bytes());
        hasher.update_vec3(self.position);
        hasher.update_vec3(self.velocity);
    }
}

// =============================================================================
// ROOM META STATE
// =============================================================================

/// Combat intensity and the phase derived from it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomMetaState {
    /// 0.0 to 1.0
    pub heat: f32,
    /// 0, 1 or 2
    pub phase: u8,
}

// =============================================================================
// ROOM SIMULATION STATE
// =============================================================================

/// Complete simulation state of a room.
///
/// Owned by exactly one room task; nothing else holds a reference to it.
#[derive(Clone, Debug)]
pub struct RoomSimulationState {
    /// Ticks simulated so far
    pub tick: u64,

    /// RNG seed (for verification)
    pub rng_seed: u64,

    /// Deterministic RNG state
    pub rng: DeterministicRng,

    /// All players (BTreeMap for deterministic iteration)
    pub players: BTreeMap<PlayerId, PlayerState>,

    /// Fixed-size crowd pool, indexed by agent id
    pub crowd: Vec<CrowdAgent>,

    /// Scene obstacles in load order
    pub obstacles: Vec<Obstacle>,

    pub ground: GroundModel,

    /// Baked from static obstacles at construction
    pub nav: NavGrid,

    pub meta: RoomMetaState,

    /// Events generated since the last `take_events`
    pub pending_events: Vec<GameEvent>,
}

impl RoomSimulationState {
    /// Build a room from its scene.
    pub fn new(scene: &SceneDescriptor, config: &RoomConfig) -> Self {
        let obstacles: Vec<Obstacle> = scene
            .obstacles
            .iter()
            .map(|d| {
                let physics = scene.physics.get(&d.id).cloned().unwrap_or_default();
                Obstacle::from_descriptor(d, physics)
            })
            .collect();

        let nav = NavGrid::build(
            config.world_half_extent,
            config.nav_cell_size,
            obstacles
                .iter()
                .filter(|o| o.blocks_navigation())
                .map(Obstacle::aabb),
        );

        let mut state = Self {
            tick: 0,
            rng_seed: config.seed,
            rng: DeterministicRng::new(config.seed),
            players: BTreeMap::new(),
            crowd: Vec::new(),
            obstacles,
            ground: GroundModel::from_scene(scene),
            nav,
            meta: RoomMetaState::default(),
            pending_events: Vec::new(),
        };

        if scene.crowd_enabled {
            for id in 0..config.crowd_pool_size {
                let position = state.crowd_spawn_position(config.world_half_extent);
                let phase = state.rng.range_f32(0.0, TAU);
                state.crowd.push(CrowdAgent::new(id as u32, position, phase));
            }
        }

        state
    }

    /// Random open nav cell, or a random point in bounds if sampling fails.
    pub fn crowd_spawn_position(&mut self, world_half_extent: f32) -> Vec3 {
        let (x, z) = match self.nav.random_open(&mut self.rng) {
            Some(p) => (p.x, p.z),
            None => {
                let bound = (world_half_extent - CROWD_RADIUS).max(0.0);
                (self.rng.range_f32(-bound, bound), self.rng.range_f32(-bound, bound))
            }
        };
        Vec3::new(x, self.ground.sample(&self.obstacles, x, z), z)
    }

    /// Random point in the spawn square, snapped to ground.
    pub fn player_spawn_position(&mut self) -> Vec3 {
        let x = self.rng.range_f32(-SPAWN_HALF_EXTENT, SPAWN_HALF_EXTENT);
        let z = self.rng.range_f32(-SPAWN_HALF_EXTENT, SPAWN_HALF_EXTENT);
        Vec3::new(x, self.ground.sample(&self.obstacles, x, z), z)
    }

    /// Add a player at a random spawn point. Returns false if already present.
    pub fn add_player(&mut self, id: PlayerId) -> bool {
        if self.players.contains_key(&id) {
            return false;
        }
        let position = self.player_spawn_position();
        self.players.insert(id, PlayerState::new(id, position));
        self.push_event(GameEvent::player_joined(self.tick, id, position));
        true
    }

    /// Remove a player.
    pub fn remove_player(&mut self, id: &PlayerId) -> Option<PlayerState> {
        let removed = self.players.remove(id)?;
        self.push_event(GameEvent::player_left(self.tick, *id));
        Some(removed)
    }

    /// Get a player by ID.
    pub fn get_player(&self, id: &PlayerId) -> Option<&PlayerState> {
        self.players.get(id)
    }

    /// Ground height at (x, z) given the current obstacle positions.
    pub fn ground_height(&self, x: f32, z: f32) -> f32 {
        self.ground.sample(&self.obstacles, x, z)
    }

    /// Compute hash of current state for verification.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.tick, self.rng_seed, |hasher| {
            for player in self.players.values() {
                player.hash_into(hasher);
            }

            hasher.update_u32(self.crowd.len() as u32);
            for agent in &self.crowd {
                agent.hash_into(hasher);
            }

            for obstacle in &self.obstacles {
                obstacle.hash_into(hasher);
            }

            hasher.update_f32(self.meta.heat);
            hasher.update_u8(self.meta.phase);

            let [s0, s1] = self.rng.state();
            hasher.update_u64(s0);
            hasher.update_u64(s1);
        })
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Push a game event.
    pub fn push_event(&mut self, event: GameEvent) {
        self.pending_events.push(event);
    }
}

// =============================================================================
// TESTS
// =============================================================================
