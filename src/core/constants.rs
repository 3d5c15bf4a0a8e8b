//! Simulation Tuning Constants
//!
//! Every fixed number the room simulation uses lives here.
//! Durations are in seconds, speeds in units/second, distances in world units.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  World axes: X/Z horizontal plane, +Y up                    │
//! │  Player and agent positions are feet; obstacle positions    │
//! │  are box centres, so a bottom is position.y - size.y / 2    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// TICK
// =============================================================================

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 20;

/// Fixed step duration (1/20 s)
pub const TICK_DT: f32 = 1.0 / TICK_RATE as f32;

/// World gravity (units/s², applied on Y)
pub const GRAVITY: f32 = -18.0;

/// Countdown timers at or below this are treated as expired
pub const TIMER_EPSILON: f32 = 1e-3;

/// Penetration depth ignored by contact tests
pub const CONTACT_SLOP: f32 = 1e-3;

// =============================================================================
// PLAYER MOVEMENT
// =============================================================================

/// Player collision radius in the XZ plane
pub const PLAYER_RADIUS: f32 = 0.4;

/// Player capsule height (feet at position.y)
pub const PLAYER_HEIGHT: f32 = 1.8;

/// Walking speed
pub const BASE_MOVE_SPEED: f32 = 5.0;

/// Sprint speed multiplier (takes precedence over crouch)
pub const SPRINT_MULTIPLIER: f32 = 1.6;

/// Crouch speed multiplier
pub const CROUCH_MULTIPLIER: f32 = 0.5;

/// Velocity easing rate while sliding (1/s)
pub const SLIDE_ACCEL: f32 = 6.0;

/// Per-tick velocity retention while sliding with no stick input
pub const SLIDE_FRICTION: f32 = 0.9;

/// Stick magnitude below which input counts as released
pub const INPUT_DEADZONE: f32 = 0.05;

/// Horizontal speed below which yaw is left untouched
pub const FACING_DEADZONE: f32 = 0.1;

/// Height above ground still considered standing on it
pub const GROUND_EPSILON: f32 = 0.05;

/// Vertical speed above which the player counts as ascending (not grounded)
pub const ASCENDING_THRESHOLD: f32 = 0.5;

/// Grace window after leaving the ground during which jump is honoured
pub const COYOTE_TIME: f32 = 0.12;

/// Vertical speed set by a jump
pub const JUMP_SPEED: f32 = 6.5;

/// Per-tick retention of the knockback impulse
pub const KNOCKBACK_DECAY: f32 = 0.8;

/// Knockback below this magnitude is dropped
pub const KNOCKBACK_EPSILON: f32 = 0.01;

/// Half-size of the square players spawn in, centred on the origin
pub const SPAWN_HALF_EXTENT: f32 = 3.0;

/// Starting/maximum health
pub const MAX_HEALTH: f32 = 100.0;

/// Stamina upper bound
pub const MAX_STAMINA: f32 = 100.0;

/// Stamina drain per second while not sprinting
pub const STAMINA_DRAIN: f32 = 0.5;

/// Stamina drain per second while sprinting
pub const SPRINT_STAMINA_DRAIN: f32 = 8.0;

// =============================================================================
// OBSTACLE PHYSICS
// =============================================================================

/// Impact speed below which a landing body stops instead of bouncing
pub const BOUNCE_THRESHOLD: f32 = 1.5;

/// Scale applied to an obstacle's friction coefficient while grounded (1/s)
pub const GROUND_FRICTION_SCALE: f32 = 4.0;

/// Default positional solver passes per tick
pub const SOLVER_ITERATIONS: u32 = 2;

/// Upper bound on any velocity component produced by a player push
pub const MAX_PUSH_SPEED: f32 = 6.0;

/// Scale of the normal push impulse
pub const PUSH_STRENGTH: f32 = 1.0;

/// Fraction of the player's tangential speed transferred on push
pub const PUSH_TANGENT_DAMPING: f32 = 0.25;

/// Player horizontal speed cap used when computing push impulses
pub const PUSH_PLAYER_SPEED_CAP: f32 = BASE_MOVE_SPEED * SPRINT_MULTIPLIER;

/// Minimum mass used for inverse-mass computations
pub const MIN_OBSTACLE_MASS: f32 = 0.1;

// =============================================================================
// WORLD / NAVIGATION
// =============================================================================

/// Default half-extent of the square play area
pub const WORLD_HALF_EXTENT: f32 = 40.0;

/// Default navigation cell size
pub const NAV_CELL_SIZE: f32 = 1.0;

/// Random cells tried by `NavGrid::random_open` before giving up
pub const RANDOM_OPEN_ATTEMPTS: u32 = 12;

// =============================================================================
// CROWD
// =============================================================================

/// Default crowd pool size
pub const CROWD_POOL_SIZE: usize = 24;

/// Crowd agent collision radius
pub const CROWD_RADIUS: f32 = 0.35;

/// Distance at which a waypoint counts as reached
pub const WAYPOINT_RADIUS: f32 = 0.6;

/// Delay before retrying after a failed path request
pub const REPATH_DELAY: f32 = 0.5;

/// Radius inside which players repel agents
pub const REPULSION_RADIUS: f32 = 2.5;

/// Peak repulsion acceleration
pub const REPULSION_WEIGHT: f32 = 8.0;

/// Waypoint seek acceleration
pub const SEEK_WEIGHT: f32 = 4.0;

/// Smooth wander acceleration
pub const WANDER_WEIGHT: f32 = 1.5;

/// Wander heading rotation rate (rad/s)
pub const WANDER_FREQUENCY: f32 = 0.7;

/// Seek-player acceleration while fighting
pub const FIGHT_WEIGHT: f32 = 12.0;

/// Flee acceleration
pub const FLEE_WEIGHT: f32 = 14.0;

/// Per-tick velocity retention for agents
pub const CROWD_DAMPING: f32 = 0.9;

/// Speed cap while wandering
pub const WANDER_SPEED: f32 = 1.6;

/// Speed cap while fighting
pub const FIGHT_SPEED: f32 = 3.2;

/// Speed cap while fleeing
pub const FLEE_SPEED: f32 = 4.2;

/// Speed above which a wandering agent walks
pub const WALK_THRESHOLD: f32 = 0.2;

/// Agent melee reach
pub const CROWD_MELEE_RANGE: f32 = 1.2;

/// Seconds between agent attacks
pub const CROWD_ATTACK_COOLDOWN: f32 = 1.2;

/// Damage dealt by an agent attack
pub const CROWD_ATTACK_DAMAGE: f32 = 6.0;

/// Knockback impulse of an agent attack
pub const CROWD_KNOCKBACK: f32 = 3.0;

/// Anim lock after an agent attacks
pub const ATTACK_ANIM_LOCK: f32 = 0.5;

/// Anim lock after an agent is hit
pub const HIT_ANIM_LOCK: f32 = 0.4;

/// Duration of the fight behaviour
pub const FIGHT_DURATION: f32 = 6.0;

/// Duration of the flee behaviour
pub const FLEE_DURATION: f32 = 4.0;

/// Default probability a hit agent fights back
pub const FIGHT_CHANCE: f32 = 0.35;

/// Health an agent needs to be eligible to fight back
pub const FIGHT_HEALTH_THRESHOLD: f32 = 30.0;

/// Share of a player/agent overlap resolved by moving the agent
pub const CROWD_SEPARATION_SHARE: f32 = 0.7;

// =============================================================================
// COMBAT / META
// =============================================================================

/// Seconds between player attacks
pub const ATTACK_COOLDOWN: f32 = 0.5;

/// Player melee reach
pub const MELEE_RANGE: f32 = 1.6;

/// Damage dealt by a player attack
pub const ATTACK_DAMAGE: f32 = 10.0;

/// Knockback impulse of a player attack
pub const KNOCKBACK_IMPULSE: f32 = 4.0;

/// Heat added per player attack
pub const HEAT_PER_ATTACK: f32 = 0.08;

/// Heat lost per second
pub const HEAT_DECAY: f32 = 0.05;

/// Heat at which phase 1 begins
pub const PHASE_1_HEAT: f32 = 0.4;

/// Heat at which phase 2 begins
pub const PHASE_2_HEAT: f32 = 0.7;

// =============================================================================
// REPLICATION
// =============================================================================

/// Default radius around any player inside which agents are replicated
pub const CROWD_INTEREST_RADIUS: f32 = 30.0;

/// Longest animation tag accepted from a client
pub const MAX_ANIM_STATE_LEN: usize = 32;
