//! Game Logic Module
//!
//! All room simulation code. Deterministic for a given seed and input
//! sequence; no I/O except scene loading.
//!
//! ## Module Structure
//!
//! - `input`: Input sanitization and latest-input buffering
//! - `state`: Room state, players, crowd agents, obstacles
//! - `scene`: Scene descriptors, loading, ground sampling
//! - `collision`: AABB and circle contact helpers
//! - `nav`: Navigation grid and A* search
//! - `player`: Player movement
//! - `obstacles`: Dynamic obstacle physics and player pushes
//! - `crowd`: Crowd steering and behavior
//! - `combat`: Melee attacks, heat and phase
//! - `snapshot`: Per-tick broadcasts
//! - `tick`: Authoritative simulation loop
//! - `events`: Game events for logging and replay checks

pub mod input;
pub mod state;
pub mod scene;
pub mod collision;
pub mod nav;
pub mod player;
pub mod obstacles;
pub mod crowd;
pub mod combat;
pub mod snapshot;
pub mod tick;
pub mod events;

// Re-export key types
pub use input::{InputFrame, InputBuffer};
pub use state::{RoomSimulationState, PlayerState, PlayerId, CrowdAgent, CrowdAnim, CrowdBehavior, Obstacle};
pub use scene::{SceneDescriptor, SceneLoader, JsonSceneLoader, FixedSceneLoader, SceneError};
pub use snapshot::{RoomSnapshot, CrowdSnapshot, ObstaclesSnapshot, TickBroadcast};
pub use tick::{tick, replay_room, RoomConfig, TickResult};
pub use events::{GameEvent, GameEventData};
