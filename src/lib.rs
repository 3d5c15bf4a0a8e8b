//! # Crowd Room Server
//!
//! Authoritative, tick-based room host: player movement, dynamic obstacle
//! physics, crowd NPCs with pathfinding, melee combat and interest-filtered
//! state broadcasts.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CROWD ROOM SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── constants.rs- Tuning constants                          │
//! │  ├── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │  └── hash.rs     - State hashing for verification            │
//! │                                                              │
//! │  game/           - Room simulation (deterministic)           │
//! │  ├── input.rs    - Input sanitization, latest-wins slots     │
//! │  ├── state.rs    - Room, player, crowd and obstacle state    │
//! │  ├── scene.rs    - Scene loading and ground height           │
//! │  ├── nav.rs      - Navigation grid and A*                    │
//! │  ├── player.rs   - Player movement                           │
//! │  ├── obstacles.rs- Dynamic obstacle physics                  │
//! │  ├── crowd.rs    - Crowd steering and behavior               │
//! │  ├── combat.rs   - Melee, heat and phase                     │
//! │  ├── snapshot.rs - Per-tick broadcasts                       │
//! │  └── tick.rs     - Authoritative simulation loop             │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── server.rs   - WebSocket server, room registry           │
//! │  ├── room.rs     - Room task                                 │
//! │  └── protocol.rs - Message types                             │
//! │                                                              │
//! │  config.rs       - Server configuration                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! The `core/` and `game/` modules are deterministic for a given seed,
//! scene and input sequence on one build:
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - All randomness from the room's seeded Xorshift128+
//!
//! Float results may differ across platforms; determinism is checked by
//! replaying on the same machine and comparing state hashes.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::ServerConfig;
pub use crate::core::rng::DeterministicRng;
pub use game::input::{InputFrame, InputBuffer};
pub use game::state::{RoomSimulationState, PlayerState, PlayerId};
pub use game::tick::RoomConfig;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = crate::core::constants::TICK_RATE;
