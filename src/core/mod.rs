//! Core deterministic primitives.
//!
//! Tuning constants, the seeded RNG and state hashing.
//! Nothing in here touches the network or the clock.

pub mod constants;
pub mod rng;
pub mod hash;

// Re-export core types
pub use rng::{DeterministicRng, derive_room_seed};
pub use hash::{StateHash, StateHasher, compute_state_hash};
