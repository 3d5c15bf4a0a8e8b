//! Network Layer
//!
//! WebSocket server and per-room tasks.
//! This layer is **non-deterministic** - all game logic runs through `game/`.

pub mod protocol;
pub mod room;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, ClientInput, JoinRequest, WelcomeInfo, ErrorCode};
pub use room::{Room, RoomHandle, RoomKey, RoomError, spawn_room};
pub use server::{GameServer, RoomManager, GameServerError};
