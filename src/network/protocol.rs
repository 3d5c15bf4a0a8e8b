//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Messages are JSON text frames tagged by `type`. Input may also be
//! sent as a binary frame holding a bincode-encoded [`ClientInput`].

use serde::{Serialize, Deserialize};

use crate::game::input::InputFrame;
use crate::game::snapshot::{RoomSnapshot, CrowdSnapshot, ObstaclesSnapshot};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter the room for a game/scene pair, creating it if needed.
    Join(JoinRequest),

    /// Latest input state.
    Input(ClientInput),

    /// Ping for latency measurement.
    Ping {
        #[serde(default)]
        timestamp: u64,
    },

    /// Leave the current room.
    Leave,
}

/// Room selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub game: String,
    pub scene: String,
}

/// Player input as sent by the client.
///
/// Every field but `seq` is optional; missing fields read as idle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientInput {
    /// Per-session sequence number; stale values are dropped.
    pub seq: u64,
    pub move_x: f32,
    pub move_z: f32,
    pub look_yaw: f32,
    pub look_pitch: f32,
    pub anim_state: String,
    pub anim_time: f32,
    pub sprint: bool,
    pub attack: bool,
    pub interact: bool,
    pub jump: bool,
    pub crouch: bool,
    pub ragdoll: bool,
}

impl ClientInput {
    /// Convert to InputFrame for game simulation.
    ///
    /// The frame is sanitized again when it is accepted by the room.
    pub fn to_input_frame(&self) -> InputFrame {
        InputFrame {
            move_x: self.move_x,
            move_z: self.move_z,
            look_yaw: self.look_yaw,
            look_pitch: self.look_pitch,
            anim_state: self.anim_state.clone(),
            anim_time: self.anim_time,
            sprint: self.sprint,
            attack: self.attack,
            interact: self.interact,
            jump: self.jump,
            crouch: self.crouch,
            ragdoll: self.ragdoll,
        }
        .sanitize()
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join accepted.
    Welcome(WelcomeInfo),

    /// Player states plus heat and phase (every tick).
    Snapshot(RoomSnapshot),

    /// Crowd agents near at least one player (every tick).
    Crowd(CrowdSnapshot),

    /// Every obstacle (every tick).
    Obstacles(ObstaclesSnapshot),

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error message.
    Error(ServerError),

    /// Room or server is shutting down.
    Shutdown { reason: String },
}

/// Sent once after a successful join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeInfo {
    /// This connection's player id (UUID string).
    pub player_id: String,
    pub game: String,
    pub scene: String,
    /// Room tick at join time.
    pub tick: u64,
    /// Simulation rate in Hz.
    pub tick_rate: u32,
    pub server_version: String,
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message could not be decoded.
    InvalidMessage,
    /// Game or scene id rejected.
    InvalidRoom,
    /// Already in a room.
    AlreadyInRoom,
    /// Room closed before the request completed.
    RoomUnavailable,
    /// Connection limit reached.
    ServerOverloaded,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Shorthand for an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ServerError::new(code, message))
    }
}

/// Milliseconds since the Unix epoch.
pub fn server_time_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_parse_input_message() {
        let json = r#"{"type":"input","seq":7,"moveX":0.5,"moveZ":-0.5,"lookYaw":1.0,
            "animState":"run","sprint":true,"attack":true}"#;
        let msg = ClientMessage::from_json(json).unwrap();

        let ClientMessage::Input(input) = msg else {
            panic!("Wrong message type");
        };
        assert_eq!(input.seq, 7);
        assert_eq!(input.move_x, 0.5);
        assert_eq!(input.anim_state, "run");
        assert!(input.sprint && input.attack);
        assert!(!input.jump);
        assert_eq!(input.look_pitch, 0.0);
    }

    #[test]
    fn test_parse_join_ping_leave() {
        let join = ClientMessage::from_json(r#"{"type":"join","game":"arena","scene":"plaza"}"#).unwrap();
        assert_eq!(
            join,
            ClientMessage::Join(JoinRequest { game: "arena".into(), scene: "plaza".into() })
        );

        let ping = ClientMessage::from_json(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(ping, ClientMessage::Ping { timestamp: 0 });

        let leave = ClientMessage::from_json(r#"{"type":"leave"}"#).unwrap();
        assert_eq!(leave, ClientMessage::Leave);
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(ClientMessage::from_json(r#"{"type":"teleport","x":1}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_input_frame_is_sanitized() {
        let input = ClientInput {
            seq: 1,
            move_x: 3.0,
            move_z: 4.0,
            look_yaw: f32::NAN,
            ..ClientInput::default()
        };
        let frame = input.to_input_frame();
        assert!((frame.move_magnitude() - 1.0).abs() < 1e-5);
        assert_eq!(frame.look_yaw, 0.0);
    }

    #[test]
    fn test_binary_input() {
        let input = ClientInput {
            seq: 42,
            move_x: -1.0,
            anim_state: "jump".into(),
            jump: true,
            ..ClientInput::default()
        };
        let bytes = input.to_bytes().unwrap();
        assert_eq!(ClientInput::from_bytes(&bytes).unwrap(), input);
        assert!(ClientInput::from_bytes(&[1, 2]).is_err());
    }

    #[test]
    fn test_snapshot_message_shape() {
        let msg = ServerMessage::Snapshot(RoomSnapshot {
            tick: 3,
            players: BTreeMap::new(),
            heat: 0.5,
            phase: 1,
        });
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "snapshot");
        assert_eq!(value["phase"], 1);
        assert!(value["players"].is_object());
    }

    #[test]
    fn test_welcome_uses_camel_case() {
        let msg = ServerMessage::Welcome(WelcomeInfo {
            player_id: "p1".into(),
            game: "g".into(),
            scene: "s".into(),
            tick: 7,
            tick_rate: 20,
            server_version: "1.0.0".into(),
        });
        let json = msg.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "welcome");
        assert_eq!(value["playerId"], "p1");
        assert_eq!(value["tickRate"], 20);
        assert_eq!(value["serverVersion"], "1.0.0");
        assert!(value.get("player_id").is_none());
        assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_error_codes() {
        let msg = ServerMessage::error(ErrorCode::AlreadyInRoom, "leave first");
        let json = msg.to_json().unwrap();
        assert!(json.contains("already_in_room"));
        assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);
    }
}
