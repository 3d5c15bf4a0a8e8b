//! Server Configuration
//!
//! Defaults plus `CROWD_ROOM_*` environment overrides. A malformed value
//! is logged and ignored; it never stops the server from starting.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::core::constants::TICK_RATE;
use crate::game::tick::RoomConfig;

/// Bind address override.
pub const ENV_BIND: &str = "CROWD_ROOM_BIND";
/// Connection limit override.
pub const ENV_MAX_CONNECTIONS: &str = "CROWD_ROOM_MAX_CONNECTIONS";
/// Tick rate override (Hz).
pub const ENV_TICK_RATE: &str = "CROWD_ROOM_TICK_RATE";
/// Scene directory override.
pub const ENV_SCENE_DIR: &str = "CROWD_ROOM_SCENE_DIR";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Room tick rate (Hz).
    pub tick_rate: u32,
    /// Root of `<game>/<scene>.json` scene files.
    pub scene_dir: PathBuf,
    /// Connections silent for longer than this are dropped.
    pub idle_timeout: Duration,
    /// Per-connection outbound queue length, in messages.
    pub outbound_buffer: usize,
    /// How often empty rooms are looked for.
    pub cleanup_interval: Duration,
    /// Simulation parameters for new rooms; the seed is derived per room.
    pub room: RoomConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            tick_rate: TICK_RATE,
            scene_dir: PathBuf::from("scenes"),
            idle_timeout: Duration::from_secs(300),
            outbound_buffer: 64,
            cleanup_interval: Duration::from_secs(30),
            room: RoomConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = parse_var(&lookup, ENV_BIND) {
            config.bind_addr = addr;
        }
        if let Some(max) = parse_var(&lookup, ENV_MAX_CONNECTIONS) {
            config.max_connections = max;
        }
        match parse_var::<u32, _>(&lookup, ENV_TICK_RATE) {
            Some(0) => warn!("{} must be positive, using {}", ENV_TICK_RATE, config.tick_rate),
            Some(rate) => {
                config.tick_rate = rate;
                config.room.dt = 1.0 / rate as f32;
            }
            None => {}
        }
        if let Some(dir) = lookup(ENV_SCENE_DIR).filter(|d| !d.trim().is_empty()) {
            config.scene_dir = PathBuf::from(dir);
        }

        config
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring malformed {}={:?}", key, raw);
            None
        }
    }
}
