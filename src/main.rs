//! Crowd Room Server
//!
//! `crowd-room-server [serve]` runs the WebSocket server.
//! `crowd-room-server demo [ticks]` runs a scripted room headless and
//! checks determinism by replaying it.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use glam::Vec3;
use tracing::{info, debug};
use tracing_subscriber::EnvFilter;

use crowd_room::{
    VERSION, TICK_RATE,
    config::ServerConfig,
    game::{
        events::GameEventData,
        input::{InputBuffer, InputFrame},
        scene::{ObstacleDescriptor, ObstaclePhysicsConfig, SceneDescriptor, TerrainDescriptor},
        state::{CrowdBehavior, PlayerId, RoomSimulationState},
        tick::{tick, replay_room, RoomConfig},
    },
    network::GameServer,
};

/// Default demo length (60 seconds).
const DEMO_TICKS: u64 = 1200;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Crowd Room Server v{}", VERSION);
    info!("Tick Rate: {} Hz", TICK_RATE);

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        None | Some("serve") => serve().await,
        Some("demo") => {
            let ticks = match args.get(2) {
                Some(raw) => raw.parse().with_context(|| format!("invalid tick count {:?}", raw))?,
                None => DEMO_TICKS,
            };
            demo_room(ticks)
        }
        Some(other) => bail!("unknown command {:?} (expected `serve` or `demo [ticks]`)", other),
    }
}

/// Run the WebSocket server until Ctrl-C.
async fn serve() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    info!(
        "Config: bind {}, max {} connections, scenes in {}",
        config.bind_addr,
        config.max_connections,
        config.scene_dir.display()
    );

    let server = Arc::new(GameServer::new(config));
    let running = server.clone();
    let mut task = tokio::spawn(async move { running.run().await });

    tokio::select! {
        result = &mut task => {
            result.context("server task panicked")??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("Ctrl-C received, shutting down");
            server.shutdown();
            task.await.context("server task panicked")??;
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Arena used by the demo: pillars, a dynamic crate and rolling terrain.
fn demo_scene() -> SceneDescriptor {
    let pillar = |id: &str, x: f32, z: f32| ObstacleDescriptor {
        id: id.to_string(),
        position: Vec3::new(x, 2.0, z),
        size: Vec3::new(2.0, 4.0, 2.0),
    };

    SceneDescriptor {
        obstacles: vec![
            pillar("pillar-ne", 12.0, 12.0),
            pillar("pillar-nw", -12.0, 12.0),
            pillar("pillar-se", 12.0, -12.0),
            pillar("pillar-sw", -12.0, -12.0),
            ObstacleDescriptor {
                id: "crate".to_string(),
                position: Vec3::new(2.0, 0.5, 0.0),
                size: Vec3::splat(1.0),
            },
        ],
        physics: [(
            "crate".to_string(),
            ObstaclePhysicsConfig {
                spawn_height_offset: 3.0,
                ..ObstaclePhysicsConfig::dynamic(2.0, 0.3)
            },
        )]
        .into_iter()
        .collect(),
        crowd_enabled: true,
        ground_height: 0.0,
        terrain: Some(TerrainDescriptor { amplitude: 0.4, frequency: 0.15 }),
    }
}

/// Scripted input: players circle the origin, sprinting and swinging.
fn demo_input(player_index: usize, t: u64) -> InputFrame {
    let angle = t as f32 * 0.03 + player_index as f32 * std::f32::consts::FRAC_PI_2;
    InputFrame {
        sprint: (t / 40) % 3 == 0,
        jump: t % 50 == player_index as u64,
        attack: t % 9 == 0,
        anim_state: "run".to_string(),
        ..InputFrame::with_movement(angle.cos(), angle.sin())
    }
}

/// Run a scripted room and verify it replays to the same hash.
fn demo_room(ticks: u64) -> anyhow::Result<()> {
    info!("=== Starting Demo Room ===");

    let scene = demo_scene();
    let config = RoomConfig {
        seed: 12345,
        ..RoomConfig::default()
    };
    info!("RNG Seed: {}", config.seed);

    let mut state = RoomSimulationState::new(&scene, &config);
    let mut inputs = InputBuffer::new();

    let player_ids: Vec<PlayerId> = (1..=4).map(|i| PlayerId::new([i; 16])).collect();
    for id in &player_ids {
        state.add_player(*id);
        inputs.open(*id);
        if let Some(player) = state.get_player(id) {
            info!("Added player {} at {:?}", id.short(), player.position);
        }
    }

    let mut recorded: BTreeMap<PlayerId, Vec<InputFrame>> = BTreeMap::new();
    let mut hits = 0usize;
    let mut respawns = 0usize;
    let mut total_events = 0usize;

    info!("Running {} ticks...", ticks);

    for t in 1..=ticks {
        for (i, id) in player_ids.iter().enumerate() {
            let frame = demo_input(i, t);
            inputs.offer(id, t, frame.clone());
            recorded.entry(*id).or_default().push(frame);
        }

        let result = tick(&mut state, &inputs, &config);
        total_events += result.events.len();

        for event in &result.events {
            match &event.data {
                GameEventData::PlayerHit { .. } | GameEventData::CrowdHit { .. } | GameEventData::CrowdAttack { .. } => {
                    hits += 1;
                }
                GameEventData::PlayerRespawned { .. } | GameEventData::CrowdRespawned { .. } => {
                    respawns += 1;
                }
                GameEventData::PhaseChanged { old_phase, new_phase } => {
                    info!("Tick {}: phase {} -> {}", event.tick, old_phase, new_phase);
                }
                _ => debug!("Tick {}: {:?}", event.tick, event.data),
            }
        }

        if t % 200 == 0 {
            let fighting = state.crowd.iter().filter(|a| a.behavior == CrowdBehavior::Fight).count();
            let fleeing = state.crowd.iter().filter(|a| a.behavior == CrowdBehavior::Flee).count();
            info!(
                "Tick {}: heat {:.2}, phase {}, {} crowd visible, {} fighting, {} fleeing",
                t,
                state.meta.heat,
                state.meta.phase,
                result.broadcast.crowd.agents.len(),
                fighting,
                fleeing
            );
        }
    }

    info!("=== Demo Results ===");
    info!("Hits: {}, respawns: {}, events: {}", hits, respawns, total_events);
    let hash = state.compute_hash();
    info!("Final State Hash: {}", hex::encode(hash));

    // Verify determinism by replaying
    info!("=== Verifying Determinism ===");
    let initial = RoomSimulationState::new(&scene, &config);
    let (replayed, replay_events) = replay_room(initial, &recorded, ticks, &config);
    let replay_hash = replayed.compute_hash();
    info!("Replay State Hash: {}", hex::encode(replay_hash));

    if hash != replay_hash || total_events != replay_events.len() {
        bail!("determinism failure: replay diverged");
    }
    info!("DETERMINISM VERIFIED: Hashes match!");
    Ok(())
}
