//! Authoritative Simulation Tick
//!
//! The fixed-step room loop. Runs synchronously; nothing in here awaits,
//! allocates per-entity on the heap beyond snapshots, or can fail.
//!
//! ```text
//!  1. players ─► 2. dynamic obstacles ─► 3. player/player separation
//!       │
//!  4. crowd AI ─► 5. player/crowd separation ─► 6. ground snap
//!       │
//!  7. combat ─► 8. heat/phase ─► 9. respawns ─► 10. snapshot
//! ```

use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Serialize, Deserialize};

use crate::core::constants::{
    TICK_DT, WORLD_HALF_EXTENT, NAV_CELL_SIZE, CROWD_POOL_SIZE, CROWD_INTEREST_RADIUS,
    FIGHT_CHANCE, SOLVER_ITERATIONS, PLAYER_RADIUS, CROWD_RADIUS, CROWD_SEPARATION_SHARE,
};
use crate::game::collision::separate_circles;
use crate::game::combat::{resolve_attacks, update_meta, CombatParams};
use crate::game::crowd::{resolve_static_contacts, step_crowd, CrowdContext};
use crate::game::events::GameEvent;
use crate::game::input::{InputBuffer, InputFrame};
use crate::game::obstacles::step_dynamic_obstacles;
use crate::game::player::{push_out_of_obstacles, simulate_player, snap_to_ground};
use crate::game::snapshot::{build_broadcast, TickBroadcast};
use crate::game::state::{PlayerId, PlayerState, RoomSimulationState};

/// Per-room simulation parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Half-size of the square play area
    pub world_half_extent: f32,
    /// Navigation cell edge
    pub nav_cell_size: f32,
    /// Crowd agents per room when the scene enables them
    pub crowd_pool_size: usize,
    /// Agents further than this from every player are not sent
    pub interest_radius: f32,
    /// Probability a healthy agent fights back when hit
    pub fight_chance: f32,
    /// Obstacle solver passes per tick
    pub solver_iterations: u32,
    /// RNG seed
    pub seed: u64,
    /// Fixed step in seconds
    pub dt: f32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            world_half_extent: WORLD_HALF_EXTENT,
            nav_cell_size: NAV_CELL_SIZE,
            crowd_pool_size: CROWD_POOL_SIZE,
            interest_radius: CROWD_INTEREST_RADIUS,
            fight_chance: FIGHT_CHANCE,
            solver_iterations: SOLVER_ITERATIONS,
            seed: 0,
            dt: TICK_DT,
        }
    }
}

/// Result of a tick.
#[derive(Clone, Debug)]
pub struct TickResult {
    /// Tick just simulated
    pub tick: u64,
    /// Events generated this tick, including joins/leaves since the last tick
    pub events: Vec<GameEvent>,
    /// What to send to clients
    pub broadcast: TickBroadcast,
}

/// Run one simulation tick.
///
/// # Arguments
///
/// * `state` - The room state (will be mutated)
/// * `inputs` - Latest accepted input per session; players without one idle
/// * `config` - Room configuration
///
/// # Determinism
///
/// For a given seed, scene and input sequence the resulting state hash
/// is identical run to run:
/// - BTreeMap iteration order for players
/// - Pool order for agents, load order for obstacles
/// - All randomness from `state.rng`
pub fn tick(state: &mut RoomSimulationState, inputs: &InputBuffer, config: &RoomConfig) -> TickResult {
    let dt = config.dt;

    // 0. Advance tick counter
    state.tick += 1;
    let now = state.tick as f32 * dt;

    let mut events = state.take_events();

    // 1. Player movement (and pushes on dynamic obstacles)
    let idle = InputFrame::default();
    for (id, player) in state.players.iter_mut() {
        let input = inputs.latest(id).unwrap_or(&idle);
        simulate_player(player, input, &mut state.obstacles, &state.ground, dt);
    }

    // 2. Dynamic obstacles
    step_dynamic_obstacles(&mut state.obstacles, &state.ground, config.solver_iterations, dt);

    // 3. Player vs player
    separate_players(&mut state.players);
    for player in state.players.values_mut() {
        push_out_of_obstacles(player, &state.obstacles);
    }

    // 4. Crowd AI
    let ctx = CrowdContext {
        nav: &state.nav,
        obstacles: &state.obstacles,
        ground: &state.ground,
        world_half_extent: config.world_half_extent,
        now,
        tick: state.tick,
        dt,
    };
    step_crowd(&mut state.crowd, &mut state.players, &mut state.rng, &ctx, &mut events);

    // 5. Player vs crowd
    separate_players_from_crowd(state);
    for player in state.players.values_mut() {
        push_out_of_obstacles(player, &state.obstacles);
    }
    for agent in state.crowd.iter_mut() {
        agent.position = resolve_static_contacts(agent.position, &state.obstacles);
    }

    // 6. Ground snap after every horizontal correction
    for player in state.players.values_mut() {
        snap_to_ground(player, &state.obstacles, &state.ground);
    }
    for agent in state.crowd.iter_mut() {
        if agent.position.is_finite() {
            agent.position.y = state.ground.sample(&state.obstacles, agent.position.x, agent.position.z);
        }
    }

    // 7. Combat
    let params = CombatParams {
        fight_chance: config.fight_chance,
        tick: state.tick,
        dt,
    };
    resolve_attacks(
        &mut state.players,
        &mut state.crowd,
        inputs,
        &mut state.meta,
        &mut state.rng,
        &params,
        &mut events,
    );

    // 8. Heat / phase
    if let Some((old, new)) = update_meta(&mut state.meta, dt) {
        events.push(GameEvent::phase_changed(state.tick, old, new));
    }

    // 9. Respawns
    process_respawns(state, config, &mut events);

    // 10. Snapshot
    let broadcast = build_broadcast(state, config.interest_radius);

    TickResult {
        tick: state.tick,
        events,
        broadcast,
    }
}

/// Pairwise separation in id order, equal split.
fn separate_players(players: &mut BTreeMap<PlayerId, PlayerState>) {
    let mut positions: Vec<Vec3> = players.values().map(|p| p.position).collect();
    let min_dist = PLAYER_RADIUS * 2.0;

    for i in 0..positions.len() {
        for j in (i + 1)..positions.len() {
            let (head, tail) = positions.split_at_mut(j);
            separate_circles(&mut head[i], &mut tail[0], min_dist, 0.5);
        }
    }

    for (player, position) in players.values_mut().zip(positions) {
        player.position = position;
    }
}

/// Agents take most of each player/agent overlap.
fn separate_players_from_crowd(state: &mut RoomSimulationState) {
    let min_dist = PLAYER_RADIUS + CROWD_RADIUS;
    for agent in state.crowd.iter_mut() {
        for player in state.players.values_mut() {
            separate_circles(&mut agent.position, &mut player.position, min_dist, CROWD_SEPARATION_SHARE);
        }
    }
}

fn process_respawns(state: &mut RoomSimulationState, config: &RoomConfig, events: &mut Vec<GameEvent>) {
    let fallen: Vec<PlayerId> = state
        .players
        .iter()
        .filter(|(_, p)| p.health <= 0.0 || !p.position.is_finite() || !p.velocity.is_finite())
        .map(|(id, _)| *id)
        .collect();

    for id in fallen {
        let position = state.player_spawn_position();
        if let Some(player) = state.players.get_mut(&id) {
            player.respawn(position);
            events.push(GameEvent::player_respawned(state.tick, id, position));
        }
    }

    for index in 0..state.crowd.len() {
        let agent = &state.crowd[index];
        if agent.health > 0.0 && agent.position.is_finite() && agent.velocity.is_finite() {
            continue;
        }
        let position = state.crowd_spawn_position(config.world_half_extent);
        let agent = &mut state.crowd[index];
        agent.respawn(position);
        events.push(GameEvent::crowd_respawned(state.tick, agent.id, position));
    }
}

/// Replay a room from recorded inputs (for verification).
///
/// `player_inputs[id][t]` is offered with sequence `t + 1` before tick
/// `t + 1`. Players join in id order before the first tick.
pub fn replay_room(
    mut state: RoomSimulationState,
    player_inputs: &BTreeMap<PlayerId, Vec<InputFrame>>,
    tick_count: u64,
    config: &RoomConfig,
) -> (RoomSimulationState, Vec<GameEvent>) {
    let mut inputs = InputBuffer::new();
    for id in player_inputs.keys() {
        state.add_player(*id);
        inputs.open(*id);
    }

    let mut all_events = Vec::new();
    for t in 0..tick_count {
        for (id, frames) in player_inputs {
            if let Some(frame) = frames.get(t as usize) {
                inputs.offer(id, t + 1, frame.clone());
            }
        }
        let result = tick(&mut state, &inputs, config);
        all_events.extend(result.events);
    }

    (state, all_events)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::{FIGHT_DURATION, MAX_HEALTH, MAX_STAMINA};
    use crate::game::collision::distance_xz;
    use crate::game::events::GameEventData;
    use crate::game::scene::{ObstacleDescriptor, ObstaclePhysicsConfig, SceneDescriptor, TerrainDescriptor};
    use crate::game::state::CrowdBehavior;
    use proptest::prelude::*;

    fn arena_scene() -> SceneDescriptor {
        SceneDescriptor {
            obstacles: vec![
                ObstacleDescriptor {
                    id: "pillar".into(),
                    position: Vec3::new(6.0, 2.0, 6.0),
                    size: Vec3::new(2.0, 4.0, 2.0),
                },
                ObstacleDescriptor {
                    id: "crate".into(),
                    position: Vec3::new(1.5, 0.5, 0.0),
                    size: Vec3::splat(1.0),
                },
            ],
            physics: [("crate".to_string(), ObstaclePhysicsConfig::dynamic(1.0, 0.3))]
                .into_iter()
                .collect(),
            crowd_enabled: true,
            ground_height: 0.0,
            terrain: Some(TerrainDescriptor { amplitude: 0.3, frequency: 0.2 }),
        }
    }

    fn join(state: &mut RoomSimulationState, inputs: &mut InputBuffer, n: u8) -> Vec<PlayerId> {
        (1..=n)
            .map(|i| {
                let id = PlayerId::new([i; 16]);
                state.add_player(id);
                inputs.open(id);
                id
            })
            .collect()
    }

    /// Deterministic scripted input for a player on a given tick.
    fn scripted(i: usize, t: u64) -> InputFrame {
        let angle = (t as f32 * 0.05) + i as f32;
        InputFrame {
            sprint: t % 40 < 10,
            jump: t % 30 == i as u64,
            attack: t % 7 == 0,
            ..InputFrame::with_movement(angle.cos(), angle.sin())
        }
    }

    fn run(seed: u64, ticks: u64) -> RoomSimulationState {
        let config = RoomConfig { seed, ..RoomConfig::default() };
        let mut state = RoomSimulationState::new(&arena_scene(), &config);
        let mut inputs = InputBuffer::new();
        let ids = join(&mut state, &mut inputs, 3);

        for t in 1..=ticks {
            for (i, id) in ids.iter().enumerate() {
                inputs.offer(id, t, scripted(i, t));
            }
            tick(&mut state, &inputs, &config);
        }
        state
    }

    #[test]
    fn test_tick_advances_and_broadcasts() {
        let config = RoomConfig::default();
        let mut state = RoomSimulationState::new(&arena_scene(), &config);
        let mut inputs = InputBuffer::new();
        let ids = join(&mut state, &mut inputs, 2);

        let result = tick(&mut state, &inputs, &config);
        assert_eq!(result.tick, 1);
        assert_eq!(state.tick, 1);
        assert_eq!(result.broadcast.snapshot.players.len(), 2);
        assert_eq!(result.broadcast.obstacles.obstacles.len(), 2);

        // Joins queued before the tick are reported with it
        let joins = result
            .events
            .iter()
            .filter(|e| matches!(e.data, GameEventData::PlayerJoined { .. }))
            .count();
        assert_eq!(joins, ids.len());
    }

    #[test]
    fn test_determinism_same_seed() {
        let a = run(42, 200);
        let b = run(42, 200);
        assert_eq!(a.compute_hash(), b.compute_hash());

        let c = run(43, 200);
        assert_ne!(a.compute_hash(), c.compute_hash());
    }

    #[test]
    fn test_replay_matches_live_run() {
        let config = RoomConfig { seed: 42, ..RoomConfig::default() };
        let live = run(42, 150);

        let recorded: BTreeMap<PlayerId, Vec<InputFrame>> = (1..=3u8)
            .map(|i| {
                let frames = (1..=150).map(|t| scripted(i as usize - 1, t)).collect();
                (PlayerId::new([i; 16]), frames)
            })
            .collect();
        let initial = RoomSimulationState::new(&arena_scene(), &config);
        let (replayed, events) = replay_room(initial, &recorded, 150, &config);

        assert_eq!(replayed.tick, 150);
        assert_eq!(live.compute_hash(), replayed.compute_hash());
        assert!(!events.is_empty());
    }

    #[test]
    fn test_overlapping_players_separated() {
        let config = RoomConfig::default();
        let mut state = RoomSimulationState::new(&SceneDescriptor::default(), &config);
        let mut inputs = InputBuffer::new();
        let ids = join(&mut state, &mut inputs, 2);

        state.players.get_mut(&ids[0]).unwrap().position = Vec3::new(0.0, 0.0, 0.0);
        state.players.get_mut(&ids[1]).unwrap().position = Vec3::new(0.2, 0.0, 0.1);

        tick(&mut state, &inputs, &config);

        let d = distance_xz(state.players[&ids[0]].position, state.players[&ids[1]].position);
        assert!(d >= 2.0 * PLAYER_RADIUS, "distance {}", d);
    }

    fn wall_scene(crowd_enabled: bool) -> SceneDescriptor {
        SceneDescriptor {
            obstacles: vec![ObstacleDescriptor {
                id: "wall".into(),
                position: Vec3::new(1.5, 2.0, 0.0),
                size: Vec3::new(1.0, 4.0, 6.0),
            }],
            crowd_enabled,
            ..SceneDescriptor::default()
        }
    }

    #[test]
    fn test_separation_cannot_shove_player_onto_wall() {
        let config = RoomConfig::default();
        let scene = wall_scene(false);
        let mut state = RoomSimulationState::new(&scene, &config);
        let mut inputs = InputBuffer::new();
        let ids = join(&mut state, &mut inputs, 2);
        for id in &ids {
            state.players.get_mut(id).unwrap().position = Vec3::new(0.6, 0.0, 0.0);
        }

        for _ in 0..20 {
            tick(&mut state, &inputs, &config);
            for player in state.players.values() {
                assert!(player.position.y < 0.5, "player lifted to y = {}", player.position.y);
                assert!(player.position.x <= 1.0 - PLAYER_RADIUS + 1e-3, "inside wall at {:?}", player.position);
            }
        }
    }

    #[test]
    fn test_crowd_separation_cannot_shove_onto_wall() {
        let config = RoomConfig { crowd_pool_size: 1, ..RoomConfig::default() };
        let mut state = RoomSimulationState::new(&wall_scene(true), &config);
        let mut inputs = InputBuffer::new();
        let ids = join(&mut state, &mut inputs, 1);
        state.players.get_mut(&ids[0]).unwrap().position = Vec3::new(0.5, 0.0, 0.0);
        state.crowd[0].position = Vec3::new(0.7, 0.0, 0.0);
        state.crowd[0].velocity = Vec3::ZERO;

        tick(&mut state, &inputs, &config);

        let agent = &state.crowd[0];
        assert!(agent.position.y < 0.5, "agent lifted to y = {}", agent.position.y);
        assert!(agent.position.x <= 1.0 - CROWD_RADIUS + 1e-3, "agent inside wall at {:?}", agent.position);
        assert!(state.players[&ids[0]].position.y < 0.5);
    }

    #[test]
    fn test_attacked_agent_fights_then_reverts() {
        let config = RoomConfig { crowd_pool_size: 1, fight_chance: 1.0, ..RoomConfig::default() };
        let scene = SceneDescriptor { crowd_enabled: true, ..SceneDescriptor::default() };
        let mut state = RoomSimulationState::new(&scene, &config);
        let mut inputs = InputBuffer::new();
        let ids = join(&mut state, &mut inputs, 1);
        state.players.get_mut(&ids[0]).unwrap().position = Vec3::ZERO;
        state.crowd[0].position = Vec3::new(1.0, 0.0, 0.0);
        state.crowd[0].velocity = Vec3::ZERO;

        inputs.offer(&ids[0], 1, InputFrame { attack: true, ..InputFrame::new() });
        let result = tick(&mut state, &inputs, &config);
        assert!(result
            .events
            .iter()
            .any(|e| matches!(e.data, GameEventData::CrowdHit { .. })));
        assert_eq!(state.crowd[0].behavior, CrowdBehavior::Fight);
        assert_eq!(state.crowd[0].behavior_timer, FIGHT_DURATION);

        // Countdown starts in the next tick's crowd step
        inputs.offer(&ids[0], 2, InputFrame::new());
        let fight_ticks = (FIGHT_DURATION / config.dt).round() as u64;
        for t in 1..fight_ticks {
            tick(&mut state, &inputs, &config);
            assert_eq!(state.crowd[0].behavior, CrowdBehavior::Fight, "reverted early after {} ticks", t);
        }

        let result = tick(&mut state, &inputs, &config);
        assert_eq!(state.crowd[0].behavior, CrowdBehavior::Wander);
        assert!(state.crowd[0].threat.is_none());
        assert!(result.events.iter().any(|e| matches!(
            e.data,
            GameEventData::BehaviorChanged { new_behavior: CrowdBehavior::Wander, .. }
        )));
    }

    #[test]
    fn test_idle_input_retained() {
        let config = RoomConfig::default();
        let mut state = RoomSimulationState::new(&SceneDescriptor::default(), &config);
        let mut inputs = InputBuffer::new();
        let ids = join(&mut state, &mut inputs, 1);

        inputs.offer(&ids[0], 1, InputFrame::with_movement(1.0, 0.0));
        let start = state.players[&ids[0]].position.x;
        for _ in 0..10 {
            tick(&mut state, &inputs, &config);
        }
        // Still moving on the single accepted input
        assert!(state.players[&ids[0]].position.x > start + 2.0);
    }

    #[test]
    fn test_player_respawns_at_zero_health() {
        let config = RoomConfig::default();
        let mut state = RoomSimulationState::new(&SceneDescriptor::default(), &config);
        let mut inputs = InputBuffer::new();
        let ids = join(&mut state, &mut inputs, 1);

        {
            let player = state.players.get_mut(&ids[0]).unwrap();
            player.health = 0.0;
            player.stamina = 3.0;
            player.position = Vec3::new(30.0, 0.0, 30.0);
        }
        let result = tick(&mut state, &inputs, &config);

        let player = &state.players[&ids[0]];
        assert_eq!(player.health, MAX_HEALTH);
        assert_eq!(player.stamina, MAX_STAMINA);
        assert!(player.position.x.abs() <= 3.0 && player.position.z.abs() <= 3.0);
        assert!(result
            .events
            .iter()
            .any(|e| matches!(e.data, GameEventData::PlayerRespawned { .. })));
    }

    #[test]
    fn test_agent_respawns_in_slot() {
        let config = RoomConfig::default();
        let mut state = RoomSimulationState::new(&arena_scene(), &config);
        let inputs = InputBuffer::new();

        state.crowd[3].health = 0.0;
        state.crowd[3].behavior = CrowdBehavior::Flee;
        state.crowd[3].behavior_timer = 2.0;
        tick(&mut state, &inputs, &config);

        let agent = &state.crowd[3];
        assert_eq!(agent.id, 3);
        assert_eq!(agent.health, MAX_HEALTH);
        assert_eq!(agent.behavior, CrowdBehavior::Wander);
        assert_eq!(state.crowd.len(), config.crowd_pool_size);
    }

    #[test]
    fn test_heat_rises_with_attacks() {
        let config = RoomConfig::default();
        let mut state = RoomSimulationState::new(&SceneDescriptor::default(), &config);
        let mut inputs = InputBuffer::new();
        let ids = join(&mut state, &mut inputs, 1);
        inputs.offer(&ids[0], 1, InputFrame { attack: true, ..InputFrame::new() });

        let mut saw_phase_change = false;
        for _ in 0..200 {
            let result = tick(&mut state, &inputs, &config);
            saw_phase_change |= result
                .events
                .iter()
                .any(|e| matches!(e.data, GameEventData::PhaseChanged { .. }));
            assert!((0.0..=1.0).contains(&state.meta.heat));
        }
        assert!(saw_phase_change);
        assert!(state.meta.phase >= 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_players_stay_above_ground(seed in any::<u64>(), ticks in 1u64..120) {
            let config = RoomConfig { seed, ..RoomConfig::default() };
            let mut state = RoomSimulationState::new(&arena_scene(), &config);
            let mut inputs = InputBuffer::new();
            let ids = join(&mut state, &mut inputs, 4);

            for t in 1..=ticks {
                for (i, id) in ids.iter().enumerate() {
                    inputs.offer(id, t, scripted(i + seed as usize % 5, t));
                }
                tick(&mut state, &inputs, &config);
                for player in state.players.values() {
                    let floor = state.ground_height(player.position.x, player.position.z);
                    prop_assert!(player.position.y >= floor);
                }
            }
        }
    }
}
