//! Player Movement
//!
//! Per-player integration for one fixed step:
//!
//! ```text
//!   input ──► target velocity ──► proposed XZ move ──► obstacle push / resolve
//!                                                            │
//!   stamina ◄── gravity + ground clamp ◄── jump ◄── grounded / coyote
//! ```
//!
//! Walking snaps velocity straight to the target with no inertia.
//! Sprint and crouch switch to "slide" mode, which eases toward the
//! target and coasts with friction when the stick is released.

use glam::Vec3;

use crate::core::constants::{
    BASE_MOVE_SPEED, SPRINT_MULTIPLIER, CROUCH_MULTIPLIER,
    SLIDE_ACCEL, SLIDE_FRICTION, FACING_DEADZONE,
    GROUND_EPSILON, ASCENDING_THRESHOLD, COYOTE_TIME, JUMP_SPEED, GRAVITY,
    KNOCKBACK_DECAY, KNOCKBACK_EPSILON,
    PLAYER_RADIUS, PLAYER_HEIGHT,
    STAMINA_DRAIN, SPRINT_STAMINA_DRAIN, MAX_STAMINA,
};
use crate::game::collision::{horizontal, resolve_circle_aabb};
use crate::game::input::InputFrame;
use crate::game::obstacles::apply_player_push;
use crate::game::scene::GroundModel;
use crate::game::state::{Obstacle, PlayerState};

/// Advance one player by `dt`.
///
/// Dynamic obstacles the player walks into are pushed, so the obstacle
/// list is mutable.
pub fn simulate_player(
    player: &mut PlayerState,
    input: &InputFrame,
    obstacles: &mut [Obstacle],
    ground: &GroundModel,
    dt: f32,
) {
    player.look_yaw = input.look_yaw;
    player.look_pitch = input.look_pitch;
    player.anim_state.clone_from(&input.anim_state);
    player.anim_time = input.anim_time;
    player.ragdoll = input.ragdoll;

    if input.ragdoll {
        player.velocity = Vec3::ZERO;
        player.knockback = Vec3::ZERO;
        decay_stamina(player, false, dt);
        return;
    }

    update_horizontal_velocity(player, input, dt);

    let speed = horizontal(player.velocity).length();
    if speed > FACING_DEADZONE {
        player.yaw = player.velocity.x.atan2(player.velocity.z);
    }

    // Knockback rides on top of the movement velocity
    let step = (horizontal(player.velocity) + player.knockback) * dt;
    player.knockback *= KNOCKBACK_DECAY;
    if player.knockback.length() < KNOCKBACK_EPSILON {
        player.knockback = Vec3::ZERO;
    }

    let probe = player.position + step;
    let resolved = resolve_move(player, probe, obstacles);
    player.position.x = resolved.x;
    player.position.z = resolved.z;

    update_vertical(player, input, obstacles, ground, dt);
    decay_stamina(player, input.sprint, dt);
}

fn update_horizontal_velocity(player: &mut PlayerState, input: &InputFrame, dt: f32) {
    let multiplier = if input.sprint {
        SPRINT_MULTIPLIER
    } else if input.crouch {
        CROUCH_MULTIPLIER
    } else {
        1.0
    };
    let target = Vec3::new(input.move_x, 0.0, input.move_z) * (BASE_MOVE_SPEED * multiplier);

    if input.sprint || input.crouch {
        if input.is_idle_stick() {
            player.velocity.x *= SLIDE_FRICTION;
            player.velocity.z *= SLIDE_FRICTION;
        } else {
            let blend = (SLIDE_ACCEL * dt).min(1.0);
            player.velocity.x += (target.x - player.velocity.x) * blend;
            player.velocity.z += (target.z - player.velocity.z) * blend;
        }
    } else {
        player.velocity.x = target.x;
        player.velocity.z = target.z;
    }
}

/// Resolve a proposed position against every obstacle in list order.
///
/// Dynamic obstacles are pushed first, probed with the unresolved
/// position so that resolution against earlier obstacles cannot hide
/// the contact.
fn resolve_move(player: &PlayerState, probe: Vec3, obstacles: &mut [Obstacle]) -> Vec3 {
    let mut proposed = probe;
    let feet = player.position.y;

    for obstacle in obstacles.iter_mut() {
        if !obstacle.is_solid() {
            continue;
        }
        if obstacle.is_dynamic() {
            apply_player_push(obstacle, probe, player.velocity);
        }

        let aabb = obstacle.aabb();
        if !aabb.overlaps_vertical(feet, feet + PLAYER_HEIGHT) {
            continue;
        }
        if let Some(push) = resolve_circle_aabb(proposed, PLAYER_RADIUS, &aabb) {
            proposed += push;
        }
    }

    proposed
}

fn update_vertical(
    player: &mut PlayerState,
    input: &InputFrame,
    obstacles: &[Obstacle],
    ground: &GroundModel,
    dt: f32,
) {
    let ground_y = ground.sample(obstacles, player.position.x, player.position.z);
    let was_grounded = player.grounded;
    let grounded = player.position.y - ground_y <= GROUND_EPSILON
        && player.velocity.y <= ASCENDING_THRESHOLD;

    if grounded {
        player.coyote_timer = 0.0;
    } else if was_grounded {
        player.coyote_timer = COYOTE_TIME;
    } else {
        player.coyote_timer = (player.coyote_timer - dt).max(0.0);
    }
    player.grounded = grounded;

    if input.jump && (grounded || player.coyote_timer > 0.0) {
        player.velocity.y = JUMP_SPEED;
        player.coyote_timer = 0.0;
        // Taking off must not open a second coyote window
        player.grounded = false;
    }

    player.velocity.y += GRAVITY * dt;
    player.position.y += player.velocity.y * dt;

    if player.position.y <= ground_y {
        player.position.y = ground_y;
        if player.velocity.y < 0.0 {
            player.velocity.y = 0.0;
        }
    }
}

fn decay_stamina(player: &mut PlayerState, sprinting: bool, dt: f32) {
    let drain = if sprinting { SPRINT_STAMINA_DRAIN } else { STAMINA_DRAIN };
    player.stamina = (player.stamina - drain * dt).max(0.0).min(MAX_STAMINA);
}

/// Move a player back out of any solid obstacle it was shoved into.
///
/// Separation passes move players sideways after `resolve_move`; this
/// keeps them from ending inside a footprint, where the ground snap
/// would lift them onto the obstacle's top.
pub fn push_out_of_obstacles(player: &mut PlayerState, obstacles: &[Obstacle]) {
    let feet = player.position.y;
    for obstacle in obstacles.iter().filter(|o| o.is_solid()) {
        let aabb = obstacle.aabb();
        if !aabb.overlaps_vertical(feet, feet + PLAYER_HEIGHT) {
            continue;
        }
        if let Some(push) = resolve_circle_aabb(player.position, PLAYER_RADIUS, &aabb) {
            player.position += push;
        }
    }
}

/// Lift a player back onto the ground if something moved under them.
///
/// Run after every position change in the tick so that
/// `position.y >= ground` holds when the tick ends.
pub fn snap_to_ground(player: &mut PlayerState, obstacles: &[Obstacle], ground: &GroundModel) {
    if !player.position.is_finite() {
        return;
    }
    let ground_y = ground.sample(obstacles, player.position.x, player.position.z);
    if player.position.y < ground_y {
        player.position.y = ground_y;
        if player.velocity.y < 0.0 {
            player.velocity.y = 0.0;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::{MAX_PUSH_SPEED, TICK_DT};
    use crate::game::scene::{ObstaclePhysicsConfig, TerrainDescriptor};
    use crate::game::state::PlayerId;
    use proptest::prelude::*;

    fn player_at(x: f32, y: f32, z: f32) -> PlayerState {
        PlayerState::new(PlayerId::new([1; 16]), Vec3::new(x, y, z))
    }

    fn static_box(id: &str, center: Vec3, size: Vec3) -> Obstacle {
        Obstacle::new(id, center, size, ObstaclePhysicsConfig::default())
    }

    #[test]
    fn test_walk_snaps_to_target() {
        let mut player = player_at(0.0, 0.0, 0.0);
        let input = InputFrame::with_movement(1.0, 0.0);

        simulate_player(&mut player, &input, &mut [], &GroundModel::default(), TICK_DT);

        assert_eq!(player.velocity.x, BASE_MOVE_SPEED);
        assert!((player.position.x - BASE_MOVE_SPEED * TICK_DT).abs() < 1e-5);
        // Facing +X
        assert!((player.yaw - std::f32::consts::FRAC_PI_2).abs() < 1e-5);

        // Release: instant stop, yaw kept
        simulate_player(&mut player, &InputFrame::new(), &mut [], &GroundModel::default(), TICK_DT);
        assert_eq!(player.velocity.x, 0.0);
        assert!((player.yaw - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn test_sprint_eases_and_coasts() {
        let mut player = player_at(0.0, 0.0, 0.0);
        let sprint = InputFrame { sprint: true, ..InputFrame::with_movement(0.0, 1.0) };

        simulate_player(&mut player, &sprint, &mut [], &GroundModel::default(), TICK_DT);
        let target = BASE_MOVE_SPEED * SPRINT_MULTIPLIER;
        let expected = target * (SLIDE_ACCEL * TICK_DT);
        assert!((player.velocity.z - expected).abs() < 1e-4);

        for _ in 0..100 {
            simulate_player(&mut player, &sprint, &mut [], &GroundModel::default(), TICK_DT);
        }
        assert!((player.velocity.z - target).abs() < 1e-2);

        // Stick released while sprinting: friction, not a stop
        let coast = InputFrame { sprint: true, ..InputFrame::new() };
        let before = player.velocity.z;
        simulate_player(&mut player, &coast, &mut [], &GroundModel::default(), TICK_DT);
        assert!((player.velocity.z - before * SLIDE_FRICTION).abs() < 1e-4);
    }

    #[test]
    fn test_sprint_beats_crouch() {
        let mut player = player_at(0.0, 0.0, 0.0);
        let both = InputFrame { sprint: true, crouch: true, ..InputFrame::with_movement(1.0, 0.0) };
        for _ in 0..200 {
            simulate_player(&mut player, &both, &mut [], &GroundModel::default(), TICK_DT);
        }
        assert!((player.velocity.x - BASE_MOVE_SPEED * SPRINT_MULTIPLIER).abs() < 1e-2);
    }

    #[test]
    fn test_ragdoll_freezes() {
        let mut player = player_at(0.0, 0.0, 0.0);
        player.velocity = Vec3::new(3.0, 2.0, 1.0);
        let input = InputFrame { ragdoll: true, ..InputFrame::with_movement(1.0, 0.0) };

        simulate_player(&mut player, &input, &mut [], &GroundModel::default(), TICK_DT);

        assert_eq!(player.velocity, Vec3::ZERO);
        assert_eq!(player.position, Vec3::ZERO);
        assert!(player.ragdoll);
    }

    #[test]
    fn test_wall_blocks_movement() {
        let mut player = player_at(0.0, 0.0, 0.0);
        let mut obstacles = vec![static_box("wall", Vec3::new(1.0, 1.0, 0.0), Vec3::new(0.5, 2.0, 4.0))];
        let input = InputFrame::with_movement(1.0, 0.0);

        for _ in 0..40 {
            simulate_player(&mut player, &input, &mut obstacles, &GroundModel::default(), TICK_DT);
        }

        // Wall face at x = 0.75
        assert!(player.position.x <= 0.75 - PLAYER_RADIUS + 1e-4);
    }

    #[test]
    fn test_walking_into_crate_pushes_it() {
        let mut player = player_at(0.0, 0.0, 0.0);
        let mut obstacles = vec![Obstacle::new(
            "crate",
            Vec3::new(1.0, 0.5, 0.0),
            Vec3::splat(1.0),
            ObstaclePhysicsConfig::dynamic(0.2, 0.3),
        )];
        let input = InputFrame { sprint: true, ..InputFrame::with_movement(1.0, 0.0) };

        for _ in 0..10 {
            simulate_player(&mut player, &input, &mut obstacles, &GroundModel::default(), TICK_DT);
        }

        let crate_box = &obstacles[0];
        assert!(crate_box.position.x > 1.0, "crate not moved: {:?}", crate_box.position);
        assert!(crate_box.velocity.x > 0.0);
        for v in crate_box.velocity.to_array() {
            assert!(v.abs() <= MAX_PUSH_SPEED, "push velocity {:?}", crate_box.velocity);
        }
        // Held at the crate's new face
        let face = crate_box.aabb().min.x;
        assert!(player.position.x <= face - PLAYER_RADIUS + 1e-4);
        assert!(player.position.x > 0.0);
    }

    #[test]
    fn test_push_out_of_obstacles() {
        let wall = static_box("wall", Vec3::new(1.5, 2.0, 0.0), Vec3::new(1.0, 4.0, 6.0));
        let mut player = player_at(1.0005, 0.0, 0.0);

        push_out_of_obstacles(&mut player, &[wall.clone()]);
        assert!((player.position.x - (1.0 - PLAYER_RADIUS)).abs() < 1e-3);

        // Standing on top: no horizontal correction
        let mut on_top = player_at(1.5, 4.0, 0.0);
        push_out_of_obstacles(&mut on_top, &[wall]);
        assert_eq!(on_top.position, Vec3::new(1.5, 4.0, 0.0));
    }

    #[test]
    fn test_jump_and_land() {
        let mut player = player_at(0.0, 0.0, 0.0);
        let jump = InputFrame { jump: true, ..InputFrame::new() };

        simulate_player(&mut player, &jump, &mut [], &GroundModel::default(), TICK_DT);
        assert!(player.position.y > 0.0);
        assert!(!player.grounded);

        let mut max_y = player.position.y;
        for _ in 0..60 {
            simulate_player(&mut player, &InputFrame::new(), &mut [], &GroundModel::default(), TICK_DT);
            max_y = max_y.max(player.position.y);
        }
        assert!(max_y > 0.5);
        assert_eq!(player.position.y, 0.0);
        assert_eq!(player.velocity.y, 0.0);
        assert!(player.grounded);
    }

    #[test]
    fn test_no_double_jump() {
        let mut player = player_at(0.0, 0.0, 0.0);
        let jump = InputFrame { jump: true, ..InputFrame::new() };

        simulate_player(&mut player, &jump, &mut [], &GroundModel::default(), TICK_DT);
        let first_vy = player.velocity.y;
        simulate_player(&mut player, &jump, &mut [], &GroundModel::default(), TICK_DT);
        // Second press mid-air only gets gravity
        assert!(player.velocity.y < first_vy);
        assert_eq!(player.coyote_timer, 0.0);
    }

    #[test]
    fn test_coyote_jump_after_walking_off_ledge() {
        let ledge = static_box("ledge", Vec3::new(0.0, 0.5, 0.0), Vec3::new(2.0, 1.0, 2.0));
        let mut obstacles = vec![ledge];
        let ground = GroundModel::default();

        let mut player = player_at(0.9, 1.0, 0.0);
        player.grounded = true;

        // One step off the edge
        let walk = InputFrame::with_movement(1.0, 0.0);
        simulate_player(&mut player, &walk, &mut obstacles, &ground, TICK_DT);
        assert!(player.position.x > 1.0);
        assert!(!player.grounded);
        assert!(player.coyote_timer > 0.0);

        let jump = InputFrame { jump: true, ..InputFrame::new() };
        simulate_player(&mut player, &jump, &mut obstacles, &ground, TICK_DT);
        assert!(player.velocity.y > 0.0);
    }

    #[test]
    fn test_stamina_decay() {
        let mut player = player_at(0.0, 0.0, 0.0);
        simulate_player(&mut player, &InputFrame::new(), &mut [], &GroundModel::default(), TICK_DT);
        assert!((player.stamina - (MAX_STAMINA - STAMINA_DRAIN * TICK_DT)).abs() < 1e-4);

        let sprint = InputFrame { sprint: true, ..InputFrame::new() };
        for _ in 0..10_000 {
            simulate_player(&mut player, &sprint, &mut [], &GroundModel::default(), TICK_DT);
        }
        assert_eq!(player.stamina, 0.0);
    }

    #[test]
    fn test_knockback_decays() {
        let mut player = player_at(0.0, 0.0, 0.0);
        player.knockback = Vec3::new(4.0, 0.0, 0.0);

        simulate_player(&mut player, &InputFrame::new(), &mut [], &GroundModel::default(), TICK_DT);
        assert!(player.position.x > 0.0);

        for _ in 0..100 {
            simulate_player(&mut player, &InputFrame::new(), &mut [], &GroundModel::default(), TICK_DT);
        }
        assert_eq!(player.knockback, Vec3::ZERO);
    }

    #[test]
    fn test_snap_to_ground_lifts_player() {
        let mut player = player_at(0.0, 0.0, 0.0);
        player.velocity.y = -3.0;
        let obstacles = vec![static_box("step", Vec3::new(0.0, 0.25, 0.0), Vec3::new(2.0, 0.5, 2.0))];

        snap_to_ground(&mut player, &obstacles, &GroundModel::default());
        assert_eq!(player.position.y, 0.5);
        assert_eq!(player.velocity.y, 0.0);
    }

    proptest! {
        #[test]
        fn prop_player_never_below_ground(
            moves in proptest::collection::vec((-1.0f32..1.0, -1.0f32..1.0, any::<bool>(), any::<bool>()), 1..80),
        ) {
            let ground = GroundModel {
                base_height: 0.5,
                terrain: Some(TerrainDescriptor { amplitude: 1.0, frequency: 0.3 }),
            };
            let mut obstacles = vec![
                static_box("block", Vec3::new(2.0, 1.0, 0.0), Vec3::new(1.5, 1.0, 1.5)),
            ];
            let mut player = player_at(0.0, ground.terrain_height(0.0, 0.0), 0.0);

            for (x, z, jump, sprint) in moves {
                let input = InputFrame { jump, sprint, ..InputFrame::with_movement(x, z) };
                simulate_player(&mut player, &input, &mut obstacles, &ground, TICK_DT);
                let floor = ground.sample(&obstacles, player.position.x, player.position.z);
                prop_assert!(player.position.y >= floor);
            }
        }
    }
}
