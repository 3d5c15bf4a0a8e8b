//! Dynamic Obstacle Physics
//!
//! Approximate rigid-body stepping for obstacles whose physics config is
//! enabled, dynamic and not a trigger. Static and kinematic obstacles are
//! only ever collided against.
//!
//! Per tick:
//! 1. Integrate gravity, damping and velocity
//! 2. Ground contact (height sampled without the body itself)
//! 3. A few solver passes: dynamic vs static, then dynamic vs dynamic
//!
//! Player pushes happen earlier, during player movement, via
//! [`apply_player_push`].

use glam::Vec3;

use crate::core::constants::{
    GRAVITY, BOUNCE_THRESHOLD, GROUND_FRICTION_SCALE, CONTACT_SLOP,
    MAX_PUSH_SPEED, PUSH_STRENGTH, PUSH_TANGENT_DAMPING, PUSH_PLAYER_SPEED_CAP,
    PLAYER_RADIUS, PLAYER_HEIGHT,
};
use crate::game::collision::{clamp_horizontal, horizontal, Aabb};
use crate::game::scene::GroundModel;
use crate::game::state::Obstacle;

/// Step every dynamic obstacle by `dt`.
pub fn step_dynamic_obstacles(
    obstacles: &mut [Obstacle],
    ground: &GroundModel,
    solver_iterations: u32,
    dt: f32,
) {
    for index in 0..obstacles.len() {
        if !obstacles[index].is_dynamic() {
            continue;
        }
        integrate(&mut obstacles[index], dt);
        resolve_ground_contact(obstacles, index, ground, dt);
    }

    for _ in 0..solver_iterations {
        solve_static_contacts(obstacles);
        solve_dynamic_pairs(obstacles);
    }
}

fn integrate(obstacle: &mut Obstacle, dt: f32) {
    let physics = &obstacle.physics;
    obstacle.velocity.y += GRAVITY * physics.gravity_scale * dt;

    let damping = (1.0 - physics.linear_damping * dt).max(0.0).min(1.0);
    obstacle.velocity *= damping;

    if !obstacle.velocity.is_finite() {
        obstacle.velocity = Vec3::ZERO;
    }
    obstacle.position += obstacle.velocity * dt;
}

fn resolve_ground_contact(obstacles: &mut [Obstacle], index: usize, ground: &GroundModel, dt: f32) {
    let (x, z) = (obstacles[index].position.x, obstacles[index].position.z);
    let ground_y = ground.sample_excluding(obstacles, x, z, Some(index));

    let obstacle = &mut obstacles[index];
    if obstacle.bottom() > ground_y + CONTACT_SLOP {
        return;
    }

    obstacle.position.y = ground_y + obstacle.size.y * 0.5;
    if obstacle.velocity.y < 0.0 {
        let impact = -obstacle.velocity.y;
        obstacle.velocity.y = if impact < BOUNCE_THRESHOLD {
            0.0
        } else {
            impact * obstacle.physics.restitution
        };
    }

    let friction = (1.0 - obstacle.physics.friction * GROUND_FRICTION_SCALE * dt).max(0.0).min(1.0);
    obstacle.velocity.x *= friction;
    obstacle.velocity.z *= friction;
}

fn solve_static_contacts(obstacles: &mut [Obstacle]) {
    for i in 0..obstacles.len() {
        if !obstacles[i].is_dynamic() {
            continue;
        }
        for j in 0..obstacles.len() {
            if i == j || !obstacles[j].is_solid() || obstacles[j].is_dynamic() {
                continue;
            }
            let static_box = obstacles[j].aabb();
            let body = &mut obstacles[i];
            let Some(pen) = body.aabb().penetration(&static_box) else {
                continue;
            };

            *pen.axis.component_mut(&mut body.position) += pen.sign * pen.depth;

            // Still moving into the static body: reflect
            let restitution = body.physics.restitution;
            let v = pen.axis.component_mut(&mut body.velocity);
            if *v * pen.sign < 0.0 {
                *v = -*v * restitution;
            }
        }
    }
}

fn solve_dynamic_pairs(obstacles: &mut [Obstacle]) {
    for i in 0..obstacles.len() {
        if !obstacles[i].is_dynamic() {
            continue;
        }
        for j in (i + 1)..obstacles.len() {
            if !obstacles[j].is_dynamic() {
                continue;
            }
            let (head, tail) = obstacles.split_at_mut(j);
            resolve_pair(&mut head[i], &mut tail[0]);
        }
    }
}

/// Mass-weighted separation plus a 1-D impulse along the penetration axis.
fn resolve_pair(a: &mut Obstacle, b: &mut Obstacle) {
    let Some(pen) = a.aabb().penetration(&b.aabb()) else {
        return;
    };

    let inv_a = a.inverse_mass();
    let inv_b = b.inverse_mass();
    let inv_total = inv_a + inv_b;

    // Heavier body moves less
    *pen.axis.component_mut(&mut a.position) += pen.sign * pen.depth * (inv_a / inv_total);
    *pen.axis.component_mut(&mut b.position) -= pen.sign * pen.depth * (inv_b / inv_total);

    let va = pen.axis.component(a.velocity);
    let vb = pen.axis.component(b.velocity);
    // Closing speed along the normal that points from b to a
    let normal_speed = (va - vb) * pen.sign;
    if normal_speed >= 0.0 {
        return;
    }

    let restitution = a.physics.restitution.min(b.physics.restitution);
    let impulse = -(1.0 + restitution) * normal_speed / inv_total;
    *pen.axis.component_mut(&mut a.velocity) += impulse * inv_a * pen.sign;
    *pen.axis.component_mut(&mut b.velocity) -= impulse * inv_b * pen.sign;
}

/// Push a dynamic obstacle with a player's proposed position.
///
/// `probe` is the player's feet after the proposed move and before any
/// collision resolution. Returns true if the obstacle was pushed. After
/// a push every velocity component is within `MAX_PUSH_SPEED`.
pub fn apply_player_push(obstacle: &mut Obstacle, probe: Vec3, player_velocity: Vec3) -> bool {
    if !obstacle.is_dynamic() || !probe.is_finite() {
        return false;
    }

    let aabb = obstacle.aabb();
    if probe.y >= aabb.max.y - CONTACT_SLOP || probe.y + PLAYER_HEIGHT <= aabb.min.y {
        return false;
    }
    if !aabb.inflate_xz(PLAYER_RADIUS).contains_xz(probe.x, probe.z) {
        return false;
    }

    let Some((normal, depth)) = contact_normal(&aabb, probe) else {
        return false;
    };

    // Obstacle leaves along -normal
    obstacle.position -= normal * depth;

    let push_dir = -normal;
    let player_v = clamp_horizontal(horizontal(player_velocity), PUSH_PLAYER_SPEED_CAP);
    let along = player_v.dot(push_dir);
    let tangent = player_v - push_dir * along;
    let impulse = (push_dir * along.max(0.0) * PUSH_STRENGTH + tangent * PUSH_TANGENT_DAMPING)
        * obstacle.inverse_mass();

    let pushed = obstacle.velocity + impulse;
    obstacle.velocity = pushed.clamp(Vec3::splat(-MAX_PUSH_SPEED), Vec3::splat(MAX_PUSH_SPEED));
    if !obstacle.velocity.is_finite() {
        obstacle.velocity = Vec3::ZERO;
    }
    true
}

/// Horizontal normal pointing from the box toward the probe, and the
/// depth the player circle overlaps the box along it.
fn contact_normal(aabb: &Aabb, probe: Vec3) -> Option<(Vec3, f32)> {
    let closest_x = probe.x.max(aabb.min.x).min(aabb.max.x);
    let closest_z = probe.z.max(aabb.min.z).min(aabb.max.z);
    let offset = Vec3::new(probe.x - closest_x, 0.0, probe.z - closest_z);
    let dist = offset.length();

    if dist > 1e-6 {
        let depth = PLAYER_RADIUS - dist;
        return (depth > 0.0).then(|| (offset / dist, depth));
    }

    // Probe inside the box: fall back to the nearest face
    let faces = [
        (probe.x - aabb.min.x, Vec3::NEG_X),
        (aabb.max.x - probe.x, Vec3::X),
        (probe.z - aabb.min.z, Vec3::NEG_Z),
        (aabb.max.z - probe.z, Vec3::Z),
    ];
    let (face_dist, normal) = faces
        .into_iter()
        .fold((f32::INFINITY, Vec3::X), |best, face| if face.0 < best.0 { face } else { best });
    Some((normal, face_dist + PLAYER_RADIUS))
}

// =============================================================================
// TESTS
// =============================================================================
