//! Crowd AI
//!
//! Each pooled agent runs a small state machine every tick.
//!
//! ```text
//!             hit, healthy, roll < fight chance
//!   ┌────────┐ ───────────────────────────────► ┌───────┐
//!   │ Wander │                                  │ Fight │ ── seek nearest player, melee
//!   └────────┘ ◄─────── timer elapsed ───────── └───────┘
//!      │  ▲
//!      │  └──────────── timer elapsed ───────── ┌───────┐
//!      └─────────── hit, otherwise ───────────► │ Flee  │ ── run from nearest player
//!                                               └───────┘
//! ```
//!
//! Steering is an acceleration sum: player repulsion plus one behavior
//! term. Wandering agents follow NavGrid paths to random open cells and
//! fall back to a smooth phase-offset heading when they have no path.

use std::collections::BTreeMap;

use glam::Vec3;

use crate::core::constants::{
    CROWD_RADIUS, WAYPOINT_RADIUS, REPATH_DELAY, TIMER_EPSILON,
    REPULSION_RADIUS, REPULSION_WEIGHT, SEEK_WEIGHT, WANDER_WEIGHT, WANDER_FREQUENCY,
    FIGHT_WEIGHT, FLEE_WEIGHT, CROWD_DAMPING,
    WANDER_SPEED, FIGHT_SPEED, FLEE_SPEED, WALK_THRESHOLD,
    CROWD_MELEE_RANGE, CROWD_ATTACK_COOLDOWN, CROWD_ATTACK_DAMAGE, CROWD_KNOCKBACK,
    ATTACK_ANIM_LOCK, HIT_ANIM_LOCK, FIGHT_DURATION, FLEE_DURATION, FIGHT_HEALTH_THRESHOLD,
};
use crate::core::rng::DeterministicRng;
use crate::game::collision::{clamp_horizontal, direction_xz_or, distance_xz, horizontal, resolve_circle_aabb};
use crate::game::events::GameEvent;
use crate::game::nav::NavGrid;
use crate::game::scene::GroundModel;
use crate::game::state::{CrowdAgent, CrowdAnim, CrowdBehavior, Obstacle, PlayerId, PlayerState};

/// Read-only world view for one crowd step.
pub struct CrowdContext<'a> {
    pub nav: &'a NavGrid,
    pub obstacles: &'a [Obstacle],
    pub ground: &'a GroundModel,
    pub world_half_extent: f32,
    /// Room time in seconds
    pub now: f32,
    pub tick: u64,
    pub dt: f32,
}

impl CrowdBehavior {
    /// Speed cap for this behavior.
    #[inline]
    pub fn speed_cap(self) -> f32 {
        match self {
            CrowdBehavior::Wander => WANDER_SPEED,
            CrowdBehavior::Fight => FIGHT_SPEED,
            CrowdBehavior::Flee => FLEE_SPEED,
        }
    }

    /// Countdown a behavior starts with.
    #[inline]
    pub fn duration(self) -> f32 {
        match self {
            CrowdBehavior::Wander => 0.0,
            CrowdBehavior::Fight => FIGHT_DURATION,
            CrowdBehavior::Flee => FLEE_DURATION,
        }
    }
}

impl CrowdAnim {
    /// Wire name of the anim.
    pub fn as_str(self) -> &'static str {
        match self {
            CrowdAnim::Idle => "idle",
            CrowdAnim::Walk => "walk",
            CrowdAnim::Run => "run",
            CrowdAnim::Hit => "hit",
            CrowdAnim::Attack => "attack",
        }
    }
}

/// Step every agent in the pool.
pub fn step_crowd(
    agents: &mut [CrowdAgent],
    players: &mut BTreeMap<PlayerId, PlayerState>,
    rng: &mut DeterministicRng,
    ctx: &CrowdContext<'_>,
    events: &mut Vec<GameEvent>,
) {
    for agent in agents.iter_mut() {
        step_agent(agent, players, rng, ctx, events);
    }
}

fn step_agent(
    agent: &mut CrowdAgent,
    players: &mut BTreeMap<PlayerId, PlayerState>,
    rng: &mut DeterministicRng,
    ctx: &CrowdContext<'_>,
    events: &mut Vec<GameEvent>,
) {
    update_timers(agent, ctx, events);
    update_path(agent, rng, ctx);

    let mut accel = repulsion(agent.position, players);
    let nearest = nearest_player(agent.position, players);

    match (agent.behavior, nearest) {
        (CrowdBehavior::Fight, Some((target_id, target_pos, dist))) => {
            let dir = direction_xz_or(target_pos - agent.position, Vec3::X);
            accel += dir * FIGHT_WEIGHT;
            if dist <= CROWD_MELEE_RANGE {
                try_attack(agent, target_id, dir, players, ctx, events);
            }
        }
        (CrowdBehavior::Flee, Some((_, threat_pos, _))) => {
            let dir = direction_xz_or(agent.position - threat_pos, Vec3::X);
            accel += dir * FLEE_WEIGHT;
        }
        _ => accel += wander_steering(agent, ctx.now),
    }

    integrate(agent, accel, ctx);
    update_anim(agent);
}

fn update_timers(agent: &mut CrowdAgent, ctx: &CrowdContext<'_>, events: &mut Vec<GameEvent>) {
    agent.state_time += ctx.dt;
    if agent.state_timer > 0.0 {
        agent.state_timer -= ctx.dt;
        if agent.state_timer <= TIMER_EPSILON {
            agent.state_timer = 0.0;
        }
    }

    if agent.behavior != CrowdBehavior::Wander {
        agent.behavior_timer -= ctx.dt;
        if agent.behavior_timer <= TIMER_EPSILON {
            let old = agent.behavior;
            agent.behavior = CrowdBehavior::Wander;
            agent.behavior_timer = 0.0;
            agent.threat = None;
            events.push(GameEvent::behavior_changed(ctx.tick, agent.id, old, CrowdBehavior::Wander));
        }
    }
}

fn update_path(agent: &mut CrowdAgent, rng: &mut DeterministicRng, ctx: &CrowdContext<'_>) {
    while let Some(waypoint) = agent.current_waypoint() {
        if distance_xz(agent.position, waypoint) > WAYPOINT_RADIUS {
            break;
        }
        agent.path_index += 1;
    }

    if agent.has_path() {
        return;
    }

    if agent.repath_timer > 0.0 {
        agent.repath_timer = (agent.repath_timer - ctx.dt).max(0.0);
        return;
    }

    let found = ctx.nav.random_open(rng).and_then(|target| {
        ctx.nav
            .find_path(agent.position.x, agent.position.z, target.x, target.z)
            .map(|path| (target, path))
    });

    match found {
        Some((target, path)) => {
            agent.target = Some(target);
            agent.path = path;
            agent.path_index = 0;
        }
        None => {
            agent.target = None;
            agent.path.clear();
            agent.path_index = 0;
            agent.repath_timer = REPATH_DELAY;
        }
    }
}

/// Repulsion from every player within range, falling off linearly.
fn repulsion(position: Vec3, players: &BTreeMap<PlayerId, PlayerState>) -> Vec3 {
    let mut accel = Vec3::ZERO;
    for player in players.values() {
        let away = horizontal(position - player.position);
        let dist = away.length();
        if dist > 1e-6 && dist < REPULSION_RADIUS {
            accel += away / dist * (REPULSION_WEIGHT * (1.0 - dist / REPULSION_RADIUS));
        }
    }
    accel
}

/// Nearest player by horizontal distance; ties go to the lower id.
fn nearest_player(
    position: Vec3,
    players: &BTreeMap<PlayerId, PlayerState>,
) -> Option<(PlayerId, Vec3, f32)> {
    let mut nearest: Option<(PlayerId, Vec3, f32)> = None;
    for (id, player) in players {
        let dist = distance_xz(position, player.position);
        if !dist.is_finite() {
            continue;
        }
        if nearest.map_or(true, |(_, _, best)| dist < best) {
            nearest = Some((*id, player.position, dist));
        }
    }
    nearest
}

fn try_attack(
    agent: &mut CrowdAgent,
    target_id: PlayerId,
    dir: Vec3,
    players: &mut BTreeMap<PlayerId, PlayerState>,
    ctx: &CrowdContext<'_>,
    events: &mut Vec<GameEvent>,
) {
    let ready = agent
        .last_attack_at
        .map_or(true, |last| ctx.now - last >= CROWD_ATTACK_COOLDOWN - TIMER_EPSILON);
    if !ready {
        return;
    }
    let Some(victim) = players.get_mut(&target_id) else {
        return;
    };

    victim.take_damage(CROWD_ATTACK_DAMAGE);
    victim.knockback += dir * CROWD_KNOCKBACK;
    agent.last_attack_at = Some(ctx.now);
    agent.lock_anim(CrowdAnim::Attack, ATTACK_ANIM_LOCK);

    events.push(GameEvent::crowd_attack(
        ctx.tick,
        agent.id,
        target_id,
        CROWD_ATTACK_DAMAGE,
        victim.health,
    ));
}

fn wander_steering(agent: &CrowdAgent, now: f32) -> Vec3 {
    match agent.current_waypoint() {
        Some(waypoint) => direction_xz_or(waypoint - agent.position, Vec3::ZERO) * SEEK_WEIGHT,
        None => {
            let heading = agent.wander_phase + now * WANDER_FREQUENCY;
            Vec3::new(heading.cos(), 0.0, heading.sin()) * WANDER_WEIGHT
        }
    }
}

fn integrate(agent: &mut CrowdAgent, accel: Vec3, ctx: &CrowdContext<'_>) {
    let mut velocity = horizontal(agent.velocity + accel * ctx.dt) * CROWD_DAMPING;
    velocity = clamp_horizontal(velocity, agent.behavior.speed_cap());
    if !velocity.is_finite() {
        velocity = Vec3::ZERO;
    }
    agent.velocity = velocity;

    let bound = (ctx.world_half_extent - CROWD_RADIUS).max(0.0);
    let mut position = agent.position + velocity * ctx.dt;
    position.x = position.x.max(-bound).min(bound);
    position.z = position.z.max(-bound).min(bound);

    position = resolve_static_contacts(position, ctx.obstacles);

    if position.is_finite() {
        position.y = ctx.ground.sample(ctx.obstacles, position.x, position.z);
        agent.position = position;
    }
}

/// Resolve an agent footprint against the static geometry it navigates around.
pub fn resolve_static_contacts(mut position: Vec3, obstacles: &[Obstacle]) -> Vec3 {
    for obstacle in obstacles.iter().filter(|o| o.blocks_navigation()) {
        if let Some(push) = resolve_circle_aabb(position, CROWD_RADIUS, &obstacle.aabb()) {
            position += push;
        }
    }
    position
}

fn update_anim(agent: &mut CrowdAgent) {
    if agent.anim_locked() {
        return;
    }
    let anim = match agent.behavior {
        CrowdBehavior::Fight | CrowdBehavior::Flee => CrowdAnim::Run,
        CrowdBehavior::Wander if horizontal(agent.velocity).length() > WALK_THRESHOLD => CrowdAnim::Walk,
        CrowdBehavior::Wander => CrowdAnim::Idle,
    };
    agent.set_anim(anim);
}

/// React to a player's hit: lock the hit anim, remember the attacker and
/// roll between fighting back and fleeing.
///
/// Only agents above the health threshold may fight. Returns the new
/// behavior; the timer restarts even if the behavior is unchanged.
pub fn react_to_hit(
    agent: &mut CrowdAgent,
    attacker: PlayerId,
    rng: &mut DeterministicRng,
    fight_chance: f32,
) -> CrowdBehavior {
    agent.lock_anim(CrowdAnim::Hit, HIT_ANIM_LOCK);
    agent.threat = Some(attacker);

    let fights = rng.chance(fight_chance) && agent.health > FIGHT_HEALTH_THRESHOLD;
    let behavior = if fights { CrowdBehavior::Fight } else { CrowdBehavior::Flee };
    agent.behavior = behavior;
    agent.behavior_timer = behavior.duration();
    behavior
}

// =============================================================================
// TESTS
// =============================================================================
