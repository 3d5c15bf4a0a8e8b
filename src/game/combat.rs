//! Combat Resolution
//!
//! Player melee against other players and crowd agents, plus the room's
//! heat/phase meta state. Crowd attacks on players are resolved by the
//! crowd step, not here.

use std::collections::BTreeMap;

use glam::Vec3;

use crate::core::constants::{
    ATTACK_COOLDOWN, MELEE_RANGE, ATTACK_DAMAGE, KNOCKBACK_IMPULSE,
    HEAT_PER_ATTACK, HEAT_DECAY, PHASE_1_HEAT, PHASE_2_HEAT, TIMER_EPSILON,
};
use crate::core::rng::DeterministicRng;
use crate::game::collision::{direction_xz_or, horizontal};
use crate::game::crowd::react_to_hit;
use crate::game::events::GameEvent;
use crate::game::input::InputBuffer;
use crate::game::state::{CrowdAgent, PlayerId, PlayerState, RoomMetaState};

/// Phase for a heat value: 0 below 0.4, 1 below 0.7, else 2.
#[inline]
pub fn phase_for_heat(heat: f32) -> u8 {
    if !(heat >= PHASE_1_HEAT) {
        0
    } else if heat < PHASE_2_HEAT {
        1
    } else {
        2
    }
}

/// Per-tick combat parameters.
#[derive(Clone, Copy, Debug)]
pub struct CombatParams {
    /// Probability a healthy agent fights back when hit
    pub fight_chance: f32,
    pub tick: u64,
    pub dt: f32,
}

/// Resolve this tick's player attacks.
///
/// Attackers are processed in player id order. Positions are read as they
/// stand after movement; a player knocked to 0 health this tick can still
/// be hit but cannot attack.
pub fn resolve_attacks(
    players: &mut BTreeMap<PlayerId, PlayerState>,
    agents: &mut [CrowdAgent],
    inputs: &InputBuffer,
    meta: &mut RoomMetaState,
    rng: &mut DeterministicRng,
    params: &CombatParams,
    events: &mut Vec<GameEvent>,
) {
    let CombatParams { fight_chance, tick, dt } = *params;

    for player in players.values_mut() {
        player.attack_cooldown = (player.attack_cooldown - dt).max(0.0);
        if player.attack_cooldown <= TIMER_EPSILON {
            player.attack_cooldown = 0.0;
        }
    }

    let attacker_ids: Vec<PlayerId> = players
        .iter()
        .filter(|(id, p)| {
            p.attack_cooldown <= 0.0
                && !p.ragdoll
                && inputs.latest(id).is_some_and(|input| input.attack)
        })
        .map(|(id, _)| *id)
        .collect();

    for attacker_id in attacker_ids {
        let Some(attacker) = players.get_mut(&attacker_id) else {
            continue;
        };
        if attacker.health <= 0.0 {
            continue;
        }
        attacker.attack_cooldown = ATTACK_COOLDOWN;
        let origin = attacker.position;
        let facing = Vec3::new(attacker.yaw.sin(), 0.0, attacker.yaw.cos());

        meta.heat = (meta.heat + HEAT_PER_ATTACK).max(0.0).min(1.0);

        for (victim_id, victim) in players.iter_mut() {
            if *victim_id == attacker_id || !in_reach(origin, victim.position) {
                continue;
            }
            let dir = direction_xz_or(victim.position - origin, facing);
            victim.take_damage(ATTACK_DAMAGE);
            victim.knockback += dir * KNOCKBACK_IMPULSE;
            events.push(GameEvent::player_hit(tick, attacker_id, *victim_id, ATTACK_DAMAGE, victim.health));
        }

        for agent in agents.iter_mut() {
            if !in_reach(origin, agent.position) {
                continue;
            }
            let dir = direction_xz_or(agent.position - origin, facing);
            agent.take_damage(ATTACK_DAMAGE);
            agent.velocity += dir * KNOCKBACK_IMPULSE;
            events.push(GameEvent::crowd_hit(tick, attacker_id, agent.id, ATTACK_DAMAGE, agent.health));

            let old = agent.behavior;
            let new = react_to_hit(agent, attacker_id, rng, fight_chance);
            if new != old {
                events.push(GameEvent::behavior_changed(tick, agent.id, old, new));
            }
        }
    }
}

#[inline]
fn in_reach(origin: Vec3, target: Vec3) -> bool {
    let d = target - origin;
    // Vertical reach matches horizontal
    horizontal(d).length() <= MELEE_RANGE && d.y.abs() <= MELEE_RANGE
}

/// Decay heat and recompute phase. Returns (old, new) if the phase changed.
pub fn update_meta(meta: &mut RoomMetaState, dt: f32) -> Option<(u8, u8)> {
    let heat = meta.heat - HEAT_DECAY * dt;
    meta.heat = if heat.is_finite() { heat.max(0.0).min(1.0) } else { 0.0 };

    let old = meta.phase;
    meta.phase = phase_for_heat(meta.heat);
    (old != meta.phase).then_some((old, meta.phase))
}

// =============================================================================
// TESTS
// =============================================================================
