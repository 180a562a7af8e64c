//! Combat resolution: damage, missiles, death and retaliation.
//!
//! Orders decide *when* a unit fires; a [`CombatResolver`] decides what the
//! shot does. [`StandardCombat`] applies melee hits instantly and launches
//! missiles with a fixed-point travel time for ranged types.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::animation::AnimState;
use crate::map::LayerId;
use crate::math::{rect_distance, Fixed, TilePos, TileSize};
use crate::orders::{self, AttackOrder, DieOrder, Order, OrderContext};
use crate::player::PlayerKind;
use crate::rng::SyncRng;
use crate::simulation::TickEvents;
use crate::spatial;
use crate::unit::{Unit, UnitId, VariableId};
use crate::unit_type::{UnitTypeFlags, UnitTypeId};
use crate::world::World;

/// Mutable state a shot may touch.
pub struct CombatEnv<'a> {
    /// Everything except the acting unit.
    pub world: &'a mut World,
    /// Synchronized random stream.
    pub rng: &'a mut SyncRng,
    /// Missiles in flight.
    pub missiles: &'a mut Vec<Missile>,
    /// Events of the current tick.
    pub events: &'a mut TickEvents,
}

/// Snapshot of the unit that dealt damage.
///
/// The shooter may be out of storage while it acts, so retaliation works
/// from this copy rather than looking the unit up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttackerInfo {
    /// Shooter.
    pub id: UnitId,
    /// Shooter's owner.
    pub player: crate::player::PlayerId,
    /// Shooter's type.
    pub type_id: UnitTypeId,
    /// Shooter's position when firing.
    pub tile_pos: TilePos,
    /// Shooter's footprint.
    pub size: TileSize,
    /// Shooter's layer.
    pub layer: LayerId,
}

impl AttackerInfo {
    /// Snapshot `unit`.
    #[must_use]
    pub fn of(unit: &Unit) -> Self {
        Self {
            id: unit.id,
            player: unit.player,
            type_id: unit.type_id,
            tile_pos: unit.tile_pos,
            size: unit.size,
            layer: unit.layer,
        }
    }
}

/// What a shot is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FireTarget {
    /// A unit; missiles follow it.
    Unit(UnitId),
    /// A fixed tile.
    Tile {
        /// Tile.
        pos: TilePos,
        /// Layer.
        layer: LayerId,
    },
}

/// A projectile in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Missile {
    /// Shooter.
    pub source: AttackerInfo,
    /// Aim.
    pub target: FireTarget,
    /// Impact tile, updated while following a unit.
    pub dest: TilePos,
    /// Impact layer.
    pub layer: LayerId,
    /// Shooter's basic damage at launch.
    pub basic_damage: i32,
    /// Shooter's piercing damage at launch.
    pub piercing_damage: i32,
    /// Splash radius for ground impacts.
    pub splash: i32,
    /// Ticks until impact.
    pub ticks_left: u32,
    /// Damage kind dealt.
    pub damage_kind: Option<String>,
}

/// Damage dealt during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageEvent {
    /// Source, if any.
    pub attacker: Option<UnitId>,
    /// Victim.
    pub target: UnitId,
    /// Hit points removed.
    pub damage: i32,
    /// The hit was lethal.
    pub killed: bool,
}

/// Applies the effect of a unit's attack.
pub trait CombatResolver: Debug {
    /// `unit` reached the action point of its attack against `target`.
    fn fire_effect(&mut self, unit: &Unit, target: FireTarget, env: &mut CombatEnv<'_>);

    /// Advance missiles in flight by one tick.
    fn update(&mut self, env: &mut CombatEnv<'_>);
}

/// Damage from stats, reduced by a synchronized random amount of up to half.
#[must_use]
pub fn calculate_damage(basic: i32, piercing: i32, armor: i32, rng: &mut SyncRng) -> i32 {
    let damage = (basic - armor).max(1) + piercing.max(0);
    let reduction = rng.range(((damage + 2) / 2) as u32) as i32;
    (damage - reduction).max(0)
}

/// Melee hits instantly, ranged types launch missiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCombat;

impl CombatResolver for StandardCombat {
    fn fire_effect(&mut self, unit: &Unit, target: FireTarget, env: &mut CombatEnv<'_>) {
        let Some(ty) = env.world.types.get(unit.type_id) else {
            return;
        };
        let missile = ty.missile.clone();
        let damage_kind = ty.damage_kind.clone();
        let (dest, dest_size, layer) = match target {
            FireTarget::Unit(id) => match env.world.units.get(id) {
                Some(goal) if goal.is_alive_on_map() => (goal.tile_pos, goal.size, goal.layer),
                _ => return,
            },
            FireTarget::Tile { pos, layer } => (pos, TileSize::ONE, layer),
        };
        let basic = unit.modified(VariableId::BasicDamage);
        let piercing = unit.modified(VariableId::PiercingDamage);

        let Some(spec) = missile else {
            let source = Some(AttackerInfo::of(unit));
            match target {
                FireTarget::Unit(id) => {
                    let armor = env
                        .world
                        .units
                        .get(id)
                        .map_or(0, |goal| goal.modified(VariableId::Armor));
                    let damage = calculate_damage(basic, piercing, armor, env.rng);
                    hit_unit(env, source, id, damage, damage_kind.as_deref());
                }
                FireTarget::Tile { pos, layer } => {
                    splash(env, source, pos, layer, 0, basic, piercing, damage_kind.as_deref());
                }
            }
            return;
        };

        let dist = rect_distance(unit.tile_pos, unit.size, dest, dest_size).max(1);
        let ticks = if spec.speed > Fixed::ZERO {
            (Fixed::from_num(dist) / spec.speed).ceil().to_num::<u32>().max(1)
        } else {
            1
        };
        env.missiles.push(Missile {
            source: AttackerInfo::of(unit),
            target,
            dest,
            layer,
            basic_damage: basic,
            piercing_damage: piercing,
            splash: spec.splash,
            ticks_left: ticks,
            damage_kind,
        });
        env.events.missiles_fired += 1;
        tracing::trace!(shooter = %unit.id, ?target, ticks, "Missile launched");
    }

    fn update(&mut self, env: &mut CombatEnv<'_>) {
        let in_flight = std::mem::take(env.missiles);
        let mut landed = Vec::new();
        for mut missile in in_flight {
            if let FireTarget::Unit(id) = missile.target {
                if let Some(goal) = env.world.units.get(id).filter(|g| g.is_alive_on_map()) {
                    missile.dest = goal.tile_pos;
                    missile.layer = goal.layer;
                }
            }
            missile.ticks_left = missile.ticks_left.saturating_sub(1);
            if missile.ticks_left == 0 {
                landed.push(missile);
            } else {
                env.missiles.push(missile);
            }
        }
        for missile in landed {
            impact(env, &missile);
        }
    }
}

fn impact(env: &mut CombatEnv<'_>, missile: &Missile) {
    let source = Some(missile.source);
    match missile.target {
        FireTarget::Unit(id) => {
            // A missile whose target died in flight falls harmlessly.
            let Some(armor) = env
                .world
                .units
                .get(id)
                .filter(|g| g.is_alive_on_map())
                .map(|g| g.modified(VariableId::Armor))
            else {
                return;
            };
            let damage = calculate_damage(missile.basic_damage, missile.piercing_damage, armor, env.rng);
            hit_unit(env, source, id, damage, missile.damage_kind.as_deref());
        }
        FireTarget::Tile { .. } => splash(
            env,
            source,
            missile.dest,
            missile.layer,
            missile.splash,
            missile.basic_damage,
            missile.piercing_damage,
            missile.damage_kind.as_deref(),
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn splash(
    env: &mut CombatEnv<'_>,
    source: Option<AttackerInfo>,
    center: TilePos,
    layer: LayerId,
    radius: i32,
    basic: i32,
    piercing: i32,
    damage_kind: Option<&str>,
) {
    let world = &*env.world;
    let victims = spatial::select(
        world,
        center.offset(-radius, -radius),
        center.offset(radius, radius),
        layer,
        |u| {
            u.is_alive_on_map()
                && u.distance_to_tile(center) <= radius
                && world
                    .types
                    .get(u.type_id)
                    .is_some_and(|t| !t.has(UnitTypeFlags::ITEM))
        },
    );
    for id in victims {
        let armor = env
            .world
            .units
            .get(id)
            .map_or(0, |u| u.modified(VariableId::Armor));
        let damage = calculate_damage(basic, piercing, armor, env.rng);
        hit_unit(env, source, id, damage, damage_kind);
    }
}

/// Apply `damage` to `target`; kills it at zero hit points.
///
/// Surviving targets may turn on their attacker.
pub fn hit_unit(
    env: &mut CombatEnv<'_>,
    attacker: Option<AttackerInfo>,
    target: UnitId,
    damage: i32,
    damage_kind: Option<&str>,
) {
    let Some(mut goal) = env.world.units.take(target) else {
        return;
    };
    let indestructible = env
        .world
        .types
        .get(goal.type_id)
        .map_or(true, |t| t.has(UnitTypeFlags::INDESTRUCTIBLE));
    if !goal.is_alive_on_map() || indestructible {
        env.world.units.restore(goal);
        return;
    }

    if let Some(source) = attacker {
        declare_war(env.world, source, &goal);
    }

    let remaining = goal.variables.damage(damage);
    let killed = remaining == 0;
    env.events.damage.push(DamageEvent {
        attacker: attacker.map(|a| a.id),
        target,
        damage,
        killed,
    });

    if killed {
        let_unit_die(env.world, &mut goal, damage_kind);
        env.events.deaths.push(target);
    } else if let Some(source) = attacker {
        if env.world.config.attack_back {
            attack_back(env.world, &mut goal, &source);
        }
    }
    env.world.units.restore(goal);
}

/// Attacking a computer player's unit makes that player hostile.
fn declare_war(world: &mut World, source: AttackerInfo, goal: &Unit) {
    if world.players.is_enemy(goal.player, source.player) || goal.player == source.player {
        return;
    }
    let hidden = world
        .types
        .get(goal.type_id)
        .is_some_and(|t| t.has(UnitTypeFlags::HIDDEN_OWNERSHIP));
    let computer = world
        .players
        .get(goal.player)
        .is_some_and(|p| p.kind == PlayerKind::Computer);
    if computer && !hidden {
        world.players.set_enemy_with(goal.player, source.player);
    }
}

/// Kill `unit`: free its tiles, drop its orders and start dying.
pub fn let_unit_die(world: &mut World, unit: &mut Unit, damage_kind: Option<&str>) {
    if unit.destroyed {
        return;
    }
    world.unmark_unit_occupancy(unit);
    unit.variables.get_mut(VariableId::HitPoints).value = 0;
    unit.destroyed = true;
    unit.damaged_type = damage_kind.map(str::to_owned);
    unit.wait = 0;
    unit.waiting = false;
    unit.anim = AnimState::default();
    unit.orders.replace_all(Order::Die(DieOrder::new()));
    tracing::trace!(unit = %unit.id, "Unit died");
}

/// Make a hit unit fight back, saving what it was doing.
fn attack_back(world: &World, goal: &mut Unit, source: &AttackerInfo) {
    let (Some(gty), Some(aty)) = (world.types.get(goal.type_id), world.types.get(source.type_id))
    else {
        return;
    };
    if !goal.is_aggressive(gty) || !goal.can_move(gty) || !gty.can_target(aty) {
        return;
    }
    if world.players.is_teamed(goal.player, source.player) {
        return;
    }
    let ai = world.players.is_ai_active(goal.player);
    let Some(current) = goal.orders.current() else {
        return;
    };
    let eligible = match current {
        Order::Still(still) => !still.stand_ground,
        Order::Move(_) | Order::Patrol(_) => ai,
        Order::Attack(attack) => ai && attack.weak_target && !attack.ground,
        _ => false,
    };
    if !eligible {
        return;
    }

    let resume = goal
        .can_store_order(current, world)
        .then(|| current.clone());
    let order = AttackOrder::on_position(goal, source.tile_pos, source.layer, world);
    orders::interrupt(goal, Order::Attack(order), resume);
    tracing::debug!(unit = %goal.id, attacker = %source.id, "Attacking back");
}

/// Fire at `target` through the context's combat resolver.
pub fn fire(unit: &Unit, target: FireTarget, ctx: &mut OrderContext<'_>) {
    let mut env = CombatEnv {
        world: &mut *ctx.world,
        rng: &mut *ctx.rng,
        missiles: &mut *ctx.missiles,
        events: &mut *ctx.events,
    };
    ctx.services.combat.fire_effect(unit, target, &mut env);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_damage_floor_and_spread() {
        let mut rng = SyncRng::new(7);
        for _ in 0..200 {
            // max(3 - 10, 1) + 0 = 1; reduction is 0 or 1.
            let d = calculate_damage(3, 0, 10, &mut rng);
            assert!((0..=1).contains(&d));
            // max(12 - 2, 1) + 4 = 14; reduction is below 8.
            let d = calculate_damage(12, 4, 2, &mut rng);
            assert!((7..=14).contains(&d));
        }
    }

    #[test]
    fn test_damage_is_deterministic() {
        let mut a = SyncRng::new(99);
        let mut b = SyncRng::new(99);
        let xs: Vec<i32> = (0..32).map(|_| calculate_damage(9, 3, 1, &mut a)).collect();
        let ys: Vec<i32> = (0..32).map(|_| calculate_damage(9, 3, 1, &mut b)).collect();
        assert_eq!(xs, ys);
    }
}
