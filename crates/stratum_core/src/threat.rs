//! Target selection.
//!
//! Candidates are scored by a [`ThreatEvaluator`]; lower scores are more
//! attractive. Selection takes the minimum `(score, UnitId)`, so equal
//! scores always resolve to the same unit on every client.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::math::Fixed;
use crate::orders::OrderContext;
use crate::spatial;
use crate::unit::{Unit, UnitId};
use crate::unit_type::{UnitType, UnitTypeFlags};
use crate::world::World;

/// Attractiveness of a target; lower is more attractive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreatScore(pub Fixed);

impl ThreatScore {
    /// Least attractive possible score.
    pub const MAX: Self = Self(Fixed::MAX);

    /// Score from a whole number.
    #[must_use]
    pub fn from_int(value: i32) -> Self {
        Self(Fixed::from_num(value))
    }
}

/// Weights of [`StandardThreat`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatWeights {
    /// Multiplies the target's priority (subtracted).
    pub priority_factor: i32,
    /// Multiplies the target's remaining health percentage.
    pub hit_points_factor: i32,
    /// Per-tile cost for targets already within attack range.
    pub in_range_factor: i32,
    /// Flat bonus for targets already within attack range.
    pub in_range_bonus: i32,
    /// Per-tile cost for targets outside attack range.
    pub out_of_range_factor: i32,
    /// Bonus for targets able to shoot back.
    pub can_attack_bonus: i32,
}

impl Default for ThreatWeights {
    fn default() -> Self {
        Self {
            priority_factor: 1,
            hit_points_factor: 1,
            in_range_factor: 2,
            in_range_bonus: 100,
            out_of_range_factor: 10,
            can_attack_bonus: 25,
        }
    }
}

/// Scores how urgently `attacker` should engage `target`.
pub trait ThreatEvaluator: Debug {
    /// Threat of `target` from `attacker`'s point of view.
    fn threat(&self, attacker: &Unit, target: &Unit, world: &World) -> ThreatScore;
}

/// Priority, health, distance and retaliation based scoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardThreat;

impl ThreatEvaluator for StandardThreat {
    fn threat(&self, attacker: &Unit, target: &Unit, world: &World) -> ThreatScore {
        let (Some(aty), Some(tty)) = (world.types.get(attacker.type_id), world.types.get(target.type_id))
        else {
            return ThreatScore::MAX;
        };
        // Harmless targets rank after every armed one; static ones last.
        if !target.is_aggressive(tty) {
            return if tty.can_move() {
                ThreatScore(Fixed::MAX / 2)
            } else {
                ThreatScore::MAX
            };
        }

        let w = &world.config.threat;
        let hp = target.variables.get(crate::unit::VariableId::HitPoints);
        let hp_percent = Fixed::from_num(hp.value) * Fixed::from_num(100) / Fixed::from_num(hp.max.max(1));

        let mut cost = Fixed::from_num(-target.modified(crate::unit::VariableId::Priority) * w.priority_factor);
        cost += hp_percent * Fixed::from_num(w.hit_points_factor);

        let d = attacker.distance_to_unit(target);
        if in_attack_band(d, aty.min_attack_range, attacker.attack_range()) {
            cost += Fixed::from_num(d * w.in_range_factor - w.in_range_bonus);
        } else {
            cost += Fixed::from_num(d * w.out_of_range_factor);
        }
        if tty.can_target(aty) {
            cost -= Fixed::from_num(w.can_attack_bonus);
        }
        ThreatScore(cost)
    }
}

/// Canonical attack-distance predicate: `min_range < dist <= attack_range`.
#[must_use]
pub const fn in_attack_band(dist: i32, min_range: i32, attack_range: i32) -> bool {
    dist > min_range && dist <= attack_range
}

/// Kiting policy: an AI unit that outruns and outranges its target keeps
/// its distance instead of closing in.
#[must_use]
pub fn kites(attacker: &Unit, target: &Unit, world: &World) -> bool {
    world.players.get(attacker.player).is_some_and(|p| p.ai_enabled)
        && attacker.speed() > target.speed()
        && attacker.attack_range() > target.attack_range()
}

/// Exclusive minimum attack distance `attacker` keeps from `target`.
///
/// Under the kiting policy this pins the only legal attack distance to
/// exactly the attacker's attack range.
#[must_use]
pub fn attack_min_range(attacker: &Unit, target: Option<&Unit>, world: &World) -> i32 {
    let base = world
        .types
        .get(attacker.type_id)
        .map_or(0, |t| t.min_attack_range);
    match target {
        Some(target) if kites(attacker, target, world) => (attacker.attack_range() - 1).max(base),
        _ => base,
    }
}

/// Whether `target` is something `attacker` may pick on its own.
#[must_use]
pub fn is_attackable(attacker: &Unit, aty: &UnitType, target: &Unit, world: &World) -> bool {
    let Some(tty) = world.types.get(target.type_id) else {
        return false;
    };
    world.players.is_enemy(attacker.player, target.player)
        && !tty.has(UnitTypeFlags::ITEM)
        && !tty.has(UnitTypeFlags::INDESTRUCTIBLE)
        && aty.can_target(tty)
        && target.is_visible_as_goal(attacker.player, world)
}

fn best_target(unit: &Unit, range: i32, min_exclusive: i32, ctx: &OrderContext<'_>) -> Option<UnitId> {
    let world = &*ctx.world;
    let aty = world.types.get(unit.type_id)?;
    spatial::select_around(world, unit, range, |target| {
        let d = unit.distance_to_unit(target);
        d <= range && d > min_exclusive && is_attackable(unit, aty, target, world)
    })
    .into_iter()
    .filter_map(|id| world.units.get(id))
    .map(|target| (ctx.services.threat.threat(unit, target, world), target.id))
    .min()
    .map(|(_, id)| id)
}

/// Best target within `range` tiles.
pub fn attack_units_in_distance(unit: &Unit, range: i32, ctx: &OrderContext<'_>) -> Option<UnitId> {
    best_target(unit, range, -1, ctx)
}

/// Best target within the unit's reaction range; `None` for units that cannot attack.
pub fn attack_units_in_react_range(unit: &Unit, ctx: &OrderContext<'_>) -> Option<UnitId> {
    let ty = ctx.world.types.get(unit.type_id)?;
    if !unit.can_attack(ty) {
        return None;
    }
    best_target(unit, unit.reaction_range(ty, ctx.world), -1, ctx)
}

/// Best target the unit can hit without moving.
pub fn attack_units_in_range(unit: &Unit, ctx: &OrderContext<'_>) -> Option<UnitId> {
    let ty = ctx.world.types.get(unit.type_id)?;
    if !unit.can_attack(ty) {
        return None;
    }
    best_target(unit, unit.attack_range(), ty.min_attack_range, ctx)
}

/// Threat of a specific target, for retarget comparisons.
pub fn threat_of(unit: &Unit, target: UnitId, ctx: &OrderContext<'_>) -> ThreatScore {
    match ctx.world.units.get(target) {
        Some(target) => ctx.services.threat.threat(unit, target, ctx.world),
        None => ThreatScore::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attack_band_edges() {
        // Exactly at max range is in; one past is out.
        assert!(in_attack_band(4, 0, 4));
        assert!(!in_attack_band(5, 0, 4));
        // Exactly at min range is out.
        assert!(!in_attack_band(2, 2, 4));
        assert!(in_attack_band(3, 2, 4));
        // Kiting pins the band to the attack range itself.
        assert!(in_attack_band(4, 3, 4));
        assert!(!in_attack_band(3, 3, 4));
    }

    #[test]
    fn test_score_ordering_breaks_ties_by_id() {
        let a = (ThreatScore::from_int(5), UnitId::new(7, 0));
        let b = (ThreatScore::from_int(5), UnitId::new(3, 0));
        assert_eq!(a.min(b).1, UnitId::new(3, 0));
    }
}
