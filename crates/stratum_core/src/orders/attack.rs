//! Attack and attack-ground.
//!
//! ```text
//! FirstEntry ──in band──────────────▶ AttackTarget
//!     │                                 ▲     │
//!     └──────▶ MoveToTarget ──reached───┘     │ out of band
//!                  ▲                          │
//!                  └──────────────────────────┘
//! ```
//!
//! A target picked up opportunistically is *weak*: every tick a strictly
//! less threatening candidate replaces it, after the current intention
//! has been put into the saved slot.

use serde::{Deserialize, Serialize};

use crate::animation::AnimationKind;
use crate::combat::{self, FireTarget};
use crate::map::{LayerId, MapFieldFlags};
use crate::math::{rect_distance, TilePos, TileSize};
use crate::movement::{do_action_move, MoveGoal, MoveStatus};
use crate::threat::{self, attack_min_range, in_attack_band};
use crate::unit::{Unit, UnitId, VariableId};
use crate::unit_type::UnitTypeFlags;
use crate::world::World;

use super::{handle_wait, note_blocked, play_action, Order, OrderContext};

/// Phase of an attack order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AttackPhase {
    /// Not executed yet.
    #[default]
    FirstEntry,
    /// Approaching the goal.
    MoveToTarget,
    /// In range and attacking.
    AttackTarget,
}

/// Attack a unit, attack-move to a tile, or attack the ground.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttackOrder {
    /// Attack the tile itself rather than units on the way.
    pub ground: bool,
    /// Goal unit.
    pub goal: Option<UnitId>,
    /// Goal tile; the last known position while a goal unit is set.
    pub goal_pos: TilePos,
    /// Goal layer.
    pub goal_layer: LayerId,
    /// Exclusive minimum attack distance.
    pub min_range: i32,
    /// Maximum distance.
    pub range: i32,
    /// Phase.
    pub phase: AttackPhase,
    /// The goal was picked opportunistically.
    pub weak_target: bool,
    /// Consecutive blocked path requests.
    #[serde(default)]
    pub blocked: u32,
    /// Done.
    pub finished: bool,
}

impl AttackOrder {
    /// Attack-move to a tile with zero range.
    #[must_use]
    pub const fn at_position(pos: TilePos, layer: LayerId) -> Self {
        Self {
            ground: false,
            goal: None,
            goal_pos: pos,
            goal_layer: layer,
            min_range: 0,
            range: 0,
            phase: AttackPhase::FirstEntry,
            weak_target: false,
            blocked: 0,
            finished: false,
        }
    }

    /// Attack-move to a tile, engaging enemies met on the way.
    #[must_use]
    pub fn on_position(attacker: &Unit, pos: TilePos, layer: LayerId, world: &World) -> Self {
        Self {
            min_range: attack_min_range(attacker, None, world),
            range: attacker.attack_range(),
            ..Self::at_position(pos, layer)
        }
    }

    /// Attack a tile.
    #[must_use]
    pub fn on_ground(attacker: &Unit, pos: TilePos, layer: LayerId, world: &World) -> Self {
        Self {
            ground: true,
            ..Self::on_position(attacker, pos, layer, world)
        }
    }

    /// Attack a unit.
    #[must_use]
    pub fn on_unit(attacker: &Unit, target: &Unit, world: &World) -> Self {
        Self {
            goal: Some(target.id),
            min_range: attack_min_range(attacker, Some(target), world),
            range: attacker.attack_range(),
            ..Self::at_position(target.tile_pos, target.layer)
        }
    }

    pub(super) fn is_valid(&self, world: &World) -> bool {
        match self.goal {
            Some(goal) => world.units.get(goal).is_some_and(Unit::is_alive_on_map),
            None => world.map.is_point_on_map(self.goal_pos, self.goal_layer),
        }
    }

    fn goal_unit<'w>(&self, world: &'w World) -> Option<&'w Unit> {
        self.goal.and_then(|id| world.units.get(id))
    }

    /// Aimed at a tile rather than at whatever stands there.
    fn targets_ground(&self, world: &World) -> bool {
        self.goal.is_none() && (self.ground || world.map.wall_on_map(self.goal_pos, self.goal_layer))
    }

    fn target_rect(&self, world: &World) -> (TilePos, TileSize, LayerId) {
        match self.goal_unit(world) {
            Some(goal) => (goal.tile_pos, goal.size, goal.layer),
            None => (self.goal_pos, TileSize::ONE, self.goal_layer),
        }
    }

    /// Whether the unit may commit to attacking from where it stands.
    fn in_attack_position(&self, unit: &Unit, world: &World) -> bool {
        if self.goal.is_none() && !self.targets_ground(world) {
            return false;
        }
        let (pos, size, layer) = self.target_rect(world);
        if layer != unit.layer {
            return false;
        }
        let dist = rect_distance(unit.tile_pos, unit.size, pos, size);
        in_attack_band(dist, self.min_range, unit.attack_range()) && line_clear(unit, pos, world)
    }

    fn face_target(&self, unit: &mut Unit, world: &World) {
        let (pos, size, _) = self.target_rect(world);
        let side = world
            .types
            .get(unit.type_id)
            .is_some_and(|t| t.has(UnitTypeFlags::SIDE_ATTACK));
        unit.face_toward(pos, size, side);
    }

    /// Point the order at `target`, recomputing both range bounds.
    fn set_target(&mut self, unit: &Unit, target: UnitId, world: &World) {
        let Some(goal) = world.units.get(target) else {
            return;
        };
        self.goal = Some(target);
        self.goal_pos = goal.tile_pos;
        self.goal_layer = goal.layer;
        self.min_range = attack_min_range(unit, Some(goal), world);
        self.range = unit.attack_range();
    }

    /// Pathfinder goal: inclusive bounds derived from the exclusive minimum.
    fn move_goal(&self, unit: &Unit, world: &World) -> MoveGoal {
        let (pos, size, layer) = self.target_rect(world);
        let mut max_range = self.range;
        if unit.attack_range() > 1 && !line_clear(unit, pos, world) {
            max_range = 1;
        }
        let min_range = if self.min_range > 0 { self.min_range + 1 } else { 0 };
        MoveGoal {
            pos,
            size,
            layer,
            min_range: min_range.min(max_range),
            max_range,
        }
    }

    /// Drop a goal that died or went out of sight; returns true when the
    /// saved order took over.
    fn check_for_dead_goal(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) -> bool {
        let Some(id) = self.goal else {
            return false;
        };
        let world = &*ctx.world;
        if let Some(goal) = world.units.get(id) {
            if goal.is_visible_as_goal(unit.player, world) {
                return false;
            }
            self.goal_pos = goal.tile_pos;
            self.goal_layer = goal.layer;
        }
        self.min_range = 0;
        self.range = 0;
        self.goal = None;
        tracing::trace!(unit = %unit.id, goal = %id, pos = %self.goal_pos, "Attack goal lost");
        unit.restore_order(world)
    }

    /// Save an attack-move back to the current tile target, then engage `target`.
    fn engage(&mut self, unit: &mut Unit, target: UnitId, world: &World) {
        let resume = AttackOrder::on_position(unit, self.goal_pos, self.goal_layer, world);
        unit.store_order(Order::Attack(resume), world);
        self.set_target(unit, target, world);
        self.weak_target = true;
        tracing::debug!(unit = %unit.id, %target, "Engaging target");
    }

    /// Swap to a strictly less threatening candidate; returns whether it did.
    fn try_retarget(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) -> bool {
        let Some(current) = self.goal else {
            return false;
        };
        let Some(candidate) = threat::attack_units_in_react_range(unit, ctx) else {
            return false;
        };
        if candidate == current
            || threat::threat_of(unit, candidate, ctx) >= threat::threat_of(unit, current, ctx)
        {
            return false;
        }
        unit.store_order(Order::Attack(self.clone()), ctx.world);
        self.set_target(unit, candidate, ctx.world);
        tracing::debug!(unit = %unit.id, from = %current, to = %candidate, "Retargeted");
        true
    }

    /// Look for something to shoot at while on the way.
    fn check_for_target_in_range(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) -> bool {
        if self.check_for_dead_goal(unit, ctx) {
            return true;
        }
        if self.goal.is_none() {
            if !self.targets_ground(ctx.world) {
                if let Some(target) = threat::attack_units_in_react_range(unit, ctx) {
                    self.engage(unit, target, ctx.world);
                }
            }
        } else if self.weak_target || is_ai(unit, ctx.world) {
            self.try_retarget(unit, ctx);
        }
        false
    }

    fn move_to_target(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) {
        if let Some((pos, layer)) = self.goal_unit(ctx.world).map(|g| (g.tile_pos, g.layer)) {
            self.goal_pos = pos;
            self.goal_layer = layer;
        }
        let goal = self.move_goal(unit, ctx.world);
        let mut status = do_action_move(unit, &goal, ctx);
        if unit.anim.unbreakable {
            return;
        }

        // Blocked in range of a point is as good as there.
        if status == MoveStatus::Blocked
            && self.goal.is_none()
            && unit.distance_to_tile(self.goal_pos) <= unit.attack_range()
        {
            status = MoveStatus::Reached;
        }
        if status == MoveStatus::Blocked {
            note_blocked(unit, &mut self.blocked, &ctx.world.config);
        } else {
            self.blocked = 0;
        }

        match status {
            MoveStatus::InProgress | MoveStatus::Blocked => {
                self.check_for_target_in_range(unit, ctx);
            }
            MoveStatus::Reached => self.on_reached(unit, ctx),
            MoveStatus::Unreachable => self.on_unreachable(unit, ctx),
        }
    }

    fn on_reached(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) {
        let world = &*ctx.world;
        if self.goal.is_some() {
            if self.in_attack_position(unit, world) {
                self.face_target(unit, world);
                self.phase = AttackPhase::AttackTarget;
            }
            return;
        }
        if self.targets_ground(world) && unit.distance_to_tile(self.goal_pos) <= unit.attack_range() {
            self.face_target(unit, world);
            self.phase = AttackPhase::AttackTarget;
            return;
        }
        // Attack-move arrived without meeting anything.
        if !unit.restore_order(world) {
            self.finished = true;
        }
    }

    fn on_unreachable(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) {
        let config = &ctx.world.config;
        if self.goal.is_none() {
            let cap = unit.attack_range() + config.max_range_widening;
            if self.range < cap {
                self.range += 1;
                unit.wait = config.unreachable_retry_wait;
                tracing::trace!(unit = %unit.id, range = self.range, "Widened attack range");
                return;
            }
            tracing::debug!(unit = %unit.id, pos = %self.goal_pos, "Attack target unreachable, giving up");
        } else {
            self.goal = None;
        }
        if !unit.restore_order(ctx.world) {
            self.finished = true;
        }
    }

    fn attack_target(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) {
        if play_action(unit, AnimationKind::Attack, ctx) {
            self.on_animation_attack(unit, ctx);
        }
        if unit.anim.unbreakable || self.targets_ground(ctx.world) {
            return;
        }
        if self.check_for_dead_goal(unit, ctx) {
            return;
        }

        if self.goal.is_none() {
            let Some(target) = threat::attack_units_in_react_range(unit, ctx) else {
                if !unit.restore_order(ctx.world) {
                    self.phase = AttackPhase::MoveToTarget;
                }
                return;
            };
            self.engage(unit, target, ctx.world);
        } else if self.weak_target && self.try_retarget(unit, ctx) {
            self.phase = AttackPhase::MoveToTarget;
        }

        let world = &*ctx.world;
        let Some(goal) = self.goal_unit(world) else {
            return;
        };
        let dist = unit.distance_to_unit(goal);
        if dist > unit.attack_range() || !line_clear(unit, goal.tile_pos, world) {
            unit.frame = 0;
            self.phase = AttackPhase::MoveToTarget;
        } else if dist <= self.min_range {
            self.phase = AttackPhase::MoveToTarget;
        }
        self.face_target(unit, world);
    }

    fn on_animation_attack(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) {
        let target = match self.goal {
            Some(id) => match ctx.world.units.get(id) {
                Some(goal) if goal.is_alive_on_map() => FireTarget::Unit(id),
                _ => return,
            },
            None if self.targets_ground(ctx.world) => FireTarget::Tile {
                pos: self.goal_pos,
                layer: self.goal_layer,
            },
            None => return,
        };
        combat::fire(unit, target, ctx);
        reveal(unit);
        unit.step_count = 0;
    }

    pub(super) fn execute(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) {
        if handle_wait(unit, ctx) {
            return;
        }

        if self.phase == AttackPhase::FirstEntry {
            if self.check_for_dead_goal(unit, ctx) {
                return;
            }
            if self.in_attack_position(unit, ctx.world) {
                self.face_target(unit, ctx.world);
                self.phase = AttackPhase::AttackTarget;
                self.attack_target(unit, ctx);
                return;
            }
            self.phase = AttackPhase::MoveToTarget;
        }

        match self.phase {
            AttackPhase::MoveToTarget => {
                let can_move = ctx
                    .world
                    .types
                    .get(unit.type_id)
                    .is_some_and(|t| unit.can_move(t));
                if !can_move {
                    self.finished = true;
                    return;
                }
                self.move_to_target(unit, ctx);
            }
            AttackPhase::AttackTarget => self.attack_target(unit, ctx),
            AttackPhase::FirstEntry => {}
        }
    }
}

pub(super) fn line_clear(unit: &Unit, pos: TilePos, world: &World) -> bool {
    world
        .map
        .line_clear(unit.tile_pos, pos, MapFieldFlags::AIR_UNPASSABLE, unit.layer)
}

pub(super) fn is_ai(unit: &Unit, world: &World) -> bool {
    world.players.get(unit.player).is_some_and(|p| p.ai_enabled)
}

/// Attacking gives away an invisible unit.
pub(super) fn reveal(unit: &mut Unit) {
    unit.modifiers.retain(|m| m.variable != VariableId::Invisible);
    unit.variables.get_mut(VariableId::Invisible).value = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_orders_are_strong() {
        let order = AttackOrder::at_position(TilePos::new(3, 4), 0);
        assert!(!order.weak_target);
        assert_eq!(order.phase, AttackPhase::FirstEntry);
        assert_eq!(order.goal, None);
    }
}
