//! Still and stand-ground: the idle order and its reactive behaviors.

use serde::{Deserialize, Serialize};

use crate::animation::AnimationKind;
use crate::combat::{self, FireTarget};
use crate::pathfinding::PathRequest;
use crate::simulation::SoundEvent;
use crate::spatial;
use crate::spells;
use crate::threat;
use crate::unit::{Unit, UnitId, VariableId};
use crate::unit_type::UnitTypeFlags;

use super::attack::{is_ai, line_clear, reveal};
use super::{interrupt, play, play_action, AttackOrder, MoveOrder, Order, OrderContext, PickUpOrder, RepairOrder};

/// Sub-state of an idle unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StillState {
    /// Doing nothing.
    #[default]
    Standby,
    /// Shooting at something in range without moving.
    Attack,
}

/// Idle; with `stand_ground` the unit never leaves its tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StillOrder {
    /// Never move, not even to chase.
    pub stand_ground: bool,
    /// Sub-state.
    pub state: StillState,
    /// Unit being shot at in [`StillState::Attack`].
    pub goal: Option<UnitId>,
    /// Done (a plain still finishes every tick it is not busy).
    pub finished: bool,
}

impl StillOrder {
    /// Idle order.
    #[must_use]
    pub const fn new(stand_ground: bool) -> Self {
        Self {
            stand_ground,
            state: StillState::Standby,
            goal: None,
            finished: false,
        }
    }

    pub(super) fn execute(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) {
        if unit.removed {
            return;
        }
        self.finished = false;

        match self.state {
            StillState::Standby => {
                if !unit.is_stunned() {
                    play(unit, AnimationKind::Still, ctx);
                }
                // Rolled every idle tick, stunned or not.
                let chance = ctx.world.config.idle_sound_chance;
                if chance > 0 && ctx.rng.range(chance) == 0 {
                    ctx.events.sounds.push(SoundEvent {
                        unit: unit.id,
                        sound: "idle".to_owned(),
                    });
                }
                unit.step_count = 0;
            }
            StillState::Attack => {
                if play_action(unit, AnimationKind::Attack, ctx) {
                    self.on_animation_attack(unit, ctx);
                }
            }
        }
        if unit.anim.unbreakable || unit.is_stunned() {
            return;
        }

        self.state = StillState::Standby;
        self.goal = None;
        self.finished = !self.stand_ground;

        let Some(ty) = ctx.world.types.get(unit.type_id) else {
            return;
        };
        let aggressive = unit.is_aggressive(ty);
        if self.stand_ground || !unit.can_move(ty) {
            spells::auto_cast(unit, ctx);
            if aggressive {
                self.auto_attack_stand(unit, ctx);
            }
            return;
        }

        let home = Order::Attack(AttackOrder::on_position(unit, unit.tile_pos, unit.layer, ctx.world));
        let _ = spells::auto_cast(unit, ctx)
            || (aggressive && auto_attack(unit, Some(home), ctx))
            || auto_repair(unit, None, ctx)
            || move_randomly(unit, ctx)
            || pick_up_item(unit, ctx);
    }

    /// Pick a target within attack range and shoot without moving.
    fn auto_attack_stand(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) -> bool {
        let world = &*ctx.world;
        let Some(ty) = world.types.get(unit.type_id) else {
            return false;
        };
        if !unit.can_attack(ty) {
            return false;
        }
        let Some(target) = threat::attack_units_in_range(unit, ctx) else {
            return false;
        };
        let Some(goal) = world.units.get(target) else {
            return false;
        };
        if unit.distance_to_unit(goal) > unit.attack_range() || !line_clear(unit, goal.tile_pos, world) {
            return false;
        }
        self.state = StillState::Attack;
        self.goal = Some(target);
        unit.face_toward(goal.tile_pos, goal.size, ty.has(UnitTypeFlags::SIDE_ATTACK));
        true
    }

    fn on_animation_attack(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) {
        let Some(id) = self.goal else {
            return;
        };
        let in_range = ctx
            .world
            .units
            .get(id)
            .is_some_and(|g| g.is_alive_on_map() && unit.distance_to_unit(g) <= unit.attack_range());
        if !in_range {
            self.goal = None;
            return;
        }
        combat::fire(unit, FireTarget::Unit(id), ctx);
        reveal(unit);
    }
}

/// Attack the best enemy in reaction range, saving `resume` to come back to.
pub fn auto_attack(unit: &mut Unit, resume: Option<Order>, ctx: &mut OrderContext<'_>) -> bool {
    let world = &*ctx.world;
    let Some(ty) = world.types.get(unit.type_id) else {
        return false;
    };
    if !unit.can_attack(ty) {
        return false;
    }
    let Some(target) = threat::attack_units_in_react_range(unit, ctx) else {
        return false;
    };
    let Some(goal) = world.units.get(target) else {
        return false;
    };
    let order = AttackOrder::on_position(unit, goal.tile_pos, goal.layer, world);
    tracing::debug!(unit = %unit.id, %target, "Auto-attack");
    interrupt(unit, Order::Attack(order), resume);
    true
}

/// Repair the first damaged teamed unit in auto-repair range.
pub fn auto_repair(unit: &mut Unit, resume: Option<Order>, ctx: &mut OrderContext<'_>) -> bool {
    if !unit.auto_repair {
        return false;
    }
    let world = &*ctx.world;
    let Some(ty) = world.types.get(unit.type_id) else {
        return false;
    };
    if !ty.has(UnitTypeFlags::CAN_REPAIR) {
        return false;
    }
    let range = unit.modified(VariableId::AutoRepairRange);
    let found = spatial::select_around(world, unit, range, |other| {
        other.is_alive_on_map()
            && world.players.is_teamed(unit.player, other.player)
            && other.hit_points() < other.variables.max(VariableId::HitPoints)
            && unit.distance_to_unit(other) <= range
            && world.types.get(other.type_id).is_some_and(|t| t.repair_hp > 0)
    });
    let Some(target) = found.first().and_then(|id| world.units.get(*id)) else {
        return false;
    };
    let order = RepairOrder::new(unit, target, world);
    tracing::debug!(unit = %unit.id, target = %target.id, "Auto-repair");
    interrupt(unit, Order::Repair(order), resume);
    true
}

/// Wander to a random nearby tile.
fn move_randomly(unit: &mut Unit, ctx: &mut OrderContext<'_>) -> bool {
    let Some(ty) = ctx.world.types.get(unit.type_id) else {
        return false;
    };
    let probability = ty.random_movement_probability;
    let distance = ty.random_movement_distance;
    let movement = ty.movement;
    let people_aversion = ty.has(UnitTypeFlags::PEOPLE_AVERSION);
    if probability == 0 || ctx.rng.range(100) > probability {
        return false;
    }

    let span = (distance * 2 + 1).max(1) as u32;
    let dx = ctx.rng.range(span) as i32 - distance;
    let dy = ctx.rng.range(span) as i32 - distance;
    let pos = ctx.world.map.clamp(unit.tile_pos.offset(dx, dy), unit.layer);
    if pos == unit.tile_pos {
        return false;
    }

    ctx.world.unmark_unit_occupancy(unit);
    let free = ctx.world.map.can_be_at(movement, pos, unit.size, unit.layer, false);
    ctx.world.mark_unit_occupancy(unit);
    if !free {
        return false;
    }

    if people_aversion {
        let world = &*ctx.world;
        let crowded = spatial::find_unit_if(
            world,
            pos.offset(-distance, -distance),
            pos.offset(distance, distance),
            unit.layer,
            |other| {
                other.player != unit.player
                    && other.is_alive_on_map()
                    && world
                        .types
                        .get(other.type_id)
                        .is_some_and(|t| t.has(UnitTypeFlags::ORGANIC))
            },
        );
        if crowded.is_some() {
            return false;
        }
    }

    interrupt(unit, Order::Move(MoveOrder::new(pos, unit.layer, 0)), None);
    true
}

/// Damaged organic AI units walk to healing items they can reach.
fn pick_up_item(unit: &mut Unit, ctx: &mut OrderContext<'_>) -> bool {
    let world = &*ctx.world;
    let Some(ty) = world.types.get(unit.type_id) else {
        return false;
    };
    if !ty.has(UnitTypeFlags::ORGANIC) || !is_ai(unit, world) {
        return false;
    }
    if unit.hit_points() >= unit.variables.max(VariableId::HitPoints) {
        return false;
    }

    let sight = unit.current_sight_range;
    let max_length = usize::try_from(unit.reaction_range(ty, world).max(1) * 8).unwrap_or(usize::MAX);
    let items = spatial::select_around(world, unit, sight, |other| {
        other.is_alive_on_map()
            && other.modified(VariableId::HitPointHealing) > 0
            && world.types.get(other.type_id).is_some_and(|t| t.has(UnitTypeFlags::ITEM))
    });

    for id in items {
        let Some(item) = ctx.world.units.get(id) else {
            continue;
        };
        let request = PathRequest {
            unit: unit.id,
            movement: ty.movement,
            from: unit.tile_pos,
            size: unit.size,
            layer: unit.layer,
            goal_pos: item.tile_pos,
            goal_size: item.size,
            goal_layer: item.layer,
            min_range: 0,
            max_range: 1,
            can_step: false,
            max_nodes: ctx.world.config.max_search_nodes,
        };
        if ctx
            .services
            .pathfinder
            .is_reachable(&ctx.world.map, &request, max_length)
        {
            tracing::debug!(unit = %unit.id, item = %id, "Going for item");
            interrupt(unit, Order::PickUp(PickUpOrder::new(id)), None);
            return true;
        }
    }
    false
}
