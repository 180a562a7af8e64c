use serde::{Deserialize, Serialize};

use crate::animation::AnimationKind;
use crate::map::LayerId;
use crate::math::TilePos;
use crate::movement::{do_action_move, MoveGoal, MoveStatus};
use crate::unit::{Unit, UnitId, VariableId};
use crate::world::World;

use super::{handle_wait, play_action, OrderContext};

/// Sub-state of a repair order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RepairState {
    /// Walking to the damaged unit.
    #[default]
    MoveToGoal,
    /// Working on it.
    Repairing,
}

/// Restore hit points of a damaged teamed unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepairOrder {
    /// Unit being repaired.
    pub goal: Option<UnitId>,
    /// Its last known position.
    pub goal_pos: TilePos,
    /// Its layer.
    pub goal_layer: LayerId,
    /// Distance the repairer works from.
    pub range: i32,
    /// Sub-state.
    pub state: RepairState,
    /// Done.
    pub finished: bool,
}

impl RepairOrder {
    /// Repair `target`.
    #[must_use]
    pub fn new(repairer: &Unit, target: &Unit, world: &World) -> Self {
        let range = world.types.get(repairer.type_id).map_or(1, |t| t.repair_range.max(1));
        Self {
            goal: Some(target.id),
            goal_pos: target.tile_pos,
            goal_layer: target.layer,
            range,
            state: RepairState::MoveToGoal,
            finished: false,
        }
    }

    pub(super) fn is_valid(&self, world: &World) -> bool {
        self.goal
            .and_then(|id| world.units.get(id))
            .is_some_and(Unit::is_alive_on_map)
    }

    fn finish(&mut self, unit: &mut Unit, world: &World) {
        self.goal = None;
        if !unit.restore_order(world) {
            self.finished = true;
        }
    }

    pub(super) fn execute(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) {
        if handle_wait(unit, ctx) {
            return;
        }
        let Some(goal) = self.goal.and_then(|id| ctx.world.units.get(id)).filter(|g| g.is_alive_on_map())
        else {
            self.finish(unit, ctx.world);
            return;
        };
        let hp = goal.variables.get(VariableId::HitPoints);
        if hp.value >= hp.max {
            self.finish(unit, ctx.world);
            return;
        }
        let move_goal = MoveGoal::unit(goal, 0, self.range);
        let in_range = unit.distance_to_unit(goal) <= self.range;
        self.goal_pos = goal.tile_pos;
        self.goal_layer = goal.layer;

        match self.state {
            RepairState::MoveToGoal => match do_action_move(unit, &move_goal, ctx) {
                MoveStatus::Reached => {
                    unit.face_toward(move_goal.pos, move_goal.size, false);
                    self.state = RepairState::Repairing;
                }
                MoveStatus::Unreachable => {
                    tracing::debug!(unit = %unit.id, "Repair target unreachable");
                    self.finish(unit, ctx.world);
                }
                MoveStatus::InProgress | MoveStatus::Blocked => {}
            },
            RepairState::Repairing => {
                if !in_range {
                    self.state = RepairState::MoveToGoal;
                    return;
                }
                if play_action(unit, AnimationKind::Repair, ctx) {
                    self.repair_step(unit, ctx);
                }
            }
        }
    }

    fn repair_step(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) {
        let Some(id) = self.goal else {
            return;
        };
        let amount = ctx
            .world
            .units
            .get(id)
            .and_then(|g| ctx.world.types.get(g.type_id))
            .map_or(0, |t| t.repair_hp);
        let Some(goal) = ctx.world.units.get_mut(id) else {
            return;
        };
        goal.variables.heal(amount);
        let full = goal.hit_points() >= goal.variables.max(VariableId::HitPoints);
        tracing::trace!(unit = %unit.id, target = %id, amount, "Repaired");
        if full && !unit.anim.unbreakable {
            self.finish(unit, ctx.world);
        }
    }
}
