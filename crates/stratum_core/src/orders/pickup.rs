use serde::{Deserialize, Serialize};

use crate::movement::{do_action_move, MoveGoal, MoveStatus};
use crate::unit::{Unit, UnitId, VariableId};
use crate::unit_type::UnitTypeFlags;
use crate::world::World;

use super::{handle_wait, OrderContext};

/// Walk to an item and consume it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PickUpOrder {
    /// The item.
    pub goal: Option<UnitId>,
    /// Done.
    pub finished: bool,
}

impl PickUpOrder {
    /// Pick up `item`.
    #[must_use]
    pub const fn new(item: UnitId) -> Self {
        Self {
            goal: Some(item),
            finished: false,
        }
    }

    pub(super) fn is_valid(&self, world: &World) -> bool {
        self.goal.and_then(|id| world.units.get(id)).is_some_and(|item| {
            item.is_alive_on_map()
                && world
                    .types
                    .get(item.type_id)
                    .is_some_and(|t| t.has(UnitTypeFlags::ITEM))
        })
    }

    pub(super) fn execute(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) {
        if handle_wait(unit, ctx) {
            return;
        }
        let Some(item_id) = self.goal.filter(|_| self.is_valid(ctx.world)) else {
            self.finished = true;
            return;
        };
        let Some(goal) = ctx.world.units.get(item_id).map(|item| MoveGoal::unit(item, 0, 1)) else {
            self.finished = true;
            return;
        };

        match do_action_move(unit, &goal, ctx) {
            MoveStatus::Reached => {
                if let Some(item) = ctx.world.release_unit(item_id) {
                    let healed = unit.variables.heal(item.modified(VariableId::HitPointHealing));
                    ctx.events.released.push(item_id);
                    tracing::debug!(unit = %unit.id, item = %item_id, healed, "Picked up item");
                }
                self.goal = None;
                self.finished = true;
            }
            MoveStatus::Unreachable => {
                tracing::debug!(unit = %unit.id, item = %item_id, "Item unreachable");
                self.finished = true;
            }
            MoveStatus::InProgress | MoveStatus::Blocked => {}
        }
    }
}
