use serde::{Deserialize, Serialize};

use crate::map::LayerId;
use crate::math::TilePos;
use crate::movement::{do_action_move, MoveGoal, MoveStatus};
use crate::spells;
use crate::unit::Unit;

use super::still::{auto_attack, auto_repair};
use super::{handle_wait, Order, OrderContext};

/// Ticks spent blocked before turning around.
const BLOCKED_TURNAROUND: u32 = 5;

/// Walk back and forth between two tiles, engaging what comes along.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatrolOrder {
    /// Current destination.
    pub goal_pos: TilePos,
    /// The other end.
    pub waypoint: TilePos,
    /// Layer of both ends.
    pub goal_layer: LayerId,
    /// Accepted distance from the destination.
    pub range: i32,
    /// Consecutive ticks spent blocked.
    pub waiting_cycle: u32,
    /// Done.
    pub finished: bool,
}

impl PatrolOrder {
    /// Patrol from `origin` to `dest` and back.
    #[must_use]
    pub const fn new(origin: TilePos, dest: TilePos, layer: LayerId) -> Self {
        Self {
            goal_pos: dest,
            waypoint: origin,
            goal_layer: layer,
            range: 0,
            waiting_cycle: 0,
            finished: false,
        }
    }

    fn turn_around(&mut self) {
        std::mem::swap(&mut self.goal_pos, &mut self.waypoint);
        self.waiting_cycle = 0;
    }

    pub(super) fn execute(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) {
        if handle_wait(unit, ctx) {
            return;
        }

        let goal = MoveGoal::tile(self.goal_pos, self.goal_layer, self.range);
        match do_action_move(unit, &goal, ctx) {
            MoveStatus::Reached => self.turn_around(),
            MoveStatus::Unreachable => {
                if self.range < ctx.world.config.max_range_widening {
                    self.range += 1;
                } else {
                    tracing::debug!(unit = %unit.id, "Patrol unreachable");
                    self.finished = true;
                    return;
                }
            }
            MoveStatus::Blocked => {
                self.waiting_cycle += 1;
                if self.waiting_cycle >= BLOCKED_TURNAROUND {
                    self.turn_around();
                }
            }
            MoveStatus::InProgress => self.waiting_cycle = 0,
        }

        if unit.anim.unbreakable {
            return;
        }
        let resume = unit
            .can_store_order(&Order::Patrol(self.clone()), ctx.world)
            .then(|| Order::Patrol(self.clone()));
        let aggressive = ctx
            .world
            .types
            .get(unit.type_id)
            .is_some_and(|t| unit.is_aggressive(t));
        // Reactions replace the patrol through the order queue; the saved
        // clone brings it back.
        let _ = (aggressive && auto_attack(unit, resume.clone(), ctx))
            || auto_repair(unit, resume, ctx)
            || spells::auto_cast(unit, ctx);
    }
}
