use serde::{Deserialize, Serialize};

use crate::map::LayerId;
use crate::math::TilePos;
use crate::movement::{do_action_move, MoveGoal, MoveStatus};
use crate::unit::Unit;

use super::{handle_wait, note_blocked, OrderContext};

/// Move to within `range` of a tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveOrder {
    /// Destination.
    pub goal_pos: TilePos,
    /// Destination layer.
    pub goal_layer: LayerId,
    /// Accepted distance from the destination.
    pub range: i32,
    /// Consecutive blocked path requests.
    #[serde(default)]
    pub blocked: u32,
    /// Done.
    pub finished: bool,
}

impl MoveOrder {
    /// Move order to `pos`.
    #[must_use]
    pub const fn new(pos: TilePos, layer: LayerId, range: i32) -> Self {
        Self {
            goal_pos: pos,
            goal_layer: layer,
            range,
            blocked: 0,
            finished: false,
        }
    }

    pub(super) fn execute(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) {
        if handle_wait(unit, ctx) {
            return;
        }
        let goal = MoveGoal::tile(self.goal_pos, self.goal_layer, self.range);
        let status = do_action_move(unit, &goal, ctx);
        if status == MoveStatus::Blocked {
            note_blocked(unit, &mut self.blocked, &ctx.world.config);
        } else {
            self.blocked = 0;
        }
        match status {
            MoveStatus::Reached => self.finished = true,
            MoveStatus::Unreachable => {
                if self.range < ctx.world.config.max_range_widening {
                    self.range += 1;
                    tracing::trace!(unit = %unit.id, range = self.range, "Widened move range");
                } else {
                    tracing::debug!(unit = %unit.id, pos = %self.goal_pos, "Move target unreachable");
                    self.finished = true;
                }
            }
            MoveStatus::InProgress | MoveStatus::Blocked => {}
        }
    }
}
