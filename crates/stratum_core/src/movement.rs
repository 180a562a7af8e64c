//! Per-tick unit movement.
//!
//! [`do_action_move`] is the single entry point orders use to approach a
//! goal: it accumulates speed into tile-step progress, consults the
//! pathfinder once, and applies at most one step.

use crate::animation::AnimationKind;
use crate::map::LayerId;
use crate::math::{Fixed, Heading, TilePos, TileSize};
use crate::orders::{play, OrderContext};
use crate::pathfinding::{PathDecision, PathRequest};
use crate::unit::Unit;
use crate::unit_type::SPEED_SCALE;

/// Outcome of one movement tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveStatus {
    /// Travelling.
    InProgress,
    /// Temporarily blocked by other units.
    Blocked,
    /// Within range of the goal.
    Reached,
    /// No path.
    Unreachable,
}

impl MoveStatus {
    /// Whether the unit is still on its way (moving or waiting for a gap).
    #[must_use]
    pub const fn is_moving(self) -> bool {
        matches!(self, Self::InProgress | Self::Blocked)
    }
}

/// Where a unit is heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveGoal {
    /// Target top-left tile.
    pub pos: TilePos,
    /// Target footprint.
    pub size: TileSize,
    /// Target layer.
    pub layer: LayerId,
    /// Inclusive minimum distance.
    pub min_range: i32,
    /// Inclusive maximum distance.
    pub max_range: i32,
}

impl MoveGoal {
    /// Goal of reaching within `range` of a tile.
    #[must_use]
    pub const fn tile(pos: TilePos, layer: LayerId, range: i32) -> Self {
        Self {
            pos,
            size: TileSize::ONE,
            layer,
            min_range: 0,
            max_range: range,
        }
    }

    /// Goal of reaching within `[min_range, max_range]` of a unit.
    #[must_use]
    pub const fn unit(target: &Unit, min_range: i32, max_range: i32) -> Self {
        Self {
            pos: target.tile_pos,
            size: target.size,
            layer: target.layer,
            min_range,
            max_range,
        }
    }
}

/// Advance `unit` toward `goal` by one tick.
pub fn do_action_move(unit: &mut Unit, goal: &MoveGoal, ctx: &mut OrderContext<'_>) -> MoveStatus {
    let Some(ty) = ctx.world.types.get(unit.type_id) else {
        return MoveStatus::Unreachable;
    };
    if !unit.can_move(ty) {
        return MoveStatus::Unreachable;
    }
    let movement = ty.movement;

    let step = Fixed::from_num(unit.speed()) / Fixed::from_num(SPEED_SCALE);
    unit.move_progress = (unit.move_progress + step).min(Fixed::ONE);
    let can_step = unit.move_progress >= Fixed::ONE;

    let request = PathRequest {
        unit: unit.id,
        movement,
        from: unit.tile_pos,
        size: unit.size,
        layer: unit.layer,
        goal_pos: goal.pos,
        goal_size: goal.size,
        goal_layer: goal.layer,
        min_range: goal.min_range,
        max_range: goal.max_range,
        can_step,
        max_nodes: ctx.world.config.max_search_nodes,
    };

    // The unit's own footprint must not block its search.
    ctx.world.unmark_unit_occupancy(unit);
    let decision = ctx.services.pathfinder.request_move(&ctx.world.map, &request);
    let status = match decision {
        PathDecision::Reached => {
            unit.move_progress = Fixed::ZERO;
            MoveStatus::Reached
        }
        PathDecision::Unreachable => {
            unit.move_progress = Fixed::ZERO;
            MoveStatus::Unreachable
        }
        PathDecision::Blocked => MoveStatus::Blocked,
        PathDecision::Wait => MoveStatus::InProgress,
        PathDecision::Step(_) if !can_step => MoveStatus::InProgress,
        PathDecision::Step(next) => {
            let adjacent = next.chebyshev(unit.tile_pos) == 1;
            if adjacent && ctx.world.map.can_be_at(movement, next, unit.size, unit.layer, false) {
                ctx.world.unmark_unit_sight(unit);
                unit.direction = Heading::from_delta(
                    next.x - unit.tile_pos.x,
                    next.y - unit.tile_pos.y,
                    unit.direction,
                );
                unit.tile_pos = next;
                ctx.world.mark_unit_sight(unit);
                unit.move_progress -= Fixed::ONE;
                unit.step_count += 1;
                MoveStatus::InProgress
            } else {
                MoveStatus::Blocked
            }
        }
    };
    ctx.world.mark_unit_occupancy(unit);

    if status == MoveStatus::InProgress {
        play(unit, AnimationKind::Move, ctx);
    }
    status
}
