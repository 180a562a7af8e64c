use serde::{Deserialize, Serialize};

use crate::animation::AnimationKind;
use crate::map::LayerId;
use crate::math::TilePos;
use crate::movement::{do_action_move, MoveGoal, MoveStatus};
use crate::unit::{Unit, UnitId, VariableId};
use crate::unit_type::UnitTypeId;
use crate::world::World;

use super::{handle_wait, play_action, OrderContext};

/// Sub-state of a build order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BuildState {
    /// Walking to the site.
    #[default]
    MoveToSite,
    /// Raising the building.
    Constructing,
}

/// Construct a building next to the builder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildOrder {
    /// Type to construct.
    pub unit_type: UnitTypeId,
    /// Top-left tile of the site.
    pub goal_pos: TilePos,
    /// Layer of the site.
    pub goal_layer: LayerId,
    /// Sub-state.
    pub state: BuildState,
    /// Building under construction.
    pub building: Option<UnitId>,
    /// Done.
    pub finished: bool,
}

impl BuildOrder {
    /// Build `unit_type` at `pos`.
    #[must_use]
    pub const fn new(unit_type: UnitTypeId, pos: TilePos, layer: LayerId) -> Self {
        Self {
            unit_type,
            goal_pos: pos,
            goal_layer: layer,
            state: BuildState::MoveToSite,
            building: None,
            finished: false,
        }
    }

    pub(super) fn is_valid(&self, unit: &Unit, world: &World) -> bool {
        let Some(ty) = world.types.get(self.unit_type) else {
            return false;
        };
        let can_build = world
            .types
            .get(unit.type_id)
            .is_some_and(|builder| builder.builds.contains(&self.unit_type));
        let site_ok = match self.building {
            Some(id) => world.units.get(id).is_some_and(Unit::is_alive_on_map),
            None => world.map.is_rect_on_map(self.goal_pos, ty.size, self.goal_layer),
        };
        can_build && site_ok
    }

    pub(super) fn execute(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) {
        if handle_wait(unit, ctx) {
            return;
        }
        match self.state {
            BuildState::MoveToSite => {
                let Some(size) = ctx.world.types.get(self.unit_type).map(|t| t.size) else {
                    self.finished = true;
                    return;
                };
                let goal = MoveGoal {
                    pos: self.goal_pos,
                    size,
                    layer: self.goal_layer,
                    min_range: 1,
                    max_range: 1,
                };
                match do_action_move(unit, &goal, ctx) {
                    MoveStatus::Reached => self.place(unit, ctx),
                    MoveStatus::Unreachable => {
                        tracing::debug!(unit = %unit.id, site = %self.goal_pos, "Build site unreachable");
                        self.finished = true;
                    }
                    MoveStatus::InProgress | MoveStatus::Blocked => {}
                }
            }
            BuildState::Constructing => {
                let alive = self
                    .building
                    .and_then(|id| ctx.world.units.get(id))
                    .is_some_and(Unit::is_alive_on_map);
                if !alive {
                    self.finished = true;
                    return;
                }
                if play_action(unit, AnimationKind::Build, ctx) {
                    self.construct_step(unit, ctx);
                }
            }
        }
    }

    fn place(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) {
        let Some((size, movement)) = ctx.world.types.get(self.unit_type).map(|t| (t.size, t.movement)) else {
            self.finished = true;
            return;
        };
        if !ctx
            .world
            .map
            .can_be_at(movement, self.goal_pos, size, self.goal_layer, false)
        {
            tracing::debug!(unit = %unit.id, site = %self.goal_pos, "Build site blocked");
            self.finished = true;
            return;
        }
        let id = match ctx
            .world
            .spawn_unit(self.unit_type, unit.player, self.goal_pos, self.goal_layer)
        {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(unit = %unit.id, %err, "Could not place building");
                self.finished = true;
                return;
            }
        };
        if let Some(building) = ctx.world.units.get_mut(id) {
            building.constructed = false;
            building.variables.get_mut(VariableId::HitPoints).value = 1;
        }
        ctx.events.spawned.push(id);
        self.building = Some(id);
        self.state = BuildState::Constructing;
        tracing::debug!(unit = %unit.id, building = %id, "Construction started");
    }

    fn construct_step(&mut self, unit: &Unit, ctx: &mut OrderContext<'_>) {
        let Some(id) = self.building else {
            return;
        };
        let build_time = ctx.world.types.get(self.unit_type).map_or(1, |t| t.build_time.max(1));
        let Some(building) = ctx.world.units.get_mut(id) else {
            return;
        };
        let max = building.variables.max(VariableId::HitPoints);
        let step = (max / i32::try_from(build_time).unwrap_or(i32::MAX)).max(1);
        building.variables.heal(step);
        if building.hit_points() >= max {
            building.constructed = true;
            ctx.events.buildings_completed.push(id);
            self.finished = true;
            tracing::debug!(unit = %unit.id, building = %id, "Construction complete");
        }
    }
}
