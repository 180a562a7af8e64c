//! Spatial queries over the unit storage.
//!
//! Results are always in ascending [`UnitId`] order, so any selection made
//! from them is deterministic.

use crate::map::LayerId;
use crate::math::TilePos;
use crate::unit::{Unit, UnitId};
use crate::world::World;

fn intersects(unit: &Unit, min: TilePos, max: TilePos, layer: LayerId) -> bool {
    unit.layer == layer
        && unit.tile_pos.x <= max.x
        && unit.tile_pos.y <= max.y
        && unit.tile_pos.x + unit.size.width - 1 >= min.x
        && unit.tile_pos.y + unit.size.height - 1 >= min.y
}

/// Units on the map whose footprint intersects the inclusive rectangle.
pub fn select(
    world: &World,
    min: TilePos,
    max: TilePos,
    layer: LayerId,
    mut filter: impl FnMut(&Unit) -> bool,
) -> Vec<UnitId> {
    world
        .units
        .iter()
        .filter(|u| !u.removed && intersects(u, min, max, layer))
        .filter(|u| filter(u))
        .map(|u| u.id)
        .collect()
}

/// Units within `radius` tiles of `center`'s footprint bounding box.
///
/// `center` itself is never part of the result.
pub fn select_around(
    world: &World,
    center: &Unit,
    radius: i32,
    mut filter: impl FnMut(&Unit) -> bool,
) -> Vec<UnitId> {
    let min = center.tile_pos.offset(-radius, -radius);
    let max = center
        .tile_pos
        .offset(center.size.width - 1 + radius, center.size.height - 1 + radius);
    select(world, min, max, center.layer, |u| u.id != center.id && filter(u))
}

/// First unit (lowest id) in the rectangle matching `filter`.
pub fn find_unit_if(
    world: &World,
    min: TilePos,
    max: TilePos,
    layer: LayerId,
    mut filter: impl FnMut(&Unit) -> bool,
) -> Option<UnitId> {
    world
        .units
        .iter()
        .find(|u| !u.removed && intersects(u, min, max, layer) && filter(u))
        .map(|u| u.id)
}
