//! The shared game world: map, players, units and type data.

use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::error::{GameError, Result};
use crate::map::{GameMap, LayerId, MapFieldFlags};
use crate::math::TilePos;
use crate::player::{PlayerId, PlayerTable};
use crate::storage::UnitStorage;
use crate::unit::{Unit, UnitId};
use crate::unit_type::{UnitTypeFlags, UnitTypeId, UnitTypeRegistry};

/// Everything orders can observe and change, except the acting unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct World {
    /// Tile map.
    pub map: GameMap,
    /// Players.
    pub players: PlayerTable,
    /// Units.
    pub units: UnitStorage,
    /// Unit types and spells.
    pub types: UnitTypeRegistry,
    /// Tuning knobs.
    pub config: SimulationConfig,
}

impl World {
    /// Create a world without units.
    #[must_use]
    pub fn new(map: GameMap, players: PlayerTable, types: UnitTypeRegistry, config: SimulationConfig) -> Self {
        Self {
            map,
            players,
            units: UnitStorage::new(),
            types,
            config,
        }
    }

    /// Place a new, fully built unit.
    ///
    /// # Errors
    ///
    /// Fails for unknown types or players, and for footprints off the map.
    pub fn spawn_unit(
        &mut self,
        type_id: UnitTypeId,
        player: PlayerId,
        pos: TilePos,
        layer: LayerId,
    ) -> Result<UnitId> {
        let ty = self.types.require(type_id)?;
        self.players.require(player)?;
        if !self.map.is_rect_on_map(pos, ty.size, layer) {
            return Err(GameError::InvalidCommand(format!(
                "cannot place {} at {pos} on layer {layer}",
                ty.ident
            )));
        }
        let id = self
            .units
            .insert_with(|id| Unit::from_type(id, ty, player, pos, layer));
        if let Some(unit) = self.units.take(id) {
            self.mark_unit_occupancy(&unit);
            self.mark_unit_sight(&unit);
            self.units.restore(unit);
        }
        if let Some(owner) = self.players.get_mut(player) {
            owner.unit_count += 1;
        }
        tracing::trace!(unit = %id, %type_id, %player, %pos, "Spawned unit");
        Ok(id)
    }

    /// Occupancy flag the unit's footprint carries, if any.
    fn occupancy_flag(&self, unit: &Unit) -> Option<MapFieldFlags> {
        let ty = self.types.get(unit.type_id)?;
        if !ty.marks_occupancy() {
            return None;
        }
        Some(if ty.has(UnitTypeFlags::BUILDING) {
            MapFieldFlags::BUILDING
        } else {
            ty.movement.occupancy()
        })
    }

    /// Mark the tiles under a live unit as occupied.
    pub fn mark_unit_occupancy(&mut self, unit: &Unit) {
        if !unit.is_alive_on_map() {
            return;
        }
        if let Some(flag) = self.occupancy_flag(unit) {
            self.map.mark_occupancy(unit.tile_pos, unit.size, unit.layer, flag);
        }
    }

    /// Clear a unit's occupancy marks.
    pub fn unmark_unit_occupancy(&mut self, unit: &Unit) {
        if let Some(flag) = self.occupancy_flag(unit) {
            self.map.unmark_occupancy(unit.tile_pos, unit.size, unit.layer, flag);
        }
    }

    /// Add the unit's vision to its owner's sight map.
    pub fn mark_unit_sight(&mut self, unit: &Unit) {
        if unit.removed || unit.released {
            return;
        }
        self.map
            .mark_sight(unit.player, unit.tile_pos, unit.size, unit.current_sight_range, unit.layer);
    }

    /// Remove the unit's vision from its owner's sight map.
    pub fn unmark_unit_sight(&mut self, unit: &Unit) {
        if unit.removed || unit.released {
            return;
        }
        self.map
            .unmark_sight(unit.player, unit.tile_pos, unit.size, unit.current_sight_range, unit.layer);
    }

    /// Take a unit off the map for good: vision, occupancy and slot.
    ///
    /// Used for units other than the one currently acting.
    pub fn release_unit(&mut self, id: UnitId) -> Option<Unit> {
        let mut unit = self.units.take(id)?;
        if !unit.destroyed {
            self.unmark_unit_occupancy(&unit);
        }
        self.unmark_unit_sight(&unit);
        unit.removed = true;
        unit.released = true;
        self.units.free_slot(id);
        self.note_released(unit.player);
        tracing::trace!(unit = %id, "Released unit");
        Some(unit)
    }

    /// Bookkeeping after a slot was freed.
    pub fn note_released(&mut self, player: PlayerId) {
        if let Some(owner) = self.players.get_mut(player) {
            owner.unit_count = owner.unit_count.saturating_sub(1);
        }
    }
}
