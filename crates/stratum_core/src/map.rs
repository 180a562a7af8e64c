//! Tile map: terrain flags, unit occupancy and per-player vision.
//!
//! A map is a stack of equally-shaped layers. Each tile carries a set of
//! [`MapFieldFlags`]; units mark the tiles under their footprint so that
//! movement and line checks only need to look at flags.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::math::{distance_to_tile, TilePos, TileSize};
use crate::player::PlayerId;

/// Index of a map layer.
pub type LayerId = usize;

bitflags! {
    /// Per-tile terrain and occupancy flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MapFieldFlags: u16 {
        /// Ground units cannot enter.
        const LAND_UNPASSABLE = 1 << 0;
        /// Blocks flyers and missiles (cliffs, tall walls).
        const AIR_UNPASSABLE = 1 << 1;
        /// Deep water.
        const WATER = 1 << 2;
        /// A wall segment.
        const WALL = 1 << 3;
        /// Occupied by a building.
        const BUILDING = 1 << 4;
        /// Occupied by a ground unit.
        const LAND_UNIT = 1 << 5;
        /// Occupied by a flyer.
        const AIR_UNIT = 1 << 6;
        /// Occupied by a ship.
        const SEA_UNIT = 1 << 7;
    }
}

impl MapFieldFlags {
    /// Flags set by units rather than terrain.
    pub const UNITS: Self = Self::LAND_UNIT.union(Self::AIR_UNIT).union(Self::SEA_UNIT);
}

/// How a unit type moves over the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MovementKind {
    /// Walks on dry land.
    #[default]
    Land,
    /// Flies over everything but tall obstacles.
    Air,
    /// Sails on water.
    Naval,
}

impl MovementKind {
    /// Whether a tile with `flags` can hold this kind of unit.
    ///
    /// With `ignore_units` set, occupancy by mobile units is disregarded.
    #[must_use]
    pub fn can_enter(self, flags: MapFieldFlags, ignore_units: bool) -> bool {
        let flags = if ignore_units {
            flags.difference(MapFieldFlags::UNITS)
        } else {
            flags
        };
        match self {
            Self::Land => !flags.intersects(
                MapFieldFlags::LAND_UNPASSABLE
                    | MapFieldFlags::WATER
                    | MapFieldFlags::WALL
                    | MapFieldFlags::BUILDING
                    | MapFieldFlags::LAND_UNIT,
            ),
            Self::Air => !flags.intersects(MapFieldFlags::AIR_UNPASSABLE | MapFieldFlags::AIR_UNIT),
            Self::Naval => {
                flags.contains(MapFieldFlags::WATER)
                    && !flags.intersects(MapFieldFlags::BUILDING | MapFieldFlags::SEA_UNIT)
            }
        }
    }

    /// Occupancy flag a mobile unit of this kind marks.
    #[must_use]
    pub const fn occupancy(self) -> MapFieldFlags {
        match self {
            Self::Land => MapFieldFlags::LAND_UNIT,
            Self::Air => MapFieldFlags::AIR_UNIT,
            Self::Naval => MapFieldFlags::SEA_UNIT,
        }
    }
}

/// One layer of tiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapLayer {
    width: i32,
    height: i32,
    fields: Vec<MapFieldFlags>,
    /// Vision counters, `players * tiles` long, player-major.
    vision: Vec<u16>,
    explored: Vec<bool>,
    players: usize,
}

impl MapLayer {
    fn new(width: i32, height: i32) -> Self {
        let tiles = (width.max(0) * height.max(0)) as usize;
        Self {
            width,
            height,
            fields: vec![MapFieldFlags::empty(); tiles],
            vision: Vec::new(),
            explored: Vec::new(),
            players: 0,
        }
    }

    fn index(&self, pos: TilePos) -> Option<usize> {
        if pos.x < 0 || pos.y < 0 || pos.x >= self.width || pos.y >= self.height {
            return None;
        }
        Some((pos.y * self.width + pos.x) as usize)
    }

    fn tiles(&self) -> usize {
        self.fields.len()
    }

    fn ensure_player(&mut self, player: PlayerId) {
        let needed = player.index() + 1;
        if needed > self.players {
            self.players = needed;
            self.vision.resize(needed * self.tiles(), 0);
            self.explored.resize(needed * self.tiles(), false);
        }
    }
}

/// The whole map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameMap {
    layers: Vec<MapLayer>,
}

impl GameMap {
    /// Create a map of `layer_count` empty layers of the same size.
    #[must_use]
    pub fn new(width: i32, height: i32, layer_count: usize) -> Self {
        Self {
            layers: (0..layer_count.max(1))
                .map(|_| MapLayer::new(width, height))
                .collect(),
        }
    }

    /// Number of layers.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Width of a layer in tiles (0 for unknown layers).
    #[must_use]
    pub fn width(&self, layer: LayerId) -> i32 {
        self.layers.get(layer).map_or(0, |l| l.width)
    }

    /// Height of a layer in tiles (0 for unknown layers).
    #[must_use]
    pub fn height(&self, layer: LayerId) -> i32 {
        self.layers.get(layer).map_or(0, |l| l.height)
    }

    /// Whether `pos` lies on `layer`.
    #[must_use]
    pub fn is_point_on_map(&self, pos: TilePos, layer: LayerId) -> bool {
        self.layers
            .get(layer)
            .is_some_and(|l| l.index(pos).is_some())
    }

    /// Whether the whole footprint lies on `layer`.
    #[must_use]
    pub fn is_rect_on_map(&self, pos: TilePos, size: TileSize, layer: LayerId) -> bool {
        self.is_point_on_map(pos, layer)
            && self.is_point_on_map(pos.offset(size.width - 1, size.height - 1), layer)
    }

    /// Clamp `pos` into the bounds of `layer`.
    #[must_use]
    pub fn clamp(&self, pos: TilePos, layer: LayerId) -> TilePos {
        let w = (self.width(layer) - 1).max(0);
        let h = (self.height(layer) - 1).max(0);
        TilePos::new(pos.x.clamp(0, w), pos.y.clamp(0, h))
    }

    /// Flags of a tile; off-map tiles read as impassable to everything.
    #[must_use]
    pub fn field_flags(&self, pos: TilePos, layer: LayerId) -> MapFieldFlags {
        self.layers
            .get(layer)
            .and_then(|l| l.index(pos).map(|i| l.fields[i]))
            .unwrap_or(MapFieldFlags::LAND_UNPASSABLE | MapFieldFlags::AIR_UNPASSABLE)
    }

    /// Add terrain flags to a tile.
    pub fn insert_flags(&mut self, pos: TilePos, layer: LayerId, flags: MapFieldFlags) {
        if let Some(l) = self.layers.get_mut(layer) {
            if let Some(i) = l.index(pos) {
                l.fields[i].insert(flags);
            }
        }
    }

    /// Remove flags from a tile.
    pub fn remove_flags(&mut self, pos: TilePos, layer: LayerId, flags: MapFieldFlags) {
        if let Some(l) = self.layers.get_mut(layer) {
            if let Some(i) = l.index(pos) {
                l.fields[i].remove(flags);
            }
        }
    }

    /// Whether the tile holds a wall segment.
    #[must_use]
    pub fn wall_on_map(&self, pos: TilePos, layer: LayerId) -> bool {
        self.is_point_on_map(pos, layer)
            && self.field_flags(pos, layer).contains(MapFieldFlags::WALL)
    }

    /// Whether a unit of `kind` with footprint `size` fits at `pos`.
    #[must_use]
    pub fn can_be_at(
        &self,
        kind: MovementKind,
        pos: TilePos,
        size: TileSize,
        layer: LayerId,
        ignore_units: bool,
    ) -> bool {
        if !self.is_rect_on_map(pos, size, layer) {
            return false;
        }
        for dy in 0..size.height {
            for dx in 0..size.width {
                let flags = self.field_flags(pos.offset(dx, dy), layer);
                if !kind.can_enter(flags, ignore_units) {
                    return false;
                }
            }
        }
        true
    }

    /// Whether the straight line between `a` and `b` crosses no tile with
    /// any of `blocking` set. The endpoints themselves are not checked.
    #[must_use]
    pub fn line_clear(
        &self,
        a: TilePos,
        b: TilePos,
        blocking: MapFieldFlags,
        layer: LayerId,
    ) -> bool {
        let dx = (b.x - a.x).abs();
        let dy = (b.y - a.y).abs();
        let sx = if a.x < b.x { 1 } else { -1 };
        let sy = if a.y < b.y { 1 } else { -1 };
        let mut err = dx - dy;
        let (mut x, mut y) = (a.x, a.y);

        loop {
            let e2 = 2 * err;
            if e2 > -dy {
                err -= dy;
                x += sx;
            }
            if e2 < dx {
                err += dx;
                y += sy;
            }
            if (x, y) == (b.x, b.y) {
                return true;
            }
            if self.field_flags(TilePos::new(x, y), layer).intersects(blocking) {
                return false;
            }
        }
    }

    /// Mark a footprint with occupancy flags.
    pub fn mark_occupancy(&mut self, pos: TilePos, size: TileSize, layer: LayerId, flag: MapFieldFlags) {
        for dy in 0..size.height {
            for dx in 0..size.width {
                self.insert_flags(pos.offset(dx, dy), layer, flag);
            }
        }
    }

    /// Clear occupancy flags from a footprint.
    pub fn unmark_occupancy(&mut self, pos: TilePos, size: TileSize, layer: LayerId, flag: MapFieldFlags) {
        for dy in 0..size.height {
            for dx in 0..size.width {
                self.remove_flags(pos.offset(dx, dy), layer, flag);
            }
        }
    }

    fn for_each_sight_tile(
        &mut self,
        player: PlayerId,
        pos: TilePos,
        size: TileSize,
        range: i32,
        layer: LayerId,
        mut apply: impl FnMut(&mut u16, &mut bool),
    ) {
        let Some(l) = self.layers.get_mut(layer) else {
            return;
        };
        l.ensure_player(player);
        let base = player.index() * l.tiles();
        let range = range.max(0);
        for y in (pos.y - range)..(pos.y + size.height + range) {
            for x in (pos.x - range)..(pos.x + size.width + range) {
                let tile = TilePos::new(x, y);
                let Some(i) = l.index(tile) else {
                    continue;
                };
                if distance_to_tile(pos, size, tile) <= range {
                    apply(&mut l.vision[base + i], &mut l.explored[base + i]);
                }
            }
        }
    }

    /// Add one vision count to every tile within `range` of the footprint.
    pub fn mark_sight(&mut self, player: PlayerId, pos: TilePos, size: TileSize, range: i32, layer: LayerId) {
        self.for_each_sight_tile(player, pos, size, range, layer, |count, explored| {
            *count = count.saturating_add(1);
            *explored = true;
        });
    }

    /// Remove one vision count from every tile within `range` of the footprint.
    pub fn unmark_sight(&mut self, player: PlayerId, pos: TilePos, size: TileSize, range: i32, layer: LayerId) {
        self.for_each_sight_tile(player, pos, size, range, layer, |count, _| {
            *count = count.saturating_sub(1);
        });
    }

    /// Whether `player` currently sees the tile.
    #[must_use]
    pub fn is_visible(&self, player: PlayerId, pos: TilePos, layer: LayerId) -> bool {
        self.layers.get(layer).is_some_and(|l| {
            l.index(pos).is_some_and(|i| {
                player.index() < l.players && l.vision[player.index() * l.tiles() + i] > 0
            })
        })
    }

    /// Whether `player` has ever seen the tile.
    #[must_use]
    pub fn is_explored(&self, player: PlayerId, pos: TilePos, layer: LayerId) -> bool {
        self.layers.get(layer).is_some_and(|l| {
            l.index(pos).is_some_and(|i| {
                player.index() < l.players && l.explored[player.index() * l.tiles() + i]
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_on_map_and_clamp() {
        let map = GameMap::new(10, 8, 2);
        assert!(map.is_point_on_map(TilePos::new(9, 7), 1));
        assert!(!map.is_point_on_map(TilePos::new(10, 0), 0));
        assert!(!map.is_point_on_map(TilePos::new(0, 0), 2));
        assert_eq!(map.clamp(TilePos::new(-3, 20), 0), TilePos::new(0, 7));
    }

    #[test]
    fn test_wall_and_line_clear() {
        let mut map = GameMap::new(10, 10, 1);
        map.insert_flags(TilePos::new(3, 0), 0, MapFieldFlags::WALL | MapFieldFlags::AIR_UNPASSABLE);
        assert!(map.wall_on_map(TilePos::new(3, 0), 0));
        assert!(!map.line_clear(TilePos::new(0, 0), TilePos::new(6, 0), MapFieldFlags::AIR_UNPASSABLE, 0));
        assert!(map.line_clear(TilePos::new(0, 2), TilePos::new(6, 2), MapFieldFlags::AIR_UNPASSABLE, 0));
        // Endpoints are never checked.
        assert!(map.line_clear(TilePos::new(3, 0), TilePos::new(4, 0), MapFieldFlags::AIR_UNPASSABLE, 0));
        assert!(map.line_clear(TilePos::new(2, 2), TilePos::new(2, 2), MapFieldFlags::AIR_UNPASSABLE, 0));
    }

    #[test]
    fn test_can_be_at_respects_kind() {
        let mut map = GameMap::new(5, 5, 1);
        map.insert_flags(TilePos::new(1, 1), 0, MapFieldFlags::WATER);
        map.mark_occupancy(TilePos::new(2, 2), TileSize::ONE, 0, MapFieldFlags::LAND_UNIT);

        assert!(!map.can_be_at(MovementKind::Land, TilePos::new(1, 1), TileSize::ONE, 0, false));
        assert!(map.can_be_at(MovementKind::Naval, TilePos::new(1, 1), TileSize::ONE, 0, false));
        assert!(map.can_be_at(MovementKind::Air, TilePos::new(2, 2), TileSize::ONE, 0, false));
        assert!(!map.can_be_at(MovementKind::Land, TilePos::new(2, 2), TileSize::ONE, 0, false));
        assert!(map.can_be_at(MovementKind::Land, TilePos::new(2, 2), TileSize::ONE, 0, true));
        assert!(!map.can_be_at(MovementKind::Land, TilePos::new(4, 4), TileSize::new(2, 2), 0, false));
    }

    #[test]
    fn test_sight_marks_are_counted() {
        let mut map = GameMap::new(10, 10, 1);
        let p = PlayerId(1);
        map.mark_sight(p, TilePos::new(5, 5), TileSize::ONE, 2, 0);
        map.mark_sight(p, TilePos::new(5, 5), TileSize::ONE, 2, 0);
        assert!(map.is_visible(p, TilePos::new(7, 5), 0));
        assert!(!map.is_visible(p, TilePos::new(8, 5), 0));
        assert!(!map.is_visible(PlayerId(0), TilePos::new(5, 5), 0));

        map.unmark_sight(p, TilePos::new(5, 5), TileSize::ONE, 2, 0);
        assert!(map.is_visible(p, TilePos::new(5, 5), 0));
        map.unmark_sight(p, TilePos::new(5, 5), TileSize::ONE, 2, 0);
        assert!(!map.is_visible(p, TilePos::new(5, 5), 0));
        assert!(map.is_explored(p, TilePos::new(5, 5), 0));
    }
}
