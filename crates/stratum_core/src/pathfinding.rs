//! Grid pathfinding toward range goals.
//!
//! Orders never ask for a full path; they ask "which tile next?" once per
//! tick through the [`Pathfinder`] trait. The default [`GridPathfinder`]
//! answers with an 8-way A* search whose goal is any position whose
//! footprint distance to the target lies inside `[min_range, max_range]`.
//!
//! Ties in the open set are broken by tile coordinates so every client
//! expands nodes in the same order.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt::Debug;

use crate::map::{GameMap, LayerId, MovementKind};
use crate::math::{rect_distance, TilePos, TileSize};
use crate::unit::UnitId;

/// One movement question from a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRequest {
    /// Unit asking.
    pub unit: UnitId,
    /// How it moves.
    pub movement: MovementKind,
    /// Current top-left tile.
    pub from: TilePos,
    /// Its footprint.
    pub size: TileSize,
    /// Its layer.
    pub layer: LayerId,
    /// Target top-left tile.
    pub goal_pos: TilePos,
    /// Target footprint.
    pub goal_size: TileSize,
    /// Target layer.
    pub goal_layer: LayerId,
    /// Inclusive minimum footprint distance to the target.
    pub min_range: i32,
    /// Inclusive maximum footprint distance to the target.
    pub max_range: i32,
    /// Whether the unit has accumulated enough progress to step this tick.
    pub can_step: bool,
    /// Node budget for a search.
    pub max_nodes: usize,
}

impl PathRequest {
    /// Whether a unit standing at `pos` satisfies the range goal.
    #[must_use]
    pub fn in_range_at(&self, pos: TilePos) -> bool {
        let d = rect_distance(pos, self.size, self.goal_pos, self.goal_size);
        d >= self.min_range && d <= self.max_range
    }
}

/// Answer to a [`PathRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathDecision {
    /// Already within range.
    Reached,
    /// Still travelling but not stepping this tick.
    Wait,
    /// Step to this adjacent tile.
    Step(TilePos),
    /// A path exists but other units block it right now.
    Blocked,
    /// No path exists.
    Unreachable,
}

/// Movement oracle used by orders.
pub trait Pathfinder: Debug {
    /// Decide the unit's next move toward its range goal.
    fn request_move(&mut self, map: &GameMap, request: &PathRequest) -> PathDecision;

    /// Whether the goal can be reached within `max_length` steps, ignoring units.
    fn is_reachable(&mut self, map: &GameMap, request: &PathRequest, max_length: usize) -> bool;
}

/// A* over the tile grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridPathfinder;

impl Pathfinder for GridPathfinder {
    fn request_move(&mut self, map: &GameMap, request: &PathRequest) -> PathDecision {
        if request.layer != request.goal_layer {
            return PathDecision::Unreachable;
        }
        if request.in_range_at(request.from) {
            return PathDecision::Reached;
        }
        if !request.can_step {
            return PathDecision::Wait;
        }

        let Some(path) = find_path(map, request, true) else {
            return PathDecision::Unreachable;
        };
        let Some(&next) = path.first() else {
            return PathDecision::Reached;
        };
        if map.can_be_at(request.movement, next, request.size, request.layer, false) {
            return PathDecision::Step(next);
        }

        // The terrain path is blocked by units; look for a detour around them.
        match find_path(map, request, false).and_then(|p| p.first().copied()) {
            Some(detour) => PathDecision::Step(detour),
            None => PathDecision::Blocked,
        }
    }

    fn is_reachable(&mut self, map: &GameMap, request: &PathRequest, max_length: usize) -> bool {
        if request.layer != request.goal_layer {
            return false;
        }
        if request.in_range_at(request.from) {
            return true;
        }
        find_path(map, request, true).is_some_and(|path| path.len() <= max_length)
    }
}

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    pos: TilePos,
    f_score: u32,
    /// Tie-breaker for determinism: lower coordinates first.
    tie_breaker: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for min-heap behavior.
        match other.f_score.cmp(&self.f_score) {
            Ordering::Equal => other.tie_breaker.cmp(&self.tie_breaker),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Direction offsets for 8-directional movement.
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),   // East
    (1, 1),   // Southeast
    (0, 1),   // South
    (-1, 1),  // Southwest
    (-1, 0),  // West
    (-1, -1), // Northwest
    (0, -1),  // North
    (1, -1),  // Northeast
];

const STRAIGHT_COST: u32 = 10;
const DIAGONAL_COST: u32 = 14;

#[inline]
fn coords_to_tie_breaker(pos: TilePos) -> u64 {
    (u64::from(pos.y as u32) << 32) | u64::from(pos.x as u32)
}

/// Lower bound on the steps left from `pos`: Chebyshev gap past max range.
fn heuristic(pos: TilePos, request: &PathRequest) -> u32 {
    let gap = |a: i32, a_len: i32, b: i32, b_len: i32| {
        if a + a_len <= b {
            b - (a + a_len) + 1
        } else if b + b_len <= a {
            a - (b + b_len) + 1
        } else {
            0
        }
    };
    let dx = gap(pos.x, request.size.width, request.goal_pos.x, request.goal_size.width);
    let dy = gap(pos.y, request.size.height, request.goal_pos.y, request.goal_size.height);
    (dx.max(dy) - request.max_range).max(0) as u32 * STRAIGHT_COST
}

fn passable(map: &GameMap, request: &PathRequest, pos: TilePos, ignore_units: bool) -> bool {
    map.can_be_at(request.movement, pos, request.size, request.layer, ignore_units)
}

/// Search a path to the range goal; returns the tiles after the start.
///
/// With `ignore_units` set, mobile-unit occupancy does not block.
fn find_path(map: &GameMap, request: &PathRequest, ignore_units: bool) -> Option<Vec<TilePos>> {
    let start = request.from;
    let mut open_set = BinaryHeap::new();
    let mut came_from: HashMap<TilePos, TilePos> = HashMap::new();
    let mut g_score: HashMap<TilePos, u32> = HashMap::new();
    let mut expanded = 0usize;

    g_score.insert(start, 0);
    open_set.push(AStarNode {
        pos: start,
        f_score: heuristic(start, request),
        tie_breaker: coords_to_tie_breaker(start),
    });

    while let Some(current) = open_set.pop() {
        if request.in_range_at(current.pos) {
            return Some(reconstruct_path(&came_from, start, current.pos));
        }
        expanded += 1;
        if expanded > request.max_nodes {
            tracing::trace!(unit = %request.unit, expanded, "Path search budget exhausted");
            return None;
        }

        let current_g = g_score.get(&current.pos).copied().unwrap_or(u32::MAX);
        if current.f_score > current_g.saturating_add(heuristic(current.pos, request)) {
            // Stale heap entry.
            continue;
        }

        for &(dx, dy) in &DIRECTIONS {
            let next = current.pos.offset(dx, dy);
            if !passable(map, request, next, ignore_units) {
                continue;
            }
            // No corner cutting.
            if dx != 0
                && dy != 0
                && (!passable(map, request, current.pos.offset(dx, 0), ignore_units)
                    || !passable(map, request, current.pos.offset(0, dy), ignore_units))
            {
                continue;
            }

            let step = if dx != 0 && dy != 0 {
                DIAGONAL_COST
            } else {
                STRAIGHT_COST
            };
            let tentative_g = current_g + step;
            if tentative_g < g_score.get(&next).copied().unwrap_or(u32::MAX) {
                came_from.insert(next, current.pos);
                g_score.insert(next, tentative_g);
                open_set.push(AStarNode {
                    pos: next,
                    f_score: tentative_g + heuristic(next, request),
                    tie_breaker: coords_to_tie_breaker(next),
                });
            }
        }
    }

    None
}

fn reconstruct_path(came_from: &HashMap<TilePos, TilePos>, start: TilePos, goal: TilePos) -> Vec<TilePos> {
    let mut path = Vec::new();
    let mut current = goal;
    while current != start {
        path.push(current);
        match came_from.get(&current) {
            Some(&prev) => current = prev,
            None => break,
        }
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapFieldFlags;

    fn request(from: TilePos, goal: TilePos, min: i32, max: i32) -> PathRequest {
        PathRequest {
            unit: UnitId::new(0, 0),
            movement: MovementKind::Land,
            from,
            size: TileSize::ONE,
            layer: 0,
            goal_pos: goal,
            goal_size: TileSize::ONE,
            goal_layer: 0,
            min_range: min,
            max_range: max,
            can_step: true,
            max_nodes: 4096,
        }
    }

    #[test]
    fn test_reached_when_in_range() {
        let map = GameMap::new(10, 10, 1);
        let mut pf = GridPathfinder;
        let req = request(TilePos::new(0, 0), TilePos::new(2, 0), 0, 2);
        assert_eq!(pf.request_move(&map, &req), PathDecision::Reached);
    }

    #[test]
    fn test_step_toward_goal() {
        let map = GameMap::new(10, 10, 1);
        let mut pf = GridPathfinder;
        let req = request(TilePos::new(0, 0), TilePos::new(5, 0), 0, 0);
        assert_eq!(pf.request_move(&map, &req), PathDecision::Step(TilePos::new(1, 0)));
    }

    #[test]
    fn test_wait_when_not_ready() {
        let map = GameMap::new(10, 10, 1);
        let mut pf = GridPathfinder;
        let mut req = request(TilePos::new(0, 0), TilePos::new(5, 0), 0, 0);
        req.can_step = false;
        assert_eq!(pf.request_move(&map, &req), PathDecision::Wait);
    }

    #[test]
    fn test_unreachable_behind_wall() {
        let mut map = GameMap::new(10, 10, 1);
        for y in 0..10 {
            map.insert_flags(TilePos::new(4, y), 0, MapFieldFlags::LAND_UNPASSABLE);
        }
        let mut pf = GridPathfinder;
        let req = request(TilePos::new(0, 0), TilePos::new(8, 0), 0, 0);
        assert_eq!(pf.request_move(&map, &req), PathDecision::Unreachable);
        assert!(!pf.is_reachable(&map, &req, 100));
    }

    #[test]
    fn test_blocked_by_units_in_corridor() {
        let mut map = GameMap::new(5, 3, 1);
        for x in 0..5 {
            map.insert_flags(TilePos::new(x, 0), 0, MapFieldFlags::LAND_UNPASSABLE);
            map.insert_flags(TilePos::new(x, 2), 0, MapFieldFlags::LAND_UNPASSABLE);
        }
        map.insert_flags(TilePos::new(1, 1), 0, MapFieldFlags::LAND_UNIT);
        let mut pf = GridPathfinder;
        let req = request(TilePos::new(0, 1), TilePos::new(4, 1), 0, 0);
        assert_eq!(pf.request_move(&map, &req), PathDecision::Blocked);
    }

    #[test]
    fn test_min_range_moves_away() {
        let map = GameMap::new(10, 10, 1);
        let mut pf = GridPathfinder;
        let req = request(TilePos::new(4, 4), TilePos::new(5, 4), 3, 3);
        match pf.request_move(&map, &req) {
            PathDecision::Step(next) => {
                assert!(rect_distance(next, TileSize::ONE, req.goal_pos, TileSize::ONE) >= 1);
                assert!(next.x <= 4);
            }
            other => panic!("expected a step, got {other:?}"),
        }
    }

    #[test]
    fn test_determinism() {
        let mut map = GameMap::new(20, 20, 1);
        for y in 3..17 {
            map.insert_flags(TilePos::new(10, y), 0, MapFieldFlags::LAND_UNPASSABLE);
        }
        let req = request(TilePos::new(2, 10), TilePos::new(18, 10), 0, 1);
        let a = find_path(&map, &req, true);
        let b = find_path(&map, &req, true);
        assert!(a.is_some());
        assert_eq!(a, b);
    }
}
