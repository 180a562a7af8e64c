//! Collaborator stand-ins for order tests.
//!
//! Orders talk to movement, threat and combat through traits; these stubs
//! pin one of them down so a test can watch a single order's reaction.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use stratum_core::map::GameMap;
use stratum_core::pathfinding::{GridPathfinder, PathDecision, PathRequest, Pathfinder};
use stratum_core::threat::{ThreatEvaluator, ThreatScore};
use stratum_core::unit::{Unit, UnitId};
use stratum_core::world::World;

/// Shared record of the path requests a stub has seen.
pub type RequestLog = Arc<Mutex<Vec<PathRequest>>>;

fn record(log: &RequestLog, request: &PathRequest) {
    if let Ok(mut seen) = log.lock() {
        seen.push(request.clone());
    }
}

/// Reports every goal out of reach unless the unit already stands in range.
#[derive(Debug, Default)]
pub struct AlwaysUnreachable {
    log: RequestLog,
}

impl AlwaysUnreachable {
    /// A stub and a handle to its request log.
    #[must_use]
    pub fn new() -> (Self, RequestLog) {
        let log = RequestLog::default();
        (Self { log: Arc::clone(&log) }, log)
    }
}

impl Pathfinder for AlwaysUnreachable {
    fn request_move(&mut self, _map: &GameMap, request: &PathRequest) -> PathDecision {
        record(&self.log, request);
        if request.in_range_at(request.from) {
            PathDecision::Reached
        } else {
            PathDecision::Unreachable
        }
    }

    fn is_reachable(&mut self, _map: &GameMap, _request: &PathRequest, _max_length: usize) -> bool {
        false
    }
}

/// Plays back fixed answers, then defers to [`GridPathfinder`].
#[derive(Debug, Default)]
pub struct ScriptedPathfinder {
    script: VecDeque<PathDecision>,
    fallback: GridPathfinder,
    log: RequestLog,
}

impl ScriptedPathfinder {
    /// A stub answering with `script` first.
    #[must_use]
    pub fn new(script: impl IntoIterator<Item = PathDecision>) -> (Self, RequestLog) {
        let log = RequestLog::default();
        let stub = Self {
            script: script.into_iter().collect(),
            fallback: GridPathfinder,
            log: Arc::clone(&log),
        };
        (stub, log)
    }
}

impl Pathfinder for ScriptedPathfinder {
    fn request_move(&mut self, map: &GameMap, request: &PathRequest) -> PathDecision {
        record(&self.log, request);
        match self.script.pop_front() {
            Some(decision) => decision,
            None => self.fallback.request_move(map, request),
        }
    }

    fn is_reachable(&mut self, map: &GameMap, request: &PathRequest, max_length: usize) -> bool {
        self.fallback.is_reachable(map, request, max_length)
    }
}

/// Rates every target the same.
#[derive(Debug, Clone, Copy)]
pub struct ConstantThreat(pub ThreatScore);

impl Default for ConstantThreat {
    fn default() -> Self {
        Self(ThreatScore::from_int(0))
    }
}

impl ThreatEvaluator for ConstantThreat {
    fn threat(&self, _attacker: &Unit, _target: &Unit, _world: &World) -> ThreatScore {
        self.0
    }
}

/// Rates one unit as the obvious target and everything else as poor.
#[derive(Debug, Clone, Copy)]
pub struct FavoredTarget(pub UnitId);

impl ThreatEvaluator for FavoredTarget {
    fn threat(&self, _attacker: &Unit, target: &Unit, _world: &World) -> ThreatScore {
        if target.id == self.0 {
            ThreatScore::from_int(0)
        } else {
            ThreatScore::from_int(100)
        }
    }
}

/// Number of requests in a log.
#[must_use]
pub fn request_count(log: &RequestLog) -> usize {
    log.lock().map_or(0, |seen| seen.len())
}

/// Largest `max_range` asked for so far.
#[must_use]
pub fn widest_range(log: &RequestLog) -> Option<i32> {
    log.lock().ok()?.iter().map(|r| r.max_range).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_core::map::MovementKind;
    use stratum_core::math::{TilePos, TileSize};
    use stratum_core::unit::UnitId;

    fn request(from: TilePos) -> PathRequest {
        PathRequest {
            unit: UnitId::new(0, 0),
            movement: MovementKind::Land,
            from,
            size: TileSize::new(1, 1),
            layer: 0,
            goal_pos: TilePos::new(10, 10),
            goal_size: TileSize::new(1, 1),
            goal_layer: 0,
            min_range: 0,
            max_range: 1,
            can_step: true,
            max_nodes: 256,
        }
    }

    #[test]
    fn test_unreachable_stub_logs_requests() {
        let map = GameMap::new(16, 16, 1);
        let (mut stub, log) = AlwaysUnreachable::new();
        assert_eq!(stub.request_move(&map, &request(TilePos::new(0, 0))), PathDecision::Unreachable);
        assert_eq!(stub.request_move(&map, &request(TilePos::new(9, 9))), PathDecision::Reached);
        assert_eq!(request_count(&log), 2);
        assert_eq!(widest_range(&log), Some(1));
    }

    #[test]
    fn test_script_then_fallback() {
        let map = GameMap::new(16, 16, 1);
        let (mut stub, _log) = ScriptedPathfinder::new([PathDecision::Blocked]);
        assert_eq!(stub.request_move(&map, &request(TilePos::new(0, 0))), PathDecision::Blocked);
        assert!(matches!(
            stub.request_move(&map, &request(TilePos::new(0, 0))),
            PathDecision::Step(_)
        ));
    }
}
