//! Test fixtures and helpers.
//!
//! Pre-built worlds on the standard unit roster (`data/units.ron`) and a
//! small [`Harness`] that keeps test bodies about orders rather than setup.

use stratum_core::commands::Command;
use stratum_core::config::SimulationConfig;
use stratum_core::map::{GameMap, MapFieldFlags};
use stratum_core::math::{Fixed, TilePos};
use stratum_core::orders::{Order, OrderKind};
use stratum_core::player::{PlayerId, PlayerKind, PlayerTable};
use stratum_core::simulation::{Services, Simulation, TickEvents};
use stratum_core::unit::{Unit, UnitId, VariableId};
use stratum_core::unit_type::{UnitTypeId, UnitTypeRegistry};
use stratum_core::world::World;

/// The standard unit roster.
pub const STANDARD_DATA: &str = include_str!("../../../data/units.ron");

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Parse the standard roster.
///
/// # Panics
///
/// Panics if the bundled data file is broken.
#[must_use]
pub fn standard_types() -> UnitTypeRegistry {
    UnitTypeRegistry::from_ron_str(STANDARD_DATA).expect("bundled unit data is valid")
}

/// Who drives a player in a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// A person without AI assistance.
    Human,
    /// The computer.
    Ai,
}

/// Two mutually hostile players on different teams.
#[must_use]
pub fn rivals(first: Control, second: Control) -> PlayerTable {
    let kind = |c| match c {
        Control::Human => PlayerKind::Person,
        Control::Ai => PlayerKind::Computer,
    };
    let mut players = PlayerTable::new();
    let a = players.add("red", kind(first), 0);
    let b = players.add("blue", kind(second), 1);
    players.set_enemy_with(a, b);
    players
}

/// A config without fog of war.
#[must_use]
pub fn open_config() -> SimulationConfig {
    SimulationConfig {
        fog_of_war: false,
        ..SimulationConfig::default()
    }
}

/// A single-layer world on the standard roster.
#[must_use]
pub fn world(width: i32, height: i32, players: PlayerTable, config: SimulationConfig) -> World {
    World::new(GameMap::new(width, height, 1), players, standard_types(), config)
}

/// A simulation with a thin test API on top.
#[derive(Debug)]
pub struct Harness {
    /// The simulation under test.
    pub sim: Simulation,
}

impl Harness {
    /// Two human rivals on an open map.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        Self::with_players(width, height, rivals(Control::Human, Control::Human), 1)
    }

    /// Chosen players and seed on an open map.
    #[must_use]
    pub fn with_players(width: i32, height: i32, players: PlayerTable, seed: u64) -> Self {
        Self {
            sim: Simulation::new(world(width, height, players, open_config()), seed),
        }
    }

    /// Adjust the config.
    #[must_use]
    pub fn configure(mut self, f: impl FnOnce(&mut SimulationConfig)) -> Self {
        f(&mut self.sim.world_mut().config);
        self
    }

    /// Swap in collaborators.
    #[must_use]
    pub fn with_services(self, services: Services) -> Self {
        Self {
            sim: self.sim.with_services(services),
        }
    }

    /// Id of a roster type.
    ///
    /// # Panics
    ///
    /// Panics for unknown idents.
    #[must_use]
    pub fn type_id(&self, ident: &str) -> UnitTypeId {
        self.sim
            .world()
            .types
            .find(ident)
            .unwrap_or_else(|| panic!("unknown unit type '{ident}'"))
    }

    /// Spawn a roster unit.
    ///
    /// # Panics
    ///
    /// Panics if the unit does not fit.
    pub fn spawn(&mut self, ident: &str, x: i32, y: i32, player: u8) -> UnitId {
        let ty = self.type_id(ident);
        self.sim
            .spawn(ty, PlayerId(player), TilePos::new(x, y), 0)
            .unwrap_or_else(|e| panic!("cannot spawn {ident} at ({x}, {y}): {e}"))
    }

    /// Add terrain flags to a tile.
    pub fn block(&mut self, x: i32, y: i32, flags: MapFieldFlags) {
        self.sim.world_mut().map.insert_flags(TilePos::new(x, y), 0, flags);
    }

    /// Issue a flushing command.
    ///
    /// # Panics
    ///
    /// Panics if the command is rejected.
    pub fn command(&mut self, unit: UnitId, command: Command) {
        self.sim
            .apply_command(unit, &command)
            .unwrap_or_else(|e| panic!("command {command:?} rejected: {e}"));
    }

    /// Advance one tick.
    pub fn tick(&mut self) -> TickEvents {
        self.sim.tick()
    }

    /// Advance several ticks, keeping every tick's events.
    pub fn run(&mut self, ticks: u64) -> Vec<TickEvents> {
        (0..ticks).map(|_| self.sim.tick()).collect()
    }

    /// Tick until `done` holds; returns the number of ticks taken.
    pub fn run_until(&mut self, max_ticks: u64, mut done: impl FnMut(&Simulation) -> bool) -> Option<u64> {
        for ticks in 0..max_ticks {
            if done(&self.sim) {
                return Some(ticks);
            }
            self.sim.tick();
        }
        done(&self.sim).then_some(max_ticks)
    }

    /// A unit that must still exist.
    ///
    /// # Panics
    ///
    /// Panics if the id no longer resolves.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> &Unit {
        self.sim
            .unit(id)
            .unwrap_or_else(|| panic!("unit {id} no longer exists"))
    }

    /// Mutable access for setting up unit state.
    ///
    /// # Panics
    ///
    /// Panics if the id no longer resolves.
    pub fn unit_mut(&mut self, id: UnitId) -> &mut Unit {
        self.sim
            .world_mut()
            .units
            .get_mut(id)
            .unwrap_or_else(|| panic!("unit {id} no longer exists"))
    }

    /// Set a unit's hit points.
    pub fn set_hit_points(&mut self, id: UnitId, hp: i32) {
        self.unit_mut(id).variables.get_mut(VariableId::HitPoints).value = hp;
    }

    /// Whether the id resolves to a living unit.
    #[must_use]
    pub fn alive(&self, id: UnitId) -> bool {
        self.sim.unit(id).is_some_and(Unit::is_alive_on_map)
    }

    /// The unit's current order.
    ///
    /// # Panics
    ///
    /// Panics if the unit is gone.
    #[must_use]
    pub fn current_order(&self, id: UnitId) -> &Order {
        self.unit(id)
            .orders
            .current()
            .unwrap_or_else(|| panic!("unit {id} has no current order"))
    }

    /// Kind of the unit's current order.
    #[must_use]
    pub fn current(&self, id: UnitId) -> OrderKind {
        self.current_order(id).kind()
    }
}

/// A mixed two-sided battle: `per_side` units each, AI controlled, all
/// attack-moving toward the other side.
///
/// # Panics
///
/// Panics if `per_side` units do not fit the formation.
#[must_use]
pub fn skirmish(per_side: usize, seed: u64) -> Simulation {
    const ROSTER: [&str; 4] = ["footman", "archer", "knight", "footman"];
    let mut harness = Harness::with_players(64, 48, rivals(Control::Ai, Control::Ai), seed);
    let columns = 6;
    let mut units = Vec::with_capacity(per_side * 2);
    for i in 0..per_side {
        let col = (i % columns) as i32;
        let row = (i / columns) as i32;
        let ident = ROSTER[i % ROSTER.len()];
        units.push((harness.spawn(ident, 4 + col, 4 + row * 2, 0), TilePos::new(56, 4 + row * 2)));
        units.push((harness.spawn(ident, 56 - col, 4 + row * 2, 1), TilePos::new(4, 4 + row * 2)));
    }
    for (unit, goal) in units {
        harness.command(unit, Command::AttackMove { pos: goal, layer: 0 });
    }
    harness.sim
}
