//! Scenario loading and setup.
//!
//! A scenario is a RON document describing the map, players, starting units
//! and a command script. Units are referred to by their index in `units`
//! so scripts stay valid regardless of how ids are assigned.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use stratum_core::commands::{Command, QueueMode};
use stratum_core::config::SimulationConfig;
use stratum_core::error::GameError;
use stratum_core::map::{GameMap, LayerId, MapFieldFlags};
use stratum_core::math::{flags_serde, TilePos};
use stratum_core::player::{PlayerId, PlayerKind, PlayerTable};
use stratum_core::simulation::Simulation;
use stratum_core::unit::UnitId;
use stratum_core::unit_type::UnitTypeRegistry;
use stratum_core::world::World;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// A script entry names a unit index that does not exist.
    #[error("Scenario refers to unit #{0}, which is not placed")]
    UnknownUnit(usize),
    /// A player index is out of range.
    #[error("Scenario refers to player #{0}, which is not defined")]
    UnknownPlayer(usize),
    /// A build entry names a unit type the data does not define.
    #[error("Scenario builds unknown unit type '{0}'")]
    UnknownUnitType(String),
    /// Setting up the simulation failed.
    #[error("Scenario setup failed: {0}")]
    Game(#[from] GameError),
}

/// One player slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSetup {
    /// Display name.
    pub name: String,
    /// Controller.
    pub kind: PlayerKind,
    /// Team number.
    #[serde(default)]
    pub team: u8,
    /// Indexes of players this one is hostile to.
    #[serde(default)]
    pub enemies: Vec<usize>,
}

/// A rectangle of terrain flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainPatch {
    /// Left column.
    pub x: i32,
    /// Top row.
    pub y: i32,
    /// Width in tiles.
    #[serde(default = "one")]
    pub width: i32,
    /// Height in tiles.
    #[serde(default = "one")]
    pub height: i32,
    /// Layer.
    #[serde(default)]
    pub layer: LayerId,
    /// Flags to set.
    #[serde(with = "flags_serde")]
    pub flags: MapFieldFlags,
}

const fn one() -> i32 {
    1
}

/// A starting unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitPlacement {
    /// Unit type ident.
    pub unit_type: String,
    /// Owner index.
    pub player: usize,
    /// Top-left column.
    pub x: i32,
    /// Top-left row.
    pub y: i32,
    /// Layer.
    #[serde(default)]
    pub layer: LayerId,
}

/// A command with placement indexes instead of unit ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScenarioCommand {
    /// See [`Command::Stop`].
    Stop,
    /// See [`Command::StandGround`].
    StandGround,
    /// See [`Command::Move`].
    Move(i32, i32),
    /// See [`Command::Attack`].
    Attack(usize),
    /// See [`Command::AttackMove`].
    AttackMove(i32, i32),
    /// See [`Command::AttackGround`].
    AttackGround(i32, i32),
    /// See [`Command::Patrol`].
    Patrol(i32, i32),
    /// See [`Command::Repair`].
    Repair(usize),
    /// See [`Command::PickUp`].
    PickUp(usize),
    /// See [`Command::Build`].
    Build(String, i32, i32),
}

/// A command issued before a given tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedCommand {
    /// Tick before which the command is issued.
    #[serde(default)]
    pub tick: u64,
    /// Index of the commanded unit.
    pub unit: usize,
    /// The command.
    pub command: ScenarioCommand,
    /// Append instead of replacing.
    #[serde(default)]
    pub queue: bool,
}

/// A complete scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Map dimensions in tiles.
    pub map_size: (i32, i32),
    /// Number of map layers.
    #[serde(default = "default_layers")]
    pub layers: usize,
    /// Random seed.
    #[serde(default)]
    pub seed: u64,
    /// Ticks to simulate when the caller does not say.
    #[serde(default = "default_ticks")]
    pub ticks: u64,
    /// Simulation tuning.
    #[serde(default)]
    pub config: SimulationConfig,
    /// Player slots.
    pub players: Vec<PlayerSetup>,
    /// Terrain.
    #[serde(default)]
    pub terrain: Vec<TerrainPatch>,
    /// Starting units.
    pub units: Vec<UnitPlacement>,
    /// Command script.
    #[serde(default)]
    pub script: Vec<ScriptedCommand>,
}

const fn default_layers() -> usize {
    1
}

const fn default_ticks() -> u64 {
    1800
}

/// A command resolved against spawned unit ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledCommand {
    /// Tick before which the command is issued.
    pub tick: u64,
    /// Commanded unit.
    pub unit: UnitId,
    /// The command.
    pub command: Command,
    /// Queue mode.
    pub mode: QueueMode,
}

/// A scenario turned into a running simulation.
#[derive(Debug)]
pub struct PreparedScenario {
    /// The simulation at tick zero.
    pub simulation: Simulation,
    /// Seed the simulation was created with.
    pub seed: u64,
    /// Ids of the placed units, by placement index.
    pub units: Vec<UnitId>,
    /// Script sorted by tick.
    pub schedule: Vec<ScheduledCommand>,
}

impl Scenario {
    /// Load a scenario from a RON file.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing or malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string.
    ///
    /// # Errors
    ///
    /// Fails if the text is malformed.
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        Ok(ron::from_str(ron)?)
    }

    /// Build the player table.
    fn players(&self) -> Result<PlayerTable, ScenarioError> {
        let mut table = PlayerTable::new();
        for setup in &self.players {
            table.add(setup.name.clone(), setup.kind, setup.team);
        }
        for (index, setup) in self.players.iter().enumerate() {
            for &enemy in &setup.enemies {
                if enemy >= self.players.len() {
                    return Err(ScenarioError::UnknownPlayer(enemy));
                }
                table.set_enemy_with(player_id(index), player_id(enemy));
            }
        }
        Ok(table)
    }

    /// Create the simulation, spawn units and resolve the script.
    ///
    /// `seed` overrides the scenario's own seed.
    ///
    /// # Errors
    ///
    /// Fails for unknown unit types, players or unit indexes, and for
    /// units that do not fit where they are placed.
    pub fn prepare(&self, types: UnitTypeRegistry, seed: Option<u64>) -> Result<PreparedScenario, ScenarioError> {
        let (width, height) = self.map_size;
        let mut map = GameMap::new(width, height, self.layers.max(1));
        for patch in &self.terrain {
            for y in patch.y..patch.y + patch.height {
                for x in patch.x..patch.x + patch.width {
                    map.insert_flags(TilePos::new(x, y), patch.layer, patch.flags);
                }
            }
        }

        let world = World::new(map, self.players()?, types, self.config.clone());
        let seed = seed.unwrap_or(self.seed);
        let mut simulation = Simulation::new(world, seed);

        let mut units = Vec::with_capacity(self.units.len());
        for placement in &self.units {
            if placement.player >= self.players.len() {
                return Err(ScenarioError::UnknownPlayer(placement.player));
            }
            let type_id = simulation
                .world()
                .types
                .find(&placement.unit_type)
                .ok_or_else(|| GameError::InvalidUnitType(placement.unit_type.clone()))?;
            let id = simulation.spawn(
                type_id,
                player_id(placement.player),
                TilePos::new(placement.x, placement.y),
                placement.layer,
            )?;
            units.push(id);
        }

        let mut schedule = self
            .script
            .iter()
            .map(|entry| {
                let unit = *units.get(entry.unit).ok_or(ScenarioError::UnknownUnit(entry.unit))?;
                Ok(ScheduledCommand {
                    tick: entry.tick,
                    unit,
                    command: resolve(&entry.command, &units, &simulation.world().types)?,
                    mode: if entry.queue { QueueMode::Append } else { QueueMode::Flush },
                })
            })
            .collect::<Result<Vec<_>, ScenarioError>>()?;
        // Stable, so same-tick entries keep their file order.
        schedule.sort_by_key(|c| c.tick);

        info!(
            scenario = %self.name,
            seed,
            units = units.len(),
            commands = schedule.len(),
            "Scenario prepared"
        );
        Ok(PreparedScenario {
            simulation,
            seed,
            units,
            schedule,
        })
    }
}

fn player_id(index: usize) -> PlayerId {
    PlayerId(u8::try_from(index).unwrap_or(u8::MAX))
}

fn resolve(command: &ScenarioCommand, units: &[UnitId], types: &UnitTypeRegistry) -> Result<Command, ScenarioError> {
    let unit = |index: usize| units.get(index).copied().ok_or(ScenarioError::UnknownUnit(index));
    let at = |x, y| TilePos::new(x, y);
    let command = match command {
        ScenarioCommand::Stop => Command::Stop,
        ScenarioCommand::StandGround => Command::StandGround,
        ScenarioCommand::Move(x, y) => Command::Move { pos: at(*x, *y), layer: 0 },
        ScenarioCommand::Attack(target) => Command::Attack(unit(*target)?),
        ScenarioCommand::AttackMove(x, y) => Command::AttackMove { pos: at(*x, *y), layer: 0 },
        ScenarioCommand::AttackGround(x, y) => Command::AttackGround { pos: at(*x, *y), layer: 0 },
        ScenarioCommand::Patrol(x, y) => Command::Patrol { pos: at(*x, *y), layer: 0 },
        ScenarioCommand::Repair(target) => Command::Repair(unit(*target)?),
        ScenarioCommand::PickUp(item) => Command::PickUp(unit(*item)?),
        ScenarioCommand::Build(ident, x, y) => Command::Build {
            unit_type: types
                .find(ident)
                .ok_or_else(|| ScenarioError::UnknownUnitType(ident.clone()))?,
            pos: at(*x, *y),
            layer: 0,
        },
    };
    debug!(?command, "Resolved scripted command");
    Ok(command)
}
