//! Save games.
//!
//! A save game is a RON document holding the complete simulation state.
//! Unit types are referenced by their string ident and resolved against
//! the registry supplied at load time, so the same save loads against data
//! files whose numeric type order changed.
//!
//! Orders go through [`OrderRecord`]. Every persisted order is validated on
//! load: records that are malformed or point at something that no longer
//! exists are dropped with a warning, and a unit left without orders idles.

use std::path::Path;

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};

use crate::animation::{AnimKey, AnimState, AnimationKind};
use crate::combat::Missile;
use crate::config::SimulationConfig;
use crate::error::{GameError, Result};
use crate::map::{GameMap, LayerId};
use crate::math::{fixed_serde, Fixed, Heading, TilePos};
use crate::orders::{
    AttackOrder, AttackPhase, BuildOrder, BuildState, DieOrder, MoveOrder, Order, OrderKind, PatrolOrder,
    PickUpOrder, RepairOrder, RepairState, StillOrder, StillState,
};
use crate::player::{PlayerId, PlayerTable};
use crate::rng::{SyncRng, SyncRngState};
use crate::simulation::Simulation;
use crate::spells::SpellId;
use crate::storage::UnitStorage;
use crate::unit::{OrderQueue, Unit, UnitId, VariableModifier, Variables};
use crate::unit_type::UnitTypeRegistry;
use crate::world::World;

/// Save format version for compatibility.
pub const SAVE_VERSION: u32 = 1;

/// A tile on a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRecord {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
    /// Layer.
    pub layer: LayerId,
}

impl TileRecord {
    const fn new(pos: TilePos, layer: LayerId) -> Self {
        Self {
            x: pos.x,
            y: pos.y,
            layer,
        }
    }

    const fn pos(self) -> TilePos {
        TilePos::new(self.x, self.y)
    }
}

/// Animation playback with the script's unit type stored by ident.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimRecord {
    /// Type ident of the playing script.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_type: Option<String>,
    /// Kind of the playing script.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<AnimationKind>,
    /// Index of the next step.
    pub step: u16,
    /// Remaining ticks of the current hold.
    pub wait: u32,
    /// Inside an uninterruptible section.
    pub unbreakable: bool,
}

impl AnimRecord {
    /// Capture playback state.
    #[must_use]
    pub fn capture(state: &AnimState, types: &UnitTypeRegistry) -> Self {
        let key = state.key.and_then(|key| Some((types.get(key.unit_type)?.ident.clone(), key.kind)));
        Self {
            unit_type: key.as_ref().map(|(ident, _)| ident.clone()),
            kind: key.map(|(_, kind)| kind),
            step: state.step,
            wait: state.wait,
            unbreakable: state.unbreakable,
        }
    }

    /// Resolve against the loaded registry.
    ///
    /// A script of an unknown type is dropped; the animation restarts on
    /// the next tick.
    #[must_use]
    pub fn restore(&self, types: &UnitTypeRegistry) -> AnimState {
        let key = match (&self.unit_type, self.kind) {
            (Some(ident), Some(kind)) => match types.find(ident) {
                Some(unit_type) => Some(AnimKey { unit_type, kind }),
                None => {
                    tracing::warn!(unit_type = %ident, "Dropped animation of unknown unit type");
                    return AnimState::default();
                }
            },
            _ => None,
        };
        AnimState {
            key,
            step: self.step,
            wait: self.wait,
            unbreakable: self.unbreakable,
        }
    }
}

/// Persisted form of an [`Order`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Which order.
    pub kind: OrderKind,
    /// Finished flag.
    #[serde(default)]
    pub finished: bool,
    /// Goal unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<UnitId>,
    /// Goal tile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile: Option<TileRecord>,
    /// Exclusive minimum attack distance.
    #[serde(default)]
    pub min_range: i32,
    /// Accepted or maximum distance.
    #[serde(default)]
    pub range: i32,
    /// Sub-state index.
    #[serde(default)]
    pub state: u8,
    /// Opportunistic attack target.
    #[serde(default)]
    pub weak_target: bool,
    /// Other end of a patrol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waypoint: Option<TilePos>,
    /// Consecutive blocked ticks of a moving order.
    #[serde(default)]
    pub waiting_cycle: u32,
    /// Type ident of a build order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_type: Option<String>,
}

impl OrderRecord {
    fn bare(kind: OrderKind, finished: bool) -> Self {
        Self {
            kind,
            finished,
            goal: None,
            tile: None,
            min_range: 0,
            range: 0,
            state: 0,
            weak_target: false,
            waypoint: None,
            waiting_cycle: 0,
            unit_type: None,
        }
    }

    fn require_tile(&self) -> Result<TileRecord> {
        self.tile
            .ok_or_else(|| GameError::SaveFormat(format!("{:?} order without a tile", self.kind)))
    }

    fn bad_state(&self) -> GameError {
        GameError::SaveFormat(format!("{:?} order with unknown state {}", self.kind, self.state))
    }
}

impl Order {
    /// Persisted form of the order.
    #[must_use]
    pub fn to_record(&self, types: &UnitTypeRegistry) -> OrderRecord {
        let mut record = OrderRecord::bare(self.kind(), self.finished());
        match self {
            Self::Still(o) => {
                record.goal = o.goal;
                record.state = match o.state {
                    StillState::Standby => 0,
                    StillState::Attack => 1,
                };
            }
            Self::Move(o) => {
                record.tile = Some(TileRecord::new(o.goal_pos, o.goal_layer));
                record.range = o.range;
                record.waiting_cycle = o.blocked;
            }
            Self::Attack(o) => {
                record.goal = o.goal;
                record.tile = Some(TileRecord::new(o.goal_pos, o.goal_layer));
                record.min_range = o.min_range;
                record.range = o.range;
                record.weak_target = o.weak_target;
                record.waiting_cycle = o.blocked;
                record.state = match o.phase {
                    AttackPhase::FirstEntry => 0,
                    AttackPhase::MoveToTarget => 1,
                    AttackPhase::AttackTarget => 2,
                };
            }
            Self::Patrol(o) => {
                record.tile = Some(TileRecord::new(o.goal_pos, o.goal_layer));
                record.waypoint = Some(o.waypoint);
                record.range = o.range;
                record.waiting_cycle = o.waiting_cycle;
            }
            Self::Repair(o) => {
                record.goal = o.goal;
                record.tile = Some(TileRecord::new(o.goal_pos, o.goal_layer));
                record.range = o.range;
                record.state = match o.state {
                    RepairState::MoveToGoal => 0,
                    RepairState::Repairing => 1,
                };
            }
            Self::PickUp(o) => record.goal = o.goal,
            Self::Build(o) => {
                record.goal = o.building;
                record.tile = Some(TileRecord::new(o.goal_pos, o.goal_layer));
                record.unit_type = types.get(o.unit_type).map(|t| t.ident.clone());
                record.state = match o.state {
                    BuildState::MoveToSite => 0,
                    BuildState::Constructing => 1,
                };
            }
            Self::Die(_) => {}
        }
        record
    }

    /// Rebuild an order from its persisted form.
    ///
    /// Only checks that the record is well formed; whether the order still
    /// makes sense in the world is up to [`Order::is_valid`].
    ///
    /// # Errors
    ///
    /// Returns [`GameError::SaveFormat`] for missing fields, unknown states
    /// and unknown unit types.
    pub fn from_record(record: &OrderRecord, types: &UnitTypeRegistry) -> Result<Self> {
        let mut order = match record.kind {
            OrderKind::Still | OrderKind::StandGround => {
                let mut still = StillOrder::new(record.kind == OrderKind::StandGround);
                still.goal = record.goal;
                still.state = match record.state {
                    0 => StillState::Standby,
                    1 => StillState::Attack,
                    _ => return Err(record.bad_state()),
                };
                Self::Still(still)
            }
            OrderKind::Move => {
                let tile = record.require_tile()?;
                Self::Move(MoveOrder {
                    blocked: record.waiting_cycle,
                    ..MoveOrder::new(tile.pos(), tile.layer, record.range)
                })
            }
            OrderKind::Attack | OrderKind::AttackGround => {
                let tile = record.require_tile()?;
                Self::Attack(AttackOrder {
                    ground: record.kind == OrderKind::AttackGround,
                    goal: record.goal,
                    min_range: record.min_range,
                    range: record.range,
                    weak_target: record.weak_target,
                    blocked: record.waiting_cycle,
                    phase: match record.state {
                        0 => AttackPhase::FirstEntry,
                        1 => AttackPhase::MoveToTarget,
                        2 => AttackPhase::AttackTarget,
                        _ => return Err(record.bad_state()),
                    },
                    ..AttackOrder::at_position(tile.pos(), tile.layer)
                })
            }
            OrderKind::Patrol => {
                let tile = record.require_tile()?;
                let waypoint = record
                    .waypoint
                    .ok_or_else(|| GameError::SaveFormat("patrol order without a waypoint".to_string()))?;
                let mut patrol = PatrolOrder::new(waypoint, tile.pos(), tile.layer);
                patrol.range = record.range;
                patrol.waiting_cycle = record.waiting_cycle;
                Self::Patrol(patrol)
            }
            OrderKind::Repair => {
                let tile = record.require_tile()?;
                Self::Repair(RepairOrder {
                    goal: record.goal,
                    goal_pos: tile.pos(),
                    goal_layer: tile.layer,
                    range: record.range,
                    state: match record.state {
                        0 => RepairState::MoveToGoal,
                        1 => RepairState::Repairing,
                        _ => return Err(record.bad_state()),
                    },
                    finished: false,
                })
            }
            OrderKind::PickUp => {
                let item = record
                    .goal
                    .ok_or_else(|| GameError::SaveFormat("pick-up order without an item".to_string()))?;
                Self::PickUp(PickUpOrder::new(item))
            }
            OrderKind::Build => {
                let tile = record.require_tile()?;
                let ident = record
                    .unit_type
                    .as_deref()
                    .ok_or_else(|| GameError::SaveFormat("build order without a type".to_string()))?;
                let unit_type = types
                    .find(ident)
                    .ok_or_else(|| GameError::SaveFormat(format!("build order for unknown type '{ident}'")))?;
                let mut build = BuildOrder::new(unit_type, tile.pos(), tile.layer);
                build.building = record.goal;
                build.state = match record.state {
                    0 => BuildState::MoveToSite,
                    1 => BuildState::Constructing,
                    _ => return Err(record.bad_state()),
                };
                Self::Build(build)
            }
            OrderKind::Die => Self::Die(DieOrder::new()),
        };
        order.set_finished(record.finished);
        Ok(order)
    }
}

/// Persisted form of a [`Unit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    /// Handle.
    pub id: UnitId,
    /// Type ident.
    pub unit_type: String,
    /// Owner.
    pub player: PlayerId,
    /// Top-left tile.
    pub tile: TileRecord,
    /// Variables.
    pub variables: Variables,
    /// Timed modifiers.
    #[serde(default)]
    pub modifiers: Vec<VariableModifier>,
    /// Orders, current first.
    pub orders: Vec<OrderRecord>,
    /// Saved order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_order: Option<OrderRecord>,
    /// Animation playback.
    #[serde(default)]
    pub anim: AnimRecord,
    /// Animation snapshot of a running wait.
    #[serde(default)]
    pub wait_backup: AnimRecord,
    /// Wait counter.
    #[serde(default)]
    pub wait: u32,
    /// A wait is running.
    #[serde(default)]
    pub waiting: bool,
    /// Facing.
    pub direction: Heading,
    /// Sprite frame.
    #[serde(default)]
    pub frame: u16,
    /// Raw bits of the step progress.
    #[serde(with = "fixed_serde")]
    pub move_progress: Fixed,
    /// Off the map.
    #[serde(default)]
    pub removed: bool,
    /// Dead.
    #[serde(default)]
    pub destroyed: bool,
    /// Fully built.
    pub constructed: bool,
    /// Auto-repair enabled.
    #[serde(default)]
    pub auto_repair: bool,
    /// Damage kind of the killing blow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damaged_type: Option<String>,
    /// Tiles walked since the last attack.
    #[serde(default)]
    pub step_count: u32,
    /// Marked sight radius.
    pub current_sight_range: i32,
    /// Spell cooldowns.
    #[serde(default)]
    pub spell_cooldowns: Vec<(SpellId, u32)>,
}

impl UnitRecord {
    /// Capture a unit.
    #[must_use]
    pub fn capture(unit: &Unit, types: &UnitTypeRegistry) -> Self {
        let unit_type = types
            .get(unit.type_id)
            .map_or_else(|| unit.type_id.to_string(), |t| t.ident.clone());
        Self {
            id: unit.id,
            unit_type,
            player: unit.player,
            tile: TileRecord::new(unit.tile_pos, unit.layer),
            variables: unit.variables.clone(),
            modifiers: unit.modifiers.clone(),
            orders: unit.orders.iter().map(|o| o.to_record(types)).collect(),
            saved_order: unit.orders.saved().map(|o| o.to_record(types)),
            anim: AnimRecord::capture(&unit.anim, types),
            wait_backup: AnimRecord::capture(&unit.wait_backup, types),
            wait: unit.wait,
            waiting: unit.waiting,
            direction: unit.direction,
            frame: unit.frame,
            move_progress: unit.move_progress,
            removed: unit.removed,
            destroyed: unit.destroyed,
            constructed: unit.constructed,
            auto_repair: unit.auto_repair,
            damaged_type: unit.damaged_type.clone(),
            step_count: unit.step_count,
            current_sight_range: unit.current_sight_range,
            spell_cooldowns: unit.spell_cooldowns.iter().map(|(k, v)| (*k, *v)).collect(),
        }
    }

    /// Rebuild the unit with an idle order stack; orders are restored separately.
    fn to_unit(&self, types: &UnitTypeRegistry) -> Result<Unit> {
        let ty = types.find(&self.unit_type).and_then(|id| types.get(id)).ok_or_else(|| {
            GameError::InvalidUnitType(format!("unit {} has unknown type '{}'", self.id, self.unit_type))
        })?;
        let mut unit = Unit::new(
            self.id,
            ty.id,
            ty.size,
            self.variables.clone(),
            self.player,
            self.tile.pos(),
            self.tile.layer,
        );
        unit.modifiers = self.modifiers.clone();
        unit.anim = self.anim.restore(types);
        unit.wait_backup = self.wait_backup.restore(types);
        unit.wait = self.wait;
        unit.waiting = self.waiting;
        unit.direction = self.direction;
        unit.frame = self.frame;
        unit.move_progress = self.move_progress;
        unit.removed = self.removed;
        unit.destroyed = self.destroyed;
        unit.constructed = self.constructed;
        unit.auto_repair = self.auto_repair;
        unit.damaged_type = self.damaged_type.clone();
        unit.step_count = self.step_count;
        unit.current_sight_range = self.current_sight_range;
        unit.spell_cooldowns = self.spell_cooldowns.iter().copied().collect();
        Ok(unit)
    }

    /// Decode and validate the persisted orders against the loaded world.
    fn restore_orders(&self, unit: &Unit, world: &World) -> OrderQueue {
        let decode = |record: &OrderRecord| match Order::from_record(record, &world.types) {
            Ok(order) if order.is_valid(unit, world) => Some(order),
            Ok(order) => {
                tracing::warn!(unit = %self.id, kind = ?order.kind(), "Dropped invalid persisted order");
                None
            }
            Err(err) => {
                tracing::warn!(unit = %self.id, %err, "Dropped malformed persisted order");
                None
            }
        };
        let orders: Vec<Order> = self.orders.iter().filter_map(decode).collect();
        let saved = self.saved_order.as_ref().and_then(decode);
        OrderQueue::from_parts(orders, saved)
    }
}

/// A complete save game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveGame {
    /// Format version.
    pub version: u32,
    /// Tick the game was saved at.
    pub tick: u64,
    /// Random stream position.
    pub rng: SyncRngState,
    /// Tuning knobs.
    pub config: SimulationConfig,
    /// Players.
    pub players: PlayerTable,
    /// Map with occupancy and sight marks.
    pub map: GameMap,
    /// Generation of every storage slot.
    pub generations: Vec<u32>,
    /// Released slots awaiting reuse.
    pub free_slots: Vec<u32>,
    /// Units in id order.
    pub units: Vec<UnitRecord>,
    /// Missiles in flight.
    #[serde(default)]
    pub missiles: Vec<Missile>,
}

impl SaveGame {
    /// Capture the state of a simulation.
    #[must_use]
    pub fn capture(sim: &Simulation) -> Self {
        let world = sim.world();
        Self {
            version: SAVE_VERSION,
            tick: sim.get_tick(),
            rng: sim.rng().state(),
            config: world.config.clone(),
            players: world.players.clone(),
            map: world.map.clone(),
            generations: world.units.generations().to_vec(),
            free_slots: world.units.free_slots().iter().copied().collect(),
            units: world
                .units
                .iter()
                .map(|u| UnitRecord::capture(u, &world.types))
                .collect(),
            missiles: sim.missiles().to_vec(),
        }
    }

    /// Rebuild a simulation with unit types from `types`.
    ///
    /// # Errors
    ///
    /// Fails on a version mismatch, unknown unit types and unit ids that do
    /// not fit the slot layout. Bad orders are dropped, not reported.
    pub fn restore(self, types: UnitTypeRegistry) -> Result<Simulation> {
        if self.version != SAVE_VERSION {
            return Err(GameError::SaveFormat(format!(
                "save version mismatch: expected {SAVE_VERSION}, got {}",
                self.version
            )));
        }

        let mut units = UnitStorage::with_layout(self.generations, self.free_slots.into_iter().collect());
        for record in &self.units {
            let slot_generation = units.generations().get(record.id.index as usize).copied();
            if slot_generation != Some(record.id.generation) {
                return Err(GameError::SaveFormat(format!(
                    "unit {} does not match its storage slot",
                    record.id
                )));
            }
            units.restore(record.to_unit(&types)?);
        }

        let mut world = World::new(self.map, self.players, types, self.config);
        world.units = units;

        for record in &self.units {
            let Some(mut unit) = world.units.take(record.id) else {
                continue;
            };
            unit.orders = record.restore_orders(&unit, &world);
            world.units.restore(unit);
        }

        tracing::debug!(tick = self.tick, units = self.units.len(), "Loaded save game");
        Ok(Simulation::from_parts(
            self.tick,
            world,
            SyncRng::from_state(self.rng),
            self.missiles,
        ))
    }

    /// Render as RON text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_ron(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, PrettyConfig::default())
            .map_err(|e| GameError::SaveFormat(format!("failed to write save game: {e}")))
    }

    /// Parse RON text.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] for malformed text.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| GameError::DataParseError {
            path: "<save>".to_string(),
            message: e.to_string(),
        })
    }

    /// Write to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_ron()?)?;
        Ok(())
    }

    /// Read from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        ron::from_str(&source).map_err(|e| GameError::DataParseError {
            path: path.as_ref().display().to_string(),
            message: e.to_string(),
        })
    }
}
