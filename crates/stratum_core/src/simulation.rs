//! Core simulation loop.
//!
//! The simulation advances in fixed ticks. Each tick every unit, in
//! ascending [`UnitId`] order, gets one turn: its finished orders are
//! retired, then its current order executes for exactly one step. After
//! all units have acted, missiles in flight advance and timed modifiers
//! decay.
//!
//! # Determinism
//!
//! All operations in this module are fully deterministic:
//! - No floating-point math (uses fixed-point via [`crate::math::Fixed`])
//! - One synchronized random stream ([`SyncRng`])
//! - Consistent iteration order (ascending unit ids)
//! - Same inputs always produce same outputs

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::combat::{CombatEnv, CombatResolver, DamageEvent, Missile, StandardCombat};
use crate::commands::{self, Command, QueueMode};
use crate::error::{GameError, Result};
use crate::map::LayerId;
use crate::math::TilePos;
use crate::orders::OrderContext;
use crate::pathfinding::{GridPathfinder, Pathfinder};
use crate::player::PlayerId;
use crate::rng::SyncRng;
use crate::spells::SpellCast;
use crate::threat::{StandardThreat, ThreatEvaluator};
use crate::unit::{Unit, UnitId};
use crate::unit_type::UnitTypeId;
use crate::world::World;

/// Ticks per second for the simulation.
pub const TICK_RATE: u32 = 30;

/// Exchangeable collaborators consulted by orders.
///
/// Not part of the simulation state: snapshots and save games come back
/// with the defaults attached.
#[derive(Debug)]
pub struct Services {
    /// Movement oracle.
    pub pathfinder: Box<dyn Pathfinder>,
    /// Attack effects and missiles.
    pub combat: Box<dyn CombatResolver>,
    /// Target ranking.
    pub threat: Box<dyn ThreatEvaluator>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            pathfinder: Box::new(GridPathfinder),
            combat: Box::new(StandardCombat),
            threat: Box::new(StandardThreat),
        }
    }
}

/// A sound an animation asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundEvent {
    /// Unit making the sound.
    pub unit: UnitId,
    /// Sound name from the animation script.
    pub sound: String,
}

/// Events generated during a tick.
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    /// Damage dealt.
    pub damage: Vec<DamageEvent>,
    /// Units killed.
    pub deaths: Vec<UnitId>,
    /// Units whose slots were released.
    pub released: Vec<UnitId>,
    /// Animation sounds.
    pub sounds: Vec<SoundEvent>,
    /// Missiles launched.
    pub missiles_fired: usize,
    /// Spells cast.
    pub spells_cast: Vec<SpellCast>,
    /// Buildings finished.
    pub buildings_completed: Vec<UnitId>,
    /// Units placed by orders.
    pub spawned: Vec<UnitId>,
}

/// The core game simulation.
///
/// Owns the world, the synchronized random stream and missiles in flight.
#[derive(Debug, Serialize, Deserialize)]
pub struct Simulation {
    tick: u64,
    world: World,
    rng: SyncRng,
    missiles: Vec<Missile>,
    #[serde(skip)]
    services: Services,
}

impl Simulation {
    /// Create a simulation at tick 0.
    #[must_use]
    pub fn new(world: World, seed: u64) -> Self {
        Self::from_parts(0, world, SyncRng::new(seed), Vec::new())
    }

    /// Rebuild a simulation from persisted state.
    #[must_use]
    pub fn from_parts(tick: u64, world: World, rng: SyncRng, missiles: Vec<Missile>) -> Self {
        Self {
            tick,
            world,
            rng,
            missiles,
            services: Services::default(),
        }
    }

    /// Replace the collaborators.
    #[must_use]
    pub fn with_services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    /// Get the current tick number.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// The world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The world, mutably (scenario setup).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The synchronized random stream.
    #[must_use]
    pub fn rng(&self) -> &SyncRng {
        &self.rng
    }

    /// Missiles in flight.
    #[must_use]
    pub fn missiles(&self) -> &[Missile] {
        &self.missiles
    }

    /// The collaborators, mutably.
    pub fn services_mut(&mut self) -> &mut Services {
        &mut self.services
    }

    /// Resolve a unit.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.world.units.get(id)
    }

    /// Place a new unit.
    ///
    /// # Errors
    ///
    /// See [`World::spawn_unit`].
    pub fn spawn(&mut self, type_id: UnitTypeId, player: PlayerId, pos: TilePos, layer: LayerId) -> Result<UnitId> {
        self.world.spawn_unit(type_id, player, pos, layer)
    }

    /// Issue a command, replacing the unit's orders.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit doesn't exist or cannot take the command.
    pub fn apply_command(&mut self, unit: UnitId, command: &Command) -> Result<()> {
        self.issue(unit, command, QueueMode::Flush)
    }

    /// Issue a command behind the unit's current orders.
    ///
    /// # Errors
    ///
    /// Same as [`apply_command`](Self::apply_command).
    pub fn queue_command(&mut self, unit: UnitId, command: &Command) -> Result<()> {
        self.issue(unit, command, QueueMode::Append)
    }

    /// Issue a command with an explicit queue mode.
    ///
    /// # Errors
    ///
    /// Same as [`apply_command`](Self::apply_command).
    pub fn issue(&mut self, unit: UnitId, command: &Command, mode: QueueMode) -> Result<()> {
        let mut taken = self.world.units.take(unit).ok_or(GameError::UnitNotFound(unit))?;
        let result = commands::issue(&mut taken, command, mode, &self.world);
        self.world.units.restore(taken);
        result
    }

    /// Advance the simulation by one tick.
    ///
    /// Returns events generated during this tick for use by the game layer.
    pub fn tick(&mut self) -> TickEvents {
        let mut events = TickEvents::default();

        for id in self.world.units.sorted_ids() {
            // Released earlier in this tick by another unit's order.
            let Some(mut unit) = self.world.units.take(id) else {
                continue;
            };
            unit.orders.advance();
            if let Some(mut order) = unit.orders.lend_current() {
                let mut ctx = OrderContext {
                    world: &mut self.world,
                    rng: &mut self.rng,
                    missiles: &mut self.missiles,
                    events: &mut events,
                    services: &mut self.services,
                    tick: self.tick,
                };
                order.execute(&mut unit, &mut ctx);
                unit.orders.return_current(order);
            }

            if unit.released {
                self.world.units.free_slot(id);
                self.world.note_released(unit.player);
                events.released.push(id);
                tracing::trace!(unit = %id, tick = self.tick, "Freed unit slot");
            } else {
                self.world.units.restore(unit);
            }
        }

        let mut env = CombatEnv {
            world: &mut self.world,
            rng: &mut self.rng,
            missiles: &mut self.missiles,
            events: &mut events,
        };
        self.services.combat.update(&mut env);

        for unit in self.world.units.iter_mut() {
            unit.decay_timers();
        }

        self.tick += 1;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.tick, state_hash = hash, "Simulation state hash");
        }

        events
    }

    /// Run `ticks` ticks, discarding events.
    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Calculate a hash of the current simulation state.
    ///
    /// Used for desync detection in multiplayer. Two simulations
    /// with identical state will produce identical hashes.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        self.rng.state().hash(&mut hasher);
        self.world.players.hash(&mut hasher);

        let ids = self.world.units.sorted_ids();
        ids.len().hash(&mut hasher);
        for unit in self.world.units.iter() {
            unit.hash(&mut hasher);
        }
        self.world.units.free_slots().hash(&mut hasher);
        self.missiles.hash(&mut hasher);

        hasher.finish()
    }

    /// Compare against a peer's hash for the same tick.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DesyncDetected`] when the hashes differ.
    pub fn check_sync(&self, remote_hash: u64) -> Result<()> {
        let local_hash = self.state_hash();
        if local_hash == remote_hash {
            return Ok(());
        }
        tracing::warn!(tick = self.tick, local_hash, remote_hash, "Desync detected");
        Err(GameError::DesyncDetected {
            tick: self.tick,
            local_hash,
            remote_hash,
        })
    }

    /// Serialize the simulation state for replay or network sync.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize simulation: {e}")))
    }

    /// Deserialize simulation state from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize simulation: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::map::GameMap;
    use crate::orders::{Order, OrderKind};
    use crate::player::{PlayerKind, PlayerTable};
    use crate::unit::VariableId;
    use crate::unit_type::UnitTypeRegistry;

    const DATA: &str = r#"GameData(unit_types: [
        (
            ident: "footman",
            name: "Footman",
            flags: "CAN_ATTACK | CAN_TARGET_LAND | ORGANIC",
            stats: (hit_points: 60, attack_range: 1, speed: 32, sight_range: 4, basic_damage: 9, priority: 60),
        ),
        (
            ident: "peasant",
            name: "Peasant",
            flags: "ORGANIC",
            stats: (hit_points: 30, speed: 32, sight_range: 4),
        ),
    ])"#;

    fn sim(seed: u64) -> Simulation {
        let mut players = PlayerTable::new();
        let red = players.add("red", PlayerKind::Person, 0);
        let blue = players.add("blue", PlayerKind::Person, 1);
        players.set_enemy_with(red, blue);
        let types = UnitTypeRegistry::from_ron_str(DATA).expect("valid data");
        let world = World::new(GameMap::new(24, 24, 1), players, types, SimulationConfig::default());
        Simulation::new(world, seed)
    }

    fn spawn(sim: &mut Simulation, ident: &str, x: i32, y: i32, player: u8) -> UnitId {
        let ty = sim.world().types.find(ident).expect("type");
        sim.spawn(ty, PlayerId(player), TilePos::new(x, y), 0).expect("spawn")
    }

    #[test]
    fn test_tick_increments() {
        let mut sim = sim(1);
        sim.tick();
        sim.tick();
        assert_eq!(sim.get_tick(), 2);
    }

    #[test]
    fn test_move_command_reaches_goal() {
        let mut sim = sim(1);
        let unit = spawn(&mut sim, "peasant", 1, 1, 0);
        sim.apply_command(unit, &Command::Move { pos: TilePos::new(6, 1), layer: 0 })
            .expect("command");
        sim.run(20);
        let unit = sim.unit(unit).expect("alive");
        assert_eq!(unit.tile_pos, TilePos::new(6, 1));
        assert!(unit.orders.current().is_some_and(Order::is_idle));
    }

    #[test]
    fn test_melee_fight_ends_in_release() {
        let mut sim = sim(3);
        let attacker = spawn(&mut sim, "footman", 2, 2, 0);
        let victim = spawn(&mut sim, "peasant", 3, 2, 1);
        sim.apply_command(attacker, &Command::Attack(victim)).expect("command");

        let mut released = Vec::new();
        for _ in 0..200 {
            released.extend(sim.tick().released);
        }
        assert!(released.contains(&victim));
        assert!(sim.unit(victim).is_none());
        let attacker = sim.unit(attacker).expect("attacker survives");
        assert_eq!(attacker.hit_points(), attacker.variables.max(VariableId::HitPoints));
        assert_eq!(attacker.orders.current().map(Order::kind), Some(OrderKind::Still));
    }

    #[test]
    fn test_deterministic_hash() {
        let run = || {
            let mut sim = sim(42);
            let a = spawn(&mut sim, "footman", 2, 2, 0);
            spawn(&mut sim, "footman", 8, 2, 1);
            sim.apply_command(a, &Command::AttackMove { pos: TilePos::new(12, 2), layer: 0 })
                .expect("command");
            sim.run(120);
            sim.state_hash()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut sim = sim(9);
        let a = spawn(&mut sim, "footman", 2, 2, 0);
        spawn(&mut sim, "footman", 6, 2, 1);
        sim.apply_command(a, &Command::AttackMove { pos: TilePos::new(10, 2), layer: 0 })
            .expect("command");
        sim.run(5);

        let bytes = sim.serialize().expect("serialize");
        let mut restored = Simulation::deserialize(&bytes).expect("deserialize");
        assert_eq!(restored.state_hash(), sim.state_hash());

        sim.run(40);
        restored.run(40);
        assert_eq!(restored.state_hash(), sim.state_hash());
    }

    #[test]
    fn test_check_sync_reports_desync() {
        let sim = sim(1);
        let hash = sim.state_hash();
        assert!(sim.check_sync(hash).is_ok());
        let err = sim.check_sync(hash ^ 1).unwrap_err();
        assert!(matches!(err, GameError::DesyncDetected { tick: 0, .. }));
    }
}
