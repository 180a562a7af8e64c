//! # Stratum Core
//!
//! Deterministic unit order execution for a real-time strategy engine.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO outside explicit save/load helpers
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! Every tick each unit advances its current order by one step: attack,
//! move, patrol, repair, pick up, build, die or stand still. Orders consult
//! the pathfinder, the threat evaluator and the combat resolver through
//! [`simulation::Services`] and mutate the shared [`world::World`].
//!
//! ## Crate Structure
//!
//! - [`orders`] - Per-unit order state machines
//! - [`unit`] - Units, variables and the order stack
//! - [`threat`] - Target acquisition and ranking
//! - [`combat`] - Damage, missiles, death
//! - [`pathfinding`] / [`movement`] - Range goals and stepping
//! - [`simulation`] - Core simulation loop
//! - [`save`] / [`replay`] - Persistence

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod animation;
pub mod combat;
pub mod commands;
pub mod config;
pub mod error;
pub mod map;
pub mod math;
pub mod movement;
pub mod orders;
pub mod pathfinding;
pub mod player;
pub mod replay;
pub mod rng;
pub mod save;
pub mod simulation;
pub mod spatial;
pub mod spells;
pub mod storage;
pub mod threat;
pub mod unit;
pub mod unit_type;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::commands::{Command, QueueMode};
    pub use crate::config::SimulationConfig;
    pub use crate::error::{GameError, Result};
    pub use crate::map::{GameMap, LayerId, MapFieldFlags, MovementKind};
    pub use crate::math::{Fixed, TilePos, TileSize};
    pub use crate::orders::{Order, OrderKind};
    pub use crate::player::{PlayerId, PlayerKind, PlayerTable};
    pub use crate::save::SaveGame;
    pub use crate::simulation::{Services, Simulation, TickEvents};
    pub use crate::unit::{Unit, UnitId, VariableId};
    pub use crate::unit_type::{UnitTypeId, UnitTypeRegistry};
    pub use crate::world::World;
}
