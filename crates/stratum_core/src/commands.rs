//! Player and AI commands.
//!
//! A [`Command`] is turned into an [`Order`] when issued. Flushing replaces
//! whatever the unit was doing; appending queues behind it.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::map::LayerId;
use crate::math::TilePos;
use crate::orders::{AttackOrder, BuildOrder, MoveOrder, Order, PatrolOrder, PickUpOrder, RepairOrder};
use crate::unit::{Unit, UnitId};
use crate::unit_type::{UnitTypeFlags, UnitTypeId};
use crate::world::World;

/// A high-level instruction for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Drop everything and idle.
    Stop,
    /// Idle without ever moving.
    StandGround,
    /// Move to a tile.
    Move {
        /// Destination.
        pos: TilePos,
        /// Destination layer.
        layer: LayerId,
    },
    /// Attack a specific unit.
    Attack(UnitId),
    /// Move to a tile, engaging enemies on the way.
    AttackMove {
        /// Destination.
        pos: TilePos,
        /// Destination layer.
        layer: LayerId,
    },
    /// Attack a tile.
    AttackGround {
        /// Target tile.
        pos: TilePos,
        /// Target layer.
        layer: LayerId,
    },
    /// Walk between the current position and a tile.
    Patrol {
        /// Far end.
        pos: TilePos,
        /// Layer of both ends.
        layer: LayerId,
    },
    /// Repair a unit.
    Repair(UnitId),
    /// Pick up an item.
    PickUp(UnitId),
    /// Construct a building.
    Build {
        /// Type to construct.
        unit_type: UnitTypeId,
        /// Top-left tile of the site.
        pos: TilePos,
        /// Layer of the site.
        layer: LayerId,
    },
}

/// How a command combines with the unit's existing orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QueueMode {
    /// Replace the current and queued orders, and forget the saved one.
    #[default]
    Flush,
    /// Queue behind the existing orders.
    Append,
}

/// Build the order a command stands for.
///
/// # Errors
///
/// Fails when a referenced unit does not resolve or the unit cannot carry
/// the order out.
pub fn order_for(unit: &Unit, command: &Command, world: &World) -> Result<Order> {
    let lookup = |id: UnitId| {
        world
            .units
            .get(id)
            .filter(|u| u.is_alive_on_map())
            .ok_or(GameError::UnitNotFound(id))
    };
    let ty = world.types.require(unit.type_id)?;

    let order = match *command {
        Command::Stop => Order::still(),
        Command::StandGround => Order::stand_ground(),
        Command::Move { pos, layer } => Order::Move(MoveOrder::new(pos, layer, 0)),
        Command::Attack(target) => {
            if !ty.has(UnitTypeFlags::CAN_ATTACK) {
                return Err(GameError::InvalidCommand(format!("{} cannot attack", ty.ident)));
            }
            Order::Attack(AttackOrder::on_unit(unit, lookup(target)?, world))
        }
        Command::AttackMove { pos, layer } => {
            Order::Attack(AttackOrder::on_position(unit, pos, layer, world))
        }
        Command::AttackGround { pos, layer } => {
            if !ty.has(UnitTypeFlags::CAN_ATTACK) {
                return Err(GameError::InvalidCommand(format!("{} cannot attack", ty.ident)));
            }
            Order::Attack(AttackOrder::on_ground(unit, pos, layer, world))
        }
        Command::Patrol { pos, layer } => Order::Patrol(PatrolOrder::new(unit.tile_pos, pos, layer)),
        Command::Repair(target) => {
            if !ty.has(UnitTypeFlags::CAN_REPAIR) {
                return Err(GameError::InvalidCommand(format!("{} cannot repair", ty.ident)));
            }
            Order::Repair(RepairOrder::new(unit, lookup(target)?, world))
        }
        Command::PickUp(item) => {
            lookup(item)?;
            Order::PickUp(PickUpOrder::new(item))
        }
        Command::Build { unit_type, pos, layer } => Order::Build(BuildOrder::new(unit_type, pos, layer)),
    };

    if !order.is_valid(unit, world) {
        return Err(GameError::InvalidCommand(format!(
            "{:?} is not valid for unit {}",
            order.kind(),
            unit.id
        )));
    }
    Ok(order)
}

/// Issue a command to a unit that is out of storage.
///
/// # Errors
///
/// Dying and released units refuse commands; see also [`order_for`].
pub fn issue(unit: &mut Unit, command: &Command, mode: QueueMode, world: &World) -> Result<()> {
    if unit.destroyed || unit.released {
        return Err(GameError::InvalidCommand(format!("unit {} is dying", unit.id)));
    }
    let order = order_for(unit, command, world)?;
    tracing::trace!(unit = %unit.id, kind = ?order.kind(), ?mode, "Issued command");
    match mode {
        QueueMode::Flush => {
            unit.orders.release_pending();
            unit.orders.clear_saved();
        }
        QueueMode::Append => {
            // An idle unit starts on an appended order right away.
            if unit.orders.len() == 1 && unit.orders.current().is_some_and(Order::is_idle) {
                unit.orders.finish_current();
            }
        }
    }
    unit.orders.push(order);
    Ok(())
}
