//! Unit orders.
//!
//! An [`Order`] is one queued intention with its own per-tick state
//! machine. Orders never block: [`Order::execute`] advances by exactly one
//! tick and returns. The acting unit is lent to the order by value (it is
//! out of storage during its turn), everything else is reached through
//! the [`OrderContext`].

mod attack;
mod build;
mod die;
mod move_order;
mod patrol;
mod pickup;
mod repair;
mod still;

pub use attack::{AttackOrder, AttackPhase};
pub use build::{BuildOrder, BuildState};
pub use die::DieOrder;
pub use move_order::MoveOrder;
pub use patrol::PatrolOrder;
pub use pickup::PickUpOrder;
pub use repair::{RepairOrder, RepairState};
pub use still::{auto_attack, auto_repair, StillOrder, StillState};

use serde::{Deserialize, Serialize};

use crate::animation::AnimationKind;
use crate::combat::Missile;
use crate::config::SimulationConfig;
use crate::rng::SyncRng;
use crate::simulation::{Services, SoundEvent, TickEvents};
use crate::unit::{Unit, UnitId};
use crate::world::World;

/// Everything an executing order may touch besides its own unit.
pub struct OrderContext<'a> {
    /// Map, players, other units and type data.
    pub world: &'a mut World,
    /// Synchronized random stream.
    pub rng: &'a mut SyncRng,
    /// Missiles in flight.
    pub missiles: &'a mut Vec<Missile>,
    /// Events of the current tick.
    pub events: &'a mut TickEvents,
    /// Pathfinder, combat and threat collaborators.
    pub services: &'a mut Services,
    /// Current tick.
    pub tick: u64,
}

/// Persisted discriminant of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderKind {
    /// Idle.
    Still,
    /// Idle without ever moving.
    StandGround,
    /// Move to a tile.
    Move,
    /// Attack a unit or attack-move to a tile.
    Attack,
    /// Attack a tile.
    AttackGround,
    /// Walk between two tiles.
    Patrol,
    /// Repair a unit.
    Repair,
    /// Pick up an item.
    PickUp,
    /// Construct a building.
    Build,
    /// Play the death sequence.
    Die,
}

/// One queued intention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Order {
    /// Idle or stand ground.
    Still(StillOrder),
    /// Move.
    Move(MoveOrder),
    /// Attack or attack ground.
    Attack(AttackOrder),
    /// Patrol.
    Patrol(PatrolOrder),
    /// Repair.
    Repair(RepairOrder),
    /// Pick up.
    PickUp(PickUpOrder),
    /// Build.
    Build(BuildOrder),
    /// Die.
    Die(DieOrder),
}

impl Order {
    /// The default idle order.
    #[must_use]
    pub fn still() -> Self {
        Self::Still(StillOrder::new(false))
    }

    /// Idle without moving.
    #[must_use]
    pub fn stand_ground() -> Self {
        Self::Still(StillOrder::new(true))
    }

    /// Persisted discriminant.
    #[must_use]
    pub fn kind(&self) -> OrderKind {
        match self {
            Self::Still(o) if o.stand_ground => OrderKind::StandGround,
            Self::Still(_) => OrderKind::Still,
            Self::Move(_) => OrderKind::Move,
            Self::Attack(o) if o.ground => OrderKind::AttackGround,
            Self::Attack(_) => OrderKind::Attack,
            Self::Patrol(_) => OrderKind::Patrol,
            Self::Repair(_) => OrderKind::Repair,
            Self::PickUp(_) => OrderKind::PickUp,
            Self::Build(_) => OrderKind::Build,
            Self::Die(_) => OrderKind::Die,
        }
    }

    /// Whether the order is done and may be retired.
    #[must_use]
    pub fn finished(&self) -> bool {
        match self {
            Self::Still(o) => o.finished,
            Self::Move(o) => o.finished,
            Self::Attack(o) => o.finished,
            Self::Patrol(o) => o.finished,
            Self::Repair(o) => o.finished,
            Self::PickUp(o) => o.finished,
            Self::Build(o) => o.finished,
            Self::Die(o) => o.finished,
        }
    }

    /// Set the finished flag.
    pub fn set_finished(&mut self, finished: bool) {
        match self {
            Self::Still(o) => o.finished = finished,
            Self::Move(o) => o.finished = finished,
            Self::Attack(o) => o.finished = finished,
            Self::Patrol(o) => o.finished = finished,
            Self::Repair(o) => o.finished = finished,
            Self::PickUp(o) => o.finished = finished,
            Self::Build(o) => o.finished = finished,
            Self::Die(o) => o.finished = finished,
        }
    }

    /// Whether this is an idle order.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Still(_))
    }

    /// Whether the order may be paused into the saved slot.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        !matches!(self, Self::Die(_))
    }

    /// Goal unit, if the order has one.
    #[must_use]
    pub fn goal(&self) -> Option<UnitId> {
        match self {
            Self::Still(o) => o.goal,
            Self::Attack(o) => o.goal,
            Self::Repair(o) => o.goal,
            Self::PickUp(o) => o.goal,
            Self::Build(o) => o.building,
            Self::Move(_) | Self::Patrol(_) | Self::Die(_) => None,
        }
    }

    /// Whether the order still denotes a legal target or location.
    #[must_use]
    pub fn is_valid(&self, unit: &Unit, world: &World) -> bool {
        match self {
            Self::Still(_) | Self::Die(_) => true,
            Self::Move(o) => world.map.is_point_on_map(o.goal_pos, o.goal_layer),
            Self::Attack(o) => o.is_valid(world),
            Self::Patrol(o) => {
                world.map.is_point_on_map(o.goal_pos, o.goal_layer)
                    && world.map.is_point_on_map(o.waypoint, o.goal_layer)
            }
            Self::Repair(o) => o.is_valid(world),
            Self::PickUp(o) => o.is_valid(world),
            Self::Build(o) => o.is_valid(unit, world),
        }
    }

    /// Advance the order by one tick.
    pub fn execute(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) {
        debug_assert!(!unit.released, "executing an order of released unit {}", unit.id);
        if unit.released {
            return;
        }
        if unit.destroyed && !matches!(self, Self::Die(_)) {
            debug_assert!(false, "destroyed unit {} is not dying", unit.id);
            return;
        }
        match self {
            Self::Still(o) => o.execute(unit, ctx),
            Self::Move(o) => o.execute(unit, ctx),
            Self::Attack(o) => o.execute(unit, ctx),
            Self::Patrol(o) => o.execute(unit, ctx),
            Self::Repair(o) => o.execute(unit, ctx),
            Self::PickUp(o) => o.execute(unit, ctx),
            Self::Build(o) => o.execute(unit, ctx),
            Self::Die(o) => o.execute(unit, ctx),
        }
    }
}

/// Replace the unit's orders with `order`, keeping `resume` to come back to.
pub fn interrupt(unit: &mut Unit, order: Order, resume: Option<Order>) {
    unit.orders.release_pending();
    unit.orders.clear_saved();
    unit.orders.push(order);
    if let Some(resume) = resume {
        unit.orders.set_saved(resume);
    }
}

/// Idle while the unit's wait counter runs; returns true while waiting.
pub(crate) fn handle_wait(unit: &mut Unit, ctx: &mut OrderContext<'_>) -> bool {
    if unit.wait > 0 {
        if !unit.waiting {
            unit.waiting = true;
            unit.wait_backup = unit.anim.clone();
        }
        play(unit, AnimationKind::Still, ctx);
        unit.wait -= 1;
        return true;
    }
    if unit.waiting {
        unit.anim = unit.wait_backup.clone();
        unit.waiting = false;
    }
    false
}

/// Count a blocked path request; at the limit the unit backs off.
pub(crate) fn note_blocked(unit: &mut Unit, blocked: &mut u32, config: &SimulationConfig) {
    *blocked += 1;
    if config.blocked_retry_limit > 0 && *blocked >= config.blocked_retry_limit {
        *blocked = 0;
        unit.wait = config.unreachable_retry_wait;
        tracing::trace!(unit = %unit.id, wait = unit.wait, "Path stays blocked, backing off");
    }
}

/// Advance an animation, forwarding its sounds.
///
/// Returns whether an action point was passed, or `None` without an
/// animation of that kind.
pub(crate) fn play(unit: &mut Unit, kind: AnimationKind, ctx: &mut OrderContext<'_>) -> Option<bool> {
    let outcome = unit.animate(kind, &ctx.world.types, ctx.rng)?;
    for sound in outcome.sounds {
        ctx.events.sounds.push(SoundEvent { unit: unit.id, sound });
    }
    Some(outcome.action)
}

/// Advance an action animation; types without one act every call.
pub(crate) fn play_action(unit: &mut Unit, kind: AnimationKind, ctx: &mut OrderContext<'_>) -> bool {
    play(unit, kind, ctx).unwrap_or(true)
}

