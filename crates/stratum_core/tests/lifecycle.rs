//! Death, corpses and slot reuse.

use stratum_core::combat::let_unit_die;
use stratum_core::commands::Command;
use stratum_core::error::GameError;
use stratum_core::math::TilePos;
use stratum_core::orders::{Order, OrderKind};
use stratum_core::unit::{UnitId, VariableId};
use stratum_test_utils::fixtures::{skirmish, Harness};

fn kill(h: &mut Harness, id: UnitId) {
    let world = h.sim.world_mut();
    let mut unit = world.units.take(id).expect("unit in storage");
    let_unit_die(world, &mut unit, None);
    world.units.restore(unit);
}

#[test]
fn test_death_replaces_every_order() {
    let mut h = Harness::new(24, 24);
    let footman = h.spawn("footman", 4, 4, 0);
    h.command(footman, Command::Move { pos: TilePos::new(20, 4), layer: 0 });
    h.sim
        .queue_command(footman, &Command::Patrol { pos: TilePos::new(20, 20), layer: 0 })
        .expect("queue");

    kill(&mut h, footman);
    let orders: Vec<OrderKind> = h.unit(footman).orders.iter().map(Order::kind).collect();
    assert_eq!(orders, vec![OrderKind::Die]);
    assert!(h.unit(footman).orders.saved().is_none());
    assert_eq!(h.unit(footman).variables.value(VariableId::HitPoints), 0);
}

#[test]
fn test_dying_unit_refuses_commands() {
    let mut h = Harness::new(24, 24);
    let footman = h.spawn("footman", 4, 4, 0);
    kill(&mut h, footman);

    let err = h.sim.apply_command(footman, &Command::Stop).unwrap_err();
    assert!(matches!(err, GameError::InvalidCommand(_)));
    let err = h
        .sim
        .queue_command(footman, &Command::Move { pos: TilePos::new(8, 8), layer: 0 })
        .unwrap_err();
    assert!(matches!(err, GameError::InvalidCommand(_)));
}

#[test]
fn test_corpse_keeps_id_then_releases() {
    let mut h = Harness::new(24, 24);
    let footman = h.spawn("footman", 4, 4, 0);
    let dead_body = h.type_id("dead-body");
    let red = h.unit(footman).player;
    let owned = |h: &Harness| h.sim.world().players.get(red).map(|p| p.unit_count);
    let sees = |h: &Harness, x: i32, y: i32| h.sim.world().map.is_visible(red, TilePos::new(x, y), 0);

    assert_eq!(owned(&h), Some(1));
    assert!(sees(&h, 8, 4));
    kill(&mut h, footman);
    let before = h.sim.world().units.len();
    // The dying unit keeps watching until its death animation ends.
    assert!(sees(&h, 8, 4));

    let became_corpse = h.run_until(20, |sim| sim.unit(footman).is_some_and(|u| u.type_id == dead_body));
    assert!(became_corpse.is_some(), "footman never became a corpse");
    assert_eq!(h.unit(footman).current_sight_range, 0);
    assert_eq!(h.current(footman), OrderKind::Die);
    assert!(!h.alive(footman));
    assert!(!sees(&h, 8, 4), "footman sight left behind");
    assert!(sees(&h, 4, 4), "corpse sight not marked");
    assert_eq!(owned(&h), Some(1));

    let mut released_event = false;
    for _ in 0..150 {
        let events = h.tick();
        if events.released.contains(&footman) {
            released_event = true;
            break;
        }
    }
    assert!(released_event, "corpse was never released");
    assert!(h.sim.unit(footman).is_none());
    assert_eq!(h.sim.world().units.len(), before - 1);
    assert!(!sees(&h, 4, 4), "corpse sight left behind");
    assert_eq!(owned(&h), Some(0));
}

#[test]
fn test_released_slot_is_reused_with_new_generation() {
    let mut h = Harness::new(24, 24);
    let catapult = h.spawn("catapult", 4, 4, 0);
    kill(&mut h, catapult);

    // No corpse and no death animation: gone on the first tick.
    let events = h.tick();
    assert_eq!(events.released, vec![catapult]);
    assert!(h.sim.unit(catapult).is_none());

    let replacement = h.spawn("footman", 10, 10, 1);
    assert_eq!(replacement.index, catapult.index);
    assert_eq!(replacement.generation, catapult.generation + 1);
    assert!(h.sim.unit(catapult).is_none());
    assert!(h.alive(replacement));
}

#[test]
fn test_order_targeting_released_unit_finishes() {
    let mut h = Harness::new(24, 24);
    let archer = h.spawn("archer", 4, 10, 0);
    let catapult = h.spawn("catapult", 18, 10, 1);
    h.command(archer, Command::Attack(catapult));
    kill(&mut h, catapult);

    let idle = h.run_until(10, |sim| {
        sim.unit(archer)
            .and_then(|u| u.orders.current())
            .is_some_and(|o| o.kind() == OrderKind::Still)
    });
    assert!(idle.is_some(), "attack on a released unit never ended");
}

#[test]
fn test_battle_keeps_orders_total() {
    let mut sim = skirmish(10, 21);
    let mut released = Vec::new();
    for _ in 0..600 {
        let events = sim.tick();
        released.extend(events.released);
        for unit in sim.world().units.iter() {
            assert!(!unit.released, "released unit {} still stored", unit.id);
            let current = unit.orders.current().map(Order::kind);
            assert!(current.is_some(), "unit {} has no order", unit.id);
            if unit.destroyed {
                assert_eq!(current, Some(OrderKind::Die), "dead unit {} not dying", unit.id);
            }
        }
    }
    for id in released {
        assert!(sim.unit(id).is_none());
    }
}

proptest::proptest! {
    #![proptest_config(proptest::prelude::ProptestConfig::with_cases(24))]

    #[test]
    fn prop_any_destination_keeps_orders_total(
        pos in stratum_test_utils::determinism::strategies::arb_tile_around(24, 24, 6),
        attack in proptest::bool::ANY,
    ) {
        let mut h = Harness::new(24, 24);
        let footman = h.spawn("footman", 12, 12, 0);
        let command = if attack {
            Command::AttackMove { pos, layer: 0 }
        } else {
            Command::Move { pos, layer: 0 }
        };
        // Off-map tiles may be refused up front; either way the unit stays idle-capable.
        let _ = h.sim.apply_command(footman, &command);
        for _ in 0..120 {
            h.tick();
            proptest::prop_assert!(h.sim.unit(footman).and_then(|u| u.orders.current()).is_some());
        }
        let settled = h.current(footman);
        proptest::prop_assert!(
            matches!(settled, OrderKind::Still | OrderKind::Move | OrderKind::Attack),
            "unexpected order {:?}",
            settled
        );
    }
}
