//! Repair, pick-up, build and patrol against the standard roster.

use stratum_core::commands::Command;
use stratum_core::math::TilePos;
use stratum_core::orders::{Order, OrderKind};
use stratum_core::player::{PlayerKind, PlayerTable};
use stratum_core::unit::UnitId;
use stratum_test_utils::fixtures::{rivals, Control, Harness};

fn hp(h: &Harness, id: UnitId) -> i32 {
    h.unit(id).hit_points()
}

fn with_wildlife(first: Control) -> PlayerTable {
    let mut players = rivals(first, Control::Human);
    players.add("nature", PlayerKind::Neutral, 2);
    players
}

fn farm_of(h: &Harness) -> Option<UnitId> {
    let farm = h.type_id("farm");
    h.sim.world().units.iter().find(|u| u.type_id == farm).map(|u| u.id)
}

#[test]
fn test_repair_restores_in_type_steps_until_full() {
    let mut h = Harness::new(24, 24);
    let peasant = h.spawn("peasant", 2, 2, 0);
    let farm = h.spawn("farm", 5, 2, 0);
    h.set_hit_points(farm, 380);
    h.command(peasant, Command::Repair(farm));

    let mut full = false;
    for _ in 0..120 {
        h.tick();
        let now = hp(&h, farm);
        assert_eq!((now - 380) % 4, 0, "repaired by an odd amount: {now}");
        if now == 400 {
            full = true;
            break;
        }
    }
    assert!(full, "farm never reached full health");

    h.run(2);
    assert_eq!(h.current(peasant), OrderKind::Still);
    assert_eq!(hp(&h, farm), 400);
}

#[test]
fn test_repair_of_a_full_unit_finishes_at_once() {
    let mut h = Harness::new(24, 24);
    let peasant = h.spawn("peasant", 2, 2, 0);
    let farm = h.spawn("farm", 5, 2, 0);
    h.command(peasant, Command::Repair(farm));

    h.run(2);
    assert_eq!(h.current(peasant), OrderKind::Still);
    assert_eq!(h.unit(peasant).tile_pos, TilePos::new(2, 2));
}

#[test]
fn test_pick_up_heals_up_to_max_and_consumes_item() {
    let mut h = Harness::with_players(24, 24, with_wildlife(Control::Human), 3);
    let footman = h.spawn("footman", 4, 4, 0);
    let potion = h.spawn("healing-potion", 8, 4, 2);
    h.set_hit_points(footman, 50);
    h.command(footman, Command::PickUp(potion));

    let mut released = false;
    for _ in 0..40 {
        if h.tick().released.contains(&potion) {
            released = true;
            break;
        }
    }
    assert!(released, "potion was never consumed");
    assert!(h.sim.unit(potion).is_none());
    assert_eq!(hp(&h, footman), 60);
    h.tick();
    assert_eq!(h.current(footman), OrderKind::Still);
}

#[test]
fn test_pick_up_of_a_vanished_item_finishes() {
    let mut h = Harness::with_players(24, 24, with_wildlife(Control::Human), 3);
    let footman = h.spawn("footman", 4, 4, 0);
    let potion = h.spawn("healing-potion", 12, 4, 2);
    h.command(footman, Command::PickUp(potion));
    h.run(2);
    assert!(h.sim.world_mut().release_unit(potion).is_some());

    h.run(2);
    assert_eq!(h.current(footman), OrderKind::Still);
    assert_eq!(hp(&h, footman), 60);
}

#[test]
fn test_build_places_then_raises_the_building() {
    let mut h = Harness::new(24, 24);
    let peasant = h.spawn("peasant", 2, 2, 0);
    let farm_type = h.type_id("farm");
    h.command(
        peasant,
        Command::Build {
            unit_type: farm_type,
            pos: TilePos::new(5, 2),
            layer: 0,
        },
    );

    let placed = h.run_until(40, |sim| sim.world().units.iter().any(|u| u.type_id == farm_type));
    assert!(placed.is_some(), "farm was never placed");
    let farm = farm_of(&h).expect("farm placed");
    assert!(!h.unit(farm).constructed);
    assert!(hp(&h, farm) < 400);
    assert_eq!(h.unit(farm).tile_pos, TilePos::new(5, 2));

    let mut completed = false;
    for _ in 0..200 {
        let events = h.tick();
        if events.buildings_completed.contains(&farm) {
            completed = true;
            break;
        }
        // 400 hit points over 20 build actions.
        assert_eq!((hp(&h, farm) - 1) % 20, 0);
    }
    assert!(completed, "farm was never completed");
    assert!(h.unit(farm).constructed);
    assert_eq!(hp(&h, farm), 400);

    h.tick();
    assert_eq!(h.current(peasant), OrderKind::Still);
}

#[test]
fn test_build_on_an_occupied_site_is_abandoned() {
    let mut h = Harness::new(24, 24);
    let peasant = h.spawn("peasant", 2, 2, 0);
    let squatter = h.spawn("footman", 5, 2, 0);
    h.command(squatter, Command::StandGround);
    let farm_type = h.type_id("farm");
    h.command(
        peasant,
        Command::Build {
            unit_type: farm_type,
            pos: TilePos::new(5, 2),
            layer: 0,
        },
    );

    let gave_up = h.run_until(60, |sim| {
        sim.unit(peasant)
            .and_then(|u| u.orders.current())
            .is_some_and(|o| o.kind() == OrderKind::Still)
    });
    assert!(gave_up.is_some(), "peasant kept trying to build");
    assert!(farm_of(&h).is_none());
}

#[test]
fn test_patrol_walks_back_and_forth() {
    let mut h = Harness::new(24, 24);
    let footman = h.spawn("footman", 4, 10, 0);
    h.command(footman, Command::Patrol { pos: TilePos::new(10, 10), layer: 0 });

    let out = h.run_until(60, |sim| sim.unit(footman).is_some_and(|u| u.tile_pos == TilePos::new(10, 10)));
    assert!(out.is_some(), "never reached the far end");
    let back = h.run_until(60, |sim| sim.unit(footman).is_some_and(|u| u.tile_pos == TilePos::new(4, 10)));
    assert!(back.is_some(), "never came back");
    assert_eq!(h.current(footman), OrderKind::Patrol);
}

#[test]
fn test_patrol_engages_and_keeps_its_route() {
    let mut h = Harness::with_players(24, 24, rivals(Control::Ai, Control::Human), 5);
    let footman = h.spawn("footman", 2, 10, 0);
    let enemy = h.spawn("footman", 12, 12, 1);
    h.command(enemy, Command::StandGround);
    h.command(footman, Command::Patrol { pos: TilePos::new(20, 10), layer: 0 });

    let engaged = h.run_until(80, |sim| {
        sim.unit(footman)
            .is_some_and(|u| u.orders.iter().any(|o| o.kind() == OrderKind::Attack))
    });
    assert!(engaged.is_some(), "patrol never reacted to the enemy");
    match h.unit(footman).orders.saved() {
        Some(Order::Patrol(patrol)) => {
            assert_eq!(patrol.goal_pos, TilePos::new(20, 10));
            assert_eq!(patrol.waypoint, TilePos::new(2, 10));
        }
        other => panic!("expected a saved patrol, got {:?}", other.map(Order::kind)),
    }
}

#[test]
fn test_patrol_repairs_on_the_way_then_resumes() {
    let mut h = Harness::new(24, 24);
    let peasant = h.spawn("peasant", 2, 2, 0);
    let farm = h.spawn("farm", 4, 6, 0);
    h.set_hit_points(farm, 392);
    h.command(peasant, Command::Patrol { pos: TilePos::new(2, 16), layer: 0 });

    let reacted = h.run_until(10, |sim| {
        sim.unit(peasant)
            .is_some_and(|u| u.orders.iter().any(|o| o.kind() == OrderKind::Repair))
    });
    assert!(reacted.is_some(), "patrol never repaired");
    assert!(matches!(h.unit(peasant).orders.saved(), Some(Order::Patrol(_))));

    let resumed = h.run_until(80, |sim| {
        sim.unit(peasant)
            .and_then(|u| u.orders.current())
            .is_some_and(|o| o.kind() == OrderKind::Patrol)
            && sim.unit(farm).is_some_and(|f| f.hit_points() == 400)
    });
    assert!(resumed.is_some(), "patrol did not resume after the repair");
    assert!(h.unit(peasant).orders.saved().is_none());
}
