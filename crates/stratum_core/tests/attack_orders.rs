//! Attack order behavior against the standard roster.

use proptest::prelude::*;
use stratum_core::commands::Command;
use stratum_core::math::TilePos;
use stratum_core::orders::{AttackPhase, Order, OrderKind};
use stratum_core::pathfinding::PathDecision;
use stratum_core::simulation::Services;
use stratum_core::threat::ThreatScore;
use stratum_core::unit::UnitId;
use stratum_test_utils::fixtures::{rivals, Control, Harness};
use stratum_test_utils::stubs::{request_count, widest_range, AlwaysUnreachable, ConstantThreat, FavoredTarget, ScriptedPathfinder};

fn attack_phase(h: &Harness, id: UnitId) -> Option<AttackPhase> {
    match h.current_order(id) {
        Order::Attack(attack) => Some(attack.phase),
        _ => None,
    }
}

fn attack_goal(h: &Harness, id: UnitId) -> Option<UnitId> {
    match h.current_order(id) {
        Order::Attack(attack) => attack.goal,
        _ => None,
    }
}

fn distance(h: &Harness, a: UnitId, b: UnitId) -> i32 {
    h.unit(a).distance_to_unit(h.unit(b))
}

#[test]
fn test_unreachable_point_widens_then_gives_up() {
    let (stub, log) = AlwaysUnreachable::new();
    let mut h = Harness::new(32, 32).with_services(Services {
        pathfinder: Box::new(stub),
        ..Services::default()
    });
    let footman = h.spawn("footman", 2, 2, 0);
    h.command(footman, Command::AttackMove { pos: TilePos::new(25, 25), layer: 0 });

    let cap = h.unit(footman).attack_range() + h.sim.world().config.max_range_widening;
    let mut last_range = 0;
    let mut finished_after = None;
    for tick in 0..200 {
        h.tick();
        match h.current_order(footman) {
            Order::Attack(attack) => {
                assert!(attack.range >= last_range, "range shrank at tick {tick}");
                assert!(attack.range <= cap, "range {} passed the cap", attack.range);
                last_range = attack.range;
            }
            order => {
                assert_eq!(order.kind(), OrderKind::Still);
                finished_after = Some(tick);
                break;
            }
        }
    }

    assert!(finished_after.is_some(), "attack-move never gave up");
    assert_eq!(last_range, cap);
    assert_eq!(widest_range(&log), Some(cap));
    assert_eq!(h.unit(footman).tile_pos, TilePos::new(2, 2));
}

#[test]
fn test_unreachable_move_finishes_without_waiting() {
    let (stub, log) = AlwaysUnreachable::new();
    let mut h = Harness::new(32, 32)
        .configure(|c| c.max_range_widening = 3)
        .with_services(Services {
            pathfinder: Box::new(stub),
            ..Services::default()
        });
    let footman = h.spawn("footman", 2, 2, 0);
    h.command(footman, Command::Move { pos: TilePos::new(25, 25), layer: 0 });

    // Ranges 0, 1, 2 and 3 are each tried once, then the order finishes.
    h.run(4);
    assert_eq!(request_count(&log), 4);
    h.tick();
    assert_eq!(h.current(footman), OrderKind::Still);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_widening_is_monotonic_and_bounded(
        widening in 0i32..12,
        wait in 0u32..4,
        gx in 12i32..30,
        gy in 12i32..30,
    ) {
        let (stub, _log) = AlwaysUnreachable::new();
        let mut h = Harness::new(32, 32)
            .configure(|c| {
                c.max_range_widening = widening;
                c.unreachable_retry_wait = wait;
            })
            .with_services(Services { pathfinder: Box::new(stub), ..Services::default() });
        let archer = h.spawn("archer", 1, 1, 0);
        h.command(archer, Command::AttackMove { pos: TilePos::new(gx, gy), layer: 0 });

        let cap = h.unit(archer).attack_range() + widening;
        let budget = u64::try_from(widening + 2).unwrap_or(0) * u64::from(wait + 1) + 4;
        let mut last = 0;
        let mut gave_up = false;
        for _ in 0..budget {
            h.tick();
            match h.current_order(archer) {
                Order::Attack(attack) => {
                    prop_assert!(attack.range >= last);
                    prop_assert!(attack.range <= cap);
                    last = attack.range;
                }
                _ => {
                    gave_up = true;
                    break;
                }
            }
        }
        prop_assert!(gave_up);
    }
}

#[test]
fn test_min_range_distance_is_outside_band() {
    let mut h = Harness::new(24, 24);
    let catapult = h.spawn("catapult", 4, 10, 0);
    let target = h.spawn("footman", 6, 10, 1);
    h.command(target, Command::StandGround);
    assert_eq!(distance(&h, catapult, target), 2);

    h.command(catapult, Command::Attack(target));
    h.tick();
    assert_eq!(attack_phase(&h, catapult), Some(AttackPhase::MoveToTarget));
}

#[test]
fn test_max_range_distance_attacks() {
    let mut h = Harness::new(24, 24);
    let catapult = h.spawn("catapult", 2, 10, 0);
    let target = h.spawn("footman", 10, 10, 1);
    h.command(target, Command::StandGround);
    assert_eq!(distance(&h, catapult, target), 8);

    h.command(catapult, Command::Attack(target));
    h.tick();
    assert_eq!(attack_phase(&h, catapult), Some(AttackPhase::AttackTarget));
    assert_eq!(h.unit(catapult).tile_pos, TilePos::new(2, 10));
}

#[test]
fn test_one_past_max_range_does_not_attack() {
    let mut h = Harness::new(24, 24);
    let catapult = h.spawn("catapult", 1, 10, 0);
    let target = h.spawn("footman", 10, 10, 1);
    h.command(target, Command::StandGround);
    assert_eq!(distance(&h, catapult, target), 9);

    h.command(catapult, Command::Attack(target));
    h.tick();
    assert_eq!(attack_phase(&h, catapult), Some(AttackPhase::MoveToTarget));
}

#[test]
fn test_blocked_line_forces_approach() {
    let mut h = Harness::new(24, 24);
    let archer = h.spawn("archer", 4, 10, 0);
    let target = h.spawn("footman", 7, 10, 1);
    h.command(target, Command::StandGround);
    h.block(5, 10, stratum_core::map::MapFieldFlags::AIR_UNPASSABLE);

    h.command(archer, Command::Attack(target));
    h.tick();
    assert_eq!(attack_phase(&h, archer), Some(AttackPhase::MoveToTarget));
}

#[test]
fn test_blocked_path_neither_widens_nor_gives_up() {
    let (stub, log) = ScriptedPathfinder::new([PathDecision::Blocked; 3]);
    let mut h = Harness::new(24, 24).with_services(Services {
        pathfinder: Box::new(stub),
        ..Services::default()
    });
    let footman = h.spawn("footman", 4, 10, 0);
    let target = h.spawn("footman", 10, 10, 1);
    h.command(target, Command::StandGround);
    h.command(footman, Command::Attack(target));

    h.run(3);
    assert_eq!(request_count(&log), 3);
    match h.current_order(footman) {
        Order::Attack(attack) => {
            assert_eq!(attack.phase, AttackPhase::MoveToTarget);
            assert_eq!(attack.range, 1);
            assert_eq!(attack.goal, Some(target));
        }
        order => panic!("expected an attack, got {:?}", order.kind()),
    }
    assert_eq!(h.unit(footman).tile_pos, TilePos::new(4, 10));

    let engaged = h.run_until(40, |sim| {
        matches!(
            sim.unit(footman).and_then(|u| u.orders.current()),
            Some(Order::Attack(a)) if a.phase == AttackPhase::AttackTarget
        )
    });
    assert!(engaged.is_some(), "never closed in once the path cleared");
}

#[test]
fn test_path_that_stays_blocked_backs_off_between_retries() {
    let (stub, log) = ScriptedPathfinder::new([PathDecision::Blocked; 12]);
    let mut h = Harness::new(24, 24).with_services(Services {
        pathfinder: Box::new(stub),
        ..Services::default()
    });
    let footman = h.spawn("footman", 4, 10, 0);
    let target = h.spawn("footman", 10, 10, 1);
    h.command(target, Command::StandGround);
    h.command(footman, Command::Attack(target));

    h.run(5);
    assert_eq!(request_count(&log), 5);
    assert_eq!(h.unit(footman).wait, 5);

    // Waiting out the back-off asks for nothing.
    h.run(5);
    assert_eq!(request_count(&log), 5);
    assert_eq!(attack_phase(&h, footman), Some(AttackPhase::MoveToTarget));
    assert_eq!(attack_goal(&h, footman), Some(target));

    h.run(1);
    assert_eq!(request_count(&log), 6);
    match h.current_order(footman) {
        Order::Attack(attack) => {
            assert_eq!(attack.range, 1);
            assert_eq!(attack.blocked, 1);
        }
        order => panic!("expected an attack, got {:?}", order.kind()),
    }
}

#[test]
fn test_blocked_move_backs_off_then_arrives() {
    let (stub, log) = ScriptedPathfinder::new([PathDecision::Blocked; 5]);
    let mut h = Harness::new(24, 24).with_services(Services {
        pathfinder: Box::new(stub),
        ..Services::default()
    });
    let footman = h.spawn("footman", 4, 10, 0);
    h.command(footman, Command::Move { pos: TilePos::new(9, 10), layer: 0 });

    h.run(10);
    assert_eq!(request_count(&log), 5);
    assert_eq!(h.current(footman), OrderKind::Move);
    assert_eq!(h.unit(footman).tile_pos, TilePos::new(4, 10));

    let arrived = h.run_until(40, |sim| sim.unit(footman).is_some_and(|u| u.tile_pos == TilePos::new(9, 10)));
    assert!(arrived.is_some(), "never moved once the path cleared");
}

#[test]
fn test_kiting_archer_attacks_only_at_exact_range() {
    let mut h = Harness::with_players(24, 24, rivals(Control::Ai, Control::Human), 3);
    let archer = h.spawn("archer", 8, 10, 0);
    let target = h.spawn("footman", 11, 10, 1);
    h.command(target, Command::StandGround);
    assert_eq!(distance(&h, archer, target), 3);

    h.command(archer, Command::Attack(target));
    match h.current_order(archer) {
        Order::Attack(attack) => assert_eq!(attack.min_range, 3),
        order => panic!("expected an attack, got {:?}", order.kind()),
    }
    h.tick();
    assert_eq!(attack_phase(&h, archer), Some(AttackPhase::MoveToTarget));

    let mut attacked = 0;
    for _ in 0..80 {
        h.tick();
        if !h.alive(target) {
            break;
        }
        if attack_phase(&h, archer) == Some(AttackPhase::AttackTarget) {
            assert_eq!(distance(&h, archer, target), 4);
            attacked += 1;
        }
    }
    assert!(attacked > 0, "archer never settled at its attack range");
}

#[test]
fn test_equal_threat_targets_do_not_oscillate() {
    let mut h = Harness::with_players(24, 24, rivals(Control::Ai, Control::Human), 5).with_services(Services {
        threat: Box::new(ConstantThreat(ThreatScore::from_int(5))),
        ..Services::default()
    });
    let archer = h.spawn("archer", 10, 10, 0);
    let first = h.spawn("footman", 13, 10, 1);
    let second = h.spawn("footman", 10, 13, 1);
    h.command(first, Command::StandGround);
    h.command(second, Command::StandGround);

    // The higher id loses every tie, so picking it tests that ties never retarget.
    h.command(archer, Command::Attack(second));
    for tick in 0..10 {
        h.tick();
        assert_eq!(attack_goal(&h, archer), Some(second), "retargeted at tick {tick}");
    }
}

#[test]
fn test_ai_strong_attack_keeps_its_goal_in_range() {
    let mut h = Harness::with_players(24, 24, rivals(Control::Ai, Control::Human), 6);
    let archer = h.spawn("archer", 10, 10, 0);
    let given = h.spawn("footman", 14, 10, 1);
    let favored = h.spawn("footman", 10, 14, 1);
    h.command(given, Command::StandGround);
    h.command(favored, Command::StandGround);
    h.sim.services_mut().threat = Box::new(FavoredTarget(favored));

    h.command(archer, Command::Attack(given));
    for tick in 0..20 {
        h.tick();
        assert_eq!(attack_goal(&h, archer), Some(given), "switched targets at tick {tick}");
        assert_eq!(attack_phase(&h, archer), Some(AttackPhase::AttackTarget));
    }
    assert!(h.unit(archer).orders.saved().is_none());
}

#[test]
fn test_opportunistic_target_is_weak_and_stays_weak() {
    let mut h = Harness::new(24, 24);
    let footman = h.spawn("footman", 2, 10, 0);
    let enemy = h.spawn("footman", 12, 10, 1);
    h.command(enemy, Command::StandGround);
    h.command(footman, Command::AttackMove { pos: TilePos::new(20, 10), layer: 0 });

    let engaged = h.run_until(60, |sim| {
        matches!(sim.unit(footman).and_then(|u| u.orders.current()), Some(Order::Attack(a)) if a.goal == Some(enemy))
    });
    assert!(engaged.is_some(), "never engaged the enemy on the way");

    let mut saw_attack_phase = false;
    for _ in 0..40 {
        let Order::Attack(attack) = h.current_order(footman) else {
            break;
        };
        if attack.goal != Some(enemy) {
            break;
        }
        assert!(attack.weak_target);
        saw_attack_phase |= attack.phase == AttackPhase::AttackTarget;
        h.tick();
    }
    assert!(saw_attack_phase);
}

#[test]
fn test_interrupted_move_resumes_with_original_range() {
    let mut h = Harness::with_players(20, 48, rivals(Control::Ai, Control::Human), 8);
    let knight = h.spawn("knight", 10, 40, 0);
    let archer = h.spawn("archer", 13, 36, 1);
    let destination = TilePos::new(10, 10);

    h.command(knight, Command::Move { pos: destination, layer: 0 });
    let original = h.current_order(knight).clone();
    h.command(archer, Command::Attack(knight));

    let interrupted = h.run_until(60, |sim| {
        sim.unit(knight)
            .and_then(|u| u.orders.current())
            .is_some_and(|o| o.kind() == OrderKind::Attack)
    });
    assert!(interrupted.is_some(), "knight never fought back");
    assert_eq!(h.unit(knight).orders.saved(), Some(&original));

    let killed = h.run_until(400, |sim| sim.unit(archer).map_or(true, |u| !u.is_alive_on_map()));
    assert!(killed.is_some(), "archer survived");

    let resumed = h.run_until(20, |sim| {
        sim.unit(knight)
            .and_then(|u| u.orders.current())
            .is_some_and(|o| o.kind() == OrderKind::Move)
    });
    assert!(resumed.is_some(), "knight did not resume its move");
    assert_eq!(h.current_order(knight), &original);
    assert!(h.unit(knight).orders.saved().is_none());

    let arrived = h.run_until(200, |sim| sim.unit(knight).is_some_and(|u| u.tile_pos == destination));
    assert!(arrived.is_some(), "knight never reached {destination}");
}
