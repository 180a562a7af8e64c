//! Determinism testing utilities.
//!
//! Lockstep clients only stay in sync if every client computes the same
//! tick from the same commands. The usual ways that breaks in an order
//! executor:
//!
//! - **Iteration order**: units must act in ascending id order, and any
//!   candidate scan must break ties by id rather than by container layout.
//! - **Randomness**: every roll goes through the world's synchronized RNG.
//! - **Floats**: movement progress and threat scores use fixed-point.
//! - **Hidden state**: anything that influences a later tick has to be
//!   hashed and saved, or a reload diverges.
//!
//! The helpers here run the same setup several times, on several threads,
//! or through a save round trip, and compare [`Simulation::state_hash`].

use std::thread;

use stratum_core::commands::Command;
use stratum_core::save::SaveGame;
use stratum_core::simulation::Simulation;
use stratum_core::unit::UnitId;

/// State hash after every tick of one run; entry 0 is the starting state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashTrace(pub Vec<u64>);

impl HashTrace {
    /// Run `ticks` ticks, hashing after each.
    pub fn record(sim: &mut Simulation, ticks: u64) -> Self {
        let mut hashes = Vec::with_capacity(ticks as usize + 1);
        hashes.push(sim.state_hash());
        for _ in 0..ticks {
            sim.tick();
            hashes.push(sim.state_hash());
        }
        Self(hashes)
    }

    /// Hash after the last tick.
    #[must_use]
    pub fn final_hash(&self) -> u64 {
        self.0.last().copied().unwrap_or_default()
    }

    /// First tick at which the traces disagree.
    #[must_use]
    pub fn first_divergence(&self, other: &Self) -> Option<u64> {
        self.0
            .iter()
            .zip(&other.0)
            .position(|(a, b)| a != b)
            .or_else(|| (self.0.len() != other.0.len()).then(|| self.0.len().min(other.0.len())))
            .map(|tick| tick as u64)
    }
}

/// Final hashes of several runs of one setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismReport {
    /// Ticks each run simulated.
    pub ticks: u64,
    /// Final hash per run.
    pub hashes: Vec<u64>,
}

impl DeterminismReport {
    /// Whether every run ended on the same hash.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Number of distinct final hashes.
    #[must_use]
    pub fn distinct(&self) -> usize {
        let mut unique = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique.len()
    }

    /// Fail the test unless all runs agree.
    ///
    /// # Panics
    ///
    /// Panics when the runs disagree.
    pub fn assert_deterministic(&self) {
        assert!(
            self.is_deterministic(),
            "{} runs of {} ticks ended on {} different hashes: {:?}",
            self.hashes.len(),
            self.ticks,
            self.distinct(),
            self.hashes
        );
    }
}

/// Build and run the setup `runs` times in sequence.
pub fn repeat_runs<F>(setup_fn: F, runs: usize, ticks: u64) -> DeterminismReport
where
    F: Fn() -> Simulation,
{
    let hashes: Vec<u64> = (0..runs)
        .map(|_| {
            let mut sim = setup_fn();
            sim.run(ticks);
            sim.state_hash()
        })
        .collect();
    DeterminismReport { ticks, hashes }
}

/// Build and run the setup `runs` times on scoped threads.
///
/// # Panics
///
/// Panics if a simulation thread panics.
pub fn parallel_runs<F>(setup_fn: F, runs: usize, ticks: u64) -> DeterminismReport
where
    F: Fn() -> Simulation + Sync,
{
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..runs)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    sim.run(ticks);
                    sim.state_hash()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });
    DeterminismReport { ticks, hashes }
}

/// Trace two fresh runs and report where they part.
pub fn find_first_divergence<F>(setup_fn: F, ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let a = HashTrace::record(&mut setup_fn(), ticks);
    let b = HashTrace::record(&mut setup_fn(), ticks);
    a.first_divergence(&b)
}

/// Whether a bincode snapshot taken after `ticks` restores to the same hash.
pub fn snapshot_round_trip<F>(setup_fn: F, ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let mut sim = setup_fn();
    sim.run(ticks);
    sim.serialize()
        .and_then(|bytes| Simulation::deserialize(&bytes))
        .is_ok_and(|restored| restored.state_hash() == sim.state_hash())
}

/// Run `before` ticks, save to RON and reload, then run `after` more ticks
/// on both the original and the reloaded game.
///
/// Returns the two final hashes, or `None` if the save failed to load.
pub fn save_load_continue<F>(setup_fn: F, before: u64, after: u64) -> Option<(u64, u64)>
where
    F: Fn() -> Simulation,
{
    let mut original = setup_fn();
    original.run(before);

    let text = SaveGame::capture(&original).to_ron().ok()?;
    let types = original.world().types.clone();
    let mut reloaded = SaveGame::from_ron_str(&text).ok()?.restore(types).ok()?;

    original.run(after);
    reloaded.run(after);
    Some((original.state_hash(), reloaded.state_hash()))
}

/// Replay a command script against a fresh setup.
///
/// Each entry is issued (flushing) right before the tick it names; rejected
/// commands are skipped.
pub fn run_script<F>(setup_fn: F, script: &[(u64, usize, Command)], num_ticks: u64) -> u64
where
    F: Fn() -> Simulation,
{
    let mut sim = setup_fn();
    let ids: Vec<UnitId> = sim.world().units.sorted_ids();
    for tick in 0..num_ticks {
        for (_, index, command) in script.iter().filter(|(t, _, _)| *t == tick) {
            if let Some(&unit) = ids.get(index % ids.len().max(1)) {
                let _ = sim.apply_command(unit, command);
            }
        }
        sim.tick();
    }
    sim.state_hash()
}

/// Proptest strategies for determinism testing.
pub mod strategies {
    use proptest::prelude::*;
    use stratum_core::commands::Command;
    use stratum_core::math::TilePos;

    /// A tile inside a `width` by `height` map.
    pub fn arb_tile(width: i32, height: i32) -> impl Strategy<Value = TilePos> {
        (0..width, 0..height).prop_map(|(x, y)| TilePos::new(x, y))
    }

    /// A tile that may lie up to `margin` tiles off the map.
    pub fn arb_tile_around(width: i32, height: i32, margin: i32) -> impl Strategy<Value = TilePos> {
        (-margin..width + margin, -margin..height + margin).prop_map(|(x, y)| TilePos::new(x, y))
    }

    /// A command without unit references.
    pub fn arb_ground_command(width: i32, height: i32) -> impl Strategy<Value = Command> {
        prop_oneof![
            arb_tile(width, height).prop_map(|pos| Command::Move { pos, layer: 0 }),
            arb_tile(width, height).prop_map(|pos| Command::AttackMove { pos, layer: 0 }),
            arb_tile(width, height).prop_map(|pos| Command::Patrol { pos, layer: 0 }),
            arb_tile(width, height).prop_map(|pos| Command::AttackGround { pos, layer: 0 }),
            Just(Command::Stop),
            Just(Command::StandGround),
        ]
    }

    /// A tick-stamped script of `(tick, unit index, command)` entries.
    pub fn arb_command_script(
        width: i32,
        height: i32,
        max_tick: u64,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<(u64, usize, Command)>> {
        proptest::collection::vec((0..max_tick, 0usize..64, arb_ground_command(width, height)), 0..max_len)
    }

    /// A simulation seed.
    pub fn arb_seed() -> impl Strategy<Value = u64> {
        any::<u64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{skirmish, Harness};

    #[test]
    fn test_empty_world_is_stable() {
        let trace = HashTrace::record(&mut Harness::new(16, 16).sim, 50);
        assert_eq!(trace.0.len(), 51);
        assert_eq!(find_first_divergence(|| Harness::new(16, 16).sim, 50), None);
    }

    #[test]
    fn test_skirmish_repeats() {
        let report = repeat_runs(|| skirmish(12, 42), 3, 150);
        report.assert_deterministic();
        assert_eq!(report.distinct(), 1);
    }

    #[test]
    fn test_parallel_skirmish_repeats() {
        parallel_runs(|| skirmish(8, 3), 4, 120).assert_deterministic();
    }

    #[test]
    fn test_divergence_points_at_first_bad_tick() {
        let a = HashTrace(vec![1, 2, 3, 4]);
        let b = HashTrace(vec![1, 2, 9, 4]);
        assert_eq!(a.first_divergence(&b), Some(2));
        assert_eq!(a.first_divergence(&a.clone()), None);
        assert_eq!(a.first_divergence(&HashTrace(vec![1, 2])), Some(2));
    }

    #[test]
    fn test_different_seeds_diverge() {
        let a = HashTrace::record(&mut skirmish(10, 1), 200);
        let b = HashTrace::record(&mut skirmish(10, 2), 200);
        assert!(a.first_divergence(&b).is_some());
        assert_ne!(a.final_hash(), b.final_hash());
    }

    #[test]
    fn test_snapshot_preserves_skirmish() {
        assert!(snapshot_round_trip(|| skirmish(10, 5), 60));
    }

    #[test]
    fn test_save_load_continue_matches() {
        let (a, b) = save_load_continue(|| skirmish(10, 11), 40, 80).expect("save loads");
        assert_eq!(a, b);
    }

    #[test]
    fn test_script_ignores_rejected_commands() {
        let setup = || {
            let mut h = Harness::new(24, 24);
            h.spawn("peasant", 2, 2, 0);
            h.sim
        };
        // A peasant cannot attack; the entry is skipped and the run equals an empty script.
        let rejected = vec![(0, 0, Command::AttackGround { pos: stratum_core::math::TilePos::new(5, 5), layer: 0 })];
        assert_eq!(run_script(setup, &rejected, 30), run_script(setup, &[], 30));
    }
}
