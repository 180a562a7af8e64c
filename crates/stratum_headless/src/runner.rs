//! Scenario execution and reporting.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use stratum_core::error::Result;
use stratum_core::replay::Replay;
use stratum_core::simulation::{Simulation, TickEvents};

use crate::scenario::PreparedScenario;

/// Per-player outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    /// Display name.
    pub name: String,
    /// Units still owned.
    pub units: u32,
}

/// Outcome of a headless run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Scenario name.
    pub scenario: String,
    /// Seed used.
    pub seed: u64,
    /// Final tick.
    pub ticks: u64,
    /// State hash at the final tick.
    pub final_hash: u64,
    /// Units in storage at the end.
    pub units: usize,
    /// Per-player unit counts.
    pub players: Vec<PlayerSummary>,
    /// Damage events seen.
    pub damage_events: usize,
    /// Total damage dealt.
    pub damage_dealt: i64,
    /// Units killed.
    pub deaths: usize,
    /// Unit slots released.
    pub released: usize,
    /// Missiles launched.
    pub missiles_fired: usize,
    /// Spells cast.
    pub spells_cast: usize,
    /// Buildings finished.
    pub buildings_completed: usize,
    /// Scripted commands the simulation refused.
    pub rejected_commands: usize,
}

impl RunReport {
    fn absorb(&mut self, events: &TickEvents) {
        self.damage_events += events.damage.len();
        self.damage_dealt += events.damage.iter().map(|d| i64::from(d.damage)).sum::<i64>();
        self.deaths += events.deaths.len();
        self.released += events.released.len();
        self.missiles_fired += events.missiles_fired;
        self.spells_cast += events.spells_cast.len();
        self.buildings_completed += events.buildings_completed.len();
    }

    fn finish(&mut self, sim: &Simulation) {
        self.ticks = sim.get_tick();
        self.final_hash = sim.state_hash();
        self.units = sim.world().units.len();
        self.players = sim
            .world()
            .players
            .iter()
            .map(|p| PlayerSummary {
                name: p.name.clone(),
                units: p.unit_count,
            })
            .collect();
    }
}

/// Runs a prepared scenario tick by tick.
#[derive(Debug)]
pub struct HeadlessRunner {
    prepared: PreparedScenario,
    next_command: usize,
    report: RunReport,
    replay: Option<Replay>,
}

impl HeadlessRunner {
    /// Wrap a prepared scenario.
    #[must_use]
    pub fn new(name: impl Into<String>, prepared: PreparedScenario) -> Self {
        let report = RunReport {
            scenario: name.into(),
            seed: prepared.seed,
            ..RunReport::default()
        };
        Self {
            prepared,
            next_command: 0,
            report,
            replay: None,
        }
    }

    /// Record issued commands into a replay.
    ///
    /// # Errors
    ///
    /// Fails if the initial state cannot be serialized.
    pub fn record_replay(mut self) -> Result<Self> {
        let sim = &self.prepared.simulation;
        self.replay = Some(Replay::new(self.report.scenario.clone(), self.report.seed, sim)?);
        Ok(self)
    }

    /// The simulation being run.
    #[must_use]
    pub fn simulation(&self) -> &Simulation {
        &self.prepared.simulation
    }

    /// Issue due commands, then advance one tick.
    pub fn step(&mut self) {
        let sim = &mut self.prepared.simulation;
        let tick = sim.get_tick();
        while let Some(scheduled) = self.prepared.schedule.get(self.next_command) {
            if scheduled.tick > tick {
                break;
            }
            match sim.issue(scheduled.unit, &scheduled.command, scheduled.mode) {
                Ok(()) => {
                    debug!(tick, unit = %scheduled.unit, command = ?scheduled.command, "Command issued");
                }
                Err(e) => {
                    warn!(tick, unit = %scheduled.unit, error = %e, "Scripted command rejected");
                    self.report.rejected_commands += 1;
                }
            }
            // Rejected commands are recorded too; playback rejects them the same way.
            if let Some(replay) = &mut self.replay {
                replay.record_command(tick, scheduled.unit, scheduled.command.clone(), scheduled.mode);
            }
            self.next_command += 1;
        }
        let events = sim.tick();
        self.report.absorb(&events);
        if let Some(replay) = &mut self.replay {
            replay.observe(sim);
        }
    }

    /// Run `ticks` ticks.
    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Finish the run; returns the simulation, the report and the replay if recorded.
    #[must_use]
    pub fn finish(mut self) -> (Simulation, RunReport, Option<Replay>) {
        let sim = self.prepared.simulation;
        self.report.finish(&sim);
        if let Some(replay) = &mut self.replay {
            replay.finalize(sim.get_tick(), self.report.final_hash);
        }
        info!(
            scenario = %self.report.scenario,
            ticks = self.report.ticks,
            hash = format_args!("{:016x}", self.report.final_hash),
            deaths = self.report.deaths,
            "Run complete"
        );
        (sim, self.report, self.replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;
    use stratum_core::replay::ReplayPlayer;
    use stratum_test_utils::fixtures::standard_types;

    const SKIRMISH: &str = r#"(
        name: "three-on-three",
        map_size: (24, 16),
        seed: 4,
        ticks: 400,
        config: (fog_of_war: false),
        players: [
            (name: "red", kind: Computer, enemies: [1]),
            (name: "blue", kind: Computer, team: 1),
        ],
        units: [
            (unit_type: "footman", player: 0, x: 3, y: 5),
            (unit_type: "archer", player: 0, x: 2, y: 8),
            (unit_type: "knight", player: 0, x: 3, y: 11),
            (unit_type: "footman", player: 1, x: 20, y: 5),
            (unit_type: "archer", player: 1, x: 21, y: 8),
            (unit_type: "knight", player: 1, x: 20, y: 11),
        ],
        script: [
            (unit: 0, command: AttackMove(20, 5)),
            (unit: 1, command: AttackMove(20, 8)),
            (unit: 2, command: AttackMove(20, 11)),
            (unit: 3, command: AttackMove(3, 5)),
            (unit: 4, command: AttackMove(3, 8)),
            (unit: 5, command: AttackMove(3, 11)),
            (tick: 30, unit: 3, command: Attack(9)),
        ],
    )"#;

    #[test]
    fn test_script_with_unplaced_target_is_rejected() {
        let err = Scenario::from_ron_str(SKIRMISH)
            .expect("parse")
            .prepare(standard_types(), None)
            .unwrap_err();
        assert!(matches!(err, crate::scenario::ScenarioError::UnknownUnit(9)));
    }

    fn valid_runner() -> HeadlessRunner {
        let mut scenario = Scenario::from_ron_str(SKIRMISH).expect("parse");
        scenario.script.pop();
        let prepared = scenario.prepare(standard_types(), None).expect("prepare");
        HeadlessRunner::new(scenario.name, prepared)
    }

    #[test]
    fn test_skirmish_produces_damage() {
        let mut runner = valid_runner();
        runner.run(400);
        let (_, report, replay) = runner.finish();
        assert_eq!(report.ticks, 400);
        assert!(report.damage_events > 0);
        assert!(report.damage_dealt > 0);
        assert_eq!(report.rejected_commands, 0);
        assert!(replay.is_none());
    }

    #[test]
    fn test_same_seed_same_report() {
        let mut a = valid_runner();
        let mut b = valid_runner();
        a.run(250);
        b.run(250);
        assert_eq!(a.finish().1, b.finish().1);
    }

    #[test]
    fn test_recorded_replay_verifies() {
        let mut runner = valid_runner().record_replay().expect("replay");
        runner.run(250);
        let (_, report, replay) = runner.finish();
        let replay = replay.expect("recorded");
        assert_eq!(replay.command_count(), 6);
        assert_eq!(replay.checkpoints.len(), 2);
        assert_eq!(replay.final_hash, report.final_hash);

        let mut player = ReplayPlayer::new(replay).expect("player");
        player.verify().expect("replay matches run");
    }

    #[test]
    fn test_runner_exposes_simulation() {
        let runner = valid_runner();
        assert_eq!(runner.simulation().get_tick(), 0);
        assert_eq!(runner.simulation().world().units.len(), 6);
    }
}
