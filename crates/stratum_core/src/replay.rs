//! Recorded games.
//!
//! A replay is a bincode snapshot of the starting simulation, the commands
//! issued to units in tick order, and the state hash sampled every
//! [`CHECKPOINT_INTERVAL`] ticks. Playing it back re-issues the commands
//! against the snapshot; a checkpoint mismatch pins down the first tick at
//! which the playback left the recorded game.

use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::commands::{Command, QueueMode};
use crate::error::{GameError, Result};
use crate::simulation::Simulation;
use crate::unit::UnitId;

/// Replay file format version.
pub const REPLAY_VERSION: u32 = 2;

/// Ticks between recorded state hashes.
pub const CHECKPOINT_INTERVAL: u64 = 100;

/// A command as it was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayCommand {
    /// Tick before which the command was issued.
    pub tick: u64,
    /// Commanded unit.
    pub unit: UnitId,
    /// The command.
    pub command: Command,
    /// Flush or append.
    pub mode: QueueMode,
}

/// State hash after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    /// Tick the hash was taken at.
    pub tick: u64,
    /// State hash.
    pub hash: u64,
}

/// A recorded game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replay {
    /// Format version.
    pub version: u32,
    /// Scenario name.
    pub scenario_id: String,
    /// Seed the game was created with.
    pub seed: u64,
    /// Tick of the snapshot.
    pub start_tick: u64,
    snapshot: Vec<u8>,
    /// Issued commands, ordered by tick.
    pub commands: Vec<ReplayCommand>,
    /// Sampled hashes, ordered by tick.
    pub checkpoints: Vec<SyncCheckpoint>,
    /// Last recorded tick.
    pub final_tick: u64,
    /// State hash at `final_tick`.
    pub final_hash: u64,
}

impl Replay {
    /// Start recording from `sim`.
    ///
    /// # Errors
    ///
    /// Fails if the simulation cannot be serialized.
    pub fn new(scenario_id: impl Into<String>, seed: u64, sim: &Simulation) -> Result<Self> {
        Ok(Self {
            version: REPLAY_VERSION,
            scenario_id: scenario_id.into(),
            seed,
            start_tick: sim.get_tick(),
            snapshot: sim.serialize()?,
            commands: Vec::new(),
            checkpoints: Vec::new(),
            final_tick: sim.get_tick(),
            final_hash: sim.state_hash(),
        })
    }

    /// Append an issued command. Rejected commands belong here too; playback
    /// rejects them the same way.
    pub fn record_command(&mut self, tick: u64, unit: UnitId, command: Command, mode: QueueMode) {
        debug_assert!(
            self.commands.last().map_or(true, |c| c.tick <= tick),
            "replay commands out of tick order"
        );
        self.commands.push(ReplayCommand {
            tick,
            unit,
            command,
            mode,
        });
    }

    /// Sample the hash of `sim` if it sits on a checkpoint tick.
    pub fn observe(&mut self, sim: &Simulation) {
        let tick = sim.get_tick();
        let due = tick > self.start_tick && (tick - self.start_tick) % CHECKPOINT_INTERVAL == 0;
        if due && self.checkpoints.last().map_or(true, |c| c.tick < tick) {
            self.checkpoints.push(SyncCheckpoint {
                tick,
                hash: sim.state_hash(),
            });
        }
    }

    /// Close the recording.
    pub fn finalize(&mut self, final_tick: u64, final_hash: u64) {
        self.final_tick = final_tick;
        self.final_hash = final_hash;
    }

    /// Commands issued before `tick`.
    #[must_use]
    pub fn commands_for(&self, tick: u64) -> &[ReplayCommand] {
        &self.commands[self.command_span(tick..tick + 1)]
    }

    fn command_span(&self, ticks: Range<u64>) -> Range<usize> {
        let start = self.commands.partition_point(|c| c.tick < ticks.start);
        let end = self.commands.partition_point(|c| c.tick < ticks.end);
        start..end
    }

    /// Recorded length in ticks.
    #[must_use]
    pub const fn duration(&self) -> u64 {
        self.final_tick.saturating_sub(self.start_tick)
    }

    /// Number of recorded commands.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// The simulation as it was when recording began.
    ///
    /// # Errors
    ///
    /// Fails if the snapshot is corrupt.
    pub fn initial_simulation(&self) -> Result<Simulation> {
        Simulation::deserialize(&self.snapshot)
    }

    /// Encode as bincode.
    ///
    /// # Errors
    ///
    /// Fails if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| GameError::InvalidState(format!("Failed to encode replay: {e}")))
    }

    /// Decode bincode, checking the format version.
    ///
    /// # Errors
    ///
    /// Fails on malformed bytes or a version mismatch.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let replay: Self =
            bincode::deserialize(bytes).map_err(|e| GameError::InvalidState(format!("Failed to decode replay: {e}")))?;
        if replay.version != REPLAY_VERSION {
            return Err(GameError::InvalidState(format!(
                "replay version mismatch: expected {REPLAY_VERSION}, got {}",
                replay.version
            )));
        }
        Ok(replay)
    }

    /// Write to a file.
    ///
    /// # Errors
    ///
    /// Fails if encoding or writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Read from a file.
    ///
    /// # Errors
    ///
    /// Fails if reading or decoding fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_bytes(&std::fs::read(path)?)
    }
}

/// Plays a replay back tick by tick.
#[derive(Debug)]
pub struct ReplayPlayer {
    replay: Replay,
    simulation: Simulation,
    next_checkpoint: usize,
    desync: Option<GameError>,
    /// Whether playback is paused.
    pub paused: bool,
}

impl ReplayPlayer {
    /// Load the replay's snapshot.
    ///
    /// # Errors
    ///
    /// Fails if the snapshot is corrupt.
    pub fn new(replay: Replay) -> Result<Self> {
        let simulation = replay.initial_simulation()?;
        Ok(Self {
            replay,
            simulation,
            next_checkpoint: 0,
            desync: None,
            paused: false,
        })
    }

    fn step(&mut self) {
        let tick = self.simulation.get_tick();
        for cmd in self.replay.commands_for(tick) {
            if let Err(err) = self.simulation.issue(cmd.unit, &cmd.command, cmd.mode) {
                tracing::trace!(tick, unit = %cmd.unit, %err, "Replayed command rejected");
            }
        }
        self.simulation.tick();

        let now = self.simulation.get_tick();
        while let Some(checkpoint) = self.replay.checkpoints.get(self.next_checkpoint) {
            if checkpoint.tick > now {
                break;
            }
            self.next_checkpoint += 1;
            if checkpoint.tick == now && self.desync.is_none() {
                self.desync = self.simulation.check_sync(checkpoint.hash).err();
            }
        }
    }

    /// Play one tick unless paused; returns true while ticks remain.
    pub fn advance(&mut self) -> bool {
        if !self.paused && !self.is_finished() {
            self.step();
        }
        !self.is_finished()
    }

    /// Jump to `target_tick`, restarting from the snapshot to go backwards.
    ///
    /// # Errors
    ///
    /// Fails if the snapshot is corrupt.
    pub fn seek(&mut self, target_tick: u64) -> Result<()> {
        if target_tick < self.simulation.get_tick() {
            self.simulation = self.replay.initial_simulation()?;
            self.next_checkpoint = 0;
            self.desync = None;
        }
        while self.simulation.get_tick() < target_tick && !self.is_finished() {
            self.step();
        }
        Ok(())
    }

    /// Play to the end and compare against the recording.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DesyncDetected`] for the first checkpoint that
    /// differs, or the final hash if every checkpoint matched.
    pub fn verify(&mut self) -> Result<()> {
        self.seek(self.replay.final_tick)?;
        if let Some(err) = self.desync.take() {
            return Err(err);
        }
        self.simulation.check_sync(self.replay.final_hash)
    }

    /// Current playback tick.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.simulation.get_tick()
    }

    /// The simulation being played.
    #[must_use]
    pub const fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// The replay being played.
    #[must_use]
    pub const fn replay(&self) -> &Replay {
        &self.replay
    }

    /// Whether playback reached the last recorded tick.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.simulation.get_tick() >= self.replay.final_tick
    }

    /// Flip the pause flag.
    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::map::GameMap;
    use crate::math::TilePos;
    use crate::player::{PlayerId, PlayerKind, PlayerTable};
    use crate::unit_type::UnitTypeRegistry;
    use crate::world::World;

    fn scout_game() -> (Simulation, UnitId) {
        let types = UnitTypeRegistry::from_ron_str(
            r#"GameData(unit_types: [(ident: "scout", name: "Scout", stats: (hit_points: 20, speed: 16, sight_range: 5))])"#,
        )
        .expect("valid data");
        let mut players = PlayerTable::new();
        players.add("red", PlayerKind::Person, 0);
        let world = World::new(GameMap::new(32, 32, 1), players, types, SimulationConfig::default());
        let mut sim = Simulation::new(world, 12345);
        let scout = sim.world().types.find("scout").expect("scout");
        let unit = sim.spawn(scout, PlayerId(0), TilePos::new(2, 2), 0).expect("spawn");
        (sim, unit)
    }

    fn recorded(ticks: u64) -> Replay {
        let (mut sim, unit) = scout_game();
        let mut replay = Replay::new("scouting", 12345, &sim).expect("replay");
        for tick in 0..ticks {
            if tick == 3 {
                let command = Command::Move { pos: TilePos::new(20, 9), layer: 0 };
                sim.apply_command(unit, &command).expect("command");
                replay.record_command(sim.get_tick(), unit, command, QueueMode::Flush);
            }
            if tick == 30 {
                let command = Command::Patrol { pos: TilePos::new(4, 4), layer: 0 };
                sim.queue_command(unit, &command).expect("command");
                replay.record_command(sim.get_tick(), unit, command, QueueMode::Append);
            }
            sim.tick();
            replay.observe(&sim);
        }
        replay.finalize(sim.get_tick(), sim.state_hash());
        replay
    }

    #[test]
    fn test_commands_are_found_by_tick() {
        let replay = recorded(40);
        assert_eq!(replay.command_count(), 2);
        assert_eq!(replay.commands_for(3).len(), 1);
        assert_eq!(replay.commands_for(30)[0].mode, QueueMode::Append);
        assert!(replay.commands_for(7).is_empty());
        assert!(replay.commands_for(400).is_empty());
        assert_eq!(replay.duration(), 40);
    }

    #[test]
    fn test_checkpoints_every_interval() {
        let replay = recorded(250);
        let ticks: Vec<u64> = replay.checkpoints.iter().map(|c| c.tick).collect();
        assert_eq!(ticks, vec![100, 200]);
    }

    #[test]
    fn test_replay_verifies() {
        let mut player = ReplayPlayer::new(recorded(220)).expect("player");
        player.verify().expect("replay matches recording");
        assert!(player.is_finished());
    }

    #[test]
    fn test_missing_command_desyncs() {
        let mut replay = recorded(60);
        replay.commands.remove(0);
        let err = ReplayPlayer::new(replay).expect("player").verify().unwrap_err();
        assert!(matches!(err, GameError::DesyncDetected { tick: 60, .. }));
    }

    #[test]
    fn test_first_bad_checkpoint_is_reported() {
        let mut replay = recorded(320);
        replay.checkpoints[1].hash ^= 1;
        let err = ReplayPlayer::new(replay).expect("player").verify().unwrap_err();
        assert!(matches!(err, GameError::DesyncDetected { tick: 200, .. }));
    }

    #[test]
    fn test_file_round_trip() {
        let replay = recorded(20);
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("game.replay");
        replay.save(&path).expect("save");

        let loaded = Replay::load(&path).expect("load");
        assert_eq!(loaded.scenario_id, "scouting");
        assert_eq!(loaded.seed, 12345);
        assert_eq!(loaded.commands, replay.commands);
        assert_eq!(loaded.final_hash, replay.final_hash);
    }

    #[test]
    fn test_wrong_version_is_rejected() {
        let mut replay = recorded(5);
        replay.version = 1;
        let bytes = bincode::serialize(&replay).expect("encode");
        assert!(matches!(Replay::from_bytes(&bytes), Err(GameError::InvalidState(_))));
    }

    #[test]
    fn test_seek_back_replays_identically() {
        let mut player = ReplayPlayer::new(recorded(50)).expect("player");
        player.seek(40).expect("seek");
        assert_eq!(player.current_tick(), 40);
        let at_forty = player.simulation().state_hash();

        player.seek(10).expect("seek");
        assert_eq!(player.current_tick(), 10);
        player.seek(40).expect("seek");
        assert_eq!(player.simulation().state_hash(), at_forty);
    }

    #[test]
    fn test_paused_player_holds_its_tick() {
        let mut player = ReplayPlayer::new(recorded(10)).expect("player");
        player.paused = true;
        player.advance();
        assert_eq!(player.current_tick(), 0);

        player.toggle_pause();
        player.advance();
        assert_eq!(player.current_tick(), 1);
    }
}
