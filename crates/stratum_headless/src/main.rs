//! Headless scenario runner.
//!
//! # Usage
//!
//! ```bash
//! # Run a scenario, optionally saving the end state and a replay
//! stratum-headless run --scenario data/scenarios/skirmish.ron --ticks 900 --save end.ron --replay game.replay
//!
//! # Continue a saved game
//! stratum-headless resume --save end.ron --ticks 300
//!
//! # Run the same scenario several times and compare hashes
//! stratum-headless verify --scenario data/scenarios/skirmish.ron --runs 5
//!
//! # Play back or verify a replay
//! stratum-headless replay --file game.replay --verify
//!
//! # Check a unit roster parses
//! stratum-headless validate --data data/units.ron
//! ```
//!
//! Reports go to stdout, logs to stderr. `RUST_LOG` overrides `--verbose`.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stratum_core::replay::{Replay, ReplayPlayer};
use stratum_core::save::SaveGame;
use stratum_core::unit_type::UnitTypeRegistry;
use stratum_headless::{HeadlessRunner, RunReport, Scenario};

const DEFAULT_DATA: &str = "data/units.ron";

#[derive(Parser)]
#[command(name = "stratum-headless")]
#[command(about = "Headless scenario runner for determinism checks and save-game generation")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario
    Run {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Unit roster
        #[arg(short, long, default_value = DEFAULT_DATA)]
        data: PathBuf,

        /// Ticks to run (defaults to the scenario's own)
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Override the scenario seed
        #[arg(long)]
        seed: Option<u64>,

        /// Write a RON save of the end state
        #[arg(long)]
        save: Option<PathBuf>,

        /// Record a replay
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Continue a saved game
    Resume {
        /// Save file to load
        #[arg(short, long)]
        save: PathBuf,

        /// Unit roster the save was made with
        #[arg(short, long, default_value = DEFAULT_DATA)]
        data: PathBuf,

        /// Ticks to run
        #[arg(short, long, default_value = "300")]
        ticks: u64,

        /// Write the new end state here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify determinism by running the same seed several times
    Verify {
        /// Scenario to test
        #[arg(short, long)]
        scenario: PathBuf,

        /// Unit roster
        #[arg(short, long, default_value = DEFAULT_DATA)]
        data: PathBuf,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },

    /// Play back a recorded game
    Replay {
        /// Replay file path
        #[arg(short, long)]
        file: PathBuf,

        /// Check the replay reproduces its recorded hash
        #[arg(long)]
        verify: bool,
    },

    /// Parse a unit roster and list its types
    Validate {
        /// Unit roster
        #[arg(short, long, default_value = DEFAULT_DATA)]
        data: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            data,
            ticks,
            seed,
            save,
            replay,
            json,
        } => cmd_run(&scenario, &data, ticks, seed, save.as_deref(), replay.as_deref(), json),
        Commands::Resume {
            save,
            data,
            ticks,
            output,
        } => cmd_resume(&save, &data, ticks, output.as_deref()),
        Commands::Verify { scenario, data, runs } => cmd_verify(&scenario, &data, runs),
        Commands::Replay { file, verify } => cmd_replay(&file, verify),
        Commands::Validate { data } => cmd_validate(&data),
    }
}

fn fail(context: &str, error: impl std::fmt::Display) -> ! {
    tracing::error!(%error, "{context}");
    eprintln!("{context}: {error}");
    process::exit(1);
}

fn load_types(path: &Path) -> UnitTypeRegistry {
    UnitTypeRegistry::load(path).unwrap_or_else(|e| fail("Failed to load unit data", e))
}

fn load_scenario(path: &Path) -> Scenario {
    Scenario::load(path).unwrap_or_else(|e| fail("Failed to load scenario", e))
}

fn print_report(report: &RunReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(text) => println!("{text}"),
            Err(e) => fail("Failed to encode report", e),
        }
        return;
    }
    println!("Scenario: {}", report.scenario);
    println!("Seed: {}", report.seed);
    println!("Ticks: {}", report.ticks);
    println!("State hash: {:016x}", report.final_hash);
    println!("Units: {}", report.units);
    for player in &report.players {
        println!("  {}: {} units", player.name, player.units);
    }
    println!("Damage: {} hits, {} total", report.damage_events, report.damage_dealt);
    println!("Deaths: {}  Released: {}", report.deaths, report.released);
    println!("Missiles: {}  Spells: {}", report.missiles_fired, report.spells_cast);
    println!("Buildings completed: {}", report.buildings_completed);
    if report.rejected_commands > 0 {
        println!("Rejected commands: {}", report.rejected_commands);
    }
}

fn write_save(sim: &stratum_core::simulation::Simulation, path: &Path) {
    match SaveGame::capture(sim).save(path) {
        Ok(()) => tracing::info!(path = %path.display(), tick = sim.get_tick(), "Game saved"),
        Err(e) => fail("Failed to write save", e),
    }
}

/// Run a scenario
fn cmd_run(
    scenario_path: &Path,
    data: &Path,
    ticks: Option<u64>,
    seed: Option<u64>,
    save: Option<&Path>,
    replay_path: Option<&Path>,
    json: bool,
) {
    let scenario = load_scenario(scenario_path);
    let prepared = scenario
        .prepare(load_types(data), seed)
        .unwrap_or_else(|e| fail("Failed to prepare scenario", e));
    let ticks = ticks.unwrap_or(scenario.ticks);

    let mut runner = HeadlessRunner::new(scenario.name.clone(), prepared);
    if replay_path.is_some() {
        runner = runner
            .record_replay()
            .unwrap_or_else(|e| fail("Failed to start replay", e));
    }

    tracing::info!(scenario = %scenario.name, ticks, "Running scenario");
    runner.run(ticks);
    let (sim, report, replay) = runner.finish();

    if let Some(path) = save {
        write_save(&sim, path);
    }
    if let (Some(path), Some(replay)) = (replay_path, replay) {
        match replay.save(path) {
            Ok(()) => tracing::info!(path = %path.display(), commands = replay.command_count(), "Replay saved"),
            Err(e) => fail("Failed to write replay", e),
        }
    }
    print_report(&report, json);
}

/// Continue a saved game
fn cmd_resume(save: &Path, data: &Path, ticks: u64, output: Option<&Path>) {
    let types = load_types(data);
    let mut sim = SaveGame::load(save)
        .and_then(|game| game.restore(types))
        .unwrap_or_else(|e| fail("Failed to load save", e));

    tracing::info!(tick = sim.get_tick(), ticks, "Resuming saved game");
    sim.run(ticks);
    println!("Tick: {}", sim.get_tick());
    println!("Units: {}", sim.world().units.len());
    println!("State hash: {:016x}", sim.state_hash());

    if let Some(path) = output {
        write_save(&sim, path);
    }
}

/// Verify determinism
fn cmd_verify(scenario_path: &Path, data: &Path, runs: u32) {
    let scenario = load_scenario(scenario_path);
    let types = load_types(data);
    tracing::info!(scenario = %scenario.name, seed = scenario.seed, runs, "Verifying determinism");

    let mut hashes = Vec::with_capacity(runs as usize);
    for run in 0..runs {
        let prepared = scenario
            .prepare(types.clone(), None)
            .unwrap_or_else(|e| fail("Failed to prepare scenario", e));
        let mut runner = HeadlessRunner::new(scenario.name.clone(), prepared);
        runner.run(scenario.ticks);
        let (_, report, _) = runner.finish();
        tracing::debug!(run, hash = format_args!("{:016x}", report.final_hash), "Run finished");
        hashes.push(report.final_hash);
    }

    if hashes.windows(2).all(|w| w[0] == w[1]) {
        eprintln!("PASS: All {runs} runs produced identical results");
    } else {
        eprintln!("FAIL: Non-determinism detected!");
        for (run, hash) in hashes.iter().enumerate() {
            eprintln!("  run {run}: {hash:016x}");
        }
        process::exit(1);
    }
}

/// Replay a recorded game
fn cmd_replay(file: &Path, verify: bool) {
    let replay = Replay::load(file).unwrap_or_else(|e| fail("Failed to load replay", e));

    eprintln!("Loaded replay:");
    eprintln!("  Scenario: {}", replay.scenario_id);
    eprintln!("  Seed: {}", replay.seed);
    eprintln!("  Commands: {}", replay.command_count());
    eprintln!("  Checkpoints: {}", replay.checkpoints.len());
    eprintln!("  Duration: {} ticks", replay.duration());

    let mut player = ReplayPlayer::new(replay).unwrap_or_else(|e| fail("Failed to create replay player", e));

    if verify {
        match player.verify() {
            Ok(()) => {
                eprintln!("PASS: Replay verification successful");
                eprintln!("  Hash: {:016x}", player.replay().final_hash);
            }
            Err(e) => fail("FAIL: Replay verification", e),
        }
        return;
    }

    let total = player.replay().duration().max(1);
    let mut last_percent = 0;
    while player.advance() {
        let percent = player.current_tick() * 100 / total;
        if percent > last_percent && percent % 10 == 0 {
            eprintln!("Progress: {percent}%");
            last_percent = percent;
        }
    }
    let sim = player.simulation();
    eprintln!("Replay complete at tick {}", sim.get_tick());
    eprintln!("Final state hash: {:016x}", sim.state_hash());
    eprintln!("Units: {}", sim.world().units.len());
}

/// Validate a unit roster
fn cmd_validate(data: &Path) {
    let types = load_types(data);
    println!("{} unit types", types.len());
    for ty in types.iter() {
        println!("  {:<16} {}", ty.ident, ty.name);
    }
}
