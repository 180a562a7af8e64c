//! Headless scenario runner.
//!
//! Loads a unit roster and a RON scenario, runs the simulation without any
//! presentation, and reports the outcome as JSON. Used for CI determinism
//! checks, save-game generation and replay verification.
//!
//! # Example
//!
//! ```bash
//! # Run a scenario and print a JSON report
//! cargo run -p stratum_headless -- run --scenario data/scenarios/skirmish.ron --json
//!
//! # Check a scenario is deterministic
//! cargo run -p stratum_headless -- verify --scenario data/scenarios/skirmish.ron --runs 5
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod runner;
pub mod scenario;

pub use runner::{HeadlessRunner, RunReport};
pub use scenario::{PreparedScenario, Scenario, ScenarioError};
