//! Simulation tuning knobs.
//!
//! Loaded from RON alongside scenario data; every field has a default so a
//! config file only needs to name what it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::threat::ThreatWeights;

/// Tunable parameters shared by all units in a simulation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// When false every tile counts as visible to every player.
    pub fog_of_war: bool,
    /// How far past its attack range an unreachable point target may be widened.
    pub max_range_widening: i32,
    /// Ticks a unit waits after widening the range to an unreachable point.
    pub unreachable_retry_wait: u32,
    /// Consecutive blocked path requests before a mover backs off for
    /// `unreachable_retry_wait` ticks; zero retries every tick.
    pub blocked_retry_limit: u32,
    /// One idle vocalization per this many standby ticks on average.
    pub idle_sound_chance: u32,
    /// Node budget for one A* search.
    pub max_search_nodes: usize,
    /// Whether idle units fight back when hit.
    pub attack_back: bool,
    /// Weights of the standard threat evaluator.
    pub threat: ThreatWeights,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fog_of_war: true,
            max_range_widening: 8,
            unreachable_retry_wait: 5,
            blocked_retry_limit: 5,
            idle_sound_chance: 100_000,
            max_search_nodes: 4096,
            attack_back: true,
            threat: ThreatWeights::default(),
        }
    }
}

impl SimulationConfig {
    /// Parse a config from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] if the text is not a valid config.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| GameError::DataParseError {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Load a config from a RON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        ron::from_str(&source).map_err(|e| GameError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = SimulationConfig::from_ron_str("(fog_of_war: false, max_range_widening: 3)")
            .expect("valid config");
        assert!(!config.fog_of_war);
        assert_eq!(config.max_range_widening, 3);
        assert_eq!(config.unreachable_retry_wait, 5);
        assert_eq!(config.blocked_retry_limit, 5);
        assert_eq!(config.idle_sound_chance, 100_000);
    }

    #[test]
    fn test_malformed_config_is_parse_error() {
        let err = SimulationConfig::from_ron_str("(fog_of_war: 12").unwrap_err();
        assert!(matches!(err, GameError::DataParseError { .. }));
    }
}
