//! Error types for the order execution core.
//!
//! Only API boundaries return errors. Inside a tick, stale references,
//! failed path requests and invalid orders are ordinary outcomes handled
//! by the order state machines.

use thiserror::Error;

use crate::unit::UnitId;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// The referenced unit does not exist (never spawned or already released).
    #[error("Unit not found: {0}")]
    UnitNotFound(UnitId),

    /// Unknown or malformed unit type.
    #[error("Invalid unit type: {0}")]
    InvalidUnitType(String),

    /// Unknown spell identifier.
    #[error("Invalid spell: {0}")]
    InvalidSpell(String),

    /// Player index out of range.
    #[error("Invalid player: {0}")]
    InvalidPlayer(u8),

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path to the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// A command could not be applied to its unit.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// A save game could not be read or written.
    #[error("Save game error: {0}")]
    SaveFormat(String),

    /// Invalid simulation state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),

    /// Underlying IO failure while reading or writing files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Desync detected in multiplayer.
    #[error("Desync detected at tick {tick}: local hash {local_hash}, remote hash {remote_hash}")]
    DesyncDetected {
        /// Tick where desync occurred.
        tick: u64,
        /// Local simulation hash.
        local_hash: u64,
        /// Remote simulation hash.
        remote_hash: u64,
    },
}
