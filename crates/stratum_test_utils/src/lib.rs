//! # Stratum Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Determinism test harness
//! - Scenario fixtures on the standard unit roster
//! - Scripted pathfinder and threat stubs
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;
pub mod stubs;

/// Re-export proptest for convenience.
pub use proptest;
