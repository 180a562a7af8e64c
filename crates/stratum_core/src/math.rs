//! Integer and fixed-point math for deterministic simulation.
//!
//! Tile coordinates and distances are plain integers; fractional
//! quantities (movement progress, missile travel, threat scores) use
//! fixed-point so that every client computes identical results.

use std::fmt;

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all fractional simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde helpers for bitflags fields.
///
/// Text formats read and write the flag names (`"BUILDING | WALL"`), binary
/// formats the raw bits.
pub mod flags_serde {
    use bitflags::parser::{ParseHex, WriteHex};
    use bitflags::Flags;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a flag set.
    pub fn serialize<B, S>(flags: &B, serializer: S) -> Result<S::Ok, S::Error>
    where
        B: Flags,
        B::Bits: WriteHex + Serialize,
        S: Serializer,
    {
        bitflags::serde::serialize(flags, serializer)
    }

    /// Deserialize a flag set.
    pub fn deserialize<'de, B, D>(deserializer: D) -> Result<B, D::Error>
    where
        B: Flags,
        B::Bits: ParseHex + Deserialize<'de>,
        D: Deserializer<'de>,
    {
        bitflags::serde::deserialize(deserializer)
    }
}

/// A tile coordinate on one map layer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TilePos {
    /// Column, growing east.
    pub x: i32,
    /// Row, growing south.
    pub y: i32,
}

impl TilePos {
    /// Create a new tile position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Position shifted by `(dx, dy)`.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Chebyshev distance between two tiles.
    #[must_use]
    pub fn chebyshev(self, other: Self) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

impl fmt::Display for TilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Width and height of a unit footprint in tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileSize {
    /// Width in tiles.
    pub width: i32,
    /// Height in tiles.
    pub height: i32,
}

impl TileSize {
    /// A single tile.
    pub const ONE: Self = Self {
        width: 1,
        height: 1,
    };

    /// Create a footprint size.
    #[must_use]
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

impl Default for TileSize {
    fn default() -> Self {
        Self::ONE
    }
}

/// Integer square root (floor) of a non-negative value.
#[must_use]
pub fn isqrt(value: i64) -> i32 {
    if value <= 0 {
        return 0;
    }
    // Newton iteration from an upper bound; converges monotonically.
    let mut x = value;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + value / x) / 2;
    }
    x as i32
}

/// Gap along one axis between spans `[a, a + a_len)` and `[b, b + b_len)`.
fn axis_gap(a: i32, a_len: i32, b: i32, b_len: i32) -> i32 {
    if a + a_len <= b {
        b - (a + a_len) + 1
    } else if b + b_len <= a {
        a - (b + b_len) + 1
    } else {
        0
    }
}

/// Map distance between two footprints.
///
/// Adjacent footprints are at distance 1, overlapping ones at 0; the
/// diagonal gap uses the integer square root of the squared gap.
#[must_use]
pub fn rect_distance(a: TilePos, a_size: TileSize, b: TilePos, b_size: TileSize) -> i32 {
    let dx = i64::from(axis_gap(a.x, a_size.width, b.x, b_size.width));
    let dy = i64::from(axis_gap(a.y, a_size.height, b.y, b_size.height));
    isqrt(dx * dx + dy * dy)
}

/// Map distance from a footprint to a single tile.
#[must_use]
pub fn distance_to_tile(a: TilePos, a_size: TileSize, tile: TilePos) -> i32 {
    rect_distance(a, a_size, tile, TileSize::ONE)
}

/// Facing of a unit in 1/256ths of a full turn, clockwise from north.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Heading(pub u8);

impl Heading {
    /// Facing north.
    pub const NORTH: Self = Self(0);
    /// Facing east.
    pub const EAST: Self = Self(64);
    /// Facing south.
    pub const SOUTH: Self = Self(128);
    /// Facing west.
    pub const WEST: Self = Self(192);

    /// Quarter turn in heading units.
    pub const QUARTER_TURN: u8 = 64;

    /// Heading pointing along `(dx, dy)`, snapped to one of eight facings.
    ///
    /// A zero delta keeps `current`.
    #[must_use]
    pub fn from_delta(dx: i32, dy: i32, current: Self) -> Self {
        if dx == 0 && dy == 0 {
            return current;
        }
        let (ax, ay) = (i64::from(dx).abs(), i64::from(dy).abs());
        // tan(22.5 deg) ~= 5 / 12
        let value = if 12 * ax <= 5 * ay {
            if dy < 0 {
                0
            } else {
                128
            }
        } else if 12 * ay <= 5 * ax {
            if dx > 0 {
                64
            } else {
                192
            }
        } else {
            match (dx > 0, dy < 0) {
                (true, true) => 32,
                (true, false) => 96,
                (false, false) => 160,
                (false, true) => 224,
            }
        };
        Self(value)
    }

    /// Circular distance between two headings (0..=128).
    #[must_use]
    pub fn angular_distance(self, other: Self) -> u8 {
        let diff = self.0.wrapping_sub(other.0);
        diff.min(diff.wrapping_neg())
    }

    /// Heading turned a quarter turn left or right, whichever is closer to `current`.
    ///
    /// Used by units that fire broadside: they present their flank to the target.
    #[must_use]
    pub fn broadside(self, current: Self) -> Self {
        let left = Self(self.0.wrapping_sub(Self::QUARTER_TURN));
        let right = Self(self.0.wrapping_add(Self::QUARTER_TURN));
        if left.angular_distance(current) < right.angular_distance(current) {
            left
        } else {
            right
        }
    }
}
