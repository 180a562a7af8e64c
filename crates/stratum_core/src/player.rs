//! Players, teams and diplomacy.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};

/// Index of a player in the [`PlayerTable`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct PlayerId(pub u8);

impl PlayerId {
    /// Index into per-player arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player {}", self.0)
    }
}

/// Who controls a player slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerKind {
    /// Human at a keyboard.
    Person,
    /// Computer opponent.
    Computer,
    /// Neutral critters and map features.
    Neutral,
    /// Empty slot.
    Nobody,
}

/// A participant in the game.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Player {
    /// Player index.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Controller kind.
    pub kind: PlayerKind,
    /// Whether the AI drives this player's units.
    pub ai_enabled: bool,
    /// Team number; players on the same team are allied.
    pub team: u8,
    /// Players this player is hostile to.
    pub enemies: BTreeSet<PlayerId>,
    /// Number of live units owned.
    pub unit_count: u32,
}

impl Player {
    /// Create a player with no enemies.
    #[must_use]
    pub fn new(id: PlayerId, name: impl Into<String>, kind: PlayerKind, team: u8) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            ai_enabled: kind == PlayerKind::Computer,
            team,
            enemies: BTreeSet::new(),
            unit_count: 0,
        }
    }

    /// Whether this player is hostile to `other`.
    #[must_use]
    pub fn is_enemy(&self, other: PlayerId) -> bool {
        self.enemies.contains(&other)
    }

    /// Whether the AI logic runs this player's idle behaviors.
    ///
    /// Neutral units (critters) always behave autonomously.
    #[must_use]
    pub fn is_ai_active(&self) -> bool {
        self.ai_enabled || self.kind == PlayerKind::Neutral
    }
}

/// All players of a game, indexed by [`PlayerId`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerTable {
    players: Vec<Player>,
}

impl PlayerTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a player; returns its id.
    pub fn add(&mut self, name: impl Into<String>, kind: PlayerKind, team: u8) -> PlayerId {
        let id = PlayerId(self.players.len() as u8);
        self.players.push(Player::new(id, name, kind, team));
        id
    }

    /// Number of players.
    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether there are no players.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Look up a player.
    #[must_use]
    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id.index())
    }

    /// Look up a player mutably.
    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id.index())
    }

    /// Look up a player or fail.
    pub fn require(&self, id: PlayerId) -> Result<&Player> {
        self.get(id).ok_or(GameError::InvalidPlayer(id.0))
    }

    /// Iterate players in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    /// Whether `a` is hostile to `b`.
    #[must_use]
    pub fn is_enemy(&self, a: PlayerId, b: PlayerId) -> bool {
        self.get(a).is_some_and(|p| p.is_enemy(b))
    }

    /// Whether `a` and `b` share a team (a player is teamed with itself).
    #[must_use]
    pub fn is_teamed(&self, a: PlayerId, b: PlayerId) -> bool {
        if a == b {
            return true;
        }
        match (self.get(a), self.get(b)) {
            (Some(pa), Some(pb)) => pa.team == pb.team,
            _ => false,
        }
    }

    /// Whether `id` is AI-controlled (or neutral).
    #[must_use]
    pub fn is_ai_active(&self, id: PlayerId) -> bool {
        self.get(id).is_some_and(Player::is_ai_active)
    }

    /// Make `a` and `b` mutually hostile.
    pub fn set_enemy_with(&mut self, a: PlayerId, b: PlayerId) {
        if a == b {
            return;
        }
        if let Some(pa) = self.get_mut(a) {
            pa.enemies.insert(b);
        }
        if let Some(pb) = self.get_mut(b) {
            pb.enemies.insert(a);
        }
        tracing::debug!(%a, %b, "Diplomacy set to enemy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diplomacy_is_symmetric() {
        let mut players = PlayerTable::new();
        let a = players.add("red", PlayerKind::Person, 0);
        let b = players.add("blue", PlayerKind::Computer, 1);
        assert!(!players.is_enemy(a, b));
        players.set_enemy_with(a, b);
        assert!(players.is_enemy(a, b));
        assert!(players.is_enemy(b, a));
    }

    #[test]
    fn test_teams_and_ai() {
        let mut players = PlayerTable::new();
        let a = players.add("red", PlayerKind::Person, 0);
        let b = players.add("red ally", PlayerKind::Computer, 0);
        let n = players.add("critters", PlayerKind::Neutral, 9);
        assert!(players.is_teamed(a, b));
        assert!(!players.is_teamed(a, n));
        assert!(!players.is_ai_active(a));
        assert!(players.is_ai_active(b));
        assert!(players.is_ai_active(n));
    }
}
