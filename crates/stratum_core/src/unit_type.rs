//! Data-driven unit type definitions.
//!
//! Unit types are authored in RON as a [`GameData`] document with string
//! identifiers. Loading resolves every cross reference (corpses, build lists,
//! auto-cast spells) into dense numeric ids so the simulation never touches
//! strings on the hot path.
//!
//! # Example RON
//!
//! ```ron
//! GameData(
//!     unit_types: [
//!         (
//!             ident: "footman",
//!             name: "Footman",
//!             stats: (hit_points: 60, attack_range: 1, speed: 10, sight_range: 4,
//!                     armor: 2, basic_damage: 6, piercing_damage: 3, priority: 60),
//!             flags: "CAN_ATTACK | CAN_TARGET_LAND | ORGANIC",
//!             corpse: Some("dead_body"),
//!         ),
//!         (ident: "dead_body", name: "Corpse", flags: "INDESTRUCTIBLE"),
//!     ],
//!     spells: [],
//! )
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::animation::AnimationSet;
use crate::error::{GameError, Result};
use crate::map::MovementKind;
use crate::math::{fixed_serde, flags_serde, Fixed, TileSize};
use crate::spells::{Spell, SpellData, SpellId};

/// Speed points per tile of movement per tick.
///
/// A unit with speed `SPEED_SCALE` advances one tile every tick.
pub const SPEED_SCALE: i32 = 32;

/// Dense runtime id of a unit type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct UnitTypeId(pub u16);

impl UnitTypeId {
    /// Index into the registry.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for UnitTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

bitflags! {
    /// Boolean properties of a unit type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct UnitTypeFlags: u32 {
        /// Has a weapon.
        const CAN_ATTACK = 1 << 0;
        /// May target ground and naval units.
        const CAN_TARGET_LAND = 1 << 1;
        /// May target flyers.
        const CAN_TARGET_AIR = 1 << 2;
        /// Fires broadside: turns its flank to the target.
        const SIDE_ATTACK = 1 << 3;
        /// A wall segment.
        const WALL = 1 << 4;
        /// A building.
        const BUILDING = 1 << 5;
        /// Living being (may pick up healing items).
        const ORGANIC = 1 << 6;
        /// A pick-up item lying on the map.
        const ITEM = 1 << 7;
        /// Avoids wandering next to other players' units.
        const PEOPLE_AVERSION = 1 << 8;
        /// Cannot be damaged.
        const INDESTRUCTIBLE = 1 << 9;
        /// Owner is not revealed; attacking it does not declare war.
        const HIDDEN_OWNERSHIP = 1 << 10;
        /// Never attacks on its own initiative.
        const COWARD = 1 << 11;
        /// Can repair teamed units.
        const CAN_REPAIR = 1 << 12;
    }
}

impl Default for UnitTypeFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Base values of a unit's variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseStats {
    /// Maximum hit points.
    pub hit_points: i32,
    /// Maximum attack distance in tiles.
    pub attack_range: i32,
    /// Movement speed in speed points (see [`SPEED_SCALE`]).
    pub speed: i32,
    /// Vision radius in tiles.
    pub sight_range: i32,
    /// Damage reduction.
    pub armor: i32,
    /// Damage reduced by armor.
    pub basic_damage: i32,
    /// Damage that ignores armor.
    pub piercing_damage: i32,
    /// Target priority (higher is attacked first).
    pub priority: i32,
    /// Maximum mana.
    pub mana: i32,
    /// Radius in which an idle repairer looks for damaged units.
    pub auto_repair_range: i32,
    /// Hit points an item restores when picked up.
    pub hit_point_healing: i32,
}

/// Projectile fired by a ranged attacker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MissileSpec {
    /// Travel speed in tiles per tick.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Splash radius in tiles for ground impacts.
    #[serde(default)]
    pub splash: i32,
}

const fn default_one() -> i32 {
    1
}

/// Unit type as authored in data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitTypeData {
    /// Unique string identifier.
    pub ident: String,
    /// Display name.
    pub name: String,
    /// Footprint.
    #[serde(default)]
    pub size: TileSize,
    /// Movement kind.
    #[serde(default)]
    pub movement: MovementKind,
    /// Base stats.
    #[serde(default)]
    pub stats: BaseStats,
    /// Exclusive minimum attack distance.
    #[serde(default)]
    pub min_attack_range: i32,
    /// Auto-acquire radius for human-controlled units; defaults to sight range.
    #[serde(default)]
    pub reaction_range_person: Option<i32>,
    /// Auto-acquire radius for computer-controlled units; defaults to sight range.
    #[serde(default)]
    pub reaction_range_computer: Option<i32>,
    /// Type the unit turns into when it dies.
    #[serde(default)]
    pub corpse: Option<String>,
    /// Boolean properties.
    #[serde(default, with = "flags_serde")]
    pub flags: UnitTypeFlags,
    /// Percent chance per idle tick to wander (AI-controlled units only).
    #[serde(default)]
    pub random_movement_probability: u32,
    /// Maximum wander distance.
    #[serde(default = "default_one")]
    pub random_movement_distance: i32,
    /// Hit points restored to this type per repair action.
    #[serde(default)]
    pub repair_hp: i32,
    /// Distance a repairer of this type works from.
    #[serde(default = "default_one")]
    pub repair_range: i32,
    /// Build actions needed to construct this type.
    #[serde(default)]
    pub build_time: u32,
    /// Types this unit can construct.
    #[serde(default)]
    pub builds: Vec<String>,
    /// Projectile used for attacks; `None` for melee.
    #[serde(default)]
    pub missile: Option<MissileSpec>,
    /// Damage kind dealt, selects the victim's death animation.
    #[serde(default)]
    pub damage_kind: Option<String>,
    /// Animation scripts.
    #[serde(default)]
    pub animations: AnimationSet,
    /// Spells cast automatically when idle.
    #[serde(default)]
    pub autocast: Vec<String>,
}

/// A resolved unit type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitType {
    /// Runtime id.
    pub id: UnitTypeId,
    /// Unique string identifier.
    pub ident: String,
    /// Display name.
    pub name: String,
    /// Footprint.
    pub size: TileSize,
    /// Movement kind.
    pub movement: MovementKind,
    /// Base stats.
    pub stats: BaseStats,
    /// Exclusive minimum attack distance.
    pub min_attack_range: i32,
    /// Auto-acquire radius for human-controlled units.
    pub reaction_range_person: i32,
    /// Auto-acquire radius for computer-controlled units.
    pub reaction_range_computer: i32,
    /// Corpse type.
    pub corpse: Option<UnitTypeId>,
    /// Boolean properties.
    #[serde(with = "flags_serde")]
    pub flags: UnitTypeFlags,
    /// Percent chance per idle tick to wander.
    pub random_movement_probability: u32,
    /// Maximum wander distance.
    pub random_movement_distance: i32,
    /// Hit points restored per repair action.
    pub repair_hp: i32,
    /// Distance a repairer works from.
    pub repair_range: i32,
    /// Build actions needed.
    pub build_time: u32,
    /// Constructible types.
    pub builds: Vec<UnitTypeId>,
    /// Projectile.
    pub missile: Option<MissileSpec>,
    /// Damage kind dealt.
    pub damage_kind: Option<String>,
    /// Animation scripts.
    pub animations: AnimationSet,
    /// Auto-cast spells.
    pub autocast: Vec<SpellId>,
}

impl UnitType {
    /// Whether the type has the given flag.
    #[must_use]
    pub fn has(&self, flag: UnitTypeFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Whether this type's weapon can hit `target`.
    #[must_use]
    pub fn can_target(&self, target: &Self) -> bool {
        if target.movement == MovementKind::Air {
            self.has(UnitTypeFlags::CAN_TARGET_AIR)
        } else {
            self.has(UnitTypeFlags::CAN_TARGET_LAND)
        }
    }

    /// Whether units of this type can ever move.
    #[must_use]
    pub fn can_move(&self) -> bool {
        self.stats.speed > 0 && !self.has(UnitTypeFlags::BUILDING)
    }

    /// Whether units of this type block the tiles under them.
    #[must_use]
    pub fn marks_occupancy(&self) -> bool {
        !self.has(UnitTypeFlags::ITEM)
    }
}

/// Top-level RON document with all game data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameData {
    /// Unit types, in id order.
    #[serde(default)]
    pub unit_types: Vec<UnitTypeData>,
    /// Spells, in id order.
    #[serde(default)]
    pub spells: Vec<SpellData>,
}

/// All unit types and spells of a game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitTypeRegistry {
    types: Vec<UnitType>,
    by_ident: BTreeMap<String, UnitTypeId>,
    spells: Vec<Spell>,
}

impl UnitTypeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a [`GameData`] document.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidUnitType`] for duplicate or dangling type
    /// references and [`GameError::InvalidSpell`] for unknown spells.
    pub fn from_data(data: GameData) -> Result<Self> {
        let mut by_ident = BTreeMap::new();
        for (index, def) in data.unit_types.iter().enumerate() {
            let id = UnitTypeId(index as u16);
            if by_ident.insert(def.ident.clone(), id).is_some() {
                return Err(GameError::InvalidUnitType(format!(
                    "duplicate unit type '{}'",
                    def.ident
                )));
            }
        }

        let spells = data
            .spells
            .into_iter()
            .enumerate()
            .map(|(index, def)| Spell::from_data(SpellId(index as u16), def))
            .collect::<Vec<_>>();
        let find_spell = |ident: &str| {
            spells
                .iter()
                .find(|s| s.ident == ident)
                .map(|s| s.id)
                .ok_or_else(|| GameError::InvalidSpell(ident.to_string()))
        };
        let find_type = |ident: &str, owner: &str| {
            by_ident.get(ident).copied().ok_or_else(|| {
                GameError::InvalidUnitType(format!("'{owner}' references unknown type '{ident}'"))
            })
        };

        let mut types = Vec::with_capacity(data.unit_types.len());
        for (index, def) in data.unit_types.into_iter().enumerate() {
            let corpse = def
                .corpse
                .as_deref()
                .map(|c| find_type(c, &def.ident))
                .transpose()?;
            let builds = def
                .builds
                .iter()
                .map(|b| find_type(b, &def.ident))
                .collect::<Result<Vec<_>>>()?;
            let autocast = def
                .autocast
                .iter()
                .map(|s| find_spell(s))
                .collect::<Result<Vec<_>>>()?;
            let sight = def.stats.sight_range;
            types.push(UnitType {
                id: UnitTypeId(index as u16),
                ident: def.ident,
                name: def.name,
                size: def.size,
                movement: def.movement,
                min_attack_range: def.min_attack_range,
                reaction_range_person: def.reaction_range_person.unwrap_or(sight),
                reaction_range_computer: def.reaction_range_computer.unwrap_or(sight),
                stats: def.stats,
                corpse,
                flags: def.flags,
                random_movement_probability: def.random_movement_probability,
                random_movement_distance: def.random_movement_distance,
                repair_hp: def.repair_hp,
                repair_range: def.repair_range,
                build_time: def.build_time,
                builds,
                missile: def.missile,
                damage_kind: def.damage_kind,
                animations: def.animations,
                autocast,
            });
        }

        tracing::debug!(types = types.len(), spells = spells.len(), "Loaded game data");
        Ok(Self {
            types,
            by_ident,
            spells,
        })
    }

    /// Parse and resolve RON game data.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is malformed or references are dangling.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let data: GameData = ron::from_str(source).map_err(|e| GameError::DataParseError {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        Self::from_data(data)
    }

    /// Load RON game data from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or resolved.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        let data: GameData = ron::from_str(&source).map_err(|e| GameError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_data(data)
    }

    /// Look up a type.
    #[must_use]
    pub fn get(&self, id: UnitTypeId) -> Option<&UnitType> {
        self.types.get(id.index())
    }

    /// Look up a type or fail.
    pub fn require(&self, id: UnitTypeId) -> Result<&UnitType> {
        self.get(id)
            .ok_or_else(|| GameError::InvalidUnitType(id.to_string()))
    }

    /// Find a type by its string identifier.
    #[must_use]
    pub fn find(&self, ident: &str) -> Option<UnitTypeId> {
        self.by_ident.get(ident).copied()
    }

    /// Look up a spell.
    #[must_use]
    pub fn spell(&self, id: SpellId) -> Option<&Spell> {
        self.spells.get(id.index())
    }

    /// Iterate types in id order.
    pub fn iter(&self) -> impl Iterator<Item = &UnitType> {
        self.types.iter()
    }

    /// Number of types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &str = r#"
GameData(
    unit_types: [
        (
            ident: "archer",
            name: "Archer",
            stats: (hit_points: 40, attack_range: 4, speed: 10, sight_range: 6),
            flags: "CAN_ATTACK | CAN_TARGET_LAND | CAN_TARGET_AIR | ORGANIC",
            corpse: Some("corpse"),
            missile: Some((speed: 4294967296)),
        ),
        (ident: "corpse", name: "Corpse"),
    ],
)
"#;

    #[test]
    fn test_load_resolves_references() {
        let registry = UnitTypeRegistry::from_ron_str(DATA).expect("valid data");
        let archer = registry.get(registry.find("archer").expect("archer")).expect("type");
        assert_eq!(archer.corpse, registry.find("corpse"));
        assert_eq!(archer.reaction_range_computer, 6);
        assert!(archer.has(UnitTypeFlags::ORGANIC));
        assert_eq!(archer.missile.as_ref().map(|m| m.speed), Some(Fixed::ONE));
        assert_eq!(archer.size, TileSize::ONE);
    }

    #[test]
    fn test_flag_names_parse_from_text() {
        let data = r#"GameData(unit_types: [
            (ident: "wall", name: "Wall", flags: "BUILDING | WALL"),
            (ident: "rock", name: "Rock", flags: ""),
        ])"#;
        let registry = UnitTypeRegistry::from_ron_str(data).expect("valid data");
        let wall = registry.get(registry.find("wall").expect("wall")).expect("type");
        assert_eq!(wall.flags, UnitTypeFlags::BUILDING | UnitTypeFlags::WALL);
        let rock = registry.get(registry.find("rock").expect("rock")).expect("type");
        assert!(rock.flags.is_empty());
    }

    #[test]
    fn test_unknown_flag_name_is_error() {
        let data = r#"GameData(unit_types: [(ident: "a", name: "A", flags: "FLYING")])"#;
        let err = UnitTypeRegistry::from_ron_str(data).unwrap_err();
        assert!(matches!(err, GameError::DataParseError { .. }));
    }

    #[test]
    fn test_bundled_roster_parses() {
        let registry =
            UnitTypeRegistry::from_ron_str(include_str!("../../../data/units.ron")).expect("bundled data");
        let footman = registry.get(registry.find("footman").expect("footman")).expect("type");
        assert!(footman.has(UnitTypeFlags::CAN_ATTACK | UnitTypeFlags::ORGANIC));
        let farm = registry.get(registry.find("farm").expect("farm")).expect("type");
        assert!(farm.has(UnitTypeFlags::BUILDING));
    }

    #[test]
    fn test_dangling_corpse_is_error() {
        let data = r#"GameData(unit_types: [(ident: "a", name: "A", corpse: Some("nope"))])"#;
        let err = UnitTypeRegistry::from_ron_str(data).unwrap_err();
        assert!(matches!(err, GameError::InvalidUnitType(_)));
    }

    #[test]
    fn test_duplicate_ident_is_error() {
        let data = r#"GameData(unit_types: [(ident: "a", name: "A"), (ident: "a", name: "B")])"#;
        assert!(UnitTypeRegistry::from_ron_str(data).is_err());
    }

    #[test]
    fn test_unknown_spell_is_error() {
        let data = r#"GameData(unit_types: [(ident: "a", name: "A", autocast: ["heal"])])"#;
        let err = UnitTypeRegistry::from_ron_str(data).unwrap_err();
        assert!(matches!(err, GameError::InvalidSpell(_)));
    }
}
