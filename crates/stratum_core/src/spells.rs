//! Auto-cast spells.
//!
//! Idle units try their type's auto-cast spells before any other idle
//! behavior. Spells are simple and instantaneous: a heal on the most
//! damaged teamed unit in range, or direct damage on the best threat.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::combat::{self, AttackerInfo, CombatEnv};
use crate::orders::OrderContext;
use crate::spatial;
use crate::threat;
use crate::unit::{Unit, VariableId};

/// Dense runtime id of a spell.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct SpellId(pub u16);

impl SpellId {
    /// Index into the registry.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SpellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spell#{}", self.0)
    }
}

/// What a spell does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpellEffect {
    /// Restore hit points to a damaged teamed unit.
    Heal(i32),
    /// Deal direct damage to an enemy.
    Damage(i32),
}

/// Spell as authored in data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellData {
    /// Unique string identifier.
    pub ident: String,
    /// Cast range in tiles.
    pub range: i32,
    /// Mana consumed per cast.
    #[serde(default)]
    pub mana_cost: i32,
    /// Ticks before the caster may cast it again.
    #[serde(default)]
    pub cooldown: u32,
    /// Effect.
    pub effect: SpellEffect,
}

/// A resolved spell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Spell {
    /// Runtime id.
    pub id: SpellId,
    /// Unique string identifier.
    pub ident: String,
    /// Cast range in tiles.
    pub range: i32,
    /// Mana consumed per cast.
    pub mana_cost: i32,
    /// Ticks before the caster may cast it again.
    pub cooldown: u32,
    /// Effect.
    pub effect: SpellEffect,
}

impl Spell {
    /// Resolve authored data.
    #[must_use]
    pub fn from_data(id: SpellId, data: SpellData) -> Self {
        Self {
            id,
            ident: data.ident,
            range: data.range,
            mana_cost: data.mana_cost,
            cooldown: data.cooldown,
            effect: data.effect,
        }
    }
}

/// A successful cast, reported in the tick events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpellCast {
    /// Caster.
    pub caster: crate::unit::UnitId,
    /// Spell cast.
    pub spell: SpellId,
    /// Target.
    pub target: crate::unit::UnitId,
}

/// Try each of the unit type's auto-cast spells; returns whether one was cast.
pub fn auto_cast(unit: &mut Unit, ctx: &mut OrderContext<'_>) -> bool {
    let spells: Vec<Spell> = match ctx.world.types.get(unit.type_id) {
        Some(ty) => ty
            .autocast
            .iter()
            .filter_map(|id| ctx.world.types.spell(*id).cloned())
            .collect(),
        None => return false,
    };

    for spell in spells {
        if unit.spell_cooldowns.get(&spell.id).copied().unwrap_or(0) > 0 {
            continue;
        }
        if unit.variables.value(VariableId::Mana) < spell.mana_cost {
            continue;
        }
        let target = match spell.effect {
            SpellEffect::Heal(_) => most_damaged_teammate(unit, spell.range, ctx),
            SpellEffect::Damage(_) => threat::attack_units_in_distance(unit, spell.range, ctx),
        };
        let Some(target) = target else {
            continue;
        };

        match spell.effect {
            SpellEffect::Heal(amount) => {
                if let Some(goal) = ctx.world.units.get_mut(target) {
                    goal.variables.heal(amount);
                }
            }
            SpellEffect::Damage(amount) => {
                let attacker = AttackerInfo::of(unit);
                let damage_kind = ctx
                    .world
                    .types
                    .get(unit.type_id)
                    .and_then(|t| t.damage_kind.clone());
                let mut env = CombatEnv {
                    world: &mut *ctx.world,
                    rng: &mut *ctx.rng,
                    missiles: &mut *ctx.missiles,
                    events: &mut *ctx.events,
                };
                combat::hit_unit(&mut env, Some(attacker), target, amount, damage_kind.as_deref());
            }
        }

        let mana = unit.variables.get_mut(VariableId::Mana);
        mana.value -= spell.mana_cost;
        if spell.cooldown > 0 {
            unit.spell_cooldowns.insert(spell.id, spell.cooldown);
        }
        tracing::trace!(caster = %unit.id, spell = %spell.ident, %target, "Auto-cast spell");
        ctx.events.spells_cast.push(SpellCast {
            caster: unit.id,
            spell: spell.id,
            target,
        });
        return true;
    }
    false
}

fn most_damaged_teammate(
    unit: &Unit,
    range: i32,
    ctx: &OrderContext<'_>,
) -> Option<crate::unit::UnitId> {
    let world = &*ctx.world;
    spatial::select_around(world, unit, range, |other| {
        world.players.is_teamed(unit.player, other.player)
            && !other.destroyed
            && other.variables.value(VariableId::HitPoints) < other.variables.max(VariableId::HitPoints)
            && unit.distance_to_unit(other) <= range
    })
    .into_iter()
    .filter_map(|id| world.units.get(id))
    .min_by_key(|other| {
        let hp = other.variables.get(VariableId::HitPoints);
        (i64::from(hp.value) * 100 / i64::from(hp.max.max(1)), other.id)
    })
    .map(|other| other.id)
}
