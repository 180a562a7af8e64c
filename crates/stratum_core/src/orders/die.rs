use serde::{Deserialize, Serialize};

use crate::animation::AnimationKind;
use crate::unit::{Unit, VariableId, Variables};

use super::{play, OrderContext};

/// Death sequence: play the death animation, then become a corpse or vanish.
///
/// A corpse keeps its id and plays its own death animation; once that
/// completes (and the corpse type has no corpse of its own) it is released.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DieOrder {
    /// Done; a dying unit never finishes its die order.
    pub finished: bool,
}

impl DieOrder {
    /// Die order.
    #[must_use]
    pub const fn new() -> Self {
        Self { finished: false }
    }

    pub(super) fn execute(&mut self, unit: &mut Unit, ctx: &mut OrderContext<'_>) {
        if play(unit, AnimationKind::Death, ctx).is_none() {
            unit.anim.unbreakable = false;
        }
        if unit.anim.unbreakable {
            return;
        }

        let corpse = ctx
            .world
            .types
            .get(unit.type_id)
            .and_then(|t| t.corpse)
            .and_then(|id| ctx.world.types.get(id))
            .map(|t| (t.id, t.size, Variables::from_stats(&t.stats)));

        ctx.world.unmark_unit_sight(unit);
        let Some((corpse_type, size, mut variables)) = corpse else {
            unit.orders.replace_all(super::Order::Die(DieOrder::new()));
            unit.removed = true;
            unit.released = true;
            tracing::trace!(unit = %unit.id, "Released after death");
            return;
        };

        variables.get_mut(VariableId::HitPoints).value = 0;
        unit.type_id = corpse_type;
        unit.size = size;
        unit.variables = variables;
        unit.modifiers.clear();
        unit.current_sight_range = unit.variables.value(VariableId::SightRange);
        ctx.world.mark_unit_sight(unit);
        unit.frame = 0;
        play(unit, AnimationKind::Death, ctx);
        tracing::trace!(unit = %unit.id, corpse = %corpse_type, "Became corpse");
    }
}
