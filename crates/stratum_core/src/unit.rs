//! Units: identity, variables, the order stack and per-unit playback state.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::animation::{show_animation, AnimKey, AnimOutcome, AnimState, AnimationKind};
use crate::map::LayerId;
use crate::math::{distance_to_tile, fixed_serde, rect_distance, Fixed, Heading, TilePos, TileSize};
use crate::orders::Order;
use crate::player::{PlayerId, PlayerKind};
use crate::rng::SyncRng;
use crate::spells::SpellId;
use crate::unit_type::{BaseStats, UnitType, UnitTypeFlags, UnitTypeId, UnitTypeRegistry};
use crate::world::World;

// ============================================================================
// Identity
// ============================================================================

/// Generational unit handle.
///
/// Resolving a handle whose slot was released (and possibly reused) fails.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct UnitId {
    /// Storage slot.
    pub index: u32,
    /// Slot generation at spawn time.
    pub generation: u32,
}

impl UnitId {
    /// Create a handle.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

// ============================================================================
// Variables
// ============================================================================

/// Named per-unit variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VariableId {
    /// Hit points.
    HitPoints,
    /// Attack range in tiles.
    AttackRange,
    /// Movement speed.
    Speed,
    /// Vision radius.
    SightRange,
    /// Armor.
    Armor,
    /// Basic damage.
    BasicDamage,
    /// Piercing damage.
    PiercingDamage,
    /// Target priority.
    Priority,
    /// Mana.
    Mana,
    /// Stunned while positive.
    Stun,
    /// Invisible to enemies while positive.
    Invisible,
    /// Auto-repair search radius.
    AutoRepairRange,
    /// Healing granted when picked up (items).
    HitPointHealing,
}

impl VariableId {
    /// Number of variables.
    pub const COUNT: usize = 13;

    /// All variables in index order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::HitPoints,
        Self::AttackRange,
        Self::Speed,
        Self::SightRange,
        Self::Armor,
        Self::BasicDamage,
        Self::PiercingDamage,
        Self::Priority,
        Self::Mana,
        Self::Stun,
        Self::Invisible,
        Self::AutoRepairRange,
        Self::HitPointHealing,
    ];

    const fn index(self) -> usize {
        self as usize
    }
}

/// One variable slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variable {
    /// Current value.
    pub value: i32,
    /// Maximum value.
    pub max: i32,
    /// Whether the variable applies to this unit.
    pub enable: bool,
}

impl Variable {
    fn of(value: i32) -> Self {
        Self {
            value,
            max: value,
            enable: true,
        }
    }
}

/// All variables of a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variables {
    values: [Variable; VariableId::COUNT],
}

impl Variables {
    /// Variables initialized from a type's base stats.
    #[must_use]
    pub fn from_stats(stats: &BaseStats) -> Self {
        let mut vars = Self::default();
        let init = [
            (VariableId::HitPoints, stats.hit_points),
            (VariableId::AttackRange, stats.attack_range),
            (VariableId::Speed, stats.speed),
            (VariableId::SightRange, stats.sight_range),
            (VariableId::Armor, stats.armor),
            (VariableId::BasicDamage, stats.basic_damage),
            (VariableId::PiercingDamage, stats.piercing_damage),
            (VariableId::Priority, stats.priority),
            (VariableId::Mana, stats.mana),
            (VariableId::AutoRepairRange, stats.auto_repair_range),
            (VariableId::HitPointHealing, stats.hit_point_healing),
        ];
        for (id, value) in init {
            vars.values[id.index()] = Variable::of(value);
        }
        vars.values[VariableId::Stun.index()].enable = true;
        vars.values[VariableId::Invisible.index()].enable = true;
        vars
    }

    /// Borrow a variable.
    #[must_use]
    pub fn get(&self, id: VariableId) -> &Variable {
        &self.values[id.index()]
    }

    /// Borrow a variable mutably.
    pub fn get_mut(&mut self, id: VariableId) -> &mut Variable {
        &mut self.values[id.index()]
    }

    /// Current value.
    #[must_use]
    pub fn value(&self, id: VariableId) -> i32 {
        self.values[id.index()].value
    }

    /// Maximum value.
    #[must_use]
    pub fn max(&self, id: VariableId) -> i32 {
        self.values[id.index()].max
    }

    /// Add hit points, capped at the maximum; returns the amount applied.
    pub fn heal(&mut self, amount: i32) -> i32 {
        let hp = self.get_mut(VariableId::HitPoints);
        let before = hp.value;
        hp.value = (hp.value + amount.max(0)).min(hp.max);
        hp.value - before
    }

    /// Remove hit points, floored at zero; returns the remaining hit points.
    pub fn damage(&mut self, amount: i32) -> i32 {
        let hp = self.get_mut(VariableId::HitPoints);
        hp.value = (hp.value - amount.max(0)).max(0);
        hp.value
    }
}

/// A timed change to one variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableModifier {
    /// Variable affected.
    pub variable: VariableId,
    /// Added to the variable's value while active.
    pub delta: i32,
    /// Ticks left before the modifier expires.
    pub remaining_ticks: u32,
}

// ============================================================================
// Order stack
// ============================================================================

/// A unit's orders: the current order, queued orders and one saved order.
///
/// During its own turn the current order is lent out to execute; changes
/// made through the queue in the meantime (flush, restore) are applied
/// relative to that lent order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderQueue {
    orders: VecDeque<Order>,
    saved: Option<Order>,
    #[serde(skip)]
    lent: bool,
    #[serde(skip)]
    finish_lent: bool,
    #[serde(skip)]
    discard_lent: bool,
}

impl OrderQueue {
    /// A queue holding a single order.
    #[must_use]
    pub fn new(current: Order) -> Self {
        Self {
            orders: VecDeque::from([current]),
            saved: None,
            lent: false,
            finish_lent: false,
            discard_lent: false,
        }
    }

    /// Rebuild a queue from persisted orders (current first).
    #[must_use]
    pub fn from_parts(orders: Vec<Order>, saved: Option<Order>) -> Self {
        let mut orders = VecDeque::from(orders);
        if orders.is_empty() {
            orders.push_back(Order::still());
        }
        Self {
            orders,
            saved,
            lent: false,
            finish_lent: false,
            discard_lent: false,
        }
    }

    /// The current order; `None` while it is executing.
    #[must_use]
    pub fn current(&self) -> Option<&Order> {
        if self.lent {
            None
        } else {
            self.orders.front()
        }
    }

    /// The current order, mutably; `None` while it is executing.
    pub fn current_mut(&mut self) -> Option<&mut Order> {
        if self.lent {
            None
        } else {
            self.orders.front_mut()
        }
    }

    /// Stored orders, current first.
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    /// Orders queued behind the current one.
    pub fn pending(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter().skip(usize::from(!self.lent))
    }

    /// Number of orders, counting a lent current order.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len() + usize::from(self.lent)
    }

    /// Always false: a unit has at least its current order.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The saved (interrupted) order.
    #[must_use]
    pub fn saved(&self) -> Option<&Order> {
        self.saved.as_ref()
    }

    /// Fill the saved slot.
    pub fn set_saved(&mut self, order: Order) {
        self.saved = Some(order);
    }

    /// Empty the saved slot, returning its order.
    pub fn take_saved(&mut self) -> Option<Order> {
        self.saved.take()
    }

    /// Discard the saved order.
    pub fn clear_saved(&mut self) {
        self.saved = None;
    }

    /// Queue an order at the back.
    pub fn push(&mut self, order: Order) {
        self.orders.push_back(order);
    }

    /// Mark the current order finished.
    pub fn finish_current(&mut self) {
        if self.lent {
            self.finish_lent = true;
        } else if let Some(order) = self.orders.front_mut() {
            order.set_finished(true);
        }
    }

    /// Finish the current order and discard everything queued behind it.
    pub fn release_pending(&mut self) {
        self.finish_current();
        let keep = usize::from(!self.lent).min(self.orders.len());
        self.orders.truncate(keep);
    }

    /// Insert an order directly behind the current one.
    pub fn insert_after_current(&mut self, order: Order) {
        let at = usize::from(!self.lent).min(self.orders.len());
        self.orders.insert(at, order);
    }

    /// Drop every order (including the saved one) and install `order`.
    pub fn replace_all(&mut self, order: Order) {
        self.orders.clear();
        self.orders.push_back(order);
        self.saved = None;
        if self.lent {
            self.discard_lent = true;
        }
    }

    /// Lend the current order out for execution.
    pub fn lend_current(&mut self) -> Option<Order> {
        debug_assert!(!self.lent, "current order already lent");
        let order = self.orders.pop_front()?;
        self.lent = true;
        Some(order)
    }

    /// Return a lent order to the front of the queue.
    pub fn return_current(&mut self, mut order: Order) {
        debug_assert!(self.lent, "no order lent");
        if !self.discard_lent {
            if self.finish_lent {
                order.set_finished(true);
            }
            self.orders.push_front(order);
        }
        self.lent = false;
        self.finish_lent = false;
        self.discard_lent = false;
        if self.orders.is_empty() {
            self.orders.push_back(Order::still());
        }
    }

    /// Retire a finished current order.
    ///
    /// The next queued order becomes current; with nothing queued, a
    /// finished order other than still is replaced by still.
    pub fn advance(&mut self) {
        while self.orders.len() > 1 && self.orders.front().is_some_and(Order::finished) {
            self.orders.pop_front();
        }
        if let Some(front) = self.orders.front() {
            if front.finished() && !front.is_idle() {
                self.orders[0] = Order::still();
            }
        }
    }
}

// ============================================================================
// Unit
// ============================================================================

/// A unit on the map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    /// Handle.
    pub id: UnitId,
    /// Current type (changes when a dying unit becomes a corpse).
    pub type_id: UnitTypeId,
    /// Footprint of the current type.
    pub size: TileSize,
    /// Owner.
    pub player: PlayerId,
    /// Top-left tile of the footprint.
    pub tile_pos: TilePos,
    /// Map layer.
    pub layer: LayerId,
    /// Variables.
    pub variables: Variables,
    /// Timed variable modifiers.
    pub modifiers: Vec<VariableModifier>,
    /// Orders.
    pub orders: OrderQueue,
    /// Animation playback.
    pub anim: AnimState,
    /// Animation snapshot taken when a wait starts.
    pub wait_backup: AnimState,
    /// Ticks to idle before the current order may act.
    pub wait: u32,
    /// Whether a wait is in progress.
    pub waiting: bool,
    /// Facing.
    pub direction: Heading,
    /// Sprite frame.
    pub frame: u16,
    /// Fractional progress toward the next tile step.
    #[serde(with = "fixed_serde")]
    pub move_progress: Fixed,
    /// Off the map (inside a transporter, or released).
    pub removed: bool,
    /// Dead; only the die order runs.
    pub destroyed: bool,
    /// Slot to be freed at the end of this unit's turn.
    pub released: bool,
    /// Fully built.
    pub constructed: bool,
    /// Repairs damaged teamed units when idle.
    pub auto_repair: bool,
    /// Damage kind of the killing blow.
    pub damaged_type: Option<String>,
    /// Tiles walked since the last attack.
    pub step_count: u32,
    /// Sight radius currently marked on the map.
    pub current_sight_range: i32,
    /// Ticks left before each spell may be cast again.
    pub spell_cooldowns: BTreeMap<SpellId, u32>,
}

impl Unit {
    /// Create an idle unit.
    #[must_use]
    pub fn new(
        id: UnitId,
        type_id: UnitTypeId,
        size: TileSize,
        variables: Variables,
        player: PlayerId,
        tile_pos: TilePos,
        layer: LayerId,
    ) -> Self {
        let current_sight_range = variables.value(VariableId::SightRange);
        Self {
            id,
            type_id,
            size,
            player,
            tile_pos,
            layer,
            variables,
            modifiers: Vec::new(),
            orders: OrderQueue::new(Order::still()),
            anim: AnimState::default(),
            wait_backup: AnimState::default(),
            wait: 0,
            waiting: false,
            direction: Heading::SOUTH,
            frame: 0,
            move_progress: Fixed::ZERO,
            removed: false,
            destroyed: false,
            released: false,
            constructed: true,
            auto_repair: false,
            damaged_type: None,
            step_count: 0,
            current_sight_range,
            spell_cooldowns: BTreeMap::new(),
        }
    }

    /// Create an idle unit of `ty`.
    #[must_use]
    pub fn from_type(id: UnitId, ty: &UnitType, player: PlayerId, tile_pos: TilePos, layer: LayerId) -> Self {
        let mut unit = Self::new(
            id,
            ty.id,
            ty.size,
            Variables::from_stats(&ty.stats),
            player,
            tile_pos,
            layer,
        );
        unit.auto_repair = ty.has(UnitTypeFlags::CAN_REPAIR) && ty.stats.auto_repair_range > 0;
        unit
    }

    /// Value of a variable with active modifiers applied.
    #[must_use]
    pub fn modified(&self, id: VariableId) -> i32 {
        let base = self.variables.value(id);
        self.modifiers
            .iter()
            .filter(|m| m.variable == id)
            .fold(base, |acc, m| acc.saturating_add(m.delta))
    }

    /// Current hit points.
    #[must_use]
    pub fn hit_points(&self) -> i32 {
        self.variables.value(VariableId::HitPoints)
    }

    /// Modified attack range.
    #[must_use]
    pub fn attack_range(&self) -> i32 {
        self.modified(VariableId::AttackRange)
    }

    /// Modified speed.
    #[must_use]
    pub fn speed(&self) -> i32 {
        self.modified(VariableId::Speed)
    }

    /// Whether the unit is stunned.
    #[must_use]
    pub fn is_stunned(&self) -> bool {
        self.modified(VariableId::Stun) > 0
    }

    /// On the map and not dead.
    #[must_use]
    pub fn is_alive_on_map(&self) -> bool {
        !self.removed && !self.destroyed && !self.released
    }

    /// Whether the unit can attack right now.
    #[must_use]
    pub fn can_attack(&self, ty: &UnitType) -> bool {
        ty.has(UnitTypeFlags::CAN_ATTACK) && self.constructed && !self.destroyed
    }

    /// Whether the unit can move right now.
    #[must_use]
    pub fn can_move(&self, ty: &UnitType) -> bool {
        ty.can_move() && self.constructed && self.speed() > 0
    }

    /// Whether the unit engages enemies on its own initiative.
    #[must_use]
    pub fn is_aggressive(&self, ty: &UnitType) -> bool {
        self.can_attack(ty) && !ty.has(UnitTypeFlags::COWARD)
    }

    /// Map distance between footprints.
    #[must_use]
    pub fn distance_to_unit(&self, other: &Self) -> i32 {
        rect_distance(self.tile_pos, self.size, other.tile_pos, other.size)
    }

    /// Map distance from this footprint to a tile.
    #[must_use]
    pub fn distance_to_tile(&self, pos: TilePos) -> i32 {
        distance_to_tile(self.tile_pos, self.size, pos)
    }

    /// Radius in which the unit acquires targets on its own.
    #[must_use]
    pub fn reaction_range(&self, ty: &UnitType, world: &World) -> i32 {
        let person = world
            .players
            .get(self.player)
            .is_some_and(|p| p.kind == PlayerKind::Person && !p.ai_enabled);
        let base = if person {
            ty.reaction_range_person
        } else {
            ty.reaction_range_computer
        };
        base.max(self.attack_range())
    }

    /// Whether `viewer` may pick this unit as a goal.
    #[must_use]
    pub fn is_visible_as_goal(&self, viewer: PlayerId, world: &World) -> bool {
        if !self.is_alive_on_map() {
            return false;
        }
        let teamed = world.players.is_teamed(viewer, self.player);
        if self.modified(VariableId::Invisible) > 0 && !teamed {
            return false;
        }
        if !world.config.fog_of_war || teamed {
            return true;
        }
        if world
            .players
            .get(viewer)
            .is_some_and(|p| p.kind == PlayerKind::Computer)
        {
            return true;
        }
        (0..self.size.height).any(|dy| {
            (0..self.size.width)
                .any(|dx| world.map.is_visible(viewer, self.tile_pos.offset(dx, dy), self.layer))
        })
    }

    /// Turn toward a footprint; broadside units present their flank instead.
    pub fn face_toward(&mut self, pos: TilePos, size: TileSize, side_attack: bool) {
        // Half-tile units so footprint centers stay integral.
        let dx = 2 * (pos.x - self.tile_pos.x) + (size.width - self.size.width);
        let dy = 2 * (pos.y - self.tile_pos.y) + (size.height - self.size.height);
        let heading = Heading::from_delta(dx, dy, self.direction);
        self.direction = if side_attack {
            heading.broadside(self.direction)
        } else {
            heading
        };
    }

    /// Advance the animation of `kind` by one tick.
    ///
    /// Returns `None` when the unit's type has no such animation.
    pub fn animate(
        &mut self,
        kind: AnimationKind,
        types: &UnitTypeRegistry,
        rng: &mut SyncRng,
    ) -> Option<AnimOutcome> {
        let ty = types.get(self.type_id)?;
        let script = ty.animations.script(kind, self.damaged_type.as_deref())?;
        let key = AnimKey {
            unit_type: self.type_id,
            kind,
        };
        Some(show_animation(&mut self.anim, &mut self.frame, key, script, rng))
    }

    /// Whether `order` may be kept in the saved slot.
    ///
    /// Only one order can be saved; finished, invalid and die orders never are.
    #[must_use]
    pub fn can_store_order(&self, order: &Order, world: &World) -> bool {
        self.orders.saved().is_none()
            && !order.finished()
            && order.is_resumable()
            && order.is_valid(self, world)
    }

    /// Save `order` if the slot allows it; returns whether it was saved.
    pub fn store_order(&mut self, order: Order, world: &World) -> bool {
        if !self.can_store_order(&order, world) {
            return false;
        }
        tracing::trace!(unit = %self.id, kind = ?order.kind(), "Saved order");
        self.orders.set_saved(order);
        true
    }

    /// Resume the saved order.
    ///
    /// The saved order is placed right behind the current order, which is
    /// marked finished. Returns false (discarding it if invalid) when there
    /// is nothing valid to resume.
    pub fn restore_order(&mut self, world: &World) -> bool {
        let Some(saved) = self.orders.take_saved() else {
            return false;
        };
        if !saved.is_valid(self, world) {
            tracing::debug!(unit = %self.id, kind = ?saved.kind(), "Discarded invalid saved order");
            return false;
        }
        tracing::debug!(unit = %self.id, kind = ?saved.kind(), "Restored saved order");
        self.orders.finish_current();
        self.orders.insert_after_current(saved);
        true
    }

    /// Tick timed modifiers and spell cooldowns.
    pub fn decay_timers(&mut self) {
        for modifier in &mut self.modifiers {
            modifier.remaining_ticks = modifier.remaining_ticks.saturating_sub(1);
        }
        self.modifiers.retain(|m| m.remaining_ticks > 0);
        for cooldown in self.spell_cooldowns.values_mut() {
            *cooldown = cooldown.saturating_sub(1);
        }
        self.spell_cooldowns.retain(|_, c| *c > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::{AttackOrder, MoveOrder};

    fn stats() -> BaseStats {
        BaseStats {
            hit_points: 50,
            attack_range: 3,
            speed: 8,
            sight_range: 5,
            ..BaseStats::default()
        }
    }

    fn unit() -> Unit {
        Unit::new(
            UnitId::new(0, 0),
            UnitTypeId(0),
            TileSize::ONE,
            Variables::from_stats(&stats()),
            PlayerId(0),
            TilePos::new(2, 2),
            0,
        )
    }

    #[test]
    fn test_variables_heal_and_damage_clamp() {
        let mut vars = Variables::from_stats(&stats());
        assert_eq!(vars.damage(80), 0);
        assert_eq!(vars.heal(20), 20);
        assert_eq!(vars.heal(100), 30);
        assert_eq!(vars.value(VariableId::HitPoints), 50);
    }

    #[test]
    fn test_modifiers_expire() {
        let mut u = unit();
        u.modifiers.push(VariableModifier {
            variable: VariableId::AttackRange,
            delta: 2,
            remaining_ticks: 2,
        });
        assert_eq!(u.attack_range(), 5);
        u.decay_timers();
        assert_eq!(u.attack_range(), 5);
        u.decay_timers();
        assert_eq!(u.attack_range(), 3);
    }

    #[test]
    fn test_queue_advance_replaces_finished_with_still() {
        let mut queue = OrderQueue::new(Order::Move(MoveOrder::new(TilePos::new(1, 1), 0, 0)));
        queue.finish_current();
        queue.advance();
        assert!(queue.current().is_some_and(Order::is_idle));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_queue_advance_pops_to_next() {
        let mut queue = OrderQueue::new(Order::still());
        queue.push(Order::Move(MoveOrder::new(TilePos::new(4, 4), 0, 0)));
        queue.finish_current();
        queue.advance();
        assert!(matches!(queue.current(), Some(Order::Move(_))));
    }

    #[test]
    fn test_release_pending_while_lent() {
        let mut queue = OrderQueue::new(Order::still());
        queue.push(Order::Move(MoveOrder::new(TilePos::new(4, 4), 0, 0)));
        let lent = queue.lend_current().expect("current");
        queue.release_pending();
        queue.push(Order::Attack(AttackOrder::at_position(TilePos::new(5, 5), 0)));
        queue.return_current(lent);
        assert_eq!(queue.len(), 2);
        assert!(queue.current().is_some_and(Order::finished));
        queue.advance();
        assert!(matches!(queue.current(), Some(Order::Attack(_))));
    }

    #[test]
    fn test_insert_after_current_while_lent() {
        let mut queue = OrderQueue::new(Order::still());
        let lent = queue.lend_current().expect("current");
        queue.finish_current();
        queue.insert_after_current(Order::Move(MoveOrder::new(TilePos::new(9, 9), 0, 2)));
        queue.return_current(lent);
        queue.advance();
        assert!(matches!(queue.current(), Some(Order::Move(m)) if m.range == 2));
    }

    #[test]
    fn test_face_toward() {
        let mut u = unit();
        u.face_toward(TilePos::new(6, 2), TileSize::ONE, false);
        assert_eq!(u.direction, Heading::EAST);
        u.direction = Heading::NORTH;
        u.face_toward(TilePos::new(6, 2), TileSize::ONE, true);
        assert_eq!(u.direction, Heading::NORTH);
    }
}
