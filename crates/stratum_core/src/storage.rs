//! Generational unit storage.
//!
//! Slots are reused lowest-index-first after release, with the slot's
//! generation bumped so stale [`UnitId`]s stop resolving. Iteration is
//! always in ascending slot order, which is the simulation's canonical
//! unit order.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::unit::{Unit, UnitId};

/// Storage for all units, indexed by [`UnitId`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitStorage {
    slots: Vec<Option<Unit>>,
    generations: Vec<u32>,
    free: BTreeSet<u32>,
}

impl UnitStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an empty storage with a persisted slot layout.
    ///
    /// Units are then put back with [`restore`](Self::restore).
    #[must_use]
    pub fn with_layout(generations: Vec<u32>, free: BTreeSet<u32>) -> Self {
        Self {
            slots: vec![None; generations.len()],
            generations,
            free,
        }
    }

    /// Generation of every slot, for persistence.
    #[must_use]
    pub fn generations(&self) -> &[u32] {
        &self.generations
    }

    /// Released slot indices waiting for reuse.
    #[must_use]
    pub fn free_slots(&self) -> &BTreeSet<u32> {
        &self.free
    }

    /// The id the next inserted unit will get.
    #[must_use]
    pub fn next_id(&self) -> UnitId {
        match self.free.first() {
            Some(&index) => UnitId::new(index, self.generations[index as usize]),
            None => UnitId::new(self.slots.len() as u32, 0),
        }
    }

    /// Insert a unit built for the id it is given.
    pub fn insert_with(&mut self, build: impl FnOnce(UnitId) -> Unit) -> UnitId {
        let id = self.next_id();
        let index = id.index as usize;
        if index == self.slots.len() {
            self.slots.push(None);
            self.generations.push(0);
        } else {
            self.free.remove(&id.index);
        }
        self.slots[index] = Some(build(id));
        id
    }

    /// Resolve an id to a live unit.
    #[must_use]
    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        if self.generations.get(id.index as usize) != Some(&id.generation) {
            return None;
        }
        self.slots.get(id.index as usize)?.as_ref()
    }

    /// Resolve an id to a live unit, mutably.
    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        if self.generations.get(id.index as usize) != Some(&id.generation) {
            return None;
        }
        self.slots.get_mut(id.index as usize)?.as_mut()
    }

    /// Whether `id` resolves.
    #[must_use]
    pub fn contains(&self, id: UnitId) -> bool {
        self.get(id).is_some()
    }

    /// Temporarily take a unit out of its slot without releasing the slot.
    ///
    /// While taken, the id does not resolve; put it back with [`restore`](Self::restore).
    pub fn take(&mut self, id: UnitId) -> Option<Unit> {
        if self.generations.get(id.index as usize) != Some(&id.generation) {
            return None;
        }
        self.slots.get_mut(id.index as usize)?.take()
    }

    /// Put a unit back into its own slot.
    pub fn restore(&mut self, unit: Unit) {
        let index = unit.id.index as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
            self.generations.resize(index + 1, 0);
            self.generations[index] = unit.id.generation;
        } else {
            debug_assert_eq!(self.generations[index], unit.id.generation);
        }
        self.slots[index] = Some(unit);
    }

    /// Release a slot for reuse; its current id stops resolving.
    pub fn free_slot(&mut self, id: UnitId) {
        let index = id.index as usize;
        if self.generations.get(index) != Some(&id.generation) {
            return;
        }
        self.slots[index] = None;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.free.insert(id.index);
    }

    /// Remove a unit and release its slot.
    pub fn remove(&mut self, id: UnitId) -> Option<Unit> {
        let unit = self.take(id)?;
        self.free_slot(id);
        Some(unit)
    }

    /// Number of units currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Whether no units are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all stored units, ascending.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<UnitId> {
        self.iter().map(|u| u.id).collect()
    }

    /// Iterate units in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Iterate units mutably in ascending id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Unit> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{TilePos, TileSize};
    use crate::player::PlayerId;
    use crate::unit::Variables;
    use crate::unit_type::{BaseStats, UnitTypeId};

    fn unit(id: UnitId) -> Unit {
        let stats = BaseStats {
            hit_points: 10,
            ..BaseStats::default()
        };
        Unit::new(
            id,
            UnitTypeId(0),
            TileSize::ONE,
            Variables::from_stats(&stats),
            PlayerId(0),
            TilePos::new(0, 0),
            0,
        )
    }

    #[test]
    fn test_insert_get_remove() {
        let mut storage = UnitStorage::new();
        let a = storage.insert_with(unit);
        let b = storage.insert_with(unit);
        assert_eq!(a, UnitId::new(0, 0));
        assert_eq!(b, UnitId::new(1, 0));
        assert_eq!(storage.len(), 2);
        assert!(storage.remove(a).is_some());
        assert!(storage.get(a).is_none());
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_released_slot_reused_with_new_generation() {
        let mut storage = UnitStorage::new();
        let a = storage.insert_with(unit);
        let _b = storage.insert_with(unit);
        storage.remove(a);
        let c = storage.insert_with(unit);
        assert_eq!(c.index, a.index);
        assert_ne!(c, a);
        assert!(storage.get(a).is_none());
        assert!(storage.get(c).is_some());
    }

    #[test]
    fn test_lowest_free_slot_first() {
        let mut storage = UnitStorage::new();
        let ids: Vec<_> = (0..4).map(|_| storage.insert_with(unit)).collect();
        storage.remove(ids[2]);
        storage.remove(ids[1]);
        assert_eq!(storage.next_id().index, 1);
    }

    #[test]
    fn test_take_and_restore() {
        let mut storage = UnitStorage::new();
        let a = storage.insert_with(unit);
        let taken = storage.take(a).expect("unit");
        assert!(!storage.contains(a));
        // A taken slot is not free: new units go elsewhere.
        let b = storage.insert_with(unit);
        assert_ne!(b.index, a.index);
        storage.restore(taken);
        assert!(storage.contains(a));
        assert_eq!(storage.sorted_ids(), vec![a, b]);
    }
}
