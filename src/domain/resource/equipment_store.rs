use slotmap::{SlotMap, new_key_type};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::resource::category::EquipmentCategory;
use crate::domain::resource::equipment::Equipment;
use crate::domain::utils::id::EquipmentId;

new_key_type! {
    /// Stable arena key of an equipment unit.
    pub struct EquipmentKey;
}

#[derive(Debug, Default)]
struct StoreInner {
    /// Equipment storage.
    units: SlotMap<EquipmentKey, Arc<RwLock<Equipment>>>,

    /// Lookup of the arena key by catalog id.
    id_index: HashMap<EquipmentId, EquipmentKey>,
}

/// Arena of every equipment unit of the floor. Managers hold keys into it, never copies,
/// so commits, releases and rollbacks all mutate the single source of truth.
#[derive(Debug, Clone, Default)]
pub struct EquipmentStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl EquipmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unit. A unit with an already known id replaces nothing and returns the existing key.
    pub fn add(&self, equipment: Equipment) -> EquipmentKey {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(key) = guard.id_index.get(&equipment.id) {
            log::warn!("Equipment {} ({}) registered twice; keeping the first definition.", equipment.id, equipment.name);
            return *key;
        }

        let id = equipment.id;
        let key = guard.units.insert(Arc::new(RwLock::new(equipment)));
        guard.id_index.insert(id, key);
        key
    }

    pub fn get(&self, key: EquipmentKey) -> Option<Arc<RwLock<Equipment>>> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.units.get(key).cloned()
    }

    pub fn key_of(&self, id: EquipmentId) -> Option<EquipmentKey> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.id_index.get(&id).copied()
    }

    /// Keys of every unit of a category, ordered by equipment id.
    pub fn keys_of_category(&self, category: EquipmentCategory) -> Vec<EquipmentKey> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut units: Vec<(EquipmentId, EquipmentKey)> = guard
            .units
            .iter()
            .filter_map(|(key, unit)| {
                let unit = unit.read().unwrap_or_else(PoisonError::into_inner);
                (unit.category == category).then_some((unit.id, key))
            })
            .collect();
        units.sort_by_key(|(id, _)| *id);
        units.into_iter().map(|(_, key)| key).collect()
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` on a shared view of the unit.
    pub fn with_equipment<F, R>(&self, key: EquipmentKey, f: F) -> Option<R>
    where
        F: FnOnce(&Equipment) -> R,
    {
        let handle = self.get(key)?;
        let unit = handle.read().unwrap_or_else(PoisonError::into_inner);
        Some(f(&unit))
    }

    /// Runs `f` with exclusive access to the unit. The check and the write inside `f` are atomic.
    pub fn with_mut_equipment<F, R>(&self, key: EquipmentKey, f: F) -> Option<R>
    where
        F: FnOnce(&mut Equipment) -> R,
    {
        let handle = self.get(key)?;
        let mut unit = handle.write().unwrap_or_else(PoisonError::into_inner);
        Some(f(&mut unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::technical::TechnicalProfile;

    fn unit(id: u64, category: EquipmentCategory) -> Equipment {
        Equipment::new(EquipmentId::new(id), format!("unit {}", id), category, 0, 100, 1, TechnicalProfile::Plain)
    }

    #[test]
    fn keys_are_stable_and_indexed_by_id() {
        let store = EquipmentStore::new();
        let key = store.add(unit(4, EquipmentCategory::Ovens));
        assert_eq!(store.key_of(EquipmentId::new(4)), Some(key));
        assert_eq!(store.add(unit(4, EquipmentCategory::Ovens)), key);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn category_listing_is_sorted_by_id() {
        let store = EquipmentStore::new();
        store.add(unit(9, EquipmentCategory::Mixers));
        store.add(unit(2, EquipmentCategory::Mixers));
        store.add(unit(5, EquipmentCategory::Ovens));

        let ids: Vec<u64> = store
            .keys_of_category(EquipmentCategory::Mixers)
            .into_iter()
            .filter_map(|key| store.with_equipment(key, |equipment| equipment.id.value()))
            .collect();
        assert_eq!(ids, vec![2, 9]);
    }
}
