// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Entity handles and the entity directory
//!
//! Entities are lightweight `(slot, generation)` handles that tie together
//! components. The [`EntityDirectory`] owns slot allocation, detects stale
//! handles through generation counters, remembers creation order for
//! deterministic iteration, and tracks which component types each live
//! entity carries.

use crate::ecs::ComponentId;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Entity handle with generational index support for safe references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// Create a handle from a slot index and generation
    pub fn new(index: u32, generation: u32) -> Self {
        Entity { index, generation }
    }

    /// Slot index inside the directory
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Get the generation number
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}, gen: {})", self.index, self.generation)
    }
}

#[derive(Debug, Clone)]
struct EntityRecord {
    seq: u64,
    components: BTreeSet<ComponentId>,
}

/// Directory of live entities
///
/// Slots are recycled through a free list; freeing a slot bumps its
/// generation so handles captured before the free compare unequal to the
/// handle that later reuses the slot.
///
/// Handles can be *reserved* through a shared reference. A reserved handle
/// is not alive (queries do not see it) until it is materialized, which is
/// how command buffers hand out entity handles before they flush.
#[derive(Debug, Default)]
pub struct EntityDirectory {
    generations: Vec<u32>,
    records: Vec<Option<EntityRecord>>,
    live_order: BTreeMap<u64, Entity>,
    free: RefCell<Vec<u32>>,
    reserved: RefCell<HashMap<u32, u64>>,
    next_slot: Cell<u32>,
    next_seq: Cell<u64>,
}

impl EntityDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a handle without making it alive
    pub fn reserve(&self) -> Entity {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);

        let slot = match self.free.borrow_mut().pop() {
            Some(slot) => slot,
            None => {
                let slot = self.next_slot.get();
                self.next_slot.set(slot + 1);
                slot
            }
        };
        self.reserved.borrow_mut().insert(slot, seq);

        let generation = self.generations.get(slot as usize).copied().unwrap_or(0);
        Entity::new(slot, generation)
    }

    /// Make a reserved handle alive
    ///
    /// Returns `false` if the handle was not reserved (or was reserved under
    /// a different generation).
    pub fn materialize(&mut self, entity: Entity) -> bool {
        let slot = entity.index as usize;
        if self.generation_of(slot) != entity.generation {
            return false;
        }
        let Some(seq) = self.reserved.get_mut().remove(&entity.index) else {
            return false;
        };

        if slot >= self.records.len() {
            self.records.resize(slot + 1, None);
            self.generations.resize(slot + 1, 0);
        }
        self.records[slot] = Some(EntityRecord {
            seq,
            components: BTreeSet::new(),
        });
        self.live_order.insert(seq, entity);
        true
    }

    /// Reserve and immediately materialize a handle
    pub fn allocate(&mut self) -> Entity {
        let entity = self.reserve();
        self.materialize(entity);
        entity
    }

    /// Return a reserved-but-never-materialized handle to the free list
    pub fn release_reserved(&mut self, entity: Entity) -> bool {
        if self.reserved.get_mut().remove(&entity.index).is_none() {
            return false;
        }
        self.retire_slot(entity.index);
        true
    }

    /// Free a live entity
    ///
    /// This increments the generation counter to invalidate old references
    pub fn free(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        if let Some(record) = self.records[entity.index as usize].take() {
            self.live_order.remove(&record.seq);
        }
        self.retire_slot(entity.index);
        true
    }

    fn retire_slot(&mut self, slot: u32) {
        let index = slot as usize;
        if index >= self.generations.len() {
            self.generations.resize(index + 1, 0);
            self.records.resize(index + 1, None);
        }
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.free.get_mut().push(slot);
    }

    fn generation_of(&self, slot: usize) -> u32 {
        self.generations.get(slot).copied().unwrap_or(0)
    }

    fn record(&self, entity: Entity) -> Option<&EntityRecord> {
        let slot = entity.index as usize;
        if self.generation_of(slot) != entity.generation {
            return None;
        }
        self.records.get(slot)?.as_ref()
    }

    fn record_mut(&mut self, entity: Entity) -> Option<&mut EntityRecord> {
        let slot = entity.index as usize;
        if self.generation_of(slot) != entity.generation {
            return None;
        }
        self.records.get_mut(slot)?.as_mut()
    }

    /// Check if an entity is alive
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.record(entity).is_some()
    }

    /// Check if a handle is reserved but not yet alive
    pub fn is_reserved(&self, entity: Entity) -> bool {
        self.generation_of(entity.index as usize) == entity.generation
            && self.reserved.borrow().contains_key(&entity.index)
    }

    /// Creation sequence number of a live entity
    pub fn creation_seq(&self, entity: Entity) -> Option<u64> {
        self.record(entity).map(|record| record.seq)
    }

    /// Get the number of alive entities
    pub fn len(&self) -> usize {
        self.live_order.len()
    }

    /// Check if no entity is alive
    pub fn is_empty(&self) -> bool {
        self.live_order.is_empty()
    }

    /// Iterate live entities in creation order
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.live_order.values().copied()
    }

    /// Component types carried by a live entity, in registration order
    pub fn components(&self, entity: Entity) -> Option<&BTreeSet<ComponentId>> {
        self.record(entity).map(|record| &record.components)
    }

    /// Check whether a live entity carries a component type
    pub fn has(&self, entity: Entity, component: ComponentId) -> bool {
        self.record(entity)
            .map(|record| record.components.contains(&component))
            .unwrap_or(false)
    }

    pub(crate) fn mark_added(&mut self, entity: Entity, component: ComponentId) {
        if let Some(record) = self.record_mut(entity) {
            record.components.insert(component);
        }
    }

    pub(crate) fn mark_removed(&mut self, entity: Entity, component: ComponentId) {
        if let Some(record) = self.record_mut(entity) {
            record.components.remove(&component);
        }
    }

    /// Free every live entity and release every reservation
    ///
    /// Generations survive, so handles from before the clear stay dead.
    pub fn clear(&mut self) {
        let live: Vec<Entity> = self.live_order.values().copied().collect();
        for entity in live {
            self.free(entity);
        }

        let mut reserved: Vec<u32> = self.reserved.get_mut().drain().map(|(slot, _)| slot).collect();
        reserved.sort_unstable();
        for slot in reserved {
            self.retire_slot(slot);
        }
    }
}
