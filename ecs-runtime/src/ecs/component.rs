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
//! Component storage and change tracking
//!
//! Components are data containers that can be attached to entities. Each
//! component type gets one dense [`ComponentStore`] holding the values, a
//! change-stamp pair per value, and a record of recent removals so that
//! `Removed` filters can be answered.

use crate::ecs::{ComponentId, Entity};
use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

/// Trait that all components must implement
///
/// Components should be plain data structures without behavior. The only
/// hook is [`Component::dispose`], called exactly once when an instance is
/// removed, replaced, or torn down with its entity or world. Use it to
/// release handles held in external libraries; it must not touch the world.
pub trait Component: 'static {
    /// Release external resources owned by this instance
    fn dispose(&mut self) {}
}

/// Change stamps carried by every stored component or resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentTicks {
    added: u64,
    changed: u64,
}

impl ComponentTicks {
    /// Stamps for a value added at `tick`
    pub fn new(tick: u64) -> Self {
        ComponentTicks {
            added: tick,
            changed: tick,
        }
    }

    /// Tick at which the value was added
    pub fn added(&self) -> u64 {
        self.added
    }

    /// Tick of the last mutation (or the add)
    pub fn changed(&self) -> u64 {
        self.changed
    }

    /// Whether the value was added after the checkpoint `since`
    pub fn is_added_since(&self, since: u64) -> bool {
        self.added > since
    }

    /// Whether the value changed after the checkpoint `since`
    pub fn is_changed_since(&self, since: u64) -> bool {
        self.changed > since
    }

    /// Record a mutation at `tick`
    pub fn set_changed(&mut self, tick: u64) {
        // Stamps only move forward.
        self.changed = self.changed.max(tick);
    }
}

/// Trace left behind when a component is removed from a live entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalRecord {
    added: u64,
    removed: u64,
}

impl RemovalRecord {
    /// Record a removal at `removed` of a value added at `added`
    pub fn new(added: u64, removed: u64) -> Self {
        RemovalRecord { added, removed }
    }

    /// Whether the value was present at checkpoint `since` and removed after it
    pub fn is_removed_since(&self, since: u64) -> bool {
        self.added <= since && self.removed > since
    }
}

/// Registration metadata consulted when a component is attached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentTraits {
    /// At most one entity in the world may hold this component
    pub unique: bool,
    /// Component types sharing a base are mutually exclusive states
    pub state_of: Option<ComponentId>,
}

/// Outcome of [`ComponentStore::insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// The entity did not carry the component before
    Added,
    /// An existing instance was disposed and replaced
    Replaced,
}

/// Dense storage for one component type
///
/// Values live contiguously; a sparse map from entity to dense index
/// supports swap-removal without leaving gaps.
pub struct ComponentStore<T: Component> {
    /// Mapping from Entity to dense array index
    entity_to_index: HashMap<Entity, usize>,
    /// Mapping from dense array index back to Entity (for swap_remove)
    index_to_entity: Vec<Entity>,
    components: Vec<T>,
    ticks: Vec<ComponentTicks>,
    removed: HashMap<Entity, RemovalRecord>,
}

impl<T: Component> ComponentStore<T> {
    /// Create a new empty store
    pub fn new() -> Self {
        ComponentStore {
            entity_to_index: HashMap::new(),
            index_to_entity: Vec::new(),
            components: Vec::new(),
            ticks: Vec::new(),
            removed: HashMap::new(),
        }
    }

    /// Get the number of components stored
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Get all entities that have components in this store
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.index_to_entity.iter().copied()
    }

    /// Check if an entity has this component
    pub fn contains(&self, entity: Entity) -> bool {
        self.entity_to_index.contains_key(&entity)
    }

    /// Get a reference to the component of an entity
    pub fn get(&self, entity: Entity) -> Option<&T> {
        let index = self.entity_to_index.get(&entity)?;
        Some(&self.components[*index])
    }

    /// Change stamps of an entity's component
    pub fn ticks(&self, entity: Entity) -> Option<ComponentTicks> {
        let index = self.entity_to_index.get(&entity)?;
        Some(self.ticks[*index])
    }

    /// Most recent removal of this component from `entity`
    pub fn removal(&self, entity: Entity) -> Option<RemovalRecord> {
        self.removed.get(&entity).copied()
    }

    pub(crate) fn index_of(&self, entity: Entity) -> Option<usize> {
        self.entity_to_index.get(&entity).copied()
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> (&mut T, &mut ComponentTicks) {
        (&mut self.components[index], &mut self.ticks[index])
    }

    /// Mutable access to an entity's component together with its stamps
    pub fn get_mut_with_ticks(&mut self, entity: Entity) -> Option<(&mut T, &mut ComponentTicks)> {
        let index = self.index_of(entity)?;
        Some(self.slot_mut(index))
    }

    /// Attach `component` to `entity` at `tick`
    ///
    /// An existing instance is disposed and replaced in place; the
    /// replacement keeps the original added stamp and counts as a change.
    pub fn insert(&mut self, entity: Entity, component: T, tick: u64) -> Insertion {
        if let Some(&index) = self.entity_to_index.get(&entity) {
            let mut previous = std::mem::replace(&mut self.components[index], component);
            previous.dispose();
            self.ticks[index].set_changed(tick);
            Insertion::Replaced
        } else {
            self.components.push(component);
            self.ticks.push(ComponentTicks::new(tick));
            self.entity_to_index.insert(entity, self.index_to_entity.len());
            self.index_to_entity.push(entity);
            self.removed.remove(&entity);

            debug_assert_eq!(self.entity_to_index.len(), self.index_to_entity.len());
            debug_assert_eq!(self.entity_to_index.len(), self.components.len());
            Insertion::Added
        }
    }

    /// Detach and dispose the component of `entity`, recording the removal
    pub fn remove(&mut self, entity: Entity, tick: u64) -> bool {
        let Some(index) = self.entity_to_index.remove(&entity) else {
            return false;
        };

        let last_index = self.components.len() - 1;
        if index != last_index {
            let swapped_entity = self.index_to_entity[last_index];
            self.entity_to_index.insert(swapped_entity, index);
        }
        self.index_to_entity.swap_remove(index);
        let ticks = self.ticks.swap_remove(index);
        let mut component = self.components.swap_remove(index);
        component.dispose();

        self.removed
            .insert(entity, RemovalRecord::new(ticks.added(), tick));

        debug_assert_eq!(self.entity_to_index.len(), self.index_to_entity.len());
        debug_assert_eq!(self.entity_to_index.len(), self.components.len());
        true
    }

    /// Drop removal history for an entity that no longer exists
    pub fn forget(&mut self, entity: Entity) {
        self.removed.remove(&entity);
    }
}

impl<T: Component> Default for ComponentStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased view of a `RefCell<ComponentStore<T>>`
///
/// Filter evaluation and structural operations go through this trait so
/// they can work from a [`ComponentId`] alone.
pub(crate) trait AnyStore: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn type_name(&self) -> &'static str;
    fn len(&self) -> usize;
    fn entities(&self) -> Vec<Entity>;
    fn ticks(&self, entity: Entity) -> Option<ComponentTicks>;
    fn removal(&self, entity: Entity) -> Option<RemovalRecord>;
    fn remove(&mut self, entity: Entity, tick: u64) -> bool;
    fn forget(&mut self, entity: Entity);
}

/// Shared borrow for the erased read accessors
///
/// These run only while the world is exclusively held and no fetch guard is
/// alive, so a conflicting borrow is a bug in the caller.
fn peek<T: Component>(cell: &RefCell<ComponentStore<T>>) -> Option<Ref<'_, ComponentStore<T>>> {
    let store = cell.try_borrow().ok();
    debug_assert!(
        store.is_some(),
        "component store `{}` read while mutably borrowed",
        std::any::type_name::<T>()
    );
    store
}

impl<T: Component> AnyStore for RefCell<ComponentStore<T>> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        crate::ecs::identity::short_type_name(std::any::type_name::<T>())
    }

    fn len(&self) -> usize {
        peek(self).map_or(0, |store| store.len())
    }

    fn entities(&self) -> Vec<Entity> {
        peek(self)
            .map(|store| store.entities().collect())
            .unwrap_or_default()
    }

    fn ticks(&self, entity: Entity) -> Option<ComponentTicks> {
        peek(self)?.ticks(entity)
    }

    fn removal(&self, entity: Entity) -> Option<RemovalRecord> {
        peek(self)?.removal(entity)
    }

    fn remove(&mut self, entity: Entity, tick: u64) -> bool {
        self.get_mut().remove(entity, tick)
    }

    fn forget(&mut self, entity: Entity) {
        self.get_mut().forget(entity);
    }
}

/// Change-tracking mutable access to a component fetched by a query
///
/// Dereferencing mutably stamps the component as changed.
pub struct Mut<'a, T> {
    value: &'a mut T,
    ticks: &'a mut ComponentTicks,
    tick: u64,
}

impl<'a, T> Mut<'a, T> {
    pub(crate) fn new(value: &'a mut T, ticks: &'a mut ComponentTicks, tick: u64) -> Self {
        Mut { value, ticks, tick }
    }

    /// Stamps of the underlying component
    pub fn ticks(&self) -> ComponentTicks {
        *self.ticks
    }

    /// Mutable access that does not count as a change
    pub fn bypass_change_detection(&mut self) -> &mut T {
        &mut *self.value
    }
}

impl<T> Deref for Mut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &*self.value
    }
}

impl<T> DerefMut for Mut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.ticks.set_changed(self.tick);
        &mut *self.value
    }
}

/// Change-tracking guard returned by `World::get_mut`
pub struct ComponentMut<'a, T> {
    value: RefMut<'a, T>,
    ticks: RefMut<'a, ComponentTicks>,
    tick: u64,
}

impl<'a, T: Component> ComponentMut<'a, T> {
    pub(crate) fn new(store: RefMut<'a, ComponentStore<T>>, index: usize, tick: u64) -> Self {
        let (value, ticks) = RefMut::map_split(store, |store| store.slot_mut(index));
        ComponentMut { value, ticks, tick }
    }

    /// Stamps of the underlying component
    pub fn ticks(&self) -> ComponentTicks {
        *self.ticks
    }
}

impl<T> Deref for ComponentMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for ComponentMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.ticks.set_changed(self.tick);
        &mut self.value
    }
}
