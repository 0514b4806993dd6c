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
//! Resource storage
//!
//! Resources are singletons keyed by type. They share the component change
//! stamps and disposal contract but are not attached to any entity.

use crate::ecs::component::{ComponentTicks, RemovalRecord};
use crate::ecs::identity::{IdentityRegistry, ResourceId, TypeKey};
use crate::error::{EcsError, Result};
use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

/// Trait that all resources must implement
///
/// [`Resource::dispose`] runs exactly once per instance: when it is
/// replaced, removed, or when the owning world is torn down.
pub trait Resource: 'static {
    /// Release external resources owned by this instance
    fn dispose(&mut self) {}
}

trait AnyResource: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn dispose_erased(&mut self);
}

impl<T: Resource> AnyResource for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn dispose_erased(&mut self) {
        Resource::dispose(self);
    }
}

struct ResourceSlot {
    value: Box<dyn AnyResource>,
    ticks: ComponentTicks,
}

/// Singleton store with one slot per resource type
pub struct Resources {
    registry: IdentityRegistry<ResourceId>,
    slots: Vec<Option<RefCell<ResourceSlot>>>,
    removed: HashMap<ResourceId, RemovalRecord>,
    change_tick: u64,
}

impl Resources {
    /// Create an empty store
    pub fn new() -> Self {
        Resources {
            registry: IdentityRegistry::new(),
            slots: Vec::new(),
            removed: HashMap::new(),
            change_tick: 1,
        }
    }

    pub(crate) fn set_change_tick(&mut self, tick: u64) {
        self.change_tick = tick;
    }

    /// Identity of a resource type, assigned on first use
    pub fn intern(&mut self, key: TypeKey) -> ResourceId {
        let id = self.registry.intern(key);
        if self.slots.len() <= id.raw() as usize {
            self.slots.resize_with(id.raw() as usize + 1, || None);
        }
        id
    }

    /// The identity registry of resource types
    pub fn registry(&self) -> &IdentityRegistry<ResourceId> {
        &self.registry
    }

    fn slot(&self, id: ResourceId) -> Option<&RefCell<ResourceSlot>> {
        self.slots.get(id.raw() as usize)?.as_ref()
    }

    fn slot_of<T: Resource>(&self) -> Option<&RefCell<ResourceSlot>> {
        self.slot(self.registry.id_of::<T>()?)
    }

    /// Install the default value of `T`, disposing any prior instance
    pub fn add<T: Resource + Default>(&mut self) {
        self.add_new(T::default());
    }

    /// Install the default value of `T` after applying `overrides`
    pub fn add_with<T, F>(&mut self, overrides: F)
    where
        T: Resource + Default,
        F: FnOnce(&mut T),
    {
        let mut value = T::default();
        overrides(&mut value);
        self.add_new(value);
    }

    /// Install `value`, disposing any prior instance of `T`
    pub fn add_new<T: Resource>(&mut self, value: T) {
        let id = self.intern(TypeKey::of::<T>());
        let tick = self.change_tick;
        let index = id.raw() as usize;

        let ticks = match self.slots[index].take() {
            Some(previous) => {
                let mut previous = previous.into_inner();
                previous.value.dispose_erased();
                let mut ticks = previous.ticks;
                ticks.set_changed(tick);
                ticks
            }
            None => ComponentTicks::new(tick),
        };

        self.removed.remove(&id);
        self.slots[index] = Some(RefCell::new(ResourceSlot {
            value: Box::new(value),
            ticks,
        }));
        tracing::trace!(resource = self.registry.name(id), "resource installed");
    }

    /// Borrow the resource `T`
    ///
    /// Fails with [`EcsError::MissingResource`] if absent.
    pub fn get<T: Resource>(&self) -> Result<Ref<'_, T>> {
        let missing = || EcsError::MissingResource(short_name::<T>());
        let slot = self.slot_of::<T>().ok_or_else(missing)?;
        let guard = slot.try_borrow().map_err(|_| EcsError::BorrowConflict {
            type_name: short_name::<T>(),
        })?;
        Ref::filter_map(guard, |slot| slot.value.as_any().downcast_ref::<T>()).map_err(|_| missing())
    }

    /// Borrow the resource `T` mutably; writes stamp it as changed
    pub fn get_mut<T: Resource>(&self) -> Result<ResMut<'_, T>> {
        let missing = || EcsError::MissingResource(short_name::<T>());
        let slot = self.slot_of::<T>().ok_or_else(missing)?;
        let guard = slot.try_borrow_mut().map_err(|_| EcsError::BorrowConflict {
            type_name: short_name::<T>(),
        })?;
        let (value, ticks) = RefMut::map_split(guard, |slot| (&mut slot.value, &mut slot.ticks));
        let value = RefMut::filter_map(value, |value| value.as_any_mut().downcast_mut::<T>())
            .map_err(|_| missing())?;
        Ok(ResMut {
            value,
            ticks,
            tick: self.change_tick,
        })
    }

    /// Borrow the resource `T` if present
    pub fn try_get<T: Resource>(&self) -> Option<Ref<'_, T>> {
        self.get::<T>().ok()
    }

    /// Check whether `T` is installed
    pub fn has<T: Resource>(&self) -> bool {
        self.slot_of::<T>().is_some()
    }

    /// Check whether the type behind `key` is installed
    pub fn has_key(&self, key: TypeKey) -> bool {
        self.registry
            .get(key.type_id())
            .map(|id| self.contains(id))
            .unwrap_or(false)
    }

    /// Check whether every listed type is installed
    pub fn has_all(&self, keys: &[TypeKey]) -> bool {
        keys.iter().all(|key| self.has_key(*key))
    }

    /// Check whether at least one listed type is installed
    pub fn has_any(&self, keys: &[TypeKey]) -> bool {
        keys.iter().any(|key| self.has_key(*key))
    }

    /// Remove and dispose `T`; returns whether it was present
    pub fn remove<T: Resource>(&mut self) -> bool {
        self.remove_key(TypeKey::of::<T>())
    }

    /// Remove and dispose the type behind `key`
    pub fn remove_key(&mut self, key: TypeKey) -> bool {
        match self.registry.get(key.type_id()) {
            Some(id) => self.remove_id(id),
            None => false,
        }
    }

    pub(crate) fn remove_id(&mut self, id: ResourceId) -> bool {
        let Some(slot) = self.slots.get_mut(id.raw() as usize).and_then(Option::take) else {
            return false;
        };
        let mut slot = slot.into_inner();
        slot.value.dispose_erased();
        self.removed
            .insert(id, RemovalRecord::new(slot.ticks.added(), self.change_tick));
        true
    }

    pub(crate) fn contains(&self, id: ResourceId) -> bool {
        self.slot(id).is_some()
    }

    pub(crate) fn ticks(&self, id: ResourceId) -> Option<ComponentTicks> {
        let slot = self.slot(id)?;
        slot.try_borrow().ok().map(|slot| slot.ticks)
    }

    pub(crate) fn removal(&self, id: ResourceId) -> Option<RemovalRecord> {
        self.removed.get(&id).copied()
    }

    /// Number of installed resources
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Check if no resource is installed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispose and remove every resource, in registration order
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            if let Some(slot) = slot.take() {
                slot.into_inner().value.dispose_erased();
            }
        }
        self.removed.clear();
    }
}

impl Default for Resources {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Resources {
    fn drop(&mut self) {
        self.clear();
    }
}

fn short_name<T: 'static>() -> &'static str {
    TypeKey::of::<T>().short_name()
}

/// Change-tracking mutable guard over a resource
pub struct ResMut<'a, T> {
    value: RefMut<'a, T>,
    ticks: RefMut<'a, ComponentTicks>,
    tick: u64,
}

impl<T> ResMut<'_, T> {
    /// Stamps of the underlying resource
    pub fn ticks(&self) -> ComponentTicks {
        *self.ticks
    }
}

impl<T> Deref for ResMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for ResMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.ticks.set_changed(self.tick);
        &mut self.value
    }
}
