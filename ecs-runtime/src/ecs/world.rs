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
//! World management
//!
//! The World is the central container for all ECS data. It owns the entity
//! directory, one store per component type, the resource store and the
//! event queues, and it keeps the change tick that every stamp is taken
//! from.

use crate::ecs::bundle::Bundle;
use crate::ecs::command::{Command, CommandBuffer};
use crate::ecs::component::{AnyStore, ComponentMut, ComponentStore, ComponentTraits, Insertion};
use crate::ecs::entity::EntityDirectory;
use crate::ecs::event::{Event, Events};
use crate::ecs::identity::{ComponentId, IdentityIndex, IdentityRegistry, TypeKey};
use crate::ecs::query::{QuerySpec, QueryState};
use crate::ecs::resource::Resources;
use crate::ecs::{Component, Entity};
use crate::error::{EcsError, Result};
use std::cell::{Ref, RefCell};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identifier of a [`World`] instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldId(u64);

/// The main ECS world container
///
/// Structural changes (spawning, attaching, detaching) need `&mut World`.
/// Component and resource values can be read and mutated through `&World`
/// because every store sits behind a `RefCell`; conflicting borrows are
/// reported as [`EcsError::BorrowConflict`].
pub struct World {
    id: WorldId,
    entities: EntityDirectory,
    components: IdentityRegistry<ComponentId>,
    stores: Vec<Box<dyn AnyStore>>,
    traits: Vec<ComponentTraits>,
    resources: Resources,
    events: Events,
    change_tick: u64,
}

impl World {
    /// Create a new empty world
    pub fn new() -> Self {
        World {
            id: WorldId(NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed)),
            entities: EntityDirectory::new(),
            components: IdentityRegistry::new(),
            stores: Vec::new(),
            traits: Vec::new(),
            resources: Resources::new(),
            events: Events::new(),
            change_tick: 1,
        }
    }

    /// Identifier of this world
    pub fn id(&self) -> WorldId {
        self.id
    }

    /// Tick that mutations made right now are stamped with
    pub fn change_tick(&self) -> u64 {
        self.change_tick
    }

    pub(crate) fn advance_tick(&mut self) -> u64 {
        self.change_tick += 1;
        self.resources.set_change_tick(self.change_tick);
        self.change_tick
    }

    // ---- entities -------------------------------------------------------

    /// Create a new entity without components
    pub fn spawn(&mut self) -> Entity {
        self.entities.allocate()
    }

    /// Create a new entity carrying every component of `bundle`
    pub fn spawn_bundle<B: Bundle>(&mut self, bundle: B) -> Entity {
        let entity = self.spawn();
        for component in bundle.into_boxed() {
            // The entity was allocated above, so attaching cannot fail.
            let _ = component.insert_into(self, entity);
        }
        entity
    }

    /// Destroy an entity
    ///
    /// Components are disposed in type registration order, then the slot's
    /// generation is bumped so the handle reads as dead from now on.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        let Some(ids) = self.entities.components(entity).cloned() else {
            return false;
        };
        let tick = self.change_tick;
        for id in ids {
            let store = &mut self.stores[id.index()];
            store.remove(entity, tick);
            store.forget(entity);
        }
        self.entities.free(entity)
    }

    /// Check if an entity is alive
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Get the number of alive entities
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Iterate live entities in creation order
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter()
    }

    /// The entity directory
    pub fn directory(&self) -> &EntityDirectory {
        &self.entities
    }

    /// Scoped access to one live entity
    pub fn entity_mut(&mut self, entity: Entity) -> Result<EntityWorldMut<'_>> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::DeadEntity(entity));
        }
        Ok(EntityWorldMut {
            world: self,
            entity,
        })
    }

    // ---- component registration -------------------------------------------

    /// Identity of `T`, creating its store on first use
    pub fn register<T: Component>(&mut self) -> ComponentId {
        let id = self.components.intern(TypeKey::of::<T>());
        if id.index() == self.stores.len() {
            self.stores
                .push(Box::new(RefCell::new(ComponentStore::<T>::new())));
            self.traits.push(ComponentTraits::default());
        }
        id
    }

    /// Identity of `T` if it has been registered
    pub fn component_id<T: Component>(&self) -> Option<ComponentId> {
        self.components.id_of::<T>()
    }

    /// Identity of the component type behind `key`, if registered
    pub fn component_id_of(&self, key: TypeKey) -> Option<ComponentId> {
        self.components.get(key.type_id())
    }

    /// The component identity registry
    pub fn component_registry(&self) -> &IdentityRegistry<ComponentId> {
        &self.components
    }

    /// Registration metadata of a component type
    pub fn component_traits(&self, id: ComponentId) -> ComponentTraits {
        self.traits.get(id.index()).copied().unwrap_or_default()
    }

    /// Mark `T` as unique: attaching it to an entity detaches it from any
    /// other holder first
    pub fn register_unique<T: Component>(&mut self) -> ComponentId {
        let id = self.register::<T>();
        self.traits[id.index()].unique = true;
        id
    }

    /// Mark `S` as a state of `Base`
    ///
    /// States of the same base are mutually exclusive on an entity, and
    /// removing the base removes whichever state the entity is in.
    pub fn register_state_of<S: Component, Base: Component>(&mut self) -> ComponentId {
        let base = self.register::<Base>();
        let id = self.register::<S>();
        self.traits[id.index()].state_of = Some(base);
        id
    }

    // ---- component access ---------------------------------------------------

    fn typed_store<T: Component>(&self) -> Option<&RefCell<ComponentStore<T>>> {
        let id = self.components.id_of::<T>()?;
        self.stores[id.index()].as_any().downcast_ref()
    }

    pub(crate) fn store_of<T: Component>(&self) -> Option<&RefCell<ComponentStore<T>>> {
        self.typed_store::<T>()
    }

    pub(crate) fn erased_store(&self, id: ComponentId) -> Option<&dyn AnyStore> {
        self.stores.get(id.index()).map(|store| &**store)
    }

    /// Attach `component` to `entity`, replacing (and disposing) any
    /// existing instance of the same type
    pub fn insert<T: Component>(&mut self, entity: Entity, component: T) -> Result<()> {
        if !self.entities.is_alive(entity) {
            let mut component = component;
            component.dispose();
            return Err(EcsError::DeadEntity(entity));
        }
        let id = self.register::<T>();
        let traits = self.traits[id.index()];

        if traits.unique {
            let holders: Vec<Entity> = self.stores[id.index()]
                .entities()
                .into_iter()
                .filter(|holder| *holder != entity)
                .collect();
            for holder in holders {
                self.detach(holder, id);
            }
        }
        if let Some(base) = traits.state_of {
            let siblings = self.states_of(entity, base, Some(id));
            for sibling in siblings {
                self.detach(entity, sibling);
            }
        }

        let tick = self.change_tick;
        let outcome = match self.stores[id.index()]
            .as_any_mut()
            .downcast_mut::<RefCell<ComponentStore<T>>>()
        {
            Some(store) => store.get_mut().insert(entity, component, tick),
            None => return Ok(()),
        };
        if outcome == Insertion::Added {
            self.entities.mark_added(entity, id);
        }
        Ok(())
    }

    fn states_of(&self, entity: Entity, base: ComponentId, except: Option<ComponentId>) -> Vec<ComponentId> {
        self.entities
            .components(entity)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|id| Some(*id) != except)
                    .filter(|id| self.traits[id.index()].state_of == Some(base))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn detach(&mut self, entity: Entity, id: ComponentId) -> bool {
        let tick = self.change_tick;
        if self.stores[id.index()].remove(entity, tick) {
            self.entities.mark_removed(entity, id);
            true
        } else {
            false
        }
    }

    /// Detach and dispose the `T` component of `entity`
    ///
    /// Returns `false` if the entity is dead or did not carry `T`.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> bool {
        match self.components.id_of::<T>() {
            Some(id) => self.remove_component_by_id(entity, id),
            None => false,
        }
    }

    /// Detach a component identified by its type key
    pub fn remove_component_by_key(&mut self, entity: Entity, key: TypeKey) -> bool {
        match self.component_id_of(key) {
            Some(id) => self.remove_component_by_id(entity, id),
            None => false,
        }
    }

    /// Detach a component identified by its interned identity
    pub fn remove_component_by_id(&mut self, entity: Entity, id: ComponentId) -> bool {
        if !self.entities.is_alive(entity) || id.index() >= self.stores.len() {
            return false;
        }
        let mut removed = false;
        for state in self.states_of(entity, id, None) {
            removed |= self.detach(entity, state);
        }
        removed | self.detach(entity, id)
    }

    /// Check whether `entity` carries `T`
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.components
            .id_of::<T>()
            .map(|id| self.entities.has(entity, id))
            .unwrap_or(false)
    }

    /// Shared access to the `T` component of `entity`
    ///
    /// # Errors
    ///
    /// [`EcsError::MissingComponent`] if the entity does not carry `T`,
    /// [`EcsError::DeadEntity`] if the handle is stale.
    pub fn get<T: Component>(&self, entity: Entity) -> Result<Ref<'_, T>> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::DeadEntity(entity));
        }
        let missing = || EcsError::MissingComponent {
            entity,
            component: TypeKey::of::<T>().short_name(),
        };
        let store = self.typed_store::<T>().ok_or_else(missing)?;
        let store = store.try_borrow().map_err(|_| EcsError::BorrowConflict {
            type_name: TypeKey::of::<T>().short_name(),
        })?;
        Ref::filter_map(store, |store| store.get(entity)).map_err(|_| missing())
    }

    /// Like [`World::get`] but returns `None` instead of failing
    pub fn try_get<T: Component>(&self, entity: Entity) -> Option<Ref<'_, T>> {
        self.get(entity).ok()
    }

    /// Change-tracking mutable access to the `T` component of `entity`
    pub fn get_mut<T: Component>(&self, entity: Entity) -> Result<ComponentMut<'_, T>> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::DeadEntity(entity));
        }
        let missing = || EcsError::MissingComponent {
            entity,
            component: TypeKey::of::<T>().short_name(),
        };
        let store = self.typed_store::<T>().ok_or_else(missing)?;
        let store = store.try_borrow_mut().map_err(|_| EcsError::BorrowConflict {
            type_name: TypeKey::of::<T>().short_name(),
        })?;
        let index = store.index_of(entity).ok_or_else(missing)?;
        Ok(ComponentMut::new(store, index, self.change_tick))
    }

    // ---- resources and events -------------------------------------------------

    /// The singleton resource store
    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    /// Mutable access to the resource store, for installing and removing
    pub fn resources_mut(&mut self) -> &mut Resources {
        &mut self.resources
    }

    /// Queue an event
    pub fn send_event<E: Event>(&mut self, event: E) {
        self.events.send(event);
    }

    /// Take every pending event of type `E`
    pub fn drain_events<E: Event>(&self) -> Vec<E> {
        self.events.drain()
    }

    /// Number of pending events of type `E`
    pub fn event_count<E: Event>(&self) -> usize {
        self.events.len::<E>()
    }

    // ---- queries and commands ---------------------------------------------------

    /// Validate `spec` and bind a fresh query state to this world
    pub fn query(&self, spec: QuerySpec) -> Result<QueryState> {
        let mut state = QueryState::new(spec)?;
        state.bind(self.id);
        Ok(state)
    }

    /// Apply every command of `buffer` in submission order
    ///
    /// The change tick advances exactly once afterwards, so the whole buffer
    /// reads as one transition to queries resolved later. Commands that
    /// target entities which died before the flush are dropped.
    pub fn apply(&mut self, buffer: CommandBuffer) -> usize {
        let count = buffer.len();
        for command in buffer.into_commands() {
            self.apply_command(command);
        }
        tracing::debug!(count, tick = self.change_tick, "flushed command buffer");
        self.advance_tick();
        count
    }

    fn apply_command(&mut self, command: Command) {
        match command {
            Command::Spawn { entity, components } => {
                if !self.entities.materialize(entity) {
                    tracing::warn!(%entity, "spawn command for a handle that is no longer reserved");
                    components.into_iter().for_each(|component| component.dispose());
                    return;
                }
                for component in components {
                    if let Err(err) = component.insert_into(self, entity) {
                        tracing::warn!(%err, "dropping component of spawned entity");
                    }
                }
            }
            Command::Remove(entity) => {
                if !self.despawn(entity) {
                    tracing::warn!(%entity, "remove command for an entity that is not alive");
                }
            }
            Command::AddComponent { entity, component } => {
                if let Err(err) = component.insert_into(self, entity) {
                    tracing::warn!(%err, "dropping add-component command");
                }
            }
            Command::RemoveComponent { entity, component } => {
                if !self.entities.is_alive(entity) {
                    tracing::warn!(%entity, component = component.short_name(), "remove-component command for an entity that is not alive");
                    return;
                }
                self.remove_component_by_key(entity, component);
            }
            Command::AddResource(resource) => resource.insert_into(&mut self.resources),
            Command::RemoveResource(key) => {
                self.resources.remove_key(key);
            }
            Command::Emit(event) => event.send_into(&mut self.events),
        }
    }

    /// Drop a buffer without applying it
    ///
    /// Entity handles reserved by its spawn commands are released and the
    /// queued component and resource values are disposed.
    pub fn discard(&mut self, buffer: CommandBuffer) {
        for command in buffer.into_commands() {
            match command {
                Command::Spawn { entity, components } => {
                    self.entities.release_reserved(entity);
                    components.into_iter().for_each(|component| component.dispose());
                }
                Command::AddComponent { component, .. } => component.dispose(),
                Command::AddResource(resource) => resource.dispose(),
                Command::Remove(_)
                | Command::RemoveComponent { .. }
                | Command::RemoveResource(_)
                | Command::Emit(_) => {}
            }
        }
    }

    /// Despawn every entity and drop every resource and pending event
    ///
    /// Entities are torn down in creation order; registered component types
    /// and their stores survive.
    pub fn clear(&mut self) {
        let entities: Vec<Entity> = self.entities.iter().collect();
        for entity in entities {
            self.despawn(entity);
        }
        self.entities.clear();
        self.resources.clear();
        self.events.clear();
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Scoped mutable access to one live entity
pub struct EntityWorldMut<'w> {
    world: &'w mut World,
    entity: Entity,
}

impl<'w> EntityWorldMut<'w> {
    /// Handle of the entity
    pub fn id(&self) -> Entity {
        self.entity
    }

    /// Attach the default value of `T`
    pub fn add<T: Component + Default>(&mut self) -> Result<&mut Self> {
        self.add_new(T::default())
    }

    /// Attach the default value of `T` after applying `overrides`
    pub fn add_with<T, F>(&mut self, overrides: F) -> Result<&mut Self>
    where
        T: Component + Default,
        F: FnOnce(&mut T),
    {
        let mut value = T::default();
        overrides(&mut value);
        self.add_new(value)
    }

    /// Attach a fully constructed value
    pub fn add_new<T: Component>(&mut self, component: T) -> Result<&mut Self> {
        self.world.insert(self.entity, component)?;
        Ok(self)
    }

    /// Attach every component of `bundle`
    pub fn add_bundle<B: Bundle>(&mut self, bundle: B) -> Result<&mut Self> {
        for component in bundle.into_boxed() {
            component.insert_into(self.world, self.entity)?;
        }
        Ok(self)
    }

    /// Detach and dispose `T`
    pub fn remove<T: Component>(&mut self) -> bool {
        self.world.remove_component::<T>(self.entity)
    }

    /// Check whether the entity carries `T`
    pub fn has<T: Component>(&self) -> bool {
        self.world.has::<T>(self.entity)
    }

    /// Shared access to `T`, failing with [`EcsError::MissingComponent`]
    pub fn get<T: Component>(&self) -> Result<Ref<'_, T>> {
        self.world.get(self.entity)
    }

    /// Shared access to `T`, or `None`
    pub fn try_get<T: Component>(&self) -> Option<Ref<'_, T>> {
        self.world.try_get(self.entity)
    }

    /// Change-tracking mutable access to `T`
    pub fn get_mut<T: Component>(&mut self) -> Result<ComponentMut<'_, T>> {
        self.world.get_mut(self.entity)
    }

    /// Despawn the entity
    pub fn despawn(self) -> bool {
        self.world.despawn(self.entity)
    }
}
