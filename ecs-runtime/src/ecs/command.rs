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
//! Deferred command buffer
//!
//! Systems cannot change the structure of the world while its stores are
//! borrowed for iteration. Instead they queue [`Command`]s, which the
//! scheduler applies in submission order once the system body returns.
//! Commands are plain data so a pending buffer can be inspected or
//! discarded; nothing in a buffer runs arbitrary code when applied.

use crate::ecs::bundle::Bundle;
use crate::ecs::entity::EntityDirectory;
use crate::ecs::event::{Event, Events};
use crate::ecs::identity::TypeKey;
use crate::ecs::resource::{Resource, Resources};
use crate::ecs::{Component, Entity, World};
use crate::error::Result;
use std::fmt;

trait ErasedComponent {
    fn type_key(&self) -> TypeKey;
    fn insert_into(self: Box<Self>, world: &mut World, entity: Entity) -> Result<()>;
    fn dispose(self: Box<Self>);
}

impl<T: Component> ErasedComponent for T {
    fn type_key(&self) -> TypeKey {
        TypeKey::of::<T>()
    }

    fn insert_into(self: Box<Self>, world: &mut World, entity: Entity) -> Result<()> {
        world.insert(entity, *self)
    }

    fn dispose(mut self: Box<Self>) {
        Component::dispose(&mut *self);
    }
}

/// A component value whose type has been erased for queuing
pub struct BoxedComponent(Box<dyn ErasedComponent>);

impl BoxedComponent {
    /// Erase a component value
    pub fn new<T: Component>(component: T) -> Self {
        BoxedComponent(Box::new(component))
    }

    /// Key of the wrapped component type
    pub fn type_key(&self) -> TypeKey {
        self.0.type_key()
    }

    /// Attach the value to `entity`
    pub fn insert_into(self, world: &mut World, entity: Entity) -> Result<()> {
        self.0.insert_into(world, entity)
    }

    /// Run the disposal hook of a value that will never be attached
    pub fn dispose(self) {
        self.0.dispose();
    }
}

impl fmt::Debug for BoxedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.type_key())
    }
}

trait ErasedResource {
    fn type_key(&self) -> TypeKey;
    fn insert_into(self: Box<Self>, resources: &mut Resources);
    fn dispose(self: Box<Self>);
}

impl<T: Resource> ErasedResource for T {
    fn type_key(&self) -> TypeKey {
        TypeKey::of::<T>()
    }

    fn insert_into(self: Box<Self>, resources: &mut Resources) {
        resources.add_new(*self);
    }

    fn dispose(mut self: Box<Self>) {
        Resource::dispose(&mut *self);
    }
}

/// A resource value whose type has been erased for queuing
pub struct BoxedResource(Box<dyn ErasedResource>);

impl BoxedResource {
    /// Erase a resource value
    pub fn new<T: Resource>(resource: T) -> Self {
        BoxedResource(Box::new(resource))
    }

    /// Key of the wrapped resource type
    pub fn type_key(&self) -> TypeKey {
        self.0.type_key()
    }

    pub(crate) fn insert_into(self, resources: &mut Resources) {
        self.0.insert_into(resources);
    }

    pub(crate) fn dispose(self) {
        self.0.dispose();
    }
}

trait ErasedEvent {
    fn type_key(&self) -> TypeKey;
    fn send_into(self: Box<Self>, events: &mut Events);
}

impl<E: Event> ErasedEvent for E {
    fn type_key(&self) -> TypeKey {
        TypeKey::of::<E>()
    }

    fn send_into(self: Box<Self>, events: &mut Events) {
        events.send(*self);
    }
}

/// An event value whose type has been erased for queuing
pub struct BoxedEvent(Box<dyn ErasedEvent>);

impl BoxedEvent {
    /// Erase an event value
    pub fn new<E: Event>(event: E) -> Self {
        BoxedEvent(Box::new(event))
    }

    /// Key of the wrapped event type
    pub fn type_key(&self) -> TypeKey {
        self.0.type_key()
    }

    pub(crate) fn send_into(self, events: &mut Events) {
        self.0.send_into(events);
    }
}

/// One deferred mutation
pub enum Command {
    /// Make a reserved entity alive and attach its initial components
    Spawn {
        /// Handle reserved when the command was queued
        entity: Entity,
        /// Components attached in order after the entity becomes alive
        components: Vec<BoxedComponent>,
    },
    /// Despawn an entity, disposing its components
    Remove(Entity),
    /// Attach (or replace) one component
    AddComponent {
        /// Target entity
        entity: Entity,
        /// Value to attach
        component: BoxedComponent,
    },
    /// Detach one component type
    RemoveComponent {
        /// Target entity
        entity: Entity,
        /// Component type to detach
        component: TypeKey,
    },
    /// Install (or replace) a resource
    AddResource(BoxedResource),
    /// Remove a resource
    RemoveResource(TypeKey),
    /// Queue an event
    Emit(BoxedEvent),
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Spawn { entity, components } => f
                .debug_struct("Spawn")
                .field("entity", entity)
                .field("components", components)
                .finish(),
            Command::Remove(entity) => f.debug_tuple("Remove").field(entity).finish(),
            Command::AddComponent { entity, component } => f
                .debug_struct("AddComponent")
                .field("entity", entity)
                .field("component", component)
                .finish(),
            Command::RemoveComponent { entity, component } => f
                .debug_struct("RemoveComponent")
                .field("entity", entity)
                .field("component", component)
                .finish(),
            Command::AddResource(resource) => {
                f.debug_tuple("AddResource").field(&resource.type_key()).finish()
            }
            Command::RemoveResource(key) => f.debug_tuple("RemoveResource").field(key).finish(),
            Command::Emit(event) => f.debug_tuple("Emit").field(&event.type_key()).finish(),
        }
    }
}

/// FIFO queue of commands awaiting a flush
#[derive(Debug, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Number of queued commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Queued commands in submission order
    pub fn iter(&self) -> impl Iterator<Item = &Command> + '_ {
        self.commands.iter()
    }

    pub(crate) fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

/// Command interface handed to systems that declare it
///
/// Entity handles for spawned entities are reserved immediately, so later
/// commands in the same buffer can refer to them. The entity only becomes
/// visible to queries once the buffer is applied.
pub struct Commands<'a> {
    entities: &'a EntityDirectory,
    buffer: &'a mut CommandBuffer,
}

impl<'a> Commands<'a> {
    pub(crate) fn new(entities: &'a EntityDirectory, buffer: &'a mut CommandBuffer) -> Self {
        Commands { entities, buffer }
    }

    /// Queue a new entity carrying `bundle`
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> Entity {
        let entity = self.entities.reserve();
        self.buffer.push(Command::Spawn {
            entity,
            components: bundle.into_boxed(),
        });
        entity
    }

    /// Queue a new entity without components
    pub fn spawn_empty(&mut self) -> Entity {
        self.spawn(())
    }

    /// Queue the removal of an entity
    pub fn despawn(&mut self, entity: Entity) {
        self.buffer.push(Command::Remove(entity));
    }

    /// Queue attaching a component
    pub fn add<T: Component>(&mut self, entity: Entity, component: T) {
        self.buffer.push(Command::AddComponent {
            entity,
            component: BoxedComponent::new(component),
        });
    }

    /// Queue detaching a component type
    pub fn remove<T: Component>(&mut self, entity: Entity) {
        self.buffer.push(Command::RemoveComponent {
            entity,
            component: TypeKey::of::<T>(),
        });
    }

    /// Queue installing a resource
    pub fn add_resource<R: Resource>(&mut self, resource: R) {
        self.buffer.push(Command::AddResource(BoxedResource::new(resource)));
    }

    /// Queue removing a resource
    pub fn remove_resource<R: Resource>(&mut self) {
        self.buffer.push(Command::RemoveResource(TypeKey::of::<R>()));
    }

    /// Queue an event
    pub fn emit<E: Event>(&mut self, event: E) {
        self.buffer.push(Command::Emit(BoxedEvent::new(event)));
    }

    /// Number of commands queued so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if nothing has been queued
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
