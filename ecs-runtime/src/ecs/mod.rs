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
//! Entity Component System (ECS) core implementation
//!
//! This module provides the foundational ECS architecture including:
//! - Entity management with generational handles
//! - Component and resource storage with change stamps
//! - Declarative queries with change-since-checkpoint filters
//! - Deferred command buffers
//! - Dependency-ordered run groups

mod bundle;
mod command;
mod component;
mod entity;
mod event;
mod filter;
mod identity;
mod query;
mod resource;
mod system;
mod world;

pub mod scheduler;

pub use bundle::Bundle;
pub use command::{BoxedComponent, BoxedEvent, BoxedResource, Command, CommandBuffer, Commands};
pub use component::{
    Component, ComponentMut, ComponentStore, ComponentTicks, ComponentTraits, Insertion, Mut,
    RemovalRecord,
};
pub use entity::{Entity, EntityDirectory};
pub use event::{Event, Events};
pub use filter::Term;
pub use identity::{ComponentId, EventId, IdentityIndex, IdentityRegistry, ResourceId, TypeKey};
pub use query::{
    Fetch, QueryFetch, QuerySpec, QueryState, QueryView, ResolvedQuery, COMMAND_KEY, RESOURCES_KEY,
};
pub use resource::{ResMut, Resource, Resources};
pub use scheduler::{groups, MissingResourcePolicy, RunReport, Scheduler, SchedulerConfig};
pub use system::{System, SystemContext, SystemId, SystemStats};
pub use world::{EntityWorldMut, World, WorldId};
