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
//! System definitions
//!
//! A system pairs a [`QuerySpec`] with a callback and a list of systems it
//! must run after. The callback receives a [`SystemContext`] exposing the
//! resolved query, typed fetches, resources and, when the spec declares the
//! `command` key, the deferred command interface.

use crate::ecs::command::{CommandBuffer, Commands};
use crate::ecs::event::Event;
use crate::ecs::query::{Fetch, QueryFetch, QuerySpec, QueryView, ResolvedQuery};
use crate::ecs::resource::{ResMut, Resource};
use crate::ecs::World;
use crate::error::{EcsError, Result};
use std::cell::Ref;
use std::fmt;

/// Identifier handed out when a system is registered with a scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SystemId(pub(crate) usize);

impl SystemId {
    /// Registration index of the system
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "System#{}", self.0)
    }
}

pub(crate) type SystemFn = Box<dyn FnMut(&mut SystemContext<'_>) -> Result<()>>;

/// A query specification, a callback and ordering constraints
///
/// # Examples
///
/// ```
/// use ecs_runtime::ecs::{Component, QuerySpec, System, Term};
///
/// #[derive(Default)]
/// struct Position { x: f64 }
/// impl Component for Position {}
///
/// let system = System::new(
///     "advance",
///     QuerySpec::new().key("bodies", [Term::read::<Position>()]),
///     |ctx| {
///         let mut bodies = ctx.fetch::<&mut Position>("bodies")?;
///         for &entity in bodies.entities() {
///             bodies.get(entity)?.x += 1.0;
///         }
///         Ok(())
///     },
/// );
/// assert_eq!(system.name(), "advance");
/// ```
pub struct System {
    pub(crate) name: String,
    pub(crate) spec: QuerySpec,
    pub(crate) run: SystemFn,
    pub(crate) after: Vec<SystemId>,
}

impl System {
    /// Build a system from a name, a query and a callback
    pub fn new<F>(name: impl Into<String>, spec: QuerySpec, run: F) -> Self
    where
        F: FnMut(&mut SystemContext<'_>) -> Result<()> + 'static,
    {
        System {
            name: name.into(),
            spec,
            run: Box::new(run),
            after: Vec::new(),
        }
    }

    /// Require this system to run after `other` in the same run group
    pub fn after(mut self, other: SystemId) -> Self {
        if !self.after.contains(&other) {
            self.after.push(other);
        }
        self
    }

    /// Name used in logs, reports and errors
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The query specification
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// Systems this one runs after
    pub fn dependencies(&self) -> &[SystemId] {
        &self.after
    }
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("after", &self.after)
            .finish_non_exhaustive()
    }
}

/// Run counters of one system
///
/// `skipped` counts invocations silently skipped because the system's
/// `resources` terms were not satisfied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemStats {
    /// Times the callback ran
    pub runs: u64,
    /// Times the system was skipped by its resource gate
    pub skipped: u64,
}

/// What a system callback sees while it runs
pub struct SystemContext<'a> {
    world: &'a World,
    resolved: &'a ResolvedQuery,
    buffer: &'a mut CommandBuffer,
    name: &'a str,
}

impl<'a> SystemContext<'a> {
    pub(crate) fn new(
        world: &'a World,
        resolved: &'a ResolvedQuery,
        buffer: &'a mut CommandBuffer,
        name: &'a str,
    ) -> Self {
        SystemContext {
            world,
            resolved,
            buffer,
            name,
        }
    }

    /// Name of the running system
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Shared access to the world
    pub fn world(&self) -> &'a World {
        self.world
    }

    /// Matches of one query key
    pub fn view(&self, key: &str) -> Result<&'a QueryView> {
        self.resolved.view(key)
    }

    /// Typed access to the values extracted by `key`
    pub fn fetch<Q: Fetch>(&self, key: &str) -> Result<QueryFetch<'a, 'a, Q>> {
        self.view(key)?.fetch::<Q>(self.world)
    }

    /// Shared access to a resource
    pub fn resource<R: Resource>(&self) -> Result<Ref<'a, R>> {
        self.world.resources().get::<R>()
    }

    /// Change-tracking mutable access to a resource
    pub fn resource_mut<R: Resource>(&self) -> Result<ResMut<'a, R>> {
        self.world.resources().get_mut::<R>()
    }

    /// Shared access to a resource, or `None`
    pub fn try_resource<R: Resource>(&self) -> Option<Ref<'a, R>> {
        self.world.resources().try_get::<R>()
    }

    /// Take every pending event of type `E`
    pub fn drain_events<E: Event>(&self) -> Vec<E> {
        self.world.drain_events::<E>()
    }

    /// The deferred command interface
    ///
    /// # Errors
    ///
    /// [`EcsError::CommandsNotGranted`] unless the query declared the
    /// `command` key.
    pub fn commands(&mut self) -> Result<Commands<'_>> {
        if !self.resolved.grants_commands() {
            return Err(EcsError::CommandsNotGranted(self.name.to_string()));
        }
        Ok(Commands::new(self.world.directory(), self.buffer))
    }
}
