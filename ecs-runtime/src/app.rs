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
//! Application shell
//!
//! [`App`] bundles one [`World`], one [`Scheduler`] and the plugins that
//! populate them. External drivers (a fixed-step loop, a frame callback)
//! invoke run groups through [`App::run_group`] or the zero-argument
//! closures returned by [`App::runner`].

use crate::ecs::scheduler::{RunReport, Scheduler, SchedulerConfig};
use crate::ecs::{System, SystemId, World};
use crate::error::Result;
use crate::plugins::{Plugin, PluginRegistry};

/// A world, its scheduler and registered plugins
pub struct App {
    /// The world every run group operates on
    pub world: World,
    /// Systems and run groups
    pub scheduler: Scheduler,
    plugins: PluginRegistry,
}

impl App {
    /// Create an empty app with the default scheduler configuration
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create an empty app with an explicit scheduler configuration
    pub fn with_config(config: SchedulerConfig) -> Self {
        App {
            world: World::new(),
            scheduler: Scheduler::with_config(config),
            plugins: PluginRegistry::new(),
        }
    }

    /// Register a system into a run group
    pub fn add_system(&mut self, group: &str, system: System) -> Result<SystemId> {
        self.scheduler.add_system(group, system)
    }

    /// Register a plugin; it is built by [`App::build_plugins`]
    pub fn add_plugin<P: Plugin + 'static>(&mut self, plugin: P) -> Result<&mut Self> {
        self.plugins.register(Box::new(plugin))?;
        Ok(self)
    }

    /// The plugin registry
    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Build every registered plugin that has not been built yet, in
    /// dependency order
    ///
    /// Plugins added by a `build` call are kept and built by the next
    /// call.
    pub fn build_plugins(&mut self) -> Result<()> {
        let mut plugins = std::mem::take(&mut self.plugins);
        let outcome = plugins.build_all(self);
        let added = std::mem::replace(&mut self.plugins, plugins);
        let merged = self.plugins.absorb(added);
        outcome.and(merged)
    }

    /// Invoke one run group
    pub fn run_group(&mut self, group: &str) -> Result<RunReport> {
        self.scheduler.run(&mut self.world, group)
    }

    /// A zero-argument callable invoking `group`
    pub fn runner<'a>(&'a mut self, group: &str) -> impl FnMut() -> Result<RunReport> + 'a {
        let group = group.to_string();
        move || self.scheduler.run(&mut self.world, &group)
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
