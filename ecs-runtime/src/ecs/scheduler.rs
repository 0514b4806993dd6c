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
//! Run-group scheduler
//!
//! Systems are registered into named run groups. Within a group they are
//! ordered by a stable topological sort of their `after` constraints:
//! among systems whose dependencies are satisfied, the one registered first
//! runs first. Invoking a group resolves each system's query, runs its
//! callback and flushes its command buffer before moving to the next one.

use crate::ecs::command::CommandBuffer;
use crate::ecs::query::QueryState;
use crate::ecs::system::{System, SystemContext, SystemFn, SystemId, SystemStats};
use crate::ecs::World;
use crate::error::{EcsError, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Environment variable selecting [`MissingResourcePolicy::Error`]
pub const STRICT_RESOURCES_ENV: &str = "ECS_RUNTIME_STRICT_RESOURCES";

/// Standard run group names
pub mod groups {
    /// Runs once before anything else
    pub const STARTUP: &str = "startup";

    /// Runs at a fixed simulation rate
    pub const FIXED: &str = "fixed";

    /// Runs once per frame
    pub const UPDATE: &str = "update";

    /// Runs after the frame, for teardown work
    pub const CLEANUP: &str = "cleanup";
}

/// What to do when a system's `resources` terms are not satisfied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingResourcePolicy {
    /// Skip the system for this invocation, counting the skip
    #[default]
    Skip,
    /// Abort the invocation with [`EcsError::UnsatisfiedResources`]
    Error,
}

/// Scheduler configuration
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    /// Policy for systems whose resource gate fails
    pub missing_resources: MissingResourcePolicy,
}

impl SchedulerConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the missing-resource policy
    pub fn with_missing_resources(mut self, policy: MissingResourcePolicy) -> Self {
        self.missing_resources = policy;
        self
    }

    /// Configuration taken from the environment
    ///
    /// Setting `ECS_RUNTIME_STRICT_RESOURCES` to `1` or `true` selects
    /// [`MissingResourcePolicy::Error`].
    pub fn from_env() -> Self {
        let strict = std::env::var(STRICT_RESOURCES_ENV)
            .map(|value| parse_flag(&value))
            .unwrap_or(false);
        let policy = if strict {
            MissingResourcePolicy::Error
        } else {
            MissingResourcePolicy::Skip
        };
        Self::new().with_missing_resources(policy)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Outcome of one run-group invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Name of the group
    pub group: String,
    /// Systems whose callbacks ran, in order
    pub ran: Vec<String>,
    /// Systems skipped by their resource gate, in order
    pub skipped: Vec<String>,
    /// Commands applied across all flushes
    pub commands: usize,
}

/// A system with metadata for scheduling
struct ScheduledSystem {
    name: String,
    group: usize,
    query: QueryState,
    run: SystemFn,
    after: Vec<SystemId>,
    stats: SystemStats,
}

struct RunGroup {
    name: String,
    members: Vec<SystemId>,
    order: Vec<SystemId>,
}

/// Dependency-ordered executor of run groups
///
/// # Examples
///
/// ```
/// use ecs_runtime::ecs::scheduler::{groups, Scheduler};
/// use ecs_runtime::ecs::{QuerySpec, System, World};
///
/// let mut world = World::new();
/// let mut scheduler = Scheduler::new();
/// let x = scheduler.add_system(groups::FIXED, System::new("x", QuerySpec::new(), |_| Ok(())))?;
/// scheduler.add_system(groups::FIXED, System::new("y", QuerySpec::new(), |_| Ok(())).after(x))?;
///
/// let report = scheduler.run(&mut world, groups::FIXED)?;
/// assert_eq!(report.ran, ["x", "y"]);
/// # Ok::<(), ecs_runtime::EcsError>(())
/// ```
pub struct Scheduler {
    config: SchedulerConfig,
    systems: Vec<ScheduledSystem>,
    groups: Vec<RunGroup>,
}

impl Scheduler {
    /// Create a new scheduler with the default configuration
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create a scheduler with an explicit configuration
    pub fn with_config(config: SchedulerConfig) -> Self {
        Scheduler {
            config,
            systems: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Change the missing-resource policy
    pub fn set_missing_resource_policy(&mut self, policy: MissingResourcePolicy) {
        self.config.missing_resources = policy;
    }

    fn group_index(&self, name: &str) -> Option<usize> {
        self.groups.iter().position(|group| group.name == name)
    }

    fn entry(&self, id: SystemId) -> Result<&ScheduledSystem> {
        self.systems.get(id.0).ok_or(EcsError::UnknownSystem(id))
    }

    /// Register `system` into `group`, creating the group on first use
    ///
    /// # Errors
    ///
    /// Query validation errors ([`EcsError::ReservedKey`],
    /// [`EcsError::DuplicateKey`]), [`EcsError::UnknownSystem`] or
    /// [`EcsError::CrossGroupOrdering`] for a bad `after` reference.
    pub fn add_system(&mut self, group: &str, system: System) -> Result<SystemId> {
        let System {
            name,
            spec,
            run,
            after,
        } = system;
        let query = QueryState::new(spec)?;
        let id = SystemId(self.systems.len());

        let existing = self.group_index(group);
        for dependency in &after {
            let other = self.entry(*dependency)?;
            if Some(other.group) != existing {
                return Err(EcsError::CrossGroupOrdering {
                    system: id,
                    dependency: *dependency,
                });
            }
        }
        let group_index = match existing {
            Some(index) => index,
            None => {
                self.groups.push(RunGroup {
                    name: group.to_string(),
                    members: Vec::new(),
                    order: Vec::new(),
                });
                self.groups.len() - 1
            }
        };

        tracing::debug!(system = %name, group, "registered system");
        self.systems.push(ScheduledSystem {
            name,
            group: group_index,
            query,
            run,
            after,
            stats: SystemStats::default(),
        });
        self.groups[group_index].members.push(id);
        // Dependencies all point at earlier systems, so this cannot cycle.
        self.sort_group(group_index)?;
        Ok(id)
    }

    /// Require `system` to run after `dependency`
    ///
    /// # Errors
    ///
    /// [`EcsError::CyclicDependency`] if the new edge closes a cycle; the
    /// edge is not kept in that case.
    pub fn add_ordering(&mut self, system: SystemId, dependency: SystemId) -> Result<()> {
        let group = self.entry(system)?.group;
        if self.entry(dependency)?.group != group {
            return Err(EcsError::CrossGroupOrdering { system, dependency });
        }
        if self.systems[system.0].after.contains(&dependency) {
            return Ok(());
        }

        self.systems[system.0].after.push(dependency);
        if let Err(err) = self.sort_group(group) {
            self.systems[system.0].after.pop();
            return Err(err);
        }
        Ok(())
    }

    /// Stable topological sort of one group
    ///
    /// Kahn's algorithm with a min-heap on registration position, so
    /// unconstrained systems keep their registration order.
    fn sort_group(&mut self, group_index: usize) -> Result<()> {
        let group = &self.groups[group_index];
        let members = &group.members;
        let position = |id: SystemId| members.iter().position(|member| *member == id);

        let mut in_degree = vec![0usize; members.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); members.len()];
        for (index, id) in members.iter().enumerate() {
            for dependency in &self.systems[id.0].after {
                if let Some(dep_index) = position(*dependency) {
                    in_degree[index] += 1;
                    dependents[dep_index].push(index);
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(index, _)| Reverse(index))
            .collect();

        let mut order = Vec::with_capacity(members.len());
        while let Some(Reverse(index)) = ready.pop() {
            order.push(members[index]);
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() != members.len() {
            let systems = members
                .iter()
                .enumerate()
                .filter(|(index, _)| in_degree[*index] > 0)
                .map(|(_, id)| self.systems[id.0].name.clone())
                .collect();
            return Err(EcsError::CyclicDependency {
                group: group.name.clone(),
                systems,
            });
        }

        self.groups[group_index].order = order;
        Ok(())
    }

    /// Names of the systems of `group` in execution order
    pub fn order(&self, group: &str) -> Result<Vec<&str>> {
        let index = self
            .group_index(group)
            .ok_or_else(|| EcsError::UnknownGroup(group.to_string()))?;
        Ok(self.groups[index]
            .order
            .iter()
            .map(|id| self.systems[id.0].name.as_str())
            .collect())
    }

    /// Names of every run group, in creation order
    pub fn groups(&self) -> impl Iterator<Item = &str> + '_ {
        self.groups.iter().map(|group| group.name.as_str())
    }

    /// Check whether a run group exists
    pub fn has_group(&self, group: &str) -> bool {
        self.group_index(group).is_some()
    }

    /// Run counters of a system
    pub fn stats(&self, id: SystemId) -> Result<SystemStats> {
        self.entry(id).map(|entry| entry.stats)
    }

    /// Name of a system
    pub fn name(&self, id: SystemId) -> Result<&str> {
        self.entry(id).map(|entry| entry.name.as_str())
    }

    /// Get the number of registered systems
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Invoke one run group
    ///
    /// Every member system, in sorted order, has its query resolved, its
    /// callback run, and its command buffer applied before the next one
    /// starts. A failing callback aborts the invocation; its pending
    /// commands are discarded.
    pub fn run(&mut self, world: &mut World, group: &str) -> Result<RunReport> {
        let index = self
            .group_index(group)
            .ok_or_else(|| EcsError::UnknownGroup(group.to_string()))?;
        let span = tracing::debug_span!("run_group", group);
        let _entered = span.enter();

        let mut report = RunReport {
            group: group.to_string(),
            ..RunReport::default()
        };
        for id in self.groups[index].order.clone() {
            let system = &mut self.systems[id.0];
            let Some(resolved) = system.query.resolve(world) else {
                match self.config.missing_resources {
                    MissingResourcePolicy::Skip => {
                        system.stats.skipped += 1;
                        tracing::debug!(system = %system.name, "resource requirements unmet, skipping");
                        report.skipped.push(system.name.clone());
                        continue;
                    }
                    MissingResourcePolicy::Error => {
                        return Err(EcsError::UnsatisfiedResources(system.name.clone()));
                    }
                }
            };

            tracing::trace!(system = %system.name, "running system");
            let mut buffer = CommandBuffer::new();
            let outcome = {
                let mut ctx = SystemContext::new(world, &resolved, &mut buffer, &system.name);
                (system.run)(&mut ctx)
            };
            if let Err(err) = outcome {
                tracing::debug!(system = %system.name, %err, "system failed");
                world.discard(buffer);
                return Err(err);
            }

            system.stats.runs += 1;
            report.ran.push(system.name.clone());
            report.commands += world.apply(buffer);
        }
        Ok(report)
    }

    /// Clear all systems and groups from the scheduler
    pub fn clear(&mut self) {
        self.systems.clear();
        self.groups.clear();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
