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
//! Error types shared by every part of the runtime

use crate::ecs::{Entity, SystemId};

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, EcsError>;

/// Errors raised by the ECS runtime
///
/// Registration-time variants (`ReservedKey`, `DuplicateKey`,
/// `CyclicDependency`, `CrossGroupOrdering`) are programming errors and are
/// never retried. Access variants (`MissingComponent`, `MissingResource`)
/// can be avoided by checking with `has`/`try_get` first.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// `get::<T>()` on an entity that does not carry `T`
    #[error("{entity} has no component `{component}`")]
    MissingComponent {
        /// The entity that was queried
        entity: Entity,
        /// Type name of the missing component
        component: &'static str,
    },

    /// `resources.get::<T>()` when no `T` is installed
    #[error("resource `{0}` is not present")]
    MissingResource(&'static str),

    /// The handle refers to a despawned (or never flushed) entity
    #[error("{0} is not alive")]
    DeadEntity(Entity),

    /// `after` references inside a run group form a cycle
    #[error("cyclic ordering in run group `{group}` involving systems {systems:?}")]
    CyclicDependency {
        /// Run group being sorted
        group: String,
        /// Systems that could not be placed in the order
        systems: Vec<String>,
    },

    /// `resources` or `command` used as an ordinary query key
    #[error("query key `{0}` is reserved")]
    ReservedKey(String),

    /// The same key declared twice in one query
    #[error("query key `{0}` is declared more than once")]
    DuplicateKey(String),

    /// A resolved query was asked for a key it does not declare
    #[error("query has no key named `{0}`")]
    UnknownKey(String),

    /// A store is already borrowed in a way that conflicts with this access
    #[error("`{type_name}` is already borrowed")]
    BorrowConflict {
        /// Type name of the component or resource
        type_name: &'static str,
    },

    /// A single-match accessor found zero or several matches
    #[error("expected exactly one match for `{key}`, found {count}")]
    NotExactlyOne {
        /// Query key that was resolved
        key: String,
        /// Number of entities that matched
        count: usize,
    },

    /// A typed fetch does not list the key's extracted types in term order
    #[error("query key `{key}` extracts {declared:?}, but {requested:?} was requested")]
    FetchMismatch {
        /// Query key being read
        key: String,
        /// Types extracted by the key's terms
        declared: Vec<&'static str>,
        /// Types named by the fetch
        requested: Vec<&'static str>,
    },

    /// A system used the command interface without declaring it
    #[error("system `{0}` did not declare access to commands")]
    CommandsNotGranted(String),

    /// Raised instead of a silent skip under the strict resource policy
    #[error("resource requirements of system `{0}` are not satisfied")]
    UnsatisfiedResources(String),

    /// No run group with this name exists
    #[error("unknown run group `{0}`")]
    UnknownGroup(String),

    /// The system id is not registered with this scheduler
    #[error("unknown system {0}")]
    UnknownSystem(SystemId),

    /// Ordering constraints may only relate systems of the same group
    #[error("{system} cannot be ordered after {dependency}: they belong to different run groups")]
    CrossGroupOrdering {
        /// System that declared the constraint
        system: SystemId,
        /// System it wanted to run after
        dependency: SystemId,
    },

    /// Plugin registration or build failure
    #[error("plugin `{name}`: {reason}")]
    Plugin {
        /// Plugin name
        name: String,
        /// What went wrong
        reason: String,
    },
}
