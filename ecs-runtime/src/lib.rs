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
//! # ECS Runtime
//!
//! A single-threaded Entity Component System runtime: entities with typed
//! components, singleton resources, declarative queries with change
//! detection, deferred command buffers and dependency-ordered run groups.
//!
//! ## Features
//!
//! - **Change tracking**: `Added`, `Changed` and `Removed` filters are
//!   evaluated against a per-query, per-key checkpoint
//! - **Composite filters**: terms AND together; `Term::any` / `Term::or` nest an OR
//! - **Deferred commands**: structural changes queued by a system are applied
//!   in order right after it returns
//! - **Run groups**: stable topological ordering with cycle detection
//! - **Plugins**: one-time registration of systems and resources
//!
//! ## Example
//!
//! ```rust
//! use ecs_runtime::{App, groups};
//! use ecs_runtime::ecs::{Component, QuerySpec, System, Term};
//!
//! #[derive(Default)]
//! struct Position { x: f64 }
//! impl Component for Position {}
//!
//! let mut app = App::new();
//! let entity = app.world.spawn_bundle((Position::default(),));
//! app.add_system(
//!     groups::FIXED,
//!     System::new("advance", QuerySpec::new().key("bodies", [Term::read::<Position>()]), |ctx| {
//!         let mut bodies = ctx.fetch::<&mut Position>("bodies")?;
//!         for &body in bodies.entities() {
//!             bodies.get(body)?.x += 1.0;
//!         }
//!         Ok(())
//!     }),
//! )?;
//!
//! let mut fixed = app.runner(groups::FIXED);
//! for _ in 0..3 {
//!     fixed()?;
//! }
//! drop(fixed);
//! assert_eq!(app.world.get::<Position>(entity)?.x, 3.0);
//! # Ok::<(), ecs_runtime::EcsError>(())
//! ```

#![warn(missing_docs)]

/// Entity Component System implementation
pub mod ecs;

/// Application shell owning a world and a scheduler
pub mod app;

/// Error types
pub mod error;

/// Plugin system for extensibility
pub mod plugins;

pub use app::App;
pub use ecs::{groups, Entity, World};
pub use error::{EcsError, Result};
