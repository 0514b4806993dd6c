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
//! Plugin facade
//!
//! Plugins perform one-time registration of systems, resources and
//! component metadata on an [`App`](crate::App). They are thin wiring
//! around the ECS core: rendering, physics or input integrations live
//! outside this crate and plug in through this interface.
//!
//! # Features
//!
//! - **Static Registration**: plugins are plain values registered on the app
//! - **Dependency Management**: plugins build after the plugins they depend on;
//!   cycles and missing dependencies are rejected
//! - **Version Checking**: API version compatibility between runtime and plugin
//!
//! # Example
//!
//! ```rust
//! use ecs_runtime::plugins::Plugin;
//! use ecs_runtime::ecs::Resource;
//! use ecs_runtime::App;
//!
//! #[derive(Default)]
//! struct FixedTimestep { seconds: f64 }
//! impl Resource for FixedTimestep {}
//!
//! struct TimePlugin;
//!
//! impl Plugin for TimePlugin {
//!     fn name(&self) -> &str { "time" }
//!     fn version(&self) -> &str { "1.0.0" }
//!     fn build(&self, app: &mut App) -> ecs_runtime::Result<()> {
//!         app.world.resources_mut().add_with::<FixedTimestep, _>(|t| t.seconds = 1.0 / 60.0);
//!         Ok(())
//!     }
//!     fn as_any(&self) -> &dyn std::any::Any { self }
//! }
//!
//! let mut app = App::new();
//! app.add_plugin(TimePlugin)?;
//! app.build_plugins()?;
//! assert!(app.world.resources().has::<FixedTimestep>());
//! # Ok::<(), ecs_runtime::EcsError>(())
//! ```

mod api;
mod registry;

pub use api::{plugin_fn, FnPlugin, Plugin, PLUGIN_API_VERSION};
pub use registry::PluginRegistry;
