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
//! Plugin API traits
//!
//! Plugins must:
//! - Only register systems, resources and component metadata in `build`
//! - Declare every plugin they rely on through `dependencies`
//! - Not create circular dependencies with other plugins

use crate::app::App;
use crate::error::Result;
use std::any::Any;
use std::fmt;

/// Version of the plugin API
///
/// Plugins report the API version they were written against; the registry
/// refuses plugins whose version is not compatible with this one.
/// Format: MAJOR.MINOR.PATCH following semantic versioning.
pub const PLUGIN_API_VERSION: &str = "0.1.0";

/// A unit of one-time app configuration
pub trait Plugin {
    /// Unique name of this plugin
    fn name(&self) -> &str;

    /// Version of this plugin
    fn version(&self) -> &str;

    /// Plugin API version this plugin targets
    fn api_version(&self) -> &str {
        PLUGIN_API_VERSION
    }

    /// Names of plugins that must be built before this one
    fn dependencies(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Register systems and resources on `app`
    ///
    /// # Errors
    ///
    /// Registration errors from the scheduler propagate unchanged.
    fn build(&self, app: &mut App) -> Result<()>;

    /// Get this plugin as Any for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// Plugin backed by a plain function
pub struct FnPlugin<F> {
    name: String,
    dependencies: Vec<String>,
    build: F,
}

impl<F> FnPlugin<F> {
    /// Declare a dependency on another plugin
    pub fn after(mut self, plugin: impl Into<String>) -> Self {
        self.dependencies.push(plugin.into());
        self
    }
}

impl<F> fmt::Debug for FnPlugin<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPlugin")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Wrap a registration function as a plugin
pub fn plugin_fn<F>(name: impl Into<String>, build: F) -> FnPlugin<F>
where
    F: Fn(&mut App) -> Result<()> + 'static,
{
    FnPlugin {
        name: name.into(),
        dependencies: Vec::new(),
        build,
    }
}

impl<F> Plugin for FnPlugin<F>
where
    F: Fn(&mut App) -> Result<()> + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        PLUGIN_API_VERSION
    }

    fn dependencies(&self) -> Vec<&str> {
        self.dependencies.iter().map(String::as_str).collect()
    }

    fn build(&self, app: &mut App) -> Result<()> {
        (self.build)(app)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::Resource;

    struct Marker;
    impl Resource for Marker {}

    struct TestPlugin {
        name: String,
    }

    impl Plugin for TestPlugin {
        fn name(&self) -> &str {
            &self.name
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        fn build(&self, _app: &mut App) -> Result<()> {
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_plugin_api_version() {
        assert_eq!(PLUGIN_API_VERSION, "0.1.0");
    }

    #[test]
    fn test_plugin_defaults() {
        let plugin = TestPlugin {
            name: "test".to_string(),
        };
        assert_eq!(plugin.api_version(), PLUGIN_API_VERSION);
        assert!(plugin.dependencies().is_empty());
    }

    #[test]
    fn test_plugin_downcasting() {
        let plugin: Box<dyn Plugin> = Box::new(TestPlugin {
            name: "downcast".to_string(),
        });
        let concrete = plugin.as_any().downcast_ref::<TestPlugin>().unwrap();
        assert_eq!(concrete.name, "downcast");
    }

    #[test]
    fn test_fn_plugin_builds() {
        let plugin = plugin_fn("marker", |app: &mut App| {
            app.world.resources_mut().add_new(Marker);
            Ok(())
        })
        .after("time");
        assert_eq!(plugin.dependencies(), vec!["time"]);

        let mut app = App::new();
        plugin.build(&mut app).unwrap();
        assert!(app.world.resources().has::<Marker>());
    }
}
