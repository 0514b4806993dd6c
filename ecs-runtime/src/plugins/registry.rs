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
//! Plugin registry
//!
//! This module provides the registry for managing plugins, including:
//! - Static registration with duplicate detection
//! - Version compatibility checking
//! - Dependency resolution and circular dependency detection

use crate::app::App;
use crate::error::{EcsError, Result};
use crate::plugins::api::{Plugin, PLUGIN_API_VERSION};
use semver::Version;
use std::collections::{HashMap, VecDeque};

/// Plugin registry for managing and building plugins
///
/// Plugins are kept in registration order; building walks them in
/// dependency order, and each plugin is built at most once.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
    built: Vec<bool>,
    /// Build order of the last successful `build_all`
    load_order: Vec<String>,
}

impl PluginRegistry {
    /// Create a new plugin registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin
    ///
    /// # Errors
    ///
    /// [`EcsError::Plugin`] if a plugin with the same name is already
    /// registered or its API version is incompatible.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> Result<()> {
        let name = plugin.name().to_string();

        if self.get(&name).is_some() {
            return Err(EcsError::Plugin {
                name,
                reason: "already registered".to_string(),
            });
        }

        let plugin_api_version = plugin.api_version();
        if !is_version_compatible(plugin_api_version, PLUGIN_API_VERSION) {
            return Err(EcsError::Plugin {
                reason: format!(
                    "API version {plugin_api_version} is incompatible with runtime API version {PLUGIN_API_VERSION}"
                ),
                name,
            });
        }

        tracing::debug!(plugin = %name, version = plugin.version(), "registered plugin");
        self.plugins.push(plugin);
        self.built.push(false);
        Ok(())
    }

    /// Build every plugin not built yet, dependencies first
    ///
    /// # Errors
    ///
    /// [`EcsError::Plugin`] for a missing dependency or a dependency cycle;
    /// errors returned by a plugin's `build` propagate.
    pub fn build_all(&mut self, app: &mut App) -> Result<()> {
        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        for plugin in &self.plugins {
            let deps: Vec<String> = plugin.dependencies().into_iter().map(str::to_string).collect();
            for dep in &deps {
                if self.get(dep).is_none() {
                    return Err(EcsError::Plugin {
                        name: plugin.name().to_string(),
                        reason: format!("missing dependency `{dep}`"),
                    });
                }
            }
            dependencies.insert(plugin.name().to_string(), deps);
        }

        let names: Vec<String> = self.plugins.iter().map(|p| p.name().to_string()).collect();
        let order = topological_sort(&names, &dependencies)?;
        tracing::debug!(?order, "plugin build order");

        for name in &order {
            let Some(index) = names.iter().position(|candidate| candidate == name) else {
                continue;
            };
            if self.built[index] {
                continue;
            }
            self.plugins[index].build(app)?;
            self.built[index] = true;
        }
        self.load_order = order;
        Ok(())
    }

    /// Move the plugins of `other` into this registry, keeping their
    /// build state
    ///
    /// # Errors
    ///
    /// [`EcsError::Plugin`] if a name is already registered here; plugins
    /// after the offending one are dropped.
    pub fn absorb(&mut self, other: PluginRegistry) -> Result<()> {
        for (plugin, built) in other.plugins.into_iter().zip(other.built) {
            self.register(plugin)?;
            if let Some(last) = self.built.last_mut() {
                *last = built;
            }
        }
        Ok(())
    }

    /// Get a plugin by name
    pub fn get(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins
            .iter()
            .find(|plugin| plugin.name() == name)
            .map(|plugin| plugin.as_ref())
    }

    /// Get the number of registered plugins
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Whether the named plugin has been built
    pub fn is_built(&self, name: &str) -> bool {
        self.plugins
            .iter()
            .position(|plugin| plugin.name() == name)
            .map_or(false, |index| self.built[index])
    }

    /// Get the build order
    pub fn load_order(&self) -> &[String] {
        &self.load_order
    }
}

/// Check if a plugin API version is compatible with the runtime
///
/// Uses semantic versioning rules:
/// - Major version must match
/// - For major version 0.x.y, minor versions must match (breaking changes)
/// - For major version >= 1, minor version can be less than or equal
/// - Patch version is ignored
fn is_version_compatible(plugin_version: &str, runtime_version: &str) -> bool {
    let (Ok(plugin_ver), Ok(runtime_ver)) =
        (Version::parse(plugin_version), Version::parse(runtime_version))
    else {
        return false;
    };

    if plugin_ver.major != runtime_ver.major {
        return false;
    }
    if plugin_ver.major != 0 {
        plugin_ver.minor <= runtime_ver.minor
    } else {
        plugin_ver.minor == runtime_ver.minor
    }
}

/// Topological sort of the dependency graph
///
/// Ties are broken by registration order, so the build order is
/// reproducible.
fn topological_sort(names: &[String], dependencies: &HashMap<String, Vec<String>>) -> Result<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = names.iter().map(|name| (name.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for name in names {
        for dep in dependencies.get(name).into_iter().flatten() {
            dependents.entry(dep.as_str()).or_default().push(name.as_str());
            *in_degree.entry(name.as_str()).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|name| in_degree.get(name) == Some(&0))
        .collect();

    let mut sorted = Vec::with_capacity(names.len());
    while let Some(node) = queue.pop_front() {
        sorted.push(node.to_string());
        if let Some(children) = dependents.get(node) {
            for child in children {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*child);
                    }
                }
            }
        }
    }

    if sorted.len() != names.len() {
        let stuck: Vec<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|name| !sorted.iter().any(|done| done == name))
            .collect();
        return Err(EcsError::Plugin {
            name: stuck.join(", "),
            reason: "circular dependency detected in plugin dependencies".to_string(),
        });
    }

    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::api::plugin_fn;
    use std::any::Any;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct TestPlugin {
        name: String,
        api_version: String,
        deps: Vec<String>,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl TestPlugin {
        fn new(name: &str, deps: Vec<&str>, log: &Rc<RefCell<Vec<String>>>) -> Self {
            TestPlugin {
                name: name.to_string(),
                api_version: PLUGIN_API_VERSION.to_string(),
                deps: deps.into_iter().map(String::from).collect(),
                log: log.clone(),
            }
        }
    }

    impl Plugin for TestPlugin {
        fn name(&self) -> &str {
            &self.name
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        fn api_version(&self) -> &str {
            &self.api_version
        }

        fn dependencies(&self) -> Vec<&str> {
            self.deps.iter().map(|s| s.as_str()).collect()
        }

        fn build(&self, _app: &mut App) -> Result<()> {
            self.log.borrow_mut().push(self.name.clone());
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn log() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn test_registry_creation() {
        let registry = PluginRegistry::new();
        assert_eq!(registry.plugin_count(), 0);
        assert!(registry.load_order().is_empty());
    }

    #[test]
    fn test_duplicate_plugin_registration() {
        let log = log();
        let mut registry = PluginRegistry::new();
        registry.register(Box::new(TestPlugin::new("test", vec![], &log))).unwrap();
        let err = registry
            .register(Box::new(TestPlugin::new("test", vec![], &log)))
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_incompatible_api_version() {
        let log = log();
        let mut plugin = TestPlugin::new("old", vec![], &log);
        plugin.api_version = "0.2.0".to_string();
        let mut registry = PluginRegistry::new();
        let err = registry.register(Box::new(plugin)).unwrap_err();
        assert!(err.to_string().contains("incompatible"));
    }

    #[test]
    fn test_dependency_resolution() {
        let log = log();
        let mut registry = PluginRegistry::new();
        registry.register(Box::new(TestPlugin::new("c", vec!["b"], &log))).unwrap();
        registry.register(Box::new(TestPlugin::new("b", vec!["a"], &log))).unwrap();
        registry.register(Box::new(TestPlugin::new("a", vec![], &log))).unwrap();

        let mut app = App::new();
        registry.build_all(&mut app).unwrap();
        assert_eq!(*log.borrow(), ["a", "b", "c"]);
        assert_eq!(registry.load_order(), ["a", "b", "c"]);
        assert!(registry.is_built("b"));
    }

    #[test]
    fn test_build_runs_once() {
        let log = log();
        let mut registry = PluginRegistry::new();
        registry.register(Box::new(TestPlugin::new("a", vec![], &log))).unwrap();

        let mut app = App::new();
        registry.build_all(&mut app).unwrap();
        registry.build_all(&mut app).unwrap();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_missing_dependency() {
        let log = log();
        let mut registry = PluginRegistry::new();
        registry
            .register(Box::new(TestPlugin::new("a", vec!["nonexistent"], &log)))
            .unwrap();

        let mut app = App::new();
        let err = registry.build_all(&mut app).unwrap_err();
        assert!(err.to_string().contains("missing dependency"));
    }

    #[test]
    fn test_circular_dependency() {
        let log = log();
        let mut registry = PluginRegistry::new();
        registry.register(Box::new(TestPlugin::new("a", vec!["b"], &log))).unwrap();
        registry.register(Box::new(TestPlugin::new("b", vec!["a"], &log))).unwrap();

        let mut app = App::new();
        let err = registry.build_all(&mut app).unwrap_err();
        assert!(err.to_string().contains("circular dependency"));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_fn_plugins_in_app() {
        let mut app = App::new();
        app.add_plugin(plugin_fn("second", |_: &mut App| Ok(())).after("first"))
            .unwrap();
        app.add_plugin(plugin_fn("first", |_: &mut App| Ok(()))).unwrap();
        app.build_plugins().unwrap();
        assert_eq!(app.plugins().load_order(), ["first", "second"]);
    }

    #[test]
    fn test_version_compatibility() {
        // For 0.x.y versions, minor versions must match (breaking changes)
        assert!(is_version_compatible("0.1.0", "0.1.0"));
        assert!(is_version_compatible("0.1.5", "0.1.10"));
        assert!(!is_version_compatible("0.1.0", "0.2.0"));
        assert!(!is_version_compatible("0.2.0", "0.1.0"));

        // For 1.x.y and higher, minor version <= is ok
        assert!(is_version_compatible("1.0.0", "1.2.0"));
        assert!(!is_version_compatible("1.2.0", "1.0.0"));

        // Major version must always match
        assert!(!is_version_compatible("1.0.0", "0.1.0"));
        assert!(!is_version_compatible("invalid", "0.1.0"));
    }
}
