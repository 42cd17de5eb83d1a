//! Generic plugin manager: queued loading with deduplication.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aedris_core::Result;
use aedris_core::path::is_local_reference;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::source::{PluginLoader, PluginResolver};

/// A loaded plugin and where it came from.
#[derive(Debug, Clone)]
pub struct PluginRegistration<P> {
    /// Canonical name: the package name, or the absolute path for local plugins.
    pub name: String,

    /// Resolved absolute path.
    pub absolute_path: PathBuf,

    /// The plugin value, `None` if the module exports nothing.
    pub plugin: Option<P>,
}

/// Options for [`PluginHost::load_plugins`].
#[derive(Debug, Clone, Default)]
pub struct LoadPluginOptions {
    /// Directories plugin references are resolved from.
    pub resolve_paths: Vec<PathBuf>,
}

impl LoadPluginOptions {
    /// Resolves plugins from a single directory.
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        Self {
            resolve_paths: vec![root.into()],
        }
    }
}

/// Registration table and load queue shared by every plugin host.
pub struct PluginManager<P> {
    queue: VecDeque<String>,
    registrations: Vec<PluginRegistration<P>>,
    resolver: Arc<dyn PluginResolver>,
    loader: Arc<dyn PluginLoader<P>>,
}

impl<P> PluginManager<P> {
    /// Creates a manager using the given capabilities.
    pub fn new(resolver: Arc<dyn PluginResolver>, loader: Arc<dyn PluginLoader<P>>) -> Self {
        Self {
            queue: VecDeque::new(),
            registrations: Vec::new(),
            resolver,
            loader,
        }
    }

    /// Queues a plugin to be loaded once the current references are done.
    pub fn use_plugin(&mut self, reference: impl Into<String>) {
        let reference = reference.into();
        debug!(target: "aedris::plugin_manager", reference = %reference, "adding plugin to load queue");
        self.queue.push_back(reference);
    }

    /// Takes the next queued reference.
    pub fn next_queued(&mut self) -> Option<String> {
        self.queue.pop_front()
    }

    /// Number of references waiting in the queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Registrations in load order.
    pub fn registrations(&self) -> &[PluginRegistration<P>] {
        &self.registrations
    }

    /// Looks up a registration by canonical name.
    pub fn get(&self, name: &str) -> Option<&PluginRegistration<P>> {
        self.registrations.iter().find(|r| r.name == name)
    }

    /// Looks up a loaded plugin by canonical name.
    pub fn plugin(&self, name: &str) -> Option<&P> {
        self.get(name).and_then(|r| r.plugin.as_ref())
    }

    /// Loaded plugin values in load order.
    pub fn plugins(&self) -> impl Iterator<Item = (&str, &P)> {
        self.registrations
            .iter()
            .filter_map(|r| r.plugin.as_ref().map(|p| (r.name.as_str(), p)))
    }

    /// Absolute paths of every registration.
    pub fn absolute_paths(&self) -> Vec<PathBuf> {
        self.registrations
            .iter()
            .map(|r| r.absolute_path.clone())
            .collect()
    }

    /// Returns true if a plugin is registered under `name`.
    pub fn is_registered(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The loader capability.
    pub fn loader(&self) -> Arc<dyn PluginLoader<P>> {
        Arc::clone(&self.loader)
    }

    /// The resolver capability.
    pub fn resolver(&self) -> Arc<dyn PluginResolver> {
        Arc::clone(&self.resolver)
    }

    /// Resolves a reference into its canonical name and absolute path.
    ///
    /// Package references are also looked up from every registered plugin, so
    /// plugins can pull in their own dependencies.
    pub fn resolve(&self, reference: &str, options: &LoadPluginOptions) -> Result<(String, PathBuf)> {
        let local = is_local_reference(reference);

        let mut roots = options.resolve_paths.clone();
        if !local {
            roots.extend(self.absolute_paths());
        }

        let path = self.resolver.resolve(reference, &roots)?;
        let name = if local {
            path.display().to_string()
        } else {
            reference.to_string()
        };

        Ok((name, path))
    }

    /// Describes why `name`/`path` would be a second registration, if it would.
    pub fn duplicate_of(&self, name: &str, path: &Path) -> Option<String> {
        if self.is_registered(name) {
            return Some(format!("by name {name:?}"));
        }

        self.registrations
            .iter()
            .find(|r| r.absolute_path == path)
            .map(|r| format!("by path {:?} as {:?}", path.display().to_string(), r.name))
    }

    /// Records a registration without any duplicate check.
    pub fn insert(&mut self, registration: PluginRegistration<P>) {
        self.registrations.push(registration);
    }
}

impl<P> fmt::Debug for PluginManager<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("queue", &self.queue)
            .field(
                "registrations",
                &self.registrations.iter().map(|r| &r.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Something that owns a [`PluginManager`] and knows how to apply its plugins.
///
/// Implementors provide [`apply_plugin`](Self::apply_plugin); loading,
/// deduplication and queue draining come from the provided methods.
#[async_trait]
pub trait PluginHost: Send {
    type Plugin: Clone + Send + Sync + 'static;

    fn plugin_manager(&self) -> &PluginManager<Self::Plugin>;

    fn plugin_manager_mut(&mut self) -> &mut PluginManager<Self::Plugin>;

    /// Applies a freshly registered plugin. Called exactly once per plugin.
    async fn apply_plugin(&mut self, plugin: Self::Plugin) -> Result<()>;

    /// Loads `references` in order, then drains the queue until it is empty.
    async fn load_plugins(&mut self, references: &[String], options: &LoadPluginOptions) -> Result<()> {
        info!(target: "aedris::plugin_manager", count = references.len(), "loading plugins");

        for reference in references {
            self.load_plugin(reference, options).await?;
        }

        while let Some(reference) = self.plugin_manager_mut().next_queued() {
            self.load_plugin(&reference, options).await?;
        }

        Ok(())
    }

    /// Loads and applies one plugin unless it is already registered.
    async fn load_plugin(&mut self, reference: &str, options: &LoadPluginOptions) -> Result<()> {
        debug!(target: "aedris::plugin_manager", reference, "applying plugin");

        let (name, path) = self.plugin_manager().resolve(reference, options)?;

        if let Some(reason) = self.plugin_manager().duplicate_of(&name, &path) {
            debug!(target: "aedris::plugin_manager", reference, "already loaded ({reason})");
            return Ok(());
        }

        debug!(target: "aedris::plugin_manager", path = %path.display(), "loading plugin");
        let loader = self.plugin_manager().loader();
        let plugin = loader.load(&path).await?;

        self.register_plugin(name, path, plugin).await
    }

    /// Registers a plugin and applies it. Bypasses every duplicate check.
    async fn register_plugin(
        &mut self,
        name: String,
        absolute_path: PathBuf,
        plugin: Option<Self::Plugin>,
    ) -> Result<()> {
        self.plugin_manager_mut().insert(PluginRegistration {
            name,
            absolute_path,
            plugin: plugin.clone(),
        });

        match plugin {
            Some(plugin) => self.apply_plugin(plugin).await,
            None => Ok(()),
        }
    }

    /// Queues another plugin. Meant to be called while a plugin is applied.
    fn use_plugin(&mut self, reference: &str) {
        self.plugin_manager_mut().use_plugin(reference);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aedris_core::AedrisError;
    use aedris_core::path::clean_path;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct TestPlugin {
        label: &'static str,
        uses: Vec<&'static str>,
    }

    /// Resolves local references against the first root and packages to
    /// `/modules/<name>`, recording the roots it was given.
    #[derive(Default)]
    struct RecordingResolver {
        calls: Mutex<Vec<(String, Vec<PathBuf>)>>,
    }

    impl PluginResolver for RecordingResolver {
        fn resolve(&self, reference: &str, search_roots: &[PathBuf]) -> Result<PathBuf> {
            self.calls
                .lock()
                .unwrap()
                .push((reference.to_string(), search_roots.to_vec()));

            if reference == "missing" {
                return Err(AedrisError::PluginResolve {
                    reference: reference.to_string(),
                    message: "not found".to_string(),
                });
            }

            if is_local_reference(reference) {
                let root = search_roots.first().cloned().unwrap_or_default();
                Ok(clean_path(&root.join(reference)))
            } else {
                Ok(PathBuf::from("/modules").join(reference))
            }
        }
    }

    struct MapLoader {
        plugins: HashMap<PathBuf, TestPlugin>,
    }

    #[async_trait]
    impl PluginLoader<TestPlugin> for MapLoader {
        async fn load(&self, path: &Path) -> Result<Option<TestPlugin>> {
            Ok(self.plugins.get(path).cloned())
        }
    }

    struct TestHost {
        manager: PluginManager<TestPlugin>,
        applied: Vec<&'static str>,
    }

    #[async_trait]
    impl PluginHost for TestHost {
        type Plugin = TestPlugin;

        fn plugin_manager(&self) -> &PluginManager<TestPlugin> {
            &self.manager
        }

        fn plugin_manager_mut(&mut self) -> &mut PluginManager<TestPlugin> {
            &mut self.manager
        }

        async fn apply_plugin(&mut self, plugin: TestPlugin) -> Result<()> {
            self.applied.push(plugin.label);
            for reference in plugin.uses {
                self.use_plugin(reference);
            }
            Ok(())
        }
    }

    fn plugin(label: &'static str, uses: &[&'static str]) -> TestPlugin {
        TestPlugin {
            label,
            uses: uses.to_vec(),
        }
    }

    fn host(plugins: Vec<(&str, TestPlugin)>) -> (TestHost, Arc<RecordingResolver>) {
        let resolver = Arc::new(RecordingResolver::default());
        let loader = MapLoader {
            plugins: plugins
                .into_iter()
                .map(|(path, plugin)| (PathBuf::from(path), plugin))
                .collect(),
        };

        let host = TestHost {
            manager: PluginManager::new(resolver.clone(), Arc::new(loader)),
            applied: Vec::new(),
        };
        (host, resolver)
    }

    fn refs(references: &[&str]) -> Vec<String> {
        references.iter().map(|r| r.to_string()).collect()
    }

    #[tokio::test]
    async fn test_local_and_absolute_reference_load_once() {
        let (mut host, _) = host(vec![("/proj/a.js", plugin("a", &[]))]);
        let options = LoadPluginOptions::from_root("/proj");

        host.load_plugins(&refs(&["./a.js", "/proj/a.js", "./sub/../a.js"]), &options)
            .await
            .unwrap();

        assert_eq!(host.applied, vec!["a"]);
        assert_eq!(host.manager.registrations().len(), 1);
        assert_eq!(host.manager.registrations()[0].name, "/proj/a.js");
    }

    #[tokio::test]
    async fn test_use_plugin_is_drained_before_returning() {
        let (mut host, _) = host(vec![
            ("/proj/p.js", plugin("p", &["x"])),
            ("/modules/x", plugin("x", &[])),
        ]);

        host.load_plugins(&refs(&["./p.js"]), &LoadPluginOptions::from_root("/proj"))
            .await
            .unwrap();

        assert_eq!(host.applied, vec!["p", "x"]);
        assert!(host.manager.is_registered("x"));
        assert_eq!(host.manager.queued(), 0);
    }

    #[tokio::test]
    async fn test_shared_dependency_is_applied_once() {
        let (mut host, _) = host(vec![
            ("/modules/first", plugin("first", &["shared-dep"])),
            ("/modules/second", plugin("second", &["shared-dep"])),
            ("/modules/shared-dep", plugin("shared-dep", &[])),
        ]);

        host.load_plugins(&refs(&["first", "second"]), &LoadPluginOptions::default())
            .await
            .unwrap();

        assert_eq!(host.applied, vec!["first", "second", "shared-dep"]);
        assert_eq!(host.manager.registrations().len(), 3);
    }

    #[tokio::test]
    async fn test_package_references_search_registered_plugins() {
        let (mut host, resolver) = host(vec![("/proj/a.js", plugin("a", &["dep"]))]);

        host.load_plugins(&refs(&["./a.js"]), &LoadPluginOptions::from_root("/proj"))
            .await
            .unwrap();

        let calls = resolver.calls.lock().unwrap();
        assert_eq!(calls[0], ("./a.js".to_string(), vec![PathBuf::from("/proj")]));
        assert_eq!(
            calls[1],
            (
                "dep".to_string(),
                vec![PathBuf::from("/proj"), PathBuf::from("/proj/a.js")]
            )
        );
    }

    #[tokio::test]
    async fn test_module_without_plugin_is_registered_but_not_applied() {
        let (mut host, _) = host(vec![]);

        host.load_plugins(&refs(&["runtime-only"]), &LoadPluginOptions::default())
            .await
            .unwrap();

        assert!(host.applied.is_empty());
        assert!(host.manager.is_registered("runtime-only"));
        assert!(host.manager.plugin("runtime-only").is_none());
    }

    #[tokio::test]
    async fn test_resolution_error_propagates() {
        let (mut host, _) = host(vec![("/modules/ok", plugin("ok", &["missing"]))]);

        let err = host
            .load_plugins(&refs(&["ok"]), &LoadPluginOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AedrisError::PluginResolve { .. }));
        assert_eq!(host.applied, vec!["ok"]);
    }
}
