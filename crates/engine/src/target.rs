//! Build targets: one compiler configuration each.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aedris_core::path::{clean_path, join_clean};
use aedris_core::{
    AedrisError, AsyncSeriesHook, BuildEnvironment, ProjectConfig, Result, SyncBailHook,
    SyncWaterfallHook,
};
use serde_json::Value;
use tracing::debug;

use crate::chain::{ChainConfig, CompilerConfig, EXTERNALS_KEY};
use crate::compiler::TargetCompilerHandle;
use crate::contexts::{ContextExtension, DefaultContext, base_config, default_contexts};
use crate::entry::{
    ENTRY_MODULE_PATH, ENTRY_REQUEST, RuntimePluginEntry, entry_template, has_entry_module,
};
use crate::externals::{ExternalsHook, ExternalsResolver, NODE_EXTERNALS_PRIORITY, node_externals};
use crate::virtual_modules::VirtualModules;

/// Options for creating a target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetOptions {
    /// Unique name within the builder.
    pub name: String,

    /// Contexts applied in order.
    pub context: Vec<String>,

    /// Entry points by name.
    pub entry: BTreeMap<String, Vec<String>>,

    /// Output directory relative to the project output directory.
    pub output_dir: PathBuf,
}

impl TargetOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context: Vec::new(),
            entry: BTreeMap::new(),
            output_dir: PathBuf::from("."),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    pub fn with_entry<I, S>(mut self, name: impl Into<String>, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entry
            .insert(name.into(), modules.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }
}

/// Hooks scoped to one target.
#[derive(Default)]
pub struct TargetHooks {
    /// Registers contexts, dynamic modules and runtime plugins.
    pub prepare_target: AsyncSeriesHook<BuildTarget>,

    /// Edits the chained config after the contexts, before the builder hook.
    pub prepare_compiler_config: SyncWaterfallHook<ChainConfig, BuildTarget>,

    /// Last chance to change the target, after its entry is generated.
    pub after_load: AsyncSeriesHook<BuildTarget>,

    /// Answers `true` to keep a changed file from triggering a rebuild.
    pub watch_should_ignore: SyncBailHook<PathBuf, bool>,

    /// Externals contributors, asked in priority order.
    pub externals_query: ExternalsHook,
}

/// One named compiler configuration.
pub struct BuildTarget {
    pub hooks: TargetHooks,
    name: String,
    context: Vec<String>,
    raw_entry: BTreeMap<String, Vec<String>>,
    entry: BTreeMap<String, Vec<String>>,
    output_dir: PathBuf,
    config: Arc<ProjectConfig>,
    env: BuildEnvironment,
    contexts: BTreeMap<String, ContextExtension>,
    loader_modules: Vec<PathBuf>,
    dynamic_modules: BTreeMap<String, PathBuf>,
    runtime_plugins: BTreeMap<String, RuntimePluginEntry>,
    virtual_modules: BTreeMap<PathBuf, String>,
    virtual_modules_plugin: Option<VirtualModules>,
    compiler_config: Option<CompilerConfig>,
    compiler: Option<TargetCompilerHandle>,
}

impl BuildTarget {
    /// Creates a target. Node targets get the default externals contributor.
    pub fn new(options: TargetOptions, config: Arc<ProjectConfig>, env: BuildEnvironment) -> Self {
        let hooks = TargetHooks::default();

        if options.context.iter().any(|c| c == DefaultContext::Node.as_str()) {
            hooks
                .externals_query
                .tap("node-externals", NODE_EXTERNALS_PRIORITY, |query| {
                    Box::pin(async move { Ok(node_externals(query)) })
                });
        }

        Self {
            hooks,
            name: options.name,
            context: options.context,
            entry: options.entry.clone(),
            raw_entry: options.entry,
            output_dir: options.output_dir,
            config,
            env,
            contexts: default_contexts(),
            loader_modules: vec![PathBuf::from("node_modules")],
            dynamic_modules: BTreeMap::new(),
            runtime_plugins: BTreeMap::new(),
            virtual_modules: BTreeMap::new(),
            virtual_modules_plugin: None,
            compiler_config: None,
            compiler: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &[String] {
        &self.context
    }

    pub fn has_context(&self, context: &str) -> bool {
        self.context.iter().any(|c| c == context)
    }

    /// Targets built for both the browser and node render on the server.
    pub fn is_server_rendering(&self) -> bool {
        self.has_context(DefaultContext::Web.as_str()) && self.has_context(DefaultContext::Node.as_str())
    }

    /// Entry points as given at creation.
    pub fn raw_entry(&self) -> &BTreeMap<String, Vec<String>> {
        &self.raw_entry
    }

    /// Entry points including the generated entry for applications.
    pub fn entry(&self) -> &BTreeMap<String, Vec<String>> {
        &self.entry
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Absolute output directory of this target.
    pub fn output_path(&self) -> PathBuf {
        clean_path(&join_clean(&self.config.root_dir, &self.config.output_dir).join(&self.output_dir))
    }

    /// The project config seen by this target.
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn env(&self) -> &BuildEnvironment {
        &self.env
    }

    /// Options of one plugin, by reference.
    pub fn plugin_options(&self, plugin: &str) -> Option<&Value> {
        self.config.plugin_options(plugin)
    }

    pub fn loader_modules(&self) -> &[PathBuf] {
        &self.loader_modules
    }

    /// Directories loaders are resolved from.
    pub fn set_loader_modules(&mut self, modules: Vec<PathBuf>) {
        self.loader_modules = modules;
    }

    pub fn dynamic_modules(&self) -> &BTreeMap<String, PathBuf> {
        &self.dynamic_modules
    }

    pub fn runtime_plugins(&self) -> &BTreeMap<String, RuntimePluginEntry> {
        &self.runtime_plugins
    }

    /// Virtual modules registered since the last config was created.
    pub fn virtual_modules(&self) -> &BTreeMap<PathBuf, String> {
        &self.virtual_modules
    }

    /// The finalized compiler config, once created.
    pub fn compiler_config(&self) -> Option<&CompilerConfig> {
        self.compiler_config.as_ref()
    }

    /// The compiler this target is bound to.
    pub fn compiler(&self) -> Option<&TargetCompilerHandle> {
        self.compiler.as_ref()
    }

    /// Adds or replaces a context.
    pub fn register_context<F>(&mut self, name: impl Into<String>, extension: F)
    where
        F: Fn(ChainConfig, &BuildTarget) -> Result<ChainConfig> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(target: "aedris::target", target_name = %self.name, context = %name, "registered context");
        self.contexts.insert(name, Arc::new(extension));
    }

    /// Makes `path` importable as `@aedris/dynamic/<name>`.
    pub fn register_dynamic_module(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        let (name, path) = (name.into(), path.into());
        debug!(
            target: "aedris::target",
            target_name = %self.name,
            module = %name,
            path = %path.display(),
            "registered dynamic module"
        );
        self.dynamic_modules.insert(name, path);
    }

    /// Bundles a runtime plugin into this target's generated entry.
    pub fn register_runtime_plugin(
        &mut self,
        name: impl Into<String>,
        entry: impl Into<String>,
        options: Option<Value>,
    ) {
        let name = name.into();
        let plugin = RuntimePluginEntry::new(entry, options);
        debug!(
            target: "aedris::target",
            target_name = %self.name,
            plugin = %name,
            entry = %plugin.entry,
            "registered runtime plugin"
        );
        self.runtime_plugins.insert(name, plugin);
    }

    /// Runs `prepare_target` after clearing what it registers.
    pub async fn prepare_target(&mut self) -> Result<()> {
        debug!(target: "aedris::target", target_name = %self.name, "preparing target");

        self.dynamic_modules.clear();
        self.runtime_plugins.clear();

        let hook = self.hooks.prepare_target.clone();
        hook.call(self).await
    }

    /// Assembles the compiler config from scratch.
    ///
    /// Safe to call again: the virtual module table and externals resolver are
    /// rebuilt every time.
    pub fn create_config(
        &mut self,
        builder_hook: &SyncWaterfallHook<ChainConfig, BuildTarget>,
    ) -> Result<&CompilerConfig> {
        self.virtual_modules.clear();
        self.virtual_modules_plugin = None;
        self.compiler_config = None;

        self.entry = if self.config.is_plugin {
            self.raw_entry.clone()
        } else {
            self.raw_entry
                .iter()
                .map(|(name, modules)| {
                    let modules = if has_entry_module(modules) {
                        modules.clone()
                    } else {
                        std::iter::once(ENTRY_REQUEST.to_string())
                            .chain(modules.iter().cloned())
                            .collect()
                    };
                    (name.clone(), modules)
                })
                .collect()
        };

        let mut chain = base_config(self);

        for context in &self.context {
            let extension = self.contexts.get(context).cloned().ok_or_else(|| {
                AedrisError::UnknownContext {
                    target: self.name.clone(),
                    context: context.clone(),
                }
            })?;
            chain = extension(chain, self)?;
        }

        chain = self.hooks.prepare_compiler_config.call(chain, self)?;
        chain = builder_hook.call(chain, self)?;

        if chain.has(EXTERNALS_KEY) {
            return Err(AedrisError::DirectExternals(self.name.clone()));
        }

        let resolver = ExternalsResolver::new(self.name.clone(), self.hooks.externals_query.clone());
        let config = chain.into_config(self.name.clone(), resolver);

        let plugin = config
            .virtual_modules()
            .cloned()
            .ok_or_else(|| AedrisError::MissingVirtualModules(self.name.clone()))?;
        self.virtual_modules_plugin = Some(plugin);

        Ok(self.compiler_config.insert(config))
    }

    /// Binds the target to its compiler and replays pending virtual modules.
    pub fn bind_compiler(&mut self, handle: TargetCompilerHandle) {
        self.compiler = Some(handle);

        if let Some(plugin) = &self.virtual_modules_plugin {
            for (path, contents) in &self.virtual_modules {
                plugin.write_module(path.clone(), contents.clone());
            }
        }
    }

    /// Writes the bootstrap entry for the registered runtime plugins.
    pub fn generate_entry(&mut self) {
        debug!(target: "aedris::target", target_name = %self.name, "generating entry point");
        let source = entry_template(&self.runtime_plugins);
        self.write_virtual_module(ENTRY_MODULE_PATH, source);
    }

    /// Records a virtual module, forwarding it once a compiler is bound.
    pub fn write_virtual_module(&mut self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        let (path, contents) = (path.into(), contents.into());

        if let (Some(plugin), Some(_)) = (&self.virtual_modules_plugin, &self.compiler) {
            plugin.write_module(path.clone(), contents.clone());
        }

        self.virtual_modules.insert(path, contents);
    }

    /// Runs the target's `after_load` hook.
    pub async fn after_load(&mut self) -> Result<()> {
        let hook = self.hooks.after_load.clone();
        hook.call(self).await
    }

    /// Returns true if a target hook vetoes `path`.
    pub fn should_ignore(&self, path: &Path) -> bool {
        self.hooks
            .watch_should_ignore
            .call(&path.to_path_buf())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for BuildTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildTarget")
            .field("name", &self.name)
            .field("context", &self.context)
            .field("entry", &self.entry)
            .field("output_dir", &self.output_dir)
            .field("contexts", &self.contexts.keys().collect::<Vec<_>>())
            .field("runtime_plugins", &self.runtime_plugins)
            .field("compiler", &self.compiler)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::CompilerPlugin;
    use crate::contexts::VIRTUAL_MODULES_PLUGIN;
    use aedris_core::normalize_config;
    use serde_json::json;

    fn project(is_plugin: bool) -> Arc<ProjectConfig> {
        Arc::new(normalize_config(
            Path::new("/proj"),
            &ProjectConfig::default().with_plugin_shape(is_plugin),
        ))
    }

    fn target(options: TargetOptions) -> BuildTarget {
        BuildTarget::new(options, project(false), BuildEnvironment::development())
    }

    fn backend() -> TargetOptions {
        TargetOptions::new("backend")
            .with_context("node")
            .with_entry("index", ["./src/server.ts"])
            .with_output_dir("backend")
    }

    fn no_hook() -> SyncWaterfallHook<ChainConfig, BuildTarget> {
        SyncWaterfallHook::new()
    }

    #[test]
    fn test_app_entry_gets_generated_module() {
        let mut target = target(
            backend()
                .with_entry("custom", ["@aedris/entry/custom.js", "./src/custom.ts"]),
        );
        target.create_config(&no_hook()).unwrap();

        assert_eq!(
            target.entry()["index"],
            vec![ENTRY_REQUEST.to_string(), "./src/server.ts".to_string()]
        );
        assert_eq!(
            target.entry()["custom"],
            vec!["@aedris/entry/custom.js".to_string(), "./src/custom.ts".to_string()]
        );
        assert_eq!(target.raw_entry()["index"], vec!["./src/server.ts".to_string()]);
    }

    #[test]
    fn test_library_entry_is_unchanged() {
        let mut target = BuildTarget::new(backend(), project(true), BuildEnvironment::development());
        target.create_config(&no_hook()).unwrap();
        assert_eq!(target.entry(), target.raw_entry());
    }

    #[test]
    fn test_base_policy() {
        let mut target = target(backend());
        target.register_dynamic_module("app", "./src/app.ts");

        let config = target.create_config(&no_hook()).unwrap();
        assert_eq!(config.output.path, PathBuf::from("/proj/dist/backend"));
        assert_eq!(config.output.public_path.as_deref(), Some("/_/res/"));
        assert_eq!(config.output.library_target.as_deref(), Some("commonjs2"));
        assert_eq!(config.target.as_deref(), Some("node"));
        assert_eq!(config.devtool.as_deref(), Some("eval-source-map"));
        assert_eq!(
            config.resolve.alias.get("@aedris/dynamic/app"),
            Some(&PathBuf::from("/proj/src/app.ts"))
        );
        assert!(config.virtual_modules().is_some());
    }

    #[test]
    fn test_devtool_policy_in_production() {
        let ssr = TargetOptions::new("server").with_context("web").with_context("node");
        let client = TargetOptions::new("client").with_context("web");

        let mut ssr = BuildTarget::new(ssr, project(false), BuildEnvironment::production());
        let mut client = BuildTarget::new(client, project(false), BuildEnvironment::production());

        let ssr_config = ssr.create_config(&no_hook()).unwrap();
        assert_eq!(ssr_config.devtool.as_deref(), Some("source-map"));
        assert_eq!(ssr_config.output.filename, None);
        assert_eq!(ssr_config.target.as_deref(), Some("node"));

        let client_config = client.create_config(&no_hook()).unwrap();
        assert_eq!(client_config.devtool.as_deref(), Some("hidden-source-map"));
        assert_eq!(
            client_config.output.filename.as_deref(),
            Some("[name].[chunkhash:16].bundle.js")
        );
        assert_eq!(client_config.performance.hints.as_deref(), Some("warning"));
        assert_eq!(client_config.performance.max_entrypoint_size, Some(250_000));
    }

    #[test]
    fn test_unknown_context_names_target_and_context() {
        let mut target = target(TargetOptions::new("odd").with_context("deno"));
        let err = target.create_config(&no_hook()).unwrap_err();

        match err {
            AedrisError::UnknownContext { target, context } => {
                assert_eq!(target, "odd");
                assert_eq!(context, "deno");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_registered_context_is_applied_in_order() {
        let mut target = target(backend().with_context("vue"));
        target.register_context("vue", |mut chain, _| {
            chain.resolve.extensions.push(".vue".to_string());
            Ok(chain)
        });

        let config = target.create_config(&no_hook()).unwrap();
        assert_eq!(config.resolve.extensions.last().map(String::as_str), Some(".vue"));
    }

    #[test]
    fn test_create_config_twice_does_not_leak_modules() {
        let mut target = target(backend());

        target.create_config(&no_hook()).unwrap();
        let once = target.virtual_modules().clone();

        target.write_virtual_module("./stale.js", "stale");
        target.create_config(&no_hook()).unwrap();

        assert_eq!(target.virtual_modules(), &once);
        let plugin = target.compiler_config().and_then(|c| c.virtual_modules()).unwrap();
        assert!(plugin.is_empty());
    }

    #[test]
    fn test_direct_externals_are_rejected() {
        let mut target = target(backend().with_context("bad"));
        target.register_context("bad", |mut chain, _| {
            chain.set_externals(json!({"koa": "commonjs koa"}));
            Ok(chain)
        });

        let err = target.create_config(&no_hook()).unwrap_err();
        assert!(matches!(err, AedrisError::DirectExternals(name) if name == "backend"));
    }

    #[test]
    fn test_builder_hook_runs_after_target_hook() {
        let mut target = target(backend());
        target.hooks.prepare_compiler_config.tap("target", |mut chain, _| {
            chain.set("order", json!(["target"]));
            Ok(chain)
        });

        let mut builder_hook = no_hook();
        builder_hook.tap("builder", |mut chain, target| {
            let mut order = chain.get("order").cloned().unwrap_or(json!([]));
            if let Some(list) = order.as_array_mut() {
                list.push(json!(format!("builder:{}", target.name())));
            }
            chain.set("order", order);
            Ok(chain)
        });

        let config = target.create_config(&builder_hook).unwrap();
        assert_eq!(config.extra["order"], json!(["target", "builder:backend"]));
    }

    #[tokio::test]
    async fn test_externals_via_query_hook_are_honored() {
        let mut target = target(backend());
        target.hooks.externals_query.tap("jquery", 0, |query| {
            Box::pin(async move {
                Ok((query.request == "jquery").then(|| crate::externals::External::Module("jQuery".to_string())))
            })
        });

        let config = target.create_config(&no_hook()).unwrap();
        let externals = config.externals.clone();

        assert_eq!(externals.resolve("/proj", "jquery").await.unwrap().as_deref(), Some("jQuery"));
        assert_eq!(
            externals.resolve("/proj", "koa").await.unwrap().as_deref(),
            Some("commonjs koa")
        );
        assert_eq!(externals.resolve("/proj", "./local").await.unwrap(), None);
    }

    #[test]
    fn test_missing_virtual_modules_plugin_is_an_error() {
        let mut target = target(backend());
        target.hooks.prepare_compiler_config.tap("drop", |mut chain, _| {
            chain.remove_plugin(VIRTUAL_MODULES_PLUGIN);
            Ok(chain)
        });

        let err = target.create_config(&no_hook()).unwrap_err();
        assert!(matches!(err, AedrisError::MissingVirtualModules(_)));
    }

    #[test]
    fn test_virtual_modules_reach_the_compiler_once_bound() {
        let mut target = target(backend());
        target.create_config(&no_hook()).unwrap();
        target.register_runtime_plugin("koa", "@aedris/plugin-koa/runtime", None);

        target.generate_entry();
        let plugin = match target.compiler_config().map(|c| &c.plugins) {
            Some(plugins) => plugins
                .iter()
                .find_map(|p| match p {
                    CompilerPlugin::VirtualModules(m) => Some(m.clone()),
                    CompilerPlugin::Named { .. } => None,
                })
                .unwrap(),
            None => panic!("config was not created"),
        };
        assert!(plugin.is_empty());

        target.bind_compiler(TargetCompilerHandle::new(0, "backend"));
        let entry = plugin.get(Path::new(ENTRY_MODULE_PATH)).unwrap();
        assert!(entry.contains("@aedris/plugin-koa/runtime"));

        target.write_virtual_module("./later.js", "later");
        assert_eq!(plugin.get(Path::new("./later.js")).as_deref(), Some("later"));
    }

    #[test]
    fn test_rebuilt_config_receives_modules_on_rebind() {
        let mut target = target(backend());
        target.create_config(&no_hook()).unwrap();
        target.bind_compiler(TargetCompilerHandle::new(0, "backend"));
        target.generate_entry();

        target.create_config(&no_hook()).unwrap();
        let plugin = target.compiler_config().and_then(|c| c.virtual_modules()).cloned().unwrap();
        assert!(plugin.is_empty());

        target.generate_entry();
        target.bind_compiler(TargetCompilerHandle::new(0, "backend"));
        assert!(plugin.get(Path::new(ENTRY_MODULE_PATH)).is_some());
        assert_eq!(plugin.len(), 1);
    }

    #[tokio::test]
    async fn test_prepare_target_resets_registrations() {
        let mut target = target(backend());
        target.register_runtime_plugin("stale", "stale", None);
        target.hooks.prepare_target.tap("register", |target| {
            Box::pin(async move {
                target.register_runtime_plugin("fresh", "fresh", Some(json!({"a": 1})));
                Ok(())
            })
        });

        target.prepare_target().await.unwrap();
        assert_eq!(
            target.runtime_plugins().keys().collect::<Vec<_>>(),
            vec!["fresh"]
        );
    }

    #[test]
    fn test_should_ignore_uses_bail_hook() {
        let mut target = target(backend());
        target
            .hooks
            .watch_should_ignore
            .tap("logs", |path| path.extension().is_some_and(|e| e == "log").then_some(true));

        assert!(target.should_ignore(Path::new("/proj/debug.log")));
        assert!(!target.should_ignore(Path::new("/proj/src/index.ts")));
    }
}
