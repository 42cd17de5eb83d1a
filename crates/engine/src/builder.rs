//! The build lifecycle: config, plugins, targets, compiler.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use aedris_core::{
    AedrisError, AsyncSeriesHook, BuildEnvironment, ConfigHandler, ProjectConfig, Result,
    SyncBailHook, SyncWaterfallHook,
};
use aedris_plugin::{
    LoadPluginOptions, PluginHost, PluginLoader, PluginManager, PluginResolver,
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::chain::{ChainConfig, CompilerConfig};
use crate::clean::{clean_outputs, outermost_dirs};
use crate::command_compiler::CACHE_DIR;
use crate::compiler::{CompilationStats, Compiler, CompilerFactory};
use crate::plugin::{SharedPlugin, normalize_plugin_options};
use crate::target::{BuildTarget, TargetOptions};

/// Where a [`Builder`] takes its config from.
#[derive(Debug, Clone, Default)]
pub struct BuilderOptions {
    /// Path to the config file.
    pub config_path: Option<PathBuf>,

    /// Config used instead of the file. Takes precedence over `config_path`.
    pub config: Option<ProjectConfig>,

    pub env: BuildEnvironment,
}

impl BuilderOptions {
    pub fn from_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: Some(config_path.into()),
            ..Self::default()
        }
    }

    pub fn from_config(config: ProjectConfig) -> Self {
        Self {
            config: Some(config),
            ..Self::default()
        }
    }

    pub fn with_env(mut self, env: BuildEnvironment) -> Self {
        self.env = env;
        self
    }
}

/// Capabilities a builder depends on. Nested builders reuse them.
#[derive(Clone)]
pub struct BuilderServices {
    pub resolver: Arc<dyn PluginResolver>,
    pub loader: Arc<dyn PluginLoader<SharedPlugin>>,
    pub compiler: Arc<dyn CompilerFactory>,
}

impl BuilderServices {
    pub fn new(
        resolver: Arc<dyn PluginResolver>,
        loader: Arc<dyn PluginLoader<SharedPlugin>>,
        compiler: Arc<dyn CompilerFactory>,
    ) -> Self {
        Self {
            resolver,
            loader,
            compiler,
        }
    }

    /// A fresh plugin manager using these capabilities.
    pub fn plugin_manager(&self) -> PluginManager<SharedPlugin> {
        PluginManager::new(Arc::clone(&self.resolver), Arc::clone(&self.loader))
    }
}

impl std::fmt::Debug for BuilderServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuilderServices").finish_non_exhaustive()
    }
}

/// Lifecycle hooks, in the order they fire.
#[derive(Default)]
pub struct BuilderHooks {
    /// The config is loaded but plugins have not seen it yet.
    pub after_raw_config: AsyncSeriesHook<Builder>,

    /// Folds the whole config after plugins are loaded.
    pub normalize_config: SyncWaterfallHook<ProjectConfig>,

    /// The config is final. Plugins may read each other's options.
    pub after_config: AsyncSeriesHook<Builder>,

    /// Plugins create their targets here.
    pub register_targets: AsyncSeriesHook<Builder>,

    /// Edits every target's chained config after the target's own hook.
    pub prepare_compiler_config: SyncWaterfallHook<ChainConfig, BuildTarget>,

    /// Everything is wired. Last stop before build or watch.
    pub after_load: AsyncSeriesHook<Builder>,

    pub before_clean: AsyncSeriesHook<Builder>,
    pub after_clean: AsyncSeriesHook<Builder>,
    pub before_build: AsyncSeriesHook<Builder>,
    pub after_build: AsyncSeriesHook<Builder>,
    pub before_watch: AsyncSeriesHook<Builder>,

    /// Answers `true` to keep a changed file from triggering a rebuild.
    pub watch_should_ignore: SyncBailHook<PathBuf, bool>,
}

/// Drives one project from config to compiled targets.
pub struct Builder {
    pub hooks: BuilderHooks,
    config_handler: ConfigHandler,
    services: BuilderServices,
    env: BuildEnvironment,
    config: Arc<ProjectConfig>,
    plugins: PluginManager<SharedPlugin>,
    targets: Vec<BuildTarget>,
    compiler: Option<Arc<dyn Compiler>>,
    last_stats: Option<CompilationStats>,
    load_started: bool,
}

impl Builder {
    /// Creates a builder. Fails if neither a config nor a path is given, or if
    /// an in-memory config has no root directory.
    pub fn new(options: BuilderOptions, services: BuilderServices) -> Result<Self> {
        if let Some(config) = &options.config
            && !config.has_root_dir()
        {
            return Err(AedrisError::MissingRootDir);
        }

        let config_handler = ConfigHandler::from_options(options.config_path, options.config)?;

        Ok(Self {
            hooks: BuilderHooks::default(),
            config_handler,
            plugins: services.plugin_manager(),
            services,
            env: options.env,
            config: Arc::new(ProjectConfig::default()),
            targets: Vec::new(),
            compiler: None,
            last_stats: None,
            load_started: false,
        })
    }

    /// Runs the whole load pipeline. May only be called once.
    pub async fn load(&mut self) -> Result<()> {
        if self.load_started || self.compiler.is_some() {
            return Err(AedrisError::AlreadyLoaded);
        }
        self.load_started = true;

        info!(target: "aedris::builder", config_path = ?self.config_handler.config_path(), "loading builder");

        let config = self.config_handler.load_config().await?.clone();
        self.config = Arc::new(config);

        let hook = self.hooks.after_raw_config.clone();
        hook.call(self).await?;

        let references = self.config.plugins.clone();
        let options = LoadPluginOptions::from_root(self.config.root_dir.clone());
        self.load_plugins(&references, &options).await?;

        debug!(target: "aedris::builder", "passing config to plugins");
        let config = self.hooks.normalize_config.call((*self.config).clone(), &())?;
        let config = normalize_plugin_options(config, self.plugins.registrations())?;
        self.config = Arc::new(config);

        let hook = self.hooks.after_config.clone();
        hook.call(self).await?;

        debug!(target: "aedris::builder", "creating targets");
        let hook = self.hooks.register_targets.clone();
        hook.call(self).await?;

        if self.targets.is_empty() {
            return Err(AedrisError::NoTargets);
        }

        debug!(target: "aedris::builder", targets = self.targets.len(), "creating compiler");
        let configs = self.compiler_configs()?;
        let compiler = self.services.compiler.create(configs)?;
        for (target, handle) in self.targets.iter_mut().zip(compiler.target_handles()) {
            target.bind_compiler(handle);
        }
        self.compiler = Some(compiler);

        debug!(target: "aedris::builder", "creating entry points");
        for target in &mut self.targets {
            target.generate_entry();
        }
        for target in &mut self.targets {
            target.after_load().await?;
        }

        let hook = self.hooks.after_load.clone();
        hook.call(self).await?;

        info!(target: "aedris::builder", targets = self.targets.len(), "builder loaded");
        Ok(())
    }

    fn compiler_configs(&self) -> Result<Vec<CompilerConfig>> {
        self.targets
            .iter()
            .map(|target| {
                target.compiler_config().cloned().ok_or_else(|| {
                    AedrisError::Compiler(format!("target {:?} has no compiler config", target.name()))
                })
            })
            .collect()
    }

    /// Creates, prepares and configures a target.
    pub async fn create_target(&mut self, options: TargetOptions) -> Result<&mut BuildTarget> {
        if self.target(&options.name).is_some() {
            return Err(AedrisError::DuplicateTarget(options.name));
        }

        debug!(target: "aedris::builder", name = %options.name, context = ?options.context, "creating target");

        let mut target = BuildTarget::new(options, Arc::clone(&self.config), self.env);
        target.set_loader_modules(self.loader_modules());

        let plugins: Vec<SharedPlugin> = self.plugins.plugins().map(|(_, p)| Arc::clone(p)).collect();
        for plugin in plugins {
            plugin.hook_target(&mut target).await?;
        }

        target.prepare_target().await?;
        target.create_config(&self.hooks.prepare_compiler_config)?;

        let index = self.targets.len();
        self.targets.push(target);
        Ok(&mut self.targets[index])
    }

    /// Directories loaders are resolved from: the project's and every plugin's
    /// `node_modules`.
    pub fn loader_modules(&self) -> Vec<PathBuf> {
        let mut modules = vec![
            PathBuf::from("node_modules"),
            self.config.root_dir.join("node_modules"),
        ];

        for path in self.plugins.absolute_paths() {
            let dir = if path.extension().is_some() {
                path.parent().map(Path::to_path_buf).unwrap_or(path)
            } else {
                path
            };
            let candidate = dir.join("node_modules");
            if !modules.contains(&candidate) {
                modules.push(candidate);
            }
        }

        modules
    }

    /// Runs `before_clean`, removes the output directories and runs `after_clean`.
    pub async fn clean(&mut self) -> Result<Vec<PathBuf>> {
        let hook = self.hooks.before_clean.clone();
        hook.call(self).await?;

        let removed = self.clean_outputs().await?;

        let hook = self.hooks.after_clean.clone();
        hook.call(self).await?;

        Ok(removed)
    }

    /// Removes the output directory and target output directories outside it.
    pub async fn clean_outputs(&self) -> Result<Vec<PathBuf>> {
        clean_outputs(&self.output_dirs(), &self.env).await
    }

    /// Every directory the build writes to, outermost only.
    pub fn output_dirs(&self) -> Vec<PathBuf> {
        outermost_dirs(
            std::iter::once(self.config.output_path())
                .chain(self.targets.iter().map(BuildTarget::output_path)),
        )
    }

    /// Cleans, then compiles every target once.
    pub async fn build(&mut self) -> Result<CompilationStats> {
        let compiler = self.compiler.clone().ok_or(AedrisError::NotLoaded)?;

        self.clean().await?;

        let hook = self.hooks.before_build.clone();
        hook.call(self).await?;

        info!(target: "aedris::builder", "building");
        let stats = compiler.run().await?;
        self.last_stats = Some(stats.clone());

        let hook = self.hooks.after_build.clone();
        hook.call(self).await?;

        Ok(stats)
    }

    /// Returns true if a change to `path` must not trigger a rebuild.
    pub fn should_ignore(&self, path: &Path) -> bool {
        if path
            .components()
            .any(|c| c == Component::Normal("node_modules".as_ref()))
        {
            return true;
        }

        if path.starts_with(self.config.output_path())
            || path.starts_with(self.config.root_dir.join(CACHE_DIR))
        {
            return true;
        }

        let path_buf = path.to_path_buf();
        self.hooks.watch_should_ignore.call(&path_buf).unwrap_or(false)
            || self.targets.iter().any(|target| target.should_ignore(path))
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Mutable access to the config. Targets created earlier keep the old one.
    pub fn config_mut(&mut self) -> &mut ProjectConfig {
        Arc::make_mut(&mut self.config)
    }

    pub fn env(&self) -> &BuildEnvironment {
        &self.env
    }

    pub fn services(&self) -> &BuilderServices {
        &self.services
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_handler.config_path()
    }

    pub fn targets(&self) -> &[BuildTarget] {
        &self.targets
    }

    pub fn target(&self, name: &str) -> Option<&BuildTarget> {
        self.targets.iter().find(|t| t.name() == name)
    }

    pub fn target_mut(&mut self, name: &str) -> Option<&mut BuildTarget> {
        self.targets.iter_mut().find(|t| t.name() == name)
    }

    /// Options of one plugin, by canonical name.
    pub fn plugin_options(&self, name: &str) -> Option<&Value> {
        self.config.plugin_options(name)
    }

    /// A loaded plugin, by canonical name.
    pub fn plugin(&self, name: &str) -> Option<&SharedPlugin> {
        self.plugins.plugin(name)
    }

    pub fn compiler(&self) -> Option<&Arc<dyn Compiler>> {
        self.compiler.as_ref()
    }

    pub fn last_stats(&self) -> Option<&CompilationStats> {
        self.last_stats.as_ref()
    }

    pub(crate) fn set_last_stats(&mut self, stats: CompilationStats) {
        self.last_stats = Some(stats);
    }

    pub fn is_loaded(&self) -> bool {
        self.compiler.is_some()
    }
}

#[async_trait]
impl PluginHost for Builder {
    type Plugin = SharedPlugin;

    fn plugin_manager(&self) -> &PluginManager<SharedPlugin> {
        &self.plugins
    }

    fn plugin_manager_mut(&mut self) -> &mut PluginManager<SharedPlugin> {
        &mut self.plugins
    }

    async fn apply_plugin(&mut self, plugin: SharedPlugin) -> Result<()> {
        plugin.hook_build(self).await
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("env", &self.env)
            .field("root_dir", &self.config.root_dir)
            .field("plugins", &self.plugins)
            .field("targets", &self.targets.iter().map(BuildTarget::name).collect::<Vec<_>>())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ENTRY_MODULE_PATH;
    use crate::plugin::BuildPlugin;
    use crate::testing::{TestEnv, node_target, registers_target};
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_zero_targets_is_an_error() {
        let env = TestEnv::new();
        let mut builder = env.builder(ProjectConfig::new("/proj"));

        let err = builder.load().await.unwrap_err();
        assert!(matches!(err, AedrisError::NoTargets));
    }

    #[tokio::test]
    async fn test_load_twice_is_an_error() {
        let mut env = TestEnv::new();
        env.catalog.register("base", || registers_target("backend").shared());
        let mut builder = env.builder(ProjectConfig::new("/proj").with_plugin("base"));

        builder.load().await.unwrap();
        assert!(builder.is_loaded());

        let err = builder.load().await.unwrap_err();
        assert!(matches!(err, AedrisError::AlreadyLoaded));
    }

    #[test]
    fn test_new_requires_a_config_source() {
        let env = TestEnv::new();
        let err = Builder::new(BuilderOptions::default(), env.services()).unwrap_err();
        assert!(matches!(err, AedrisError::MissingConfigSource));

        let err = Builder::new(BuilderOptions::from_config(ProjectConfig::default()), env.services())
            .unwrap_err();
        assert!(matches!(err, AedrisError::MissingRootDir));
    }

    #[tokio::test]
    async fn test_duplicate_target_names() {
        let mut env = TestEnv::new();
        env.catalog.register("base", || {
            BuildPlugin::new("base")
                .with_hook_build(|builder| {
                    Box::pin(async move {
                        builder.hooks.register_targets.tap("targets", |b| {
                            Box::pin(async move {
                                b.create_target(node_target("backend")).await?;
                                b.create_target(node_target("worker")).await?;

                                let err = b.create_target(node_target("backend")).await.err();
                                assert!(matches!(err, Some(AedrisError::DuplicateTarget(name)) if name == "backend"));
                                Ok(())
                            })
                        });
                        Ok(())
                    })
                })
                .shared()
        });

        let mut builder = env.builder(ProjectConfig::new("/proj").with_plugin("base"));
        builder.load().await.unwrap();

        let names: Vec<&str> = builder.targets().iter().map(BuildTarget::name).collect();
        assert_eq!(names, vec!["backend", "worker"]);
    }

    #[tokio::test]
    async fn test_local_plugin_applied_once_by_path() {
        let mut env = TestEnv::new();
        let applied = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&applied);
        env.catalog.register_path("/proj/a.js", move || {
            let counter = Arc::clone(&counter);
            registers_target("backend")
                .with_hook_target(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Box::pin(async { Ok(()) })
                })
                .shared()
        });

        let mut builder = env.builder(
            ProjectConfig::new("/proj")
                .with_plugin("./a.js")
                .with_plugin("/proj/a.js"),
        );
        builder.load().await.unwrap();

        assert_eq!(builder.plugin_manager().registrations().len(), 1);
        assert_eq!(applied.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_used_plugins_load_before_targets() {
        let mut env = TestEnv::new();
        let applied = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second"] {
            let applied = Arc::clone(&applied);
            env.catalog.register(name, move || {
                let applied = Arc::clone(&applied);
                BuildPlugin::new(name)
                    .with_hook_build(move |builder| {
                        applied.lock().unwrap().push(name);
                        builder.use_plugin("shared-dep");
                        Box::pin(async { Ok(()) })
                    })
                    .shared()
            });
        }

        let shared = Arc::clone(&applied);
        env.catalog.register("shared-dep", move || {
            let shared = Arc::clone(&shared);
            registers_target("backend")
                .with_hook_target(move |_| {
                    shared.lock().unwrap().push("shared-dep:target");
                    Box::pin(async { Ok(()) })
                })
                .shared()
        });

        let mut builder = env.builder(
            ProjectConfig::new("/proj")
                .with_plugin("first")
                .with_plugin("second"),
        );
        builder.load().await.unwrap();

        assert_eq!(
            *applied.lock().unwrap(),
            vec!["first", "second", "shared-dep:target"]
        );
        assert!(builder.plugin("shared-dep").is_some());
        assert_eq!(builder.plugin_manager().registrations().len(), 3);
    }

    #[tokio::test]
    async fn test_plugins_normalize_their_own_options() {
        let mut env = TestEnv::new();
        env.catalog.register("base", || registers_target("backend").shared());
        env.catalog.register("@aedris/plugin-koa", || {
            BuildPlugin::new("@aedris/plugin-koa")
                .with_normalize_options(|options, config| {
                    let port = options
                        .as_ref()
                        .and_then(|o| o.get("port"))
                        .cloned()
                        .unwrap_or(json!(3000));
                    Ok(json!({ "port": port, "isPlugin": config.is_plugin }))
                })
                .shared()
        });

        let mut builder = env.builder(
            ProjectConfig::new("/proj")
                .with_plugin("base")
                .with_plugin("@aedris/plugin-koa")
                .with_options("other", json!({"untouched": true})),
        );
        builder.hooks.normalize_config.tap("mark", |mut config, _| {
            config.extra.insert("marked".to_string(), json!(true));
            Ok(config)
        });
        builder.load().await.unwrap();

        assert_eq!(
            builder.plugin_options("@aedris/plugin-koa"),
            Some(&json!({"port": 3000, "isPlugin": false}))
        );
        assert_eq!(builder.plugin_options("other"), Some(&json!({"untouched": true})));
        assert!(builder.plugin_options("base").is_none());
        assert_eq!(builder.config().extra.get("marked"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_lifecycle_order() {
        let mut env = TestEnv::new();
        env.catalog.register("base", || registers_target("backend").shared());
        let mut builder = env.builder(ProjectConfig::new("/proj").with_plugin("base"));

        let events = Arc::new(Mutex::new(Vec::new()));
        macro_rules! record {
            ($hook:ident, $label:expr) => {{
                let events = Arc::clone(&events);
                builder.hooks.$hook.tap("record", move |b: &mut Builder| {
                    events
                        .lock()
                        .unwrap()
                        .push(format!("{}:{}", $label, b.targets().len()));
                    Box::pin(async { Ok(()) })
                });
            }};
        }

        record!(after_raw_config, "after_raw_config");
        record!(after_config, "after_config");
        record!(after_load, "after_load");
        record!(before_clean, "before_clean");
        record!(after_clean, "after_clean");
        record!(before_build, "before_build");
        record!(after_build, "after_build");

        builder.load().await.unwrap();
        let stats = builder.build().await.unwrap();

        assert!(stats.success());
        assert_eq!(builder.last_stats(), Some(&stats));
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "after_raw_config:0",
                "after_config:0",
                "after_load:1",
                "before_clean:1",
                "after_clean:1",
                "before_build:1",
                "after_build:1",
            ]
        );
    }

    #[tokio::test]
    async fn test_entries_are_generated_after_targets_exist() {
        let mut env = TestEnv::new();
        env.catalog.register("base", || {
            registers_target("backend")
                .with_hook_target(|target| {
                    target.hooks.prepare_target.tap("runtime", |t| {
                        Box::pin(async move {
                            t.register_runtime_plugin("koa", "@aedris/plugin-koa/runtime", None);
                            Ok(())
                        })
                    });
                    Box::pin(async { Ok(()) })
                })
                .shared()
        });

        let mut builder = env.builder(ProjectConfig::new("/proj").with_plugin("base"));
        builder.load().await.unwrap();

        let target = builder.target("backend").unwrap();
        assert!(target.compiler().is_some());

        let modules = target.compiler_config().and_then(|c| c.virtual_modules()).unwrap();
        let entry = modules.get(Path::new(ENTRY_MODULE_PATH)).unwrap();
        assert!(entry.contains("import(\"@aedris/plugin-koa/runtime\")"));
    }

    #[tokio::test]
    async fn test_build_requires_load() {
        let env = TestEnv::new();
        let mut builder = env.builder(ProjectConfig::new("/proj"));
        assert!(matches!(builder.build().await, Err(AedrisError::NotLoaded)));
    }

    #[tokio::test]
    async fn test_should_ignore() {
        let mut env = TestEnv::new();
        env.catalog.register("base", || registers_target("backend").shared());
        let mut builder = env.builder(ProjectConfig::new("/proj").with_plugin("base"));
        builder
            .hooks
            .watch_should_ignore
            .tap("tmp", |path| path.extension().is_some_and(|e| e == "tmp").then_some(true));
        builder.load().await.unwrap();

        assert!(builder.should_ignore(Path::new("/proj/node_modules/koa/index.js")));
        assert!(builder.should_ignore(Path::new("/proj/dist/backend/index.js")));
        assert!(builder.should_ignore(Path::new("/proj/src/a.tmp")));
        assert!(builder.should_ignore(Path::new("/proj/.cache/aedris/backend.json")));
        assert!(!builder.should_ignore(Path::new("/proj/src/index.ts")));
    }

    #[tokio::test]
    async fn test_output_dirs_include_targets_outside_output() {
        let mut env = TestEnv::new();
        env.catalog.register("base", || {
            BuildPlugin::new("base")
                .with_hook_build(|builder| {
                    builder.hooks.register_targets.tap("targets", |b| {
                        Box::pin(async move {
                            b.create_target(node_target("inside")).await?;
                            b.create_target(node_target("outside").with_output_dir("../build")).await?;
                            Ok(())
                        })
                    });
                    Box::pin(async { Ok(()) })
                })
                .shared()
        });

        let mut builder = env.builder(ProjectConfig::new("/proj").with_plugin("base"));
        builder.load().await.unwrap();

        assert_eq!(
            builder.output_dirs(),
            vec![PathBuf::from("/proj/build"), PathBuf::from("/proj/dist")]
        );
    }
}
