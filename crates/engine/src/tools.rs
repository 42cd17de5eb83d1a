//! Tools manager: loads plugins for tooling and hosts the task registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use aedris_core::{
    AedrisError, AsyncSeriesHook, BuildEnvironment, ConfigHandler, ProjectConfig, Result,
    SyncWaterfallHook,
};
use aedris_plugin::{LoadPluginOptions, PluginHost, PluginManager};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::builder::{BuilderOptions, BuilderServices};
use crate::plugin::{SharedPlugin, normalize_plugin_options};
use crate::tasks::{BUILD_TASK, BuildTask, CLEAN_TASK, CleanTask, Task, TaskContext};

/// Creates a fresh task instance.
pub type TaskFactory = Arc<dyn Fn() -> Box<dyn Task> + Send + Sync>;

#[derive(Default)]
pub struct ToolsHooks {
    pub after_raw_config: AsyncSeriesHook<ToolsManager>,
    pub normalize_config: SyncWaterfallHook<ProjectConfig>,
    pub after_config: AsyncSeriesHook<ToolsManager>,

    /// Plugins add their tasks here.
    pub register_tasks: AsyncSeriesHook<ToolsManager>,
}

/// Loads the project's plugins for tooling and exposes their tasks.
///
/// The standard `build` and `clean` tasks are always registered.
pub struct ToolsManager {
    pub hooks: ToolsHooks,
    options: BuilderOptions,
    config_handler: ConfigHandler,
    services: BuilderServices,
    config: ProjectConfig,
    plugins: PluginManager<SharedPlugin>,
    tasks: BTreeMap<String, TaskFactory>,
    load_started: bool,
}

impl ToolsManager {
    pub fn new(options: BuilderOptions, services: BuilderServices) -> Result<Self> {
        let config_handler = ConfigHandler::from_options(options.config_path.clone(), options.config.clone())?;

        let mut manager = Self {
            hooks: ToolsHooks::default(),
            plugins: services.plugin_manager(),
            options,
            config_handler,
            services,
            config: ProjectConfig::default(),
            tasks: BTreeMap::new(),
            load_started: false,
        };

        manager.register_task(BUILD_TASK, || Box::new(BuildTask::new()));
        manager.register_task(CLEAN_TASK, || Box::new(CleanTask::new()));

        Ok(manager)
    }

    /// Loads config and plugins, then collects tasks.
    pub async fn load(&mut self) -> Result<()> {
        if self.load_started {
            return Err(AedrisError::AlreadyLoaded);
        }
        self.load_started = true;

        self.config = self.config_handler.load_config().await?.clone();

        let hook = self.hooks.after_raw_config.clone();
        hook.call(self).await?;

        let references = self.config.plugins.clone();
        let options = LoadPluginOptions::from_root(self.config.root_dir.clone());
        self.load_plugins(&references, &options).await?;

        let config = self.hooks.normalize_config.call(self.config.clone(), &())?;
        self.config = normalize_plugin_options(config, self.plugins.registrations())?;

        let hook = self.hooks.after_config.clone();
        hook.call(self).await?;

        let hook = self.hooks.register_tasks.clone();
        hook.call(self).await?;

        info!(target: "aedris::tools", tasks = self.tasks.len(), "tools loaded");
        Ok(())
    }

    /// Registers a task, replacing any task of the same name.
    pub fn register_task<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Task> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(target: "aedris::tools", task = %name, "registered task");
        self.tasks.insert(name, Arc::new(factory));
    }

    /// Instantiates a registered task.
    pub fn create_task(&self, name: &str) -> Result<Box<dyn Task>> {
        self.tasks
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| AedrisError::UnknownTask(name.to_string()))
    }

    pub fn has_task(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Registered task names, sorted.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.keys().map(String::as_str).collect()
    }

    /// What tasks need to create their own builders.
    pub fn task_context(&self) -> TaskContext {
        TaskContext::new(self.options.clone(), self.services.clone())
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ProjectConfig {
        &mut self.config
    }

    pub fn env(&self) -> &BuildEnvironment {
        &self.options.env
    }

    pub fn plugin_options(&self, name: &str) -> Option<&Value> {
        self.config.plugin_options(name)
    }

    pub fn plugin(&self, name: &str) -> Option<&SharedPlugin> {
        self.plugins.plugin(name)
    }
}

#[async_trait]
impl PluginHost for ToolsManager {
    type Plugin = SharedPlugin;

    fn plugin_manager(&self) -> &PluginManager<SharedPlugin> {
        &self.plugins
    }

    fn plugin_manager_mut(&mut self) -> &mut PluginManager<SharedPlugin> {
        &mut self.plugins
    }

    async fn apply_plugin(&mut self, plugin: SharedPlugin) -> Result<()> {
        plugin.hook_tools(self).await
    }
}

impl std::fmt::Debug for ToolsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsManager")
            .field("root_dir", &self.config.root_dir)
            .field("plugins", &self.plugins)
            .field("tasks", &self.task_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::BuildPlugin;
    use crate::tasks::{TaskArgs, TaskOutput};
    use crate::testing::TestEnv;
    use serde_json::json;

    struct EchoTask;

    #[async_trait]
    impl Task for EchoTask {
        fn description(&self) -> &str {
            "echoes its name"
        }

        async fn run(&self, _context: &TaskContext, _args: &TaskArgs) -> Result<TaskOutput> {
            Ok(TaskOutput::Inspected(json!("echo")))
        }
    }

    fn manager(env: &TestEnv, config: ProjectConfig) -> ToolsManager {
        ToolsManager::new(BuilderOptions::from_config(config), env.services()).unwrap()
    }

    #[test]
    fn test_standard_tasks_are_registered() {
        let env = TestEnv::new();
        let tools = manager(&env, ProjectConfig::new("/proj"));

        assert_eq!(tools.task_names(), vec![BUILD_TASK, CLEAN_TASK]);
        assert!(tools.create_task(BUILD_TASK).is_ok());
    }

    #[test]
    fn test_unknown_task() {
        let env = TestEnv::new();
        let tools = manager(&env, ProjectConfig::new("/proj"));

        let err = tools.create_task("nope").err().unwrap();
        assert!(matches!(err, AedrisError::UnknownTask(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_plugins_register_tasks() {
        let mut env = TestEnv::new();
        env.catalog.register("echo-plugin", || {
            BuildPlugin::new("echo-plugin")
                .with_normalize_options(|_, _| Ok(json!({"normalized": true})))
                .with_hook_tools(|tools| {
                    tools.hooks.register_tasks.tap("echo", |tools| {
                        tools.register_task("echo-plugin:echo", || Box::new(EchoTask));
                        Box::pin(async { Ok(()) })
                    });
                    Box::pin(async { Ok(()) })
                })
                .shared()
        });

        let mut tools = manager(&env, ProjectConfig::new("/proj").with_plugin("echo-plugin"));
        tools.load().await.unwrap();

        assert!(tools.has_task("echo-plugin:echo"));
        assert_eq!(tools.plugin_options("echo-plugin"), Some(&json!({"normalized": true})));

        let task = tools.create_task("echo-plugin:echo").unwrap();
        let output = task.run(&tools.task_context(), &TaskArgs::default()).await.unwrap();
        assert!(matches!(output, TaskOutput::Inspected(value) if value == json!("echo")));

        assert!(matches!(tools.load().await, Err(AedrisError::AlreadyLoaded)));
    }
}
