//! Build-time plugin contract.

use std::fmt;
use std::sync::Arc;

use aedris_core::{ProjectConfig, Result};
use aedris_plugin::PluginRegistration;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use crate::builder::Builder;
use crate::target::BuildTarget;
use crate::tools::ToolsManager;

type NormalizeOptionsFn = dyn Fn(Option<Value>, &ProjectConfig) -> Result<Value> + Send + Sync;
type HookBuildFn = dyn for<'a> Fn(&'a mut Builder) -> BoxFuture<'a, Result<()>> + Send + Sync;
type HookTargetFn = dyn for<'a> Fn(&'a mut BuildTarget) -> BoxFuture<'a, Result<()>> + Send + Sync;
type HookToolsFn = dyn for<'a> Fn(&'a mut ToolsManager) -> BoxFuture<'a, Result<()>> + Send + Sync;

/// A build-time plugin: a set of optional callbacks.
///
/// Only the callbacks a plugin sets are ever called.
#[derive(Clone, Default)]
pub struct BuildPlugin {
    name: String,
    normalize_options: Option<Arc<NormalizeOptionsFn>>,
    hook_build: Option<Arc<HookBuildFn>>,
    hook_target: Option<Arc<HookTargetFn>>,
    hook_tools: Option<Arc<HookToolsFn>>,
}

/// Plugins are shared between the registration table and the hosts.
pub type SharedPlugin = Arc<BuildPlugin>;

impl BuildPlugin {
    /// Creates a plugin without callbacks.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalizes this plugin's slice of `options`.
    pub fn with_normalize_options<F>(mut self, func: F) -> Self
    where
        F: Fn(Option<Value>, &ProjectConfig) -> Result<Value> + Send + Sync + 'static,
    {
        self.normalize_options = Some(Arc::new(func));
        self
    }

    /// Called once when the plugin is applied to a [`Builder`].
    pub fn with_hook_build<F>(mut self, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut Builder) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.hook_build = Some(Arc::new(func));
        self
    }

    /// Called for every target right after it is created.
    pub fn with_hook_target<F>(mut self, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut BuildTarget) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.hook_target = Some(Arc::new(func));
        self
    }

    /// Called once when the plugin is applied to a [`ToolsManager`].
    pub fn with_hook_tools<F>(mut self, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut ToolsManager) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.hook_tools = Some(Arc::new(func));
        self
    }

    pub fn has_normalize_options(&self) -> bool {
        self.normalize_options.is_some()
    }

    /// Wraps the plugin for registration.
    pub fn shared(self) -> SharedPlugin {
        Arc::new(self)
    }

    pub(crate) fn normalize_options(
        &self,
        options: Option<Value>,
        config: &ProjectConfig,
    ) -> Option<Result<Value>> {
        self.normalize_options
            .as_ref()
            .map(|normalize| normalize(options, config))
    }

    pub(crate) async fn hook_build(&self, builder: &mut Builder) -> Result<()> {
        match &self.hook_build {
            Some(hook) => hook(builder).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn hook_target(&self, target: &mut BuildTarget) -> Result<()> {
        match &self.hook_target {
            Some(hook) => hook(target).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn hook_tools(&self, tools: &mut ToolsManager) -> Result<()> {
        match &self.hook_tools {
            Some(hook) => hook(tools).await,
            None => Ok(()),
        }
    }
}

/// Hands every plugin its own slice of `options`, keyed by registration name.
///
/// Plugins without `normalize_options` leave their slice untouched.
pub fn normalize_plugin_options(
    mut config: ProjectConfig,
    registrations: &[PluginRegistration<SharedPlugin>],
) -> Result<ProjectConfig> {
    for registration in registrations {
        let Some(plugin) = &registration.plugin else {
            continue;
        };

        let current = config.options.get(&registration.name).cloned();
        if let Some(normalized) = plugin.normalize_options(current, &config) {
            debug!(target: "aedris::plugin", plugin = %registration.name, "normalized options");
            config.options.insert(registration.name.clone(), normalized?);
        }
    }

    Ok(config)
}

impl fmt::Debug for BuildPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildPlugin")
            .field("name", &self.name)
            .field("normalize_options", &self.normalize_options.is_some())
            .field("hook_build", &self.hook_build.is_some())
            .field("hook_target", &self.hook_target.is_some())
            .field("hook_tools", &self.hook_tools.is_some())
            .finish()
    }
}
