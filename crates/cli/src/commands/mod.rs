//! CLI command implementations.

pub mod build;
pub mod clean;
pub mod run;
pub mod tasks;

use std::path::PathBuf;
use std::sync::Arc;

use aedris_core::BuildEnvironment;
use aedris_engine::{BuilderOptions, BuilderServices, CommandCompilerFactory, SharedPlugin, ToolsManager};
use aedris_plugin::{FsPluginResolver, PluginCatalog};
use miette::{Result, miette};

/// The project a command works on.
#[derive(Debug, Clone)]
pub struct Project {
    pub config_path: PathBuf,
    pub env: BuildEnvironment,
    pub bundler: String,
    pub catalog: Arc<PluginCatalog<SharedPlugin>>,
}

impl Project {
    /// Resolver, plugin catalog and bundler used by every builder.
    pub fn services(&self) -> BuilderServices {
        BuilderServices::new(
            Arc::new(FsPluginResolver::new()),
            self.catalog.clone(),
            Arc::new(CommandCompilerFactory::new().with_bundler(&self.bundler)),
        )
    }

    pub fn options(&self) -> BuilderOptions {
        BuilderOptions::from_path(&self.config_path).with_env(self.env)
    }

    /// A loaded tools manager with every plugin task registered.
    pub async fn tools(&self) -> Result<ToolsManager> {
        let mut tools = ToolsManager::new(self.options(), self.services())
            .map_err(|e| miette!("Failed to create tools manager: {}", e))?;

        tools
            .load()
            .await
            .map_err(|e| miette!("Failed to load {}: {}", self.config_path.display(), e))?;

        Ok(tools)
    }
}
