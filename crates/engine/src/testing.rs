//! Test doubles shared by the engine's unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use aedris_core::path::{clean_path, is_local_reference};
use aedris_core::{BuildEnvironment, ProjectConfig, Result};
use aedris_plugin::{PluginLoader, PluginResolver};
use async_trait::async_trait;

use crate::builder::{Builder, BuilderOptions, BuilderServices};
use crate::chain::CompilerConfig;
use crate::compiler::{CompilationStats, Compiler, CompilerFactory, TargetCompilerHandle, TargetStats};
use crate::plugin::{BuildPlugin, SharedPlugin};
use crate::target::TargetOptions;

/// Local references resolve against the first root, packages to `/modules/<name>`.
pub(crate) struct TestResolver;

impl PluginResolver for TestResolver {
    fn resolve(&self, reference: &str, search_roots: &[PathBuf]) -> Result<PathBuf> {
        if is_local_reference(reference) {
            let root = search_roots.first().cloned().unwrap_or_default();
            Ok(clean_path(&root.join(reference)))
        } else {
            Ok(package_path(reference))
        }
    }
}

fn package_path(name: &str) -> PathBuf {
    PathBuf::from("/modules").join(name)
}

type Factory = Arc<dyn Fn() -> SharedPlugin + Send + Sync>;

/// Plugins keyed by resolved path. Unknown paths load as `None`.
#[derive(Clone, Default)]
pub(crate) struct TestCatalog {
    plugins: HashMap<PathBuf, Factory>,
}

impl TestCatalog {
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> SharedPlugin + Send + Sync + 'static,
    {
        self.plugins.insert(package_path(name), Arc::new(factory));
    }

    pub fn register_path<F>(&mut self, path: impl AsRef<Path>, factory: F)
    where
        F: Fn() -> SharedPlugin + Send + Sync + 'static,
    {
        self.plugins.insert(clean_path(path.as_ref()), Arc::new(factory));
    }
}

#[async_trait]
impl PluginLoader<SharedPlugin> for TestCatalog {
    async fn load(&self, path: &Path) -> Result<Option<SharedPlugin>> {
        Ok(self.plugins.get(&clean_path(path)).map(|factory| factory()))
    }
}

/// Records the targets of every compiler it creates.
#[derive(Default)]
pub(crate) struct RecordingCompilerFactory {
    pub created: Mutex<Vec<Vec<String>>>,
}

impl CompilerFactory for RecordingCompilerFactory {
    fn create(&self, configs: Vec<CompilerConfig>) -> Result<Arc<dyn Compiler>> {
        let names: Vec<String> = configs.iter().map(|c| c.name.clone()).collect();
        self.created.lock().unwrap().push(names.clone());
        Ok(Arc::new(SucceedingCompiler { names }))
    }
}

struct SucceedingCompiler {
    names: Vec<String>,
}

#[async_trait]
impl Compiler for SucceedingCompiler {
    async fn run(&self) -> Result<CompilationStats> {
        Ok(CompilationStats {
            targets: self.names.iter().map(TargetStats::succeeded).collect(),
            duration_ms: 0,
        })
    }

    fn target_handles(&self) -> Vec<TargetCompilerHandle> {
        self.names
            .iter()
            .enumerate()
            .map(|(index, name)| TargetCompilerHandle::new(index, name))
            .collect()
    }
}

pub(crate) struct TestEnv {
    pub catalog: TestCatalog,
    pub compiler: Arc<RecordingCompilerFactory>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            catalog: TestCatalog::default(),
            compiler: Arc::new(RecordingCompilerFactory::default()),
        }
    }

    pub fn services(&self) -> BuilderServices {
        BuilderServices::new(
            Arc::new(TestResolver),
            Arc::new(self.catalog.clone()),
            self.compiler.clone(),
        )
    }

    /// A builder for `config` that only simulates cleaning.
    pub fn builder(&self, config: ProjectConfig) -> Builder {
        let options = BuilderOptions::from_config(config)
            .with_env(BuildEnvironment::development().with_simulate(true));
        Builder::new(options, self.services()).unwrap()
    }
}

pub(crate) fn node_target(name: &str) -> TargetOptions {
    TargetOptions::new(name)
        .with_context("node")
        .with_entry("main", ["./src/index.ts"])
}

/// A plugin registering one node target.
pub(crate) fn registers_target(name: &str) -> BuildPlugin {
    let name = name.to_string();
    BuildPlugin::new(format!("targets:{name}")).with_hook_build(move |builder| {
        let name = name.clone();
        builder.hooks.register_targets.tap("targets", move |b| {
            let name = name.clone();
            Box::pin(async move {
                b.create_target(node_target(&name)).await?;
                Ok(())
            })
        });
        Box::pin(async { Ok(()) })
    })
}
