//! Standard tasks: build and clean.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use aedris_core::{AsyncSeriesHook, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use crate::builder::{Builder, BuilderOptions, BuilderServices};
use crate::compiler::CompilationStats;
use crate::local_plugins::add_local_plugin_support;
use crate::target::TargetOptions;
use crate::watch::WatchOptions;

pub const BUILD_TASK: &str = "@aedris/build-tools:build";
pub const CLEAN_TASK: &str = "@aedris/build-tools:clean";

/// Build script compiled for plugin packages that have one.
pub const BUILD_SCRIPT: &str = "lib/build.ts";
pub const BUILD_SCRIPT_TARGET: &str = "@aedris/build-tools:BuildTask/build-build-script";

type Shutdown = Pin<Box<dyn Future<Output = ()> + Send>>;
type ShutdownFactory = Arc<dyn Fn() -> Shutdown + Send + Sync>;
type BuildObserver = Arc<dyn Fn(&Result<CompilationStats>) + Send + Sync>;

/// Shared inputs of every task.
#[derive(Clone)]
pub struct TaskContext {
    pub options: BuilderOptions,
    pub services: BuilderServices,
    shutdown: ShutdownFactory,
    on_build: Option<BuildObserver>,
}

impl TaskContext {
    /// A context whose watch mode stops on Ctrl-C.
    pub fn new(options: BuilderOptions, services: BuilderServices) -> Self {
        Self {
            options,
            services,
            shutdown: Arc::new(|| {
                Box::pin(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
            }),
            on_build: None,
        }
    }

    /// Replaces what ends watch mode.
    pub fn with_shutdown<F, Fut>(mut self, shutdown: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.shutdown = Arc::new(move || Box::pin(shutdown()));
        self
    }

    /// Observes every compilation in watch mode.
    pub fn with_build_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&Result<CompilationStats>) + Send + Sync + 'static,
    {
        self.on_build = Some(Arc::new(observer));
        self
    }

    /// A builder for the context's project.
    pub fn builder(&self) -> Result<Builder> {
        Builder::new(self.options.clone(), self.services.clone())
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Flags understood by the standard tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskArgs {
    pub watch: bool,
    pub print_config: bool,
    pub print_compiler_config: bool,
}

/// What a task produced.
#[derive(Debug)]
pub enum TaskOutput {
    Built(CompilationStats),
    Cleaned(Vec<PathBuf>),

    /// Requested configuration dumps.
    Inspected(Value),

    /// Watch mode ended.
    Watched,
}

#[async_trait]
pub trait Task: Send + Sync {
    /// One line shown in task listings.
    fn description(&self) -> &str;

    async fn run(&self, context: &TaskContext, args: &TaskArgs) -> Result<TaskOutput>;
}

/// Compiles the `lib/build.ts` script of plugin packages.
pub fn add_standard_targets(builder: &mut Builder) {
    builder.hooks.register_targets.tap("build-script", |b| {
        Box::pin(async move {
            let script = b.config().root_dir.join(BUILD_SCRIPT);
            let exists = tokio::fs::try_exists(&script).await.unwrap_or(false);

            if b.config().is_plugin && exists {
                b.create_target(
                    TargetOptions::new(BUILD_SCRIPT_TARGET)
                        .with_context("node")
                        .with_entry("build", [format!("./{BUILD_SCRIPT}")])
                        .with_output_dir("./"),
                )
                .await?;
            }
            Ok(())
        })
    });
}

/// Builds every target once, or keeps rebuilding in watch mode.
#[derive(Default)]
pub struct BuildTask {
    /// Runs after the builder is created and before it loads.
    pub builder_created: AsyncSeriesHook<Builder>,
}

impl BuildTask {
    pub fn new() -> Self {
        Self::default()
    }

    fn inspect(builder: &Builder, args: &TaskArgs) -> Result<Value> {
        let mut report = serde_json::Map::new();

        if args.print_config {
            report.insert("config".to_string(), serde_json::to_value(builder.config())?);
        }

        if args.print_compiler_config {
            let targets = builder
                .targets()
                .iter()
                .map(|target| -> Result<Value> {
                    Ok(json!({
                        "name": target.name(),
                        "config": serde_json::to_value(target.compiler_config())?,
                    }))
                })
                .collect::<Result<Vec<_>>>()?;
            report.insert("targets".to_string(), Value::Array(targets));
        }

        Ok(Value::Object(report))
    }
}

#[async_trait]
impl Task for BuildTask {
    fn description(&self) -> &str {
        "Build every target of the project"
    }

    async fn run(&self, context: &TaskContext, args: &TaskArgs) -> Result<TaskOutput> {
        let mut builder = context.builder()?;
        add_standard_targets(&mut builder);
        add_local_plugin_support(&mut builder);

        self.builder_created.call(&mut builder).await?;
        builder.load().await?;

        if args.print_config || args.print_compiler_config {
            return Ok(TaskOutput::Inspected(Self::inspect(&builder, args)?));
        }

        if args.watch {
            let on_build = context.on_build.clone();
            builder
                .watch(WatchOptions::default(), (context.shutdown)(), move |result| {
                    if let Some(observer) = &on_build {
                        observer(result);
                    }
                })
                .await?;
            return Ok(TaskOutput::Watched);
        }

        let stats = builder.build().await?;
        info!(target: "aedris::tasks", success = stats.success(), duration_ms = stats.duration_ms, "build finished");
        Ok(TaskOutput::Built(stats))
    }
}

/// Removes every output directory.
#[derive(Default)]
pub struct CleanTask {
    pub builder_created: AsyncSeriesHook<Builder>,
}

impl CleanTask {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Task for CleanTask {
    fn description(&self) -> &str {
        "Remove build outputs"
    }

    async fn run(&self, context: &TaskContext, _args: &TaskArgs) -> Result<TaskOutput> {
        let mut builder = context.builder()?;
        add_local_plugin_support(&mut builder);

        self.builder_created.call(&mut builder).await?;
        builder.load().await?;

        let removed = builder.clean().await?;
        Ok(TaskOutput::Cleaned(removed))
    }
}
