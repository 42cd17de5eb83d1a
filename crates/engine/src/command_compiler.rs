//! Compiler that drives an external bundler executable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use aedris_core::path::join_clean;
use aedris_core::{AedrisError, Result};
use async_trait::async_trait;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info};

use crate::chain::CompilerConfig;
use crate::compiler::{CompilationStats, Compiler, CompilerFactory, TargetCompilerHandle, TargetStats};

/// Bundler looked up on `PATH` by default.
pub const DEFAULT_BUNDLER: &str = "webpack";

/// Directory, relative to the project root, that receives generated files.
pub const CACHE_DIR: &str = ".cache/aedris";

/// Creates [`CommandCompiler`]s for a bundler executable.
#[derive(Debug, Clone)]
pub struct CommandCompilerFactory {
    bundler: String,
    env: HashMap<String, String>,
}

impl CommandCompilerFactory {
    pub fn new() -> Self {
        Self {
            bundler: DEFAULT_BUNDLER.to_string(),
            env: HashMap::new(),
        }
    }

    /// Sets the bundler executable name or path.
    pub fn with_bundler(mut self, bundler: impl Into<String>) -> Self {
        self.bundler = bundler.into();
        self
    }

    /// Adds environment variables passed to the bundler.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    /// Locates the bundler executable.
    pub fn locate(&self) -> Result<PathBuf> {
        which::which(&self.bundler)
            .map_err(|e| AedrisError::Compiler(format!("bundler {:?} not found: {e}", self.bundler)))
    }
}

impl Default for CommandCompilerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl CompilerFactory for CommandCompilerFactory {
    fn create(&self, configs: Vec<CompilerConfig>) -> Result<Arc<dyn Compiler>> {
        let program = self.locate()?;
        debug!(target: "aedris::compiler", program = %program.display(), targets = configs.len(), "compiler created");

        Ok(Arc::new(CommandCompiler {
            program,
            env: self.env.clone(),
            configs,
        }))
    }
}

/// Runs the bundler once per target with a generated config file.
///
/// Virtual modules are written below the target's context directory first.
pub struct CommandCompiler {
    program: PathBuf,
    env: HashMap<String, String>,
    configs: Vec<CompilerConfig>,
}

impl CommandCompiler {
    /// Path of the config file written for a target.
    pub fn config_file(config: &CompilerConfig) -> PathBuf {
        config.context.join(CACHE_DIR).join(format!("{}.json", config.name))
    }

    async fn compile(&self, config: &CompilerConfig) -> Result<TargetStats> {
        let started = Instant::now();

        if let Some(modules) = config.virtual_modules() {
            for (path, contents) in modules.snapshot() {
                write_if_changed(&join_clean(&config.context, &path), &contents).await?;
            }
        }

        let config_file = Self::config_file(config);
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| AedrisError::Compiler(format!("cannot serialize config of {:?}: {e}", config.name)))?;
        write_if_changed(&config_file, &json).await?;

        let command = format!("{} --config {}", self.program.display(), config_file.display());
        debug!(target: "aedris::compiler", %command, "running bundler");

        let output = TokioCommand::new(&self.program)
            .arg("--config")
            .arg(&config_file)
            .current_dir(&config.context)
            .envs(&self.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AedrisError::CommandFailed {
                command,
                exit_code: None,
                stderr: Some(e.to_string()),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut stats = if output.status.success() {
            TargetStats::succeeded(&config.name)
        } else {
            let mut stats = TargetStats::failed(
                &config.name,
                format!("bundler exited with {}", output.status.code().unwrap_or(-1)),
            );
            stats.errors.extend(stderr.lines().map(str::to_string));
            stats
        };

        if output.status.success() {
            stats.warnings.extend(
                stderr
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(str::to_string),
            );
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        Ok(stats)
    }
}

#[async_trait]
impl Compiler for CommandCompiler {
    async fn run(&self) -> Result<CompilationStats> {
        let started = Instant::now();
        let mut targets = Vec::with_capacity(self.configs.len());

        for config in &self.configs {
            let stats = self.compile(config).await?;
            info!(
                target: "aedris::compiler",
                target_name = %stats.name,
                success = stats.success,
                duration_ms = stats.duration_ms,
                "target compiled"
            );
            targets.push(stats);
        }

        Ok(CompilationStats {
            targets,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn target_handles(&self) -> Vec<TargetCompilerHandle> {
        self.configs
            .iter()
            .enumerate()
            .map(|(index, config)| TargetCompilerHandle::new(index, &config.name))
            .collect()
    }
}

/// Writes `contents` unless the file already holds the same bytes.
///
/// Returns true if the file was written.
pub async fn write_if_changed(path: &Path, contents: &str) -> Result<bool> {
    if let Ok(existing) = tokio::fs::read(path).await
        && blake3::hash(&existing) == blake3::hash(contents.as_bytes())
    {
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;

    Ok(true)
}
