//! Contract of the external bundler.

use std::sync::Arc;

use aedris_core::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::chain::CompilerConfig;

/// Outcome of compiling one target.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStats {
    pub name: String,
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

impl TargetStats {
    pub fn succeeded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: false,
            errors: vec![error.into()],
            ..Self::default()
        }
    }
}

/// Outcome of one compiler run over every target.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationStats {
    pub targets: Vec<TargetStats>,
    pub duration_ms: u64,
}

impl CompilationStats {
    /// True if every target compiled.
    pub fn success(&self) -> bool {
        self.targets.iter().all(|t| t.success)
    }

    pub fn has_errors(&self) -> bool {
        self.targets.iter().any(|t| !t.errors.is_empty())
    }

    pub fn has_warnings(&self) -> bool {
        self.targets.iter().any(|t| !t.warnings.is_empty())
    }

    pub fn target(&self, name: &str) -> Option<&TargetStats> {
        self.targets.iter().find(|t| t.name == name)
    }
}

/// The part of a multi-target compiler that belongs to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetCompilerHandle {
    pub index: usize,
    pub name: String,
}

impl TargetCompilerHandle {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

/// A compiler built from every target's finalized config.
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compiles every target once.
    async fn run(&self) -> Result<CompilationStats>;

    /// One handle per target, in config order.
    fn target_handles(&self) -> Vec<TargetCompilerHandle>;
}

/// Builds compilers.
pub trait CompilerFactory: Send + Sync {
    fn create(&self, configs: Vec<CompilerConfig>) -> Result<Arc<dyn Compiler>>;
}
