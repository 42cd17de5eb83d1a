//! In-process plugin loader backed by registered factories.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aedris_core::path::clean_path;
use aedris_core::{AedrisError, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::manifest::PluginManifest;
use crate::source::PluginLoader;

type Factory<P> = Arc<dyn Fn() -> P + Send + Sync>;

/// Maps plugin names and paths to the plugins compiled into this binary.
///
/// A resolved path is looked up directly first. Otherwise the manifest in the
/// resolved package directory names the plugin. Packages whose manifest says
/// `"build": false` load as `None`.
pub struct PluginCatalog<P> {
    by_name: HashMap<String, Factory<P>>,
    by_path: HashMap<PathBuf, Factory<P>>,
}

impl<P> PluginCatalog<P> {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            by_path: HashMap::new(),
        }
    }

    /// Registers a plugin under its package name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> P + Send + Sync + 'static,
    {
        self.by_name.insert(name.into(), Arc::new(factory));
    }

    /// Registers a plugin under an absolute path.
    pub fn register_path<F>(&mut self, path: impl AsRef<Path>, factory: F)
    where
        F: Fn() -> P + Send + Sync + 'static,
    {
        self.by_path.insert(clean_path(path.as_ref()), Arc::new(factory));
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    /// Returns true if a plugin is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Returns the registered plugin names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn lookup(&self, path: &Path) -> Result<Option<P>> {
        if let Some(factory) = self.by_path.get(&clean_path(path)) {
            return Ok(Some(factory()));
        }

        let manifest = if path.is_dir() {
            PluginManifest::from_package_dir(path)?
        } else {
            None
        };

        let Some(manifest) = manifest else {
            return Err(AedrisError::PluginLoad {
                path: path.to_path_buf(),
                reason: "no plugin is registered for this path".to_string(),
            });
        };

        if !manifest.build {
            debug!(target: "aedris::catalog", name = %manifest.name, "runtime-only package");
            return Ok(None);
        }

        match self.by_name.get(&manifest.name) {
            Some(factory) => Ok(Some(factory())),
            None => Err(AedrisError::PluginLoad {
                path: path.to_path_buf(),
                reason: format!("plugin {:?} is not built into this binary", manifest.name),
            }),
        }
    }
}

impl<P> Default for PluginCatalog<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for PluginCatalog<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("names", &self.names())
            .field("paths", &self.by_path.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl<P: Send + 'static> PluginLoader<P> for PluginCatalog<P> {
    async fn load(&self, path: &Path) -> Result<Option<P>> {
        self.lookup(path)
    }
}
