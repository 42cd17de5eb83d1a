//! Shared table of generated modules handed to the compiler.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Serialize, Serializer};

/// Generated source files the compiler treats as if they were on disk.
///
/// Clones share the same table, so a handle kept by a target sees every
/// module written through the compiler config and the other way round.
#[derive(Clone, Default)]
pub struct VirtualModules {
    modules: Arc<Mutex<BTreeMap<PathBuf, String>>>,
}

impl VirtualModules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes or replaces a module.
    pub fn write_module(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.modules.lock().insert(path.into(), contents.into());
    }

    /// Returns the contents of a module.
    pub fn get(&self, path: &Path) -> Option<String> {
        self.modules.lock().get(path).cloned()
    }

    /// Copies the current table.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, String> {
        self.modules.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.modules.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.lock().is_empty()
    }

    /// Returns true if both handles share one table.
    pub fn same_table(&self, other: &VirtualModules) -> bool {
        Arc::ptr_eq(&self.modules, &other.modules)
    }
}

impl fmt::Debug for VirtualModules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualModules")
            .field("paths", &self.modules.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Serialize for VirtualModules {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}
