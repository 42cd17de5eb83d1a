//! Capabilities the plugin manager uses to find and load plugins.

use std::path::{Path, PathBuf};

use aedris_core::path::{clean_path, is_local_reference};
use aedris_core::{AedrisError, Result};
use async_trait::async_trait;
use tracing::trace;

use crate::manifest::PluginManifest;

/// Turns a plugin reference into an absolute path.
pub trait PluginResolver: Send + Sync {
    /// Resolves `reference` using `search_roots` as starting points.
    fn resolve(&self, reference: &str, search_roots: &[PathBuf]) -> Result<PathBuf>;
}

/// Loads the plugin value found at a resolved path.
#[async_trait]
pub trait PluginLoader<P>: Send + Sync {
    /// Returns `None` when the module exists but exports no plugin.
    async fn load(&self, path: &Path) -> Result<Option<P>>;
}

/// Resolves plugin references against the filesystem the way Node does.
///
/// Local references (`./x`, `../x`, `/x`) are joined onto each search root.
/// Package references are looked up in `node_modules` of each search root and
/// its ancestors, and the package directory must contain a plugin manifest.
#[derive(Debug, Clone, Default)]
pub struct FsPluginResolver;

impl FsPluginResolver {
    pub fn new() -> Self {
        Self
    }

    fn resolve_local(&self, reference: &str, search_roots: &[PathBuf]) -> Option<PathBuf> {
        let reference = Path::new(reference);
        if reference.is_absolute() {
            let candidate = clean_path(reference);
            return candidate.exists().then_some(candidate);
        }

        search_roots
            .iter()
            .map(|root| clean_path(&search_dir(root).join(reference)))
            .find(|candidate| candidate.exists())
    }

    fn resolve_package(&self, name: &str, search_roots: &[PathBuf]) -> Option<PathBuf> {
        for root in search_roots {
            for dir in search_dir(root).ancestors() {
                let candidate = dir.join("node_modules").join(name);
                trace!(target: "aedris::resolver", candidate = %candidate.display(), "probing");

                if PluginManifest::path_in(&candidate).is_file() {
                    return Some(clean_path(&candidate));
                }
            }
        }

        None
    }
}

/// Search roots may be plugin files; lookups start from their directory.
fn search_dir(root: &Path) -> &Path {
    if root.is_file() {
        root.parent().unwrap_or(root)
    } else {
        root
    }
}

impl PluginResolver for FsPluginResolver {
    fn resolve(&self, reference: &str, search_roots: &[PathBuf]) -> Result<PathBuf> {
        let resolved = if is_local_reference(reference) {
            self.resolve_local(reference, search_roots)
        } else {
            self.resolve_package(reference, search_roots)
        };

        resolved.ok_or_else(|| AedrisError::PluginResolve {
            reference: reference.to_string(),
            message: format!(
                "not found from {}",
                search_roots
                    .iter()
                    .map(|root| root.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_package(dir: &Path, name: &str) -> PathBuf {
        let package = dir.join("node_modules").join(name);
        fs::create_dir_all(&package).unwrap();
        fs::write(
            PluginManifest::path_in(&package),
            PluginManifest::minimal(name, "1.0.0").to_json().unwrap(),
        )
        .unwrap();
        package
    }

    #[test]
    fn test_resolve_local_reference() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("plugin.js"), "").unwrap();

        let resolver = FsPluginResolver::new();
        let roots = vec![dir.path().to_path_buf()];

        let a = resolver.resolve("./plugin.js", &roots).unwrap();
        let b = resolver.resolve("./sub/../plugin.js", &roots).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, clean_path(&dir.path().join("plugin.js")));

        let absolute = resolver.resolve(a.to_str().unwrap(), &[]).unwrap();
        assert_eq!(absolute, a);
    }

    #[test]
    fn test_resolve_missing_local_reference() {
        let dir = TempDir::new().unwrap();
        let err = FsPluginResolver::new()
            .resolve("./missing.js", &[dir.path().to_path_buf()])
            .unwrap_err();
        assert!(matches!(err, AedrisError::PluginResolve { .. }));
    }

    #[test]
    fn test_resolve_package_from_ancestor() {
        let dir = TempDir::new().unwrap();
        let package = write_package(dir.path(), "@aedris/plugin-node");
        let nested = dir.path().join("apps").join("web");
        fs::create_dir_all(&nested).unwrap();

        let resolved = FsPluginResolver::new()
            .resolve("@aedris/plugin-node", &[nested])
            .unwrap();
        assert_eq!(resolved, clean_path(&package));
    }

    #[test]
    fn test_resolve_package_from_plugin_file_root() {
        let dir = TempDir::new().unwrap();
        let owner = write_package(dir.path(), "owner");
        let dependency = write_package(&owner, "dependency");
        let owner_entry = owner.join("index.js");
        fs::write(&owner_entry, "").unwrap();

        let resolved = FsPluginResolver::new()
            .resolve("dependency", &[owner_entry])
            .unwrap();
        assert_eq!(resolved, clean_path(&dependency));
    }

    #[test]
    fn test_package_without_manifest_is_not_a_plugin() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("node_modules").join("lodash")).unwrap();

        let result = FsPluginResolver::new().resolve("lodash", &[dir.path().to_path_buf()]);
        assert!(result.is_err());
    }
}
