//! Plugin package manifest (`aedris-plugin.json`).

use std::path::{Path, PathBuf};

use aedris_core::{AedrisError, Result};
use serde::{Deserialize, Serialize};

/// File name of the manifest inside a plugin package directory.
pub const MANIFEST_FILE: &str = "aedris-plugin.json";

/// Metadata describing a plugin package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Package name, also the plugin's canonical name.
    pub name: String,

    /// Package version.
    pub version: String,

    /// Plugin description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Whether the package ships a build-time plugin.
    #[serde(default = "default_build")]
    pub build: bool,

    /// Entry path of the runtime plugin, relative to the package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
}

fn default_build() -> bool {
    true
}

impl PluginManifest {
    /// Path of the manifest for a package directory.
    pub fn path_in(package_dir: &Path) -> PathBuf {
        package_dir.join(MANIFEST_FILE)
    }

    /// Loads a manifest from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| AedrisError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Loads the manifest of a package directory, if it has one.
    pub fn from_package_dir(package_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path_in(package_dir);
        if !path.is_file() {
            return Ok(None);
        }
        Self::from_file(&path).map(Some)
    }

    /// Parses a manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| AedrisError::Manifest(e.to_string()))
    }

    /// Converts the manifest to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| AedrisError::Manifest(e.to_string()))
    }

    /// Creates a minimal manifest with just name and version.
    pub fn minimal(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            build: true,
            runtime: None,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the runtime entry.
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }

    /// Marks the package as runtime-only.
    pub fn runtime_only(mut self) -> Self {
        self.build = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_manifest() {
        let json = r#"{
            "name": "@aedris/plugin-koa",
            "version": "1.0.0",
            "description": "Koa server plugin",
            "runtime": "./dist/runtime/index.js"
        }"#;

        let manifest = PluginManifest::from_json(json).unwrap();
        assert_eq!(manifest.name, "@aedris/plugin-koa");
        assert_eq!(manifest.version, "1.0.0");
        assert!(manifest.build);
        assert_eq!(manifest.runtime.as_deref(), Some("./dist/runtime/index.js"));
    }

    #[test]
    fn test_runtime_only_manifest() {
        let manifest = PluginManifest::from_json(r#"{"name": "x", "version": "0.1.0", "build": false}"#).unwrap();
        assert!(!manifest.build);
    }

    #[test]
    fn test_invalid_manifest() {
        let err = PluginManifest::from_json(r#"{"version": "1.0.0"}"#).unwrap_err();
        assert!(matches!(err, AedrisError::Manifest(_)));
    }

    #[test]
    fn test_serialize_manifest() {
        let manifest = PluginManifest::minimal("test", "1.0.0").with_description("demo");
        let json = manifest.to_json().unwrap();
        assert!(json.contains("\"name\": \"test\""));
        assert!(json.contains("\"description\": \"demo\""));
        assert!(!json.contains("runtime"));
    }

    #[test]
    fn test_from_package_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(PluginManifest::from_package_dir(dir.path()).unwrap(), None);

        let manifest = PluginManifest::minimal("pkg", "2.0.0").runtime_only();
        std::fs::write(PluginManifest::path_in(dir.path()), manifest.to_json().unwrap()).unwrap();

        assert_eq!(PluginManifest::from_package_dir(dir.path()).unwrap(), Some(manifest));
    }
}
