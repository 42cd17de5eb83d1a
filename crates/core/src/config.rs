//! Project configuration loading and normalization.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AedrisError, Result};
use crate::path::{clean_path, join_clean};

/// File name looked up when no config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "aedris.config.json";

/// Output directory used when the config does not name one.
pub const DEFAULT_OUTPUT_DIR: &str = "./dist";

/// Public asset path given to application configs.
pub const DEFAULT_PUBLIC_PATH: &str = "/_/res/";

/// The project configuration, before or after normalization.
///
/// Unknown top-level keys are kept in [`extra`](Self::extra) so plugins can
/// read settings the core does not know about.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Set once the config went through [`normalize_config`].
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub aedris_normalized: bool,

    /// Library build shape instead of an application.
    #[serde(default)]
    pub is_plugin: bool,

    /// Resolution base for every relative path. Empty means unset.
    #[serde(default, skip_serializing_if = "path_is_empty")]
    pub root_dir: PathBuf,

    /// Output directory. Empty means unset.
    #[serde(default, skip_serializing_if = "path_is_empty")]
    pub output_dir: PathBuf,

    /// Plugin references in load order.
    #[serde(default, deserialize_with = "lenient_plugins")]
    pub plugins: Vec<String>,

    /// Options keyed by plugin name. Local plugins are keyed by absolute path
    /// once normalized.
    #[serde(default, deserialize_with = "lenient_options")]
    pub options: BTreeMap<String, Value>,

    /// Public asset path, only for application configs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_path: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn path_is_empty(path: &Path) -> bool {
    path.as_os_str().is_empty()
}

fn lenient_plugins<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(reference) => Some(reference),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_options<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    })
}

impl ProjectConfig {
    /// Creates an empty config rooted at `root_dir`.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Marks the config as a library build.
    pub fn with_plugin_shape(mut self, is_plugin: bool) -> Self {
        self.is_plugin = is_plugin;
        self
    }

    /// Sets the output directory.
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// Appends a plugin reference.
    pub fn with_plugin(mut self, reference: impl Into<String>) -> Self {
        self.plugins.push(reference.into());
        self
    }

    /// Sets the options slice of one plugin.
    pub fn with_options(mut self, plugin: impl Into<String>, options: Value) -> Self {
        self.options.insert(plugin.into(), options);
        self
    }

    /// Returns true if the root directory was given.
    pub fn has_root_dir(&self) -> bool {
        !path_is_empty(&self.root_dir)
    }

    /// Returns the options slice of one plugin.
    pub fn plugin_options(&self, plugin: &str) -> Option<&Value> {
        self.options.get(plugin)
    }

    /// Returns the absolute output directory of a normalized config.
    pub fn output_path(&self) -> PathBuf {
        join_clean(&self.root_dir, &self.output_dir)
    }
}

/// Resolves `candidate` against `root`.
///
/// Absolute candidates pass through with a warning, since they make the
/// project harder to move.
pub fn resolve_path(root: &Path, candidate: &Path, property: &str) -> PathBuf {
    if candidate.is_absolute() {
        warn!(
            target: "aedris::config",
            property,
            path = %candidate.display(),
            "absolute path in config, prefer a path relative to the config file for portability"
        );
        return clean_path(candidate);
    }

    clean_path(&root.join(candidate))
}

/// Returns a normalized copy of `raw`.
///
/// A config that already carries the normalization marker is returned as is.
/// A relative `base_dir` is anchored at the current directory, so every path
/// in the result is absolute.
pub fn normalize_config(base_dir: &Path, raw: &ProjectConfig) -> ProjectConfig {
    let mut config = raw.clone();
    if config.aedris_normalized {
        return config;
    }

    let base_dir = std::path::absolute(base_dir).unwrap_or_else(|_| base_dir.to_path_buf());
    let base_dir = base_dir.as_path();

    let root_dir = if config.has_root_dir() {
        resolve_path(base_dir, &config.root_dir, "rootDir")
    } else {
        clean_path(base_dir)
    };

    let output_dir = if path_is_empty(&config.output_dir) {
        PathBuf::from(DEFAULT_OUTPUT_DIR)
    } else {
        config.output_dir.clone()
    };
    config.output_dir = resolve_path(&root_dir, &output_dir, "outputDir");
    config.options = std::mem::take(&mut config.options)
        .into_iter()
        .map(|(name, options)| {
            if name.starts_with('.') {
                (join_clean(&root_dir, Path::new(&name)).display().to_string(), options)
            } else {
                (name, options)
            }
        })
        .collect();
    config.root_dir = root_dir;

    if !config.is_plugin && config.public_path.is_none() {
        config.public_path = Some(DEFAULT_PUBLIC_PATH.to_string());
    }

    config.aedris_normalized = true;
    config
}

/// Where a [`ConfigHandler`] takes its config from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// A config file on disk.
    Path(PathBuf),

    /// An in-memory config. It must carry a root directory.
    Object(ProjectConfig),
}

/// Loads and normalizes the project configuration.
#[derive(Debug, Clone)]
pub struct ConfigHandler {
    source: ConfigSource,
    config: Option<ProjectConfig>,
}

impl ConfigHandler {
    /// Creates a handler for the given source.
    pub fn new(source: ConfigSource) -> Self {
        Self {
            source,
            config: None,
        }
    }

    /// Creates a handler from optional inputs. An object wins over a path.
    pub fn from_options(config_path: Option<PathBuf>, config: Option<ProjectConfig>) -> Result<Self> {
        let source = match (config, config_path) {
            (Some(config), _) => ConfigSource::Object(config),
            (None, Some(path)) => ConfigSource::Path(path),
            (None, None) => return Err(AedrisError::MissingConfigSource),
        };

        Ok(Self::new(source))
    }

    /// Loads the config from its source and normalizes it.
    pub async fn load_config(&mut self) -> Result<&ProjectConfig> {
        let config = match &self.source {
            ConfigSource::Object(raw) => {
                if !raw.has_root_dir() {
                    return Err(AedrisError::MissingRootDir);
                }
                normalize_config(&absolute(Path::new("."))?, raw)
            }
            ConfigSource::Path(path) => {
                let path = absolute(path)?;
                let raw = read_config_file(&path).await?;
                let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
                normalize_config(&base_dir, &raw)
            }
        };

        debug!(
            target: "aedris::config",
            root_dir = %config.root_dir.display(),
            plugins = config.plugins.len(),
            "config loaded"
        );

        Ok(self.config.insert(config))
    }

    /// The loaded config, if [`load_config`](Self::load_config) succeeded.
    pub fn config(&self) -> Option<&ProjectConfig> {
        self.config.as_ref()
    }

    pub fn config_mut(&mut self) -> Option<&mut ProjectConfig> {
        self.config.as_mut()
    }

    /// Replaces the loaded config wholesale.
    pub fn set_config(&mut self, config: ProjectConfig) {
        self.config = Some(config);
    }

    /// Takes the loaded config out of the handler.
    pub fn into_config(self) -> Option<ProjectConfig> {
        self.config
    }

    /// The config file path, if the config came from disk.
    pub fn config_path(&self) -> Option<&Path> {
        match &self.source {
            ConfigSource::Path(path) => Some(path),
            ConfigSource::Object(_) => None,
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(clean_path(path))
    } else {
        Ok(clean_path(&std::env::current_dir()?.join(path)))
    }
}

/// Reads a raw, unnormalized config file.
///
/// `.toml` files are parsed as TOML, anything else as JSON. The document must
/// be an object.
pub async fn read_config_file(path: &Path) -> Result<ProjectConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => AedrisError::ConfigNotFound(path.to_path_buf()),
            _ => AedrisError::FileRead {
                path: path.to_path_buf(),
                source,
            },
        })?;

    let parse_error = |message: String| AedrisError::ConfigParse {
        path: path.to_path_buf(),
        message,
    };

    let value: Value = if path.extension().is_some_and(|ext| ext == "toml") {
        let table: toml::Value = toml::from_str(&content).map_err(|e| parse_error(e.to_string()))?;
        serde_json::to_value(table).map_err(|e| parse_error(e.to_string()))?
    } else {
        serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?
    };

    if !value.is_object() {
        return Err(AedrisError::ConfigNotObject(path.to_path_buf()));
    }

    serde_json::from_value(value).map_err(|e| parse_error(e.to_string()))
}
