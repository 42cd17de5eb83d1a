//! Chainable compiler configuration and its finalized form.

use std::collections::BTreeMap;
use std::path::PathBuf;

use aedris_core::Mode;
use serde::Serialize;
use serde_json::Value;

use crate::externals::ExternalsResolver;
use crate::virtual_modules::VirtualModules;

/// Key under which a raw externals value would be set.
pub const EXTERNALS_KEY: &str = "externals";

/// Output settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    pub path: PathBuf,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_target: Option<String>,
}

/// Module resolution settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolveConfig {
    pub extensions: Vec<String>,
    pub alias: BTreeMap<String, PathBuf>,
}

/// Loader resolution settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolveLoaderConfig {
    pub modules: Vec<PathBuf>,
}

/// Size hints emitted by the compiler.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_entrypoint_size: Option<u64>,
}

/// A named module rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleRule {
    pub name: String,

    /// Regular expression matched against module paths.
    pub test: String,

    /// Loaders applied, last one first.
    #[serde(rename = "use")]
    pub loaders: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
}

impl ModuleRule {
    pub fn new(name: impl Into<String>, test: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            test: test.into(),
            loaders: Vec::new(),
            exclude: None,
        }
    }

    pub fn with_loader(mut self, loader: impl Into<String>) -> Self {
        self.loaders.push(loader.into());
        self
    }

    pub fn with_exclude(mut self, exclude: impl Into<String>) -> Self {
        self.exclude = Some(exclude.into());
        self
    }
}

/// A compiler plugin entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CompilerPlugin {
    /// The generated module table. Every target needs exactly one.
    VirtualModules(VirtualModules),

    /// Any other plugin, identified by name and configured with options.
    Named { name: String, options: Value },
}

impl CompilerPlugin {
    pub fn named(name: impl Into<String>, options: Value) -> Self {
        CompilerPlugin::Named {
            name: name.into(),
            options,
        }
    }
}

/// Mutable compiler configuration that contexts and plugins edit in turn.
#[derive(Debug, Clone, Default)]
pub struct ChainConfig {
    pub mode: Mode,
    pub context: PathBuf,
    pub target: Option<String>,
    pub devtool: Option<String>,
    pub entry: BTreeMap<String, Vec<String>>,
    pub output: OutputConfig,
    pub resolve: ResolveConfig,
    pub resolve_loader: ResolveLoaderConfig,
    pub performance: PerformanceConfig,
    rules: Vec<ModuleRule>,
    plugins: Vec<(String, CompilerPlugin)>,
    extra: BTreeMap<String, Value>,
}

impl ChainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a top-level key that has no dedicated field.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Returns true if a top-level key without a dedicated field is set.
    pub fn has(&self, key: &str) -> bool {
        self.extra.contains_key(key)
    }

    pub fn delete(&mut self, key: &str) -> Option<Value> {
        self.extra.remove(key)
    }

    /// Sets externals directly on the config.
    ///
    /// Targets reject configs carrying this key; contributors belong on
    /// [`ExternalsHook`](crate::externals::ExternalsHook).
    pub fn set_externals(&mut self, value: Value) -> &mut Self {
        self.set(EXTERNALS_KEY, value)
    }

    /// Adds or replaces a rule by name.
    pub fn rule(&mut self, rule: ModuleRule) -> &mut Self {
        match self.rules.iter_mut().find(|r| r.name == rule.name) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
        self
    }

    pub fn rule_mut(&mut self, name: &str) -> Option<&mut ModuleRule> {
        self.rules.iter_mut().find(|r| r.name == name)
    }

    pub fn rules(&self) -> &[ModuleRule] {
        &self.rules
    }

    /// Adds or replaces a plugin under `key`.
    pub fn plugin(&mut self, key: impl Into<String>, plugin: CompilerPlugin) -> &mut Self {
        let key = key.into();
        match self.plugins.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = plugin,
            None => self.plugins.push((key, plugin)),
        }
        self
    }

    pub fn has_plugin(&self, key: &str) -> bool {
        self.plugins.iter().any(|(k, _)| k == key)
    }

    pub fn remove_plugin(&mut self, key: &str) -> Option<CompilerPlugin> {
        let index = self.plugins.iter().position(|(k, _)| k == key)?;
        Some(self.plugins.remove(index).1)
    }

    /// Plugin keys in order.
    pub fn plugin_keys(&self) -> Vec<&str> {
        self.plugins.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Finalizes the config for the compiler.
    pub fn into_config(self, name: impl Into<String>, externals: ExternalsResolver) -> CompilerConfig {
        CompilerConfig {
            name: name.into(),
            mode: self.mode,
            context: self.context,
            target: self.target,
            devtool: self.devtool,
            entry: self.entry,
            output: self.output,
            resolve: self.resolve,
            resolve_loader: self.resolve_loader,
            module: ModuleConfig { rules: self.rules },
            performance: self.performance,
            plugins: self.plugins.into_iter().map(|(_, plugin)| plugin).collect(),
            externals,
            extra: self.extra,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModuleConfig {
    pub rules: Vec<ModuleRule>,
}

/// Finalized configuration of one target, as handed to the compiler.
///
/// `externals` is a live resolver and is not part of the serialized form.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerConfig {
    pub name: String,
    pub mode: Mode,
    pub context: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devtool: Option<String>,
    pub entry: BTreeMap<String, Vec<String>>,
    pub output: OutputConfig,
    pub resolve: ResolveConfig,
    pub resolve_loader: ResolveLoaderConfig,
    pub module: ModuleConfig,
    pub performance: PerformanceConfig,
    pub plugins: Vec<CompilerPlugin>,
    #[serde(skip)]
    pub externals: ExternalsResolver,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CompilerConfig {
    /// The virtual module table among the plugins, if there is one.
    pub fn virtual_modules(&self) -> Option<&VirtualModules> {
        self.plugins.iter().find_map(|plugin| match plugin {
            CompilerPlugin::VirtualModules(modules) => Some(modules),
            CompilerPlugin::Named { .. } => None,
        })
    }
}
