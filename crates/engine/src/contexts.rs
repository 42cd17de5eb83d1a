//! Base compiler policy and the built-in target contexts.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use aedris_core::Result;
use aedris_core::path::{clean_path, join_clean};
use serde_json::json;

use crate::chain::{ChainConfig, CompilerPlugin, ModuleRule};
use crate::target::BuildTarget;
use crate::virtual_modules::VirtualModules;

/// A named config extension applied to a target.
pub type ContextExtension =
    Arc<dyn Fn(ChainConfig, &BuildTarget) -> Result<ChainConfig> + Send + Sync>;

/// Contexts every target knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultContext {
    Node,
    Web,
}

impl DefaultContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefaultContext::Node => "node",
            DefaultContext::Web => "web",
        }
    }
}

impl fmt::Display for DefaultContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plugin key of the virtual module table.
pub const VIRTUAL_MODULES_PLUGIN: &str = "virtual-modules";

/// Plugin key of the error formatter.
pub const FRIENDLY_ERRORS_PLUGIN: &str = "friendly-errors";

/// Specifier prefix under which dynamic modules are aliased.
pub const DYNAMIC_MODULE_PREFIX: &str = "@aedris/dynamic";

/// The built-in context table.
pub fn default_contexts() -> BTreeMap<String, ContextExtension> {
    let mut contexts: BTreeMap<String, ContextExtension> = BTreeMap::new();
    contexts.insert(DefaultContext::Node.to_string(), Arc::new(node_context));
    contexts.insert(DefaultContext::Web.to_string(), Arc::new(web_context));
    contexts
}

/// Source map policy for a target.
pub fn devtool(target: &BuildTarget) -> &'static str {
    if target.env().is_development() {
        "eval-source-map"
    } else if target.is_server_rendering() {
        "source-map"
    } else {
        "hidden-source-map"
    }
}

/// The configuration every target starts from.
pub fn base_config(target: &BuildTarget) -> ChainConfig {
    let project = target.config();
    let mut chain = ChainConfig::new();

    chain.mode = target.env().mode;
    chain.entry = target.entry().clone();
    chain.context = project.root_dir.clone();
    chain.devtool = Some(devtool(target).to_string());

    chain.output.path = clean_path(&join_clean(&project.root_dir, &project.output_dir).join(target.output_dir()));
    chain.output.public_path = project.public_path.clone();

    chain.resolve.extensions = [".wasm", ".mjs", ".js", ".ts", ".json"]
        .into_iter()
        .map(str::to_string)
        .collect();
    chain.resolve.alias = target
        .dynamic_modules()
        .iter()
        .map(|(name, path)| {
            (
                format!("{DYNAMIC_MODULE_PREFIX}/{name}"),
                join_clean(&project.root_dir, path),
            )
        })
        .collect();
    chain.resolve_loader.modules = target.loader_modules().to_vec();

    chain.rule(
        ModuleRule::new("ts", r"\.ts$")
            .with_loader("ts-loader")
            .with_exclude("/node_modules"),
    );

    chain
        .plugin(
            FRIENDLY_ERRORS_PLUGIN,
            CompilerPlugin::named(FRIENDLY_ERRORS_PLUGIN, json!({ "clearConsole": false })),
        )
        .plugin(
            VIRTUAL_MODULES_PLUGIN,
            CompilerPlugin::VirtualModules(VirtualModules::new()),
        );

    chain
}

/// Node targets produce CommonJS bundles without node polyfills.
pub fn node_context(mut chain: ChainConfig, _target: &BuildTarget) -> Result<ChainConfig> {
    chain.target = Some("node".to_string());
    chain.output.library_target = Some("commonjs2".to_string());
    chain.set(
        "node",
        json!({
            "process": false,
            "global": false,
            "__filename": false,
            "__dirname": false,
            "Buffer": false,
            "setImmediate": false,
        }),
    );

    Ok(chain)
}

/// Web targets understand style sheets. Browser-only bundles get cache
/// busting names and size hints in production.
pub fn web_context(mut chain: ChainConfig, target: &BuildTarget) -> Result<ChainConfig> {
    if chain.target.is_none() {
        chain.target = Some("web".to_string());
    }

    chain
        .rule(ModuleRule::new("less", r"\.less$").with_loader("less-loader"))
        .rule(ModuleRule::new("sass", r"\.s[ac]ss$").with_loader("sass-loader"))
        .rule(ModuleRule::new("stylus", r"\.styl$").with_loader("stylus-loader"));

    if !target.has_context(DefaultContext::Node.as_str()) {
        let development = target.env().is_development();

        chain.output.filename = Some(if development {
            "[name].js".to_string()
        } else {
            "[name].[chunkhash:16].bundle.js".to_string()
        });
        chain.performance.hints = (!development).then(|| "warning".to_string());
        chain.performance.max_entrypoint_size = Some(250_000);
    }

    Ok(chain)
}
