//! Generated bootstrap entry module.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Specifier prefix of the generated entry. Entry lists already containing it
/// are left alone.
pub const ENTRY_PREFIX: &str = "@aedris/entry";

/// Specifier prepended to application entry points.
pub const ENTRY_REQUEST: &str = "@aedris/entry/index.js";

/// Virtual path the generated entry is written to.
pub const ENTRY_MODULE_PATH: &str = "./node_modules/@aedris/entry/index.js";

/// Module the generated entry imports the runtime loader from.
pub const RUNTIME_LOADER_MODULE: &str = "@aedris/build-tools/dist/runtime/index";

/// A runtime plugin bundled into a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimePluginEntry {
    /// Import specifier of the runtime plugin.
    pub entry: String,

    /// Static options forwarded to the plugin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl RuntimePluginEntry {
    pub fn new(entry: impl Into<String>, options: Option<Value>) -> Self {
        Self {
            entry: entry.into(),
            options,
        }
    }
}

/// Returns true if an entry list already names the generated entry.
pub fn has_entry_module(modules: &[String]) -> bool {
    modules.iter().any(|module| module.starts_with(ENTRY_PREFIX))
}

/// Source text of the bootstrap module registering every runtime plugin.
pub fn entry_template(plugins: &BTreeMap<String, RuntimePluginEntry>) -> String {
    let registrations = plugins
        .iter()
        .map(|(name, plugin)| {
            let options = plugin
                .options
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_else(|| "undefined".to_string());
            format!(
                "\t[{}, import({}), {}]",
                js_string(name),
                js_string(&plugin.entry),
                options
            )
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "import loader from {loader};\n\n[\n{registrations}\n].forEach((plugin) => loader.registerPlugin(plugin[0], plugin[1], plugin[2]));\n\nexport default loader;\n",
        loader = js_string(RUNTIME_LOADER_MODULE),
    )
}

fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}
