//! Aedris Engine - Builder lifecycle, targets and compiler orchestration.

mod builder;
mod chain;
mod clean;
mod command_compiler;
mod compiler;
mod contexts;
mod entry;
mod externals;
mod local_plugins;
mod plugin;
mod target;
mod tasks;
#[cfg(test)]
mod testing;
mod tools;
mod virtual_modules;
mod watch;

pub use builder::{Builder, BuilderHooks, BuilderOptions, BuilderServices};
pub use chain::{
    ChainConfig, CompilerConfig, CompilerPlugin, EXTERNALS_KEY, ModuleConfig, ModuleRule,
    OutputConfig, PerformanceConfig, ResolveConfig, ResolveLoaderConfig,
};
pub use clean::{clean_outputs, outermost_dirs};
pub use command_compiler::{
    CACHE_DIR, CommandCompiler, CommandCompilerFactory, DEFAULT_BUNDLER, write_if_changed,
};
pub use compiler::{
    CompilationStats, Compiler, CompilerFactory, TargetCompilerHandle, TargetStats,
};
pub use contexts::{
    ContextExtension, DYNAMIC_MODULE_PREFIX, DefaultContext, FRIENDLY_ERRORS_PLUGIN,
    VIRTUAL_MODULES_PLUGIN, base_config, default_contexts, devtool, node_context, web_context,
};
pub use entry::{
    ENTRY_MODULE_PATH, ENTRY_PREFIX, ENTRY_REQUEST, RUNTIME_LOADER_MODULE, RuntimePluginEntry,
    entry_template, has_entry_module,
};
pub use externals::{
    External, ExternalsHook, ExternalsQuery, ExternalsResolver, NODE_EXTERNALS_PRIORITY,
    node_externals,
};
pub use local_plugins::{
    LOCAL_PLUGIN_OUTPUT_DIR, LOCAL_PLUGIN_TARGET_PREFIX, add_local_plugin_support,
    build_local_plugins, compiled_plugin_path, is_source_plugin,
};
pub use plugin::{BuildPlugin, SharedPlugin, normalize_plugin_options};
pub use target::{BuildTarget, TargetHooks, TargetOptions};
pub use tasks::{
    BUILD_SCRIPT, BUILD_SCRIPT_TARGET, BUILD_TASK, BuildTask, CLEAN_TASK, CleanTask,
    Task, TaskArgs, TaskContext, TaskOutput, add_standard_targets,
};
pub use tools::{TaskFactory, ToolsHooks, ToolsManager};
pub use virtual_modules::VirtualModules;
pub use watch::{AGGREGATE_TIMEOUT, WatchOptions};
