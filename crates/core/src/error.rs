//! Error types for Aedris.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for Aedris operations.
pub type Result<T> = std::result::Result<T, AedrisError>;

/// Main error type for Aedris.
#[derive(Debug, Error)]
pub enum AedrisError {
    #[error("Config path or object has to be provided")]
    MissingConfigSource,

    #[error("No rootDir provided in the config object")]
    MissingRootDir,

    #[error("Config at {0} could not be found")]
    ConfigNotFound(PathBuf),

    #[error("Config at {0} is not an object")]
    ConfigNotObject(PathBuf),

    #[error("Failed to parse config at {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot resolve plugin {reference:?}: {message}")]
    PluginResolve { reference: String, message: String },

    #[error("Failed to load plugin from {path}: {reason}")]
    PluginLoad { path: PathBuf, reason: String },

    #[error("Failed to parse plugin manifest: {0}")]
    Manifest(String),

    #[error("Runtime plugin {0:?} is already registered")]
    RuntimePluginRegistered(String),

    #[error("Registered runtime plugin {0:?} has no createAedrisPlugin factory")]
    MissingPluginFactory(String),

    #[error("Builder instance already loaded")]
    AlreadyLoaded,

    #[error("Builder instance has not been loaded")]
    NotLoaded,

    #[error("Target {0:?} already exists")]
    DuplicateTarget(String),

    #[error("No targets were registered, nothing to build. Are you missing a base plugin?")]
    NoTargets,

    #[error("Context {context:?} does not exist for target {target:?}")]
    UnknownContext { target: String, context: String },

    #[error(
        "Target {0:?} sets externals directly. Use BuildTarget externals_query to contribute externals so other plugins can manipulate them"
    )]
    DirectExternals(String),

    #[error("The required virtual modules plugin is missing from the compiler config of target {0:?}")]
    MissingVirtualModules(String),

    #[error("Refusing to remove {0}: it is a filesystem root")]
    RefuseRootRemoval(PathBuf),

    #[error("Tried to create invalid task named {0:?}")]
    UnknownTask(String),

    #[error("Compiler error: {0}")]
    Compiler(String),

    #[error("Command execution failed: {command}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: Option<String>,
    },

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AedrisError {
    /// Returns true if the error means "there is no config", as opposed to a broken one.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AedrisError::ConfigNotFound(_))
    }
}
