//! Aedris Core - configuration, environment and hook primitives shared by the Aedris build tools.

pub mod config;
mod environment;
mod error;
pub mod hook;
pub mod path;

pub use config::{ConfigHandler, ConfigSource, ProjectConfig, normalize_config, resolve_path};
pub use environment::{BuildEnvironment, Mode};
pub use error::{AedrisError, Result};
pub use hook::{
    AsyncParallelHook, AsyncSeriesBailHook, AsyncSeriesHook, SyncBailHook, SyncWaterfallHook,
};
