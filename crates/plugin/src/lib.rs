//! Aedris Plugin - plugin resolution, loading and deduplication.
//!
//! [`PluginManager`] keeps the registration table and the load queue, while
//! [`PluginHost`] drives loading for whatever owns the manager. Resolving a
//! reference and turning a path into a plugin value are injected through
//! [`PluginResolver`] and [`PluginLoader`].

mod catalog;
mod manager;
mod manifest;
mod source;

pub use catalog::PluginCatalog;
pub use manager::{LoadPluginOptions, PluginHost, PluginManager, PluginRegistration};
pub use manifest::{MANIFEST_FILE, PluginManifest};
pub use source::{FsPluginResolver, PluginLoader, PluginResolver};
