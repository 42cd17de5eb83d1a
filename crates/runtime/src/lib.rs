//! Aedris Runtime - Starts the runtime plugins bundled into an application.

mod extensions;
mod loader;
mod plugin;

pub use extensions::Extensions;
pub use loader::{RuntimeHooks, RuntimePluginLoader};
pub use plugin::{PendingExports, RegisteredRuntimePlugin, RuntimeExports, RuntimePlugin};
