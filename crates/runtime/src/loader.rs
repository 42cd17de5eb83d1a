//! Wires bundled runtime plugins together at application start.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use aedris_core::{AedrisError, AsyncParallelHook, Result};
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info};

use crate::extensions::Extensions;
use crate::plugin::{PendingExports, RegisteredRuntimePlugin, RuntimeExports, RuntimePlugin};

#[derive(Default)]
pub struct RuntimeHooks {
    /// Fires once every plugin has hooked into the app.
    pub init: AsyncParallelHook<RuntimePluginLoader>,
}

/// Builds the runtime plugin instances of an application in two passes:
/// every instance is created first, then each one hooks into the app.
#[derive(Default)]
pub struct RuntimePluginLoader {
    pub hooks: RuntimeHooks,

    /// State plugins share with each other.
    pub extensions: Extensions,

    plugins: BTreeMap<String, Arc<dyn RuntimePlugin>>,
    registered: Vec<(String, RegisteredRuntimePlugin)>,
    started: bool,
}

impl RuntimePluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a plugin whose exports may still be loading.
    pub fn register_plugin(
        &mut self,
        name: impl Into<String>,
        exports: impl Into<PendingExports>,
        options: Option<Value>,
    ) -> Result<()> {
        let name = name.into();
        if self.registered(&name).is_some() {
            return Err(AedrisError::RuntimePluginRegistered(name));
        }

        debug!(target: "aedris::runtime", plugin = %name, "registered runtime plugin");
        self.registered.push((
            name,
            RegisteredRuntimePlugin {
                exports: exports.into(),
                options,
            },
        ));
        Ok(())
    }

    /// Instantiates every registered plugin, lets each hook into the app and
    /// fires `init`.
    ///
    /// `initializing` exposes the entry point itself as a plugin. It needs no
    /// factory.
    pub async fn start(&mut self, initializing: Option<(String, Arc<dyn RuntimePlugin>)>) -> Result<()> {
        let initializing_name = match initializing {
            Some((name, instance)) => {
                self.plugins.insert(name.clone(), instance);
                self.registered.retain(|(registered, _)| *registered != name);
                self.registered.push((
                    name.clone(),
                    RegisteredRuntimePlugin {
                        exports: RuntimeExports::empty().into(),
                        options: None,
                    },
                ));
                Some(name)
            }
            None => None,
        };

        info!(target: "aedris::runtime", plugins = self.registered.len(), "starting runtime plugins");

        let registered = std::mem::take(&mut self.registered);
        let resolved = join_all(registered.into_iter().map(|(name, plugin)| async move {
            let exports = plugin.exports.resolve().await;
            (name, exports, plugin.options)
        }))
        .await;

        let mut missing = None;
        for (name, exports, options) in resolved {
            if let Some(instance) = exports.create_plugin() {
                self.plugins.insert(name.clone(), instance);
            } else if initializing_name.as_deref() != Some(name.as_str()) && missing.is_none() {
                missing = Some(name.clone());
            }

            self.registered.push((
                name,
                RegisteredRuntimePlugin {
                    exports: exports.into(),
                    options,
                },
            ));
        }

        if let Some(name) = missing {
            return Err(AedrisError::MissingPluginFactory(name));
        }

        let plugins: Vec<(String, Arc<dyn RuntimePlugin>)> = self
            .plugins
            .iter()
            .map(|(name, plugin)| (name.clone(), Arc::clone(plugin)))
            .collect();

        for (name, plugin) in plugins {
            let options = self.registered(&name).and_then(|r| r.options.clone());
            plugin.hook_app(self, options.as_ref());
        }

        self.started = true;

        let hook = self.hooks.init.clone();
        hook.call(self).await?;

        info!(target: "aedris::runtime", plugins = self.plugins.len(), "runtime plugins started");
        Ok(())
    }

    /// A live plugin instance.
    pub fn plugin(&self, name: &str) -> Option<&Arc<dyn RuntimePlugin>> {
        self.plugins.get(name)
    }

    /// Names of the live plugin instances, sorted.
    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    /// A registration, including ones not yet started.
    pub fn registered(&self, name: &str) -> Option<&RegisteredRuntimePlugin> {
        self.registered
            .iter()
            .find(|(registered, _)| registered == name)
            .map(|(_, plugin)| plugin)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl fmt::Debug for RuntimePluginLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimePluginLoader")
            .field("plugins", &self.plugin_names())
            .field(
                "registered",
                &self.registered.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .field("extensions", &self.extensions)
            .field("started", &self.started)
            .finish()
    }
}
