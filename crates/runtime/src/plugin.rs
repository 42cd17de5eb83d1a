//! Runtime plugin contract.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use serde_json::Value;

use crate::loader::RuntimePluginLoader;

/// A live plugin inside a running application.
pub trait RuntimePlugin: Send + Sync {
    /// Called once every plugin instance exists, before `init` fires.
    ///
    /// `options` are the static options the build attached to the plugin.
    fn hook_app(&self, _loader: &mut RuntimePluginLoader, _options: Option<&Value>) {}
}

type PluginFactory = Arc<dyn Fn() -> Arc<dyn RuntimePlugin> + Send + Sync>;

/// What a runtime plugin module exports.
#[derive(Clone, Default)]
pub struct RuntimeExports {
    factory: Option<PluginFactory>,
}

impl RuntimeExports {
    /// Exports without a plugin factory.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Exports whose factory builds the plugin instance.
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn() -> Arc<dyn RuntimePlugin> + Send + Sync + 'static,
    {
        Self {
            factory: Some(Arc::new(factory)),
        }
    }

    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }

    /// Builds a plugin instance, if the module has a factory.
    pub fn create_plugin(&self) -> Option<Arc<dyn RuntimePlugin>> {
        self.factory.as_ref().map(|factory| factory())
    }
}

impl fmt::Debug for RuntimeExports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeExports")
            .field("factory", &self.factory.is_some())
            .finish()
    }
}

/// Exports that may still be loading, such as a dynamic import.
pub enum PendingExports {
    Ready(RuntimeExports),
    Pending(Mutex<BoxFuture<'static, RuntimeExports>>),
}

impl PendingExports {
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = RuntimeExports> + Send + 'static,
    {
        Self::Pending(Mutex::new(Box::pin(future)))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub(crate) async fn resolve(self) -> RuntimeExports {
        match self {
            Self::Ready(exports) => exports,
            Self::Pending(future) => future.into_inner().unwrap_or_else(PoisonError::into_inner).await,
        }
    }
}

impl From<RuntimeExports> for PendingExports {
    fn from(exports: RuntimeExports) -> Self {
        Self::Ready(exports)
    }
}

impl fmt::Debug for PendingExports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(exports) => f.debug_tuple("Ready").field(exports).finish(),
            Self::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// A plugin recorded by `register_plugin`.
#[derive(Debug)]
pub struct RegisteredRuntimePlugin {
    pub exports: PendingExports,
    pub options: Option<Value>,
}
