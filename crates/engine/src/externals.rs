//! Externals contributed through a priority-ordered query hook.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use aedris_core::{AsyncSeriesBailHook, Result};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;

/// A request the compiler asks about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalsQuery {
    /// Directory of the importing module.
    pub context: PathBuf,

    /// The import specifier.
    pub request: String,
}

impl ExternalsQuery {
    pub fn new(context: impl Into<PathBuf>, request: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            request: request.into(),
        }
    }
}

/// Answer of an externals contributor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum External {
    /// Leave the request out of the bundle, loading it with this expression.
    Module(String),

    /// Bundle the request, ignoring later contributors.
    Bundle,
}

impl External {
    /// A CommonJS external for `request`.
    pub fn commonjs(request: &str) -> Self {
        External::Module(format!("commonjs {request}"))
    }
}

/// Contributors asked about every request, lowest priority first.
///
/// Clones share the same contributor list, so a resolver built before a
/// contributor is added still sees it.
#[derive(Clone, Default)]
pub struct ExternalsHook {
    inner: Arc<RwLock<AsyncSeriesBailHook<ExternalsQuery, External>>>,
}

impl ExternalsHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a contributor. Lower `priority` values are asked first; equal
    /// priorities keep registration order.
    pub fn tap<F>(&self, name: impl Into<String>, priority: i32, func: F)
    where
        F: for<'a> Fn(&'a ExternalsQuery) -> BoxFuture<'a, Result<Option<External>>>
            + Send
            + Sync
            + 'static,
    {
        self.inner.write().tap_with_stage(name, priority, func);
    }

    /// Names of the contributors in query order.
    pub fn tap_names(&self) -> Vec<String> {
        self.inner
            .read()
            .tap_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Asks every contributor in order and returns the first answer.
    pub async fn query(&self, query: &ExternalsQuery) -> Result<Option<External>> {
        let hook = self.inner.read().clone();
        hook.call(query).await
    }
}

impl fmt::Debug for ExternalsHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalsHook")
            .field("taps", &self.tap_names())
            .finish()
    }
}

/// The externals function installed into a finalized compiler config.
#[derive(Clone, Debug)]
pub struct ExternalsResolver {
    target: String,
    hook: ExternalsHook,
}

impl ExternalsResolver {
    pub fn new(target: impl Into<String>, hook: ExternalsHook) -> Self {
        Self {
            target: target.into(),
            hook,
        }
    }

    /// Target the resolver belongs to.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Resolves one request. `None` means the request is bundled.
    pub async fn resolve(&self, context: impl Into<PathBuf>, request: &str) -> Result<Option<String>> {
        let query = ExternalsQuery::new(context, request);

        Ok(match self.hook.query(&query).await? {
            Some(External::Module(expression)) => Some(expression),
            Some(External::Bundle) | None => None,
        })
    }
}

/// Priority of the default node contributor.
pub const NODE_EXTERNALS_PRIORITY: i32 = 1000;

static MODULE_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:@[a-z0-9\-_]+/)?[a-z0-9\-_]+(?:$|/)").ok());

static SPECIAL_REQUEST: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^@aedris/(?:entry|dynamic)(?:/.+)?$").ok());

static BUNDLED_REQUEST: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^@aedris/entry(?:/.+)?$|\.(?:css|s[ac]ss|styl)$").ok());

fn matches(regex: &LazyLock<Option<Regex>>, text: &str) -> bool {
    regex.as_ref().is_some_and(|regex| regex.is_match(text))
}

/// Default contributor for node targets: bare package requests stay external.
///
/// Generated entry and dynamic module specifiers and style sheets are left to
/// the compiler.
pub fn node_externals(query: &ExternalsQuery) -> Option<External> {
    let request = query.request.as_str();

    if matches(&SPECIAL_REQUEST, request) {
        return None;
    }

    (matches(&MODULE_NAME, request) && !matches(&BUNDLED_REQUEST, request))
        .then(|| External::commonjs(request))
}
