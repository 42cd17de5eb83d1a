//! Watch mode: rebuild every target when project files change.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use aedris_core::{AedrisError, Result};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::builder::Builder;
use crate::compiler::CompilationStats;

/// Changes closer together than this are compiled in one go.
pub const AGGREGATE_TIMEOUT: Duration = Duration::from_millis(500);

/// Watch mode configuration.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Quiet period after a change before compiling.
    pub aggregate_timeout: Duration,

    /// Poll interval for watcher backends that poll.
    pub poll_interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            aggregate_timeout: AGGREGATE_TIMEOUT,
            poll_interval: Duration::from_millis(200),
        }
    }
}

impl Builder {
    /// Cleans, compiles once, then compiles again after every batch of
    /// relevant changes under the root directory until `shutdown` resolves.
    ///
    /// `on_build` sees the outcome of every compilation. Failed compilations
    /// do not stop the watcher.
    pub async fn watch<S, F>(&mut self, options: WatchOptions, shutdown: S, mut on_build: F) -> Result<()>
    where
        S: Future<Output = ()> + Send,
        F: FnMut(&Result<CompilationStats>) + Send,
    {
        let compiler = self.compiler().cloned().ok_or(AedrisError::NotLoaded)?;

        self.clean().await?;

        let hook = self.hooks.before_watch.clone();
        hook.call(self).await?;

        let root = self.config().root_dir.clone();
        let (tx, mut rx) = mpsc::channel::<PathBuf>(100);

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    for path in event.paths {
                        let _ = tx.blocking_send(path);
                    }
                }
            },
            Config::default().with_poll_interval(options.poll_interval),
        )
        .map_err(|e| AedrisError::Watch(format!("failed to create file watcher: {e}")))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| AedrisError::Watch(format!("failed to watch {}: {e}", root.display())))?;

        info!(target: "aedris::watch", root = %root.display(), "watching for changes");

        let result = compiler.run().await;
        self.record_watch_result(&result);
        on_build(&result);

        tokio::pin!(shutdown);

        loop {
            let changed = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                changed = rx.recv() => changed,
            };

            let Some(first) = changed else {
                warn!(target: "aedris::watch", "watcher stopped");
                break;
            };

            let mut changed = vec![first];
            while let Ok(Some(path)) = tokio::time::timeout(options.aggregate_timeout, rx.recv()).await {
                changed.push(path);
            }

            changed.retain(|path| !self.should_ignore(path));
            if changed.is_empty() {
                continue;
            }

            debug!(target: "aedris::watch", files = changed.len(), first = %changed[0].display(), "change detected");

            let result = compiler.run().await;
            self.record_watch_result(&result);
            on_build(&result);
        }

        info!(target: "aedris::watch", "stopped watching");
        Ok(())
    }

    fn record_watch_result(&mut self, result: &Result<CompilationStats>) {
        match result {
            Ok(stats) => {
                info!(target: "aedris::watch", success = stats.success(), duration_ms = stats.duration_ms, "compiled");
                self.set_last_stats(stats.clone());
            }
            Err(e) => warn!(target: "aedris::watch", error = %e, "compilation failed"),
        }
    }
}
