//! Typed hook registries that plugins tap into.
//!
//! Each registry fixes its calling convention in its type:
//!
//! - [`SyncWaterfallHook`] folds a value through every tap.
//! - [`SyncBailHook`] stops at the first tap that returns `Some`.
//! - [`AsyncSeriesHook`] awaits taps one after another with exclusive access.
//! - [`AsyncParallelHook`] awaits all taps concurrently with shared access.
//! - [`AsyncSeriesBailHook`] awaits taps in order until one returns `Some`.
//!
//! Taps run in ascending stage order and in registration order within a stage.
//! Registries are cheap to clone, so an owner can snapshot one of its own hooks
//! and call it with `&mut self`.

use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, try_join_all};

use crate::error::Result;

/// Stage used by [`tap`](SyncWaterfallHook::tap) style methods.
pub const DEFAULT_STAGE: i32 = 0;

struct Tap<F: ?Sized> {
    name: String,
    stage: i32,
    func: Arc<F>,
}

impl<F: ?Sized> Clone for Tap<F> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            stage: self.stage,
            func: Arc::clone(&self.func),
        }
    }
}

fn insert_tap<F: ?Sized>(taps: &mut Vec<Tap<F>>, tap: Tap<F>) {
    let index = taps
        .iter()
        .position(|existing| existing.stage > tap.stage)
        .unwrap_or(taps.len());
    taps.insert(index, tap);
}

fn tap_names<F: ?Sized>(taps: &[Tap<F>]) -> Vec<&str> {
    taps.iter().map(|tap| tap.name.as_str()).collect()
}

macro_rules! impl_registry_common {
    ($hook:ident < $($param:ident),+ >) => {
        impl<$($param),+> $hook<$($param),+> {
            /// Creates an empty hook.
            pub fn new() -> Self {
                Self { taps: Vec::new() }
            }

            /// Returns the names of the registered taps in call order.
            pub fn tap_names(&self) -> Vec<&str> {
                tap_names(&self.taps)
            }

            /// Returns the number of registered taps.
            pub fn len(&self) -> usize {
                self.taps.len()
            }

            /// Returns true if nothing tapped this hook.
            pub fn is_empty(&self) -> bool {
                self.taps.is_empty()
            }
        }

        impl<$($param),+> Default for $hook<$($param),+> {
            fn default() -> Self {
                Self::new()
            }
        }

        impl<$($param),+> Clone for $hook<$($param),+> {
            fn clone(&self) -> Self {
                Self {
                    taps: self.taps.clone(),
                }
            }
        }

        impl<$($param),+> fmt::Debug for $hook<$($param),+> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($hook))
                    .field("taps", &self.tap_names())
                    .finish()
            }
        }
    };
}

type WaterfallFn<T, C> = dyn Fn(T, &C) -> Result<T> + Send + Sync;

/// Synchronous hook that passes a value through every tap.
pub struct SyncWaterfallHook<T, C = ()> {
    taps: Vec<Tap<WaterfallFn<T, C>>>,
}

impl_registry_common!(SyncWaterfallHook<T, C>);

impl<T, C> SyncWaterfallHook<T, C> {
    /// Registers a tap at the default stage.
    pub fn tap<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(T, &C) -> Result<T> + Send + Sync + 'static,
    {
        self.tap_with_stage(name, DEFAULT_STAGE, func);
    }

    /// Registers a tap at the given stage.
    pub fn tap_with_stage<F>(&mut self, name: impl Into<String>, stage: i32, func: F)
    where
        F: Fn(T, &C) -> Result<T> + Send + Sync + 'static,
    {
        let func: Arc<WaterfallFn<T, C>> = Arc::new(func);
        insert_tap(
            &mut self.taps,
            Tap {
                name: name.into(),
                stage,
                func,
            },
        );
    }

    /// Folds `value` through every tap.
    pub fn call(&self, value: T, context: &C) -> Result<T> {
        self.taps
            .iter()
            .try_fold(value, |value, tap| (tap.func)(value, context))
    }
}

type BailFn<A, R> = dyn Fn(&A) -> Option<R> + Send + Sync;

/// Synchronous hook that returns the first answer given by a tap.
pub struct SyncBailHook<A, R> {
    taps: Vec<Tap<BailFn<A, R>>>,
}

impl_registry_common!(SyncBailHook<A, R>);

impl<A, R> SyncBailHook<A, R> {
    /// Registers a tap at the default stage.
    pub fn tap<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&A) -> Option<R> + Send + Sync + 'static,
    {
        self.tap_with_stage(name, DEFAULT_STAGE, func);
    }

    /// Registers a tap at the given stage.
    pub fn tap_with_stage<F>(&mut self, name: impl Into<String>, stage: i32, func: F)
    where
        F: Fn(&A) -> Option<R> + Send + Sync + 'static,
    {
        let func: Arc<BailFn<A, R>> = Arc::new(func);
        insert_tap(
            &mut self.taps,
            Tap {
                name: name.into(),
                stage,
                func,
            },
        );
    }

    /// Calls taps in order until one returns `Some`.
    pub fn call(&self, arg: &A) -> Option<R> {
        self.taps.iter().find_map(|tap| (tap.func)(arg))
    }
}

type SeriesFn<A> = dyn for<'a> Fn(&'a mut A) -> BoxFuture<'a, Result<()>> + Send + Sync;

/// Asynchronous hook whose taps run one after another with exclusive access.
///
/// Later taps observe the side effects of earlier ones.
pub struct AsyncSeriesHook<A> {
    taps: Vec<Tap<SeriesFn<A>>>,
}

impl_registry_common!(AsyncSeriesHook<A>);

impl<A> AsyncSeriesHook<A> {
    /// Registers a tap at the default stage.
    pub fn tap<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: for<'a> Fn(&'a mut A) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.tap_with_stage(name, DEFAULT_STAGE, func);
    }

    /// Registers a tap at the given stage.
    pub fn tap_with_stage<F>(&mut self, name: impl Into<String>, stage: i32, func: F)
    where
        F: for<'a> Fn(&'a mut A) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        let func: Arc<SeriesFn<A>> = Arc::new(func);
        insert_tap(
            &mut self.taps,
            Tap {
                name: name.into(),
                stage,
                func,
            },
        );
    }

    /// Awaits every tap in order, stopping at the first error.
    pub async fn call(&self, arg: &mut A) -> Result<()> {
        for tap in &self.taps {
            (tap.func)(arg).await?;
        }

        Ok(())
    }
}

type ParallelFn<A> = dyn for<'a> Fn(&'a A) -> BoxFuture<'a, Result<()>> + Send + Sync;

/// Asynchronous hook whose taps run concurrently with shared access.
pub struct AsyncParallelHook<A> {
    taps: Vec<Tap<ParallelFn<A>>>,
}

impl_registry_common!(AsyncParallelHook<A>);

impl<A> AsyncParallelHook<A> {
    /// Registers a tap at the default stage.
    pub fn tap<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: for<'a> Fn(&'a A) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        let func: Arc<ParallelFn<A>> = Arc::new(func);
        insert_tap(
            &mut self.taps,
            Tap {
                name: name.into(),
                stage: DEFAULT_STAGE,
                func,
            },
        );
    }

    /// Awaits all taps concurrently. Fails with the first error.
    pub async fn call(&self, arg: &A) -> Result<()> {
        try_join_all(self.taps.iter().map(|tap| (tap.func)(arg))).await?;
        Ok(())
    }
}

type SeriesBailFn<A, R> =
    dyn for<'a> Fn(&'a A) -> BoxFuture<'a, Result<Option<R>>> + Send + Sync;

/// Asynchronous hook that awaits taps in order until one answers.
pub struct AsyncSeriesBailHook<A, R> {
    taps: Vec<Tap<SeriesBailFn<A, R>>>,
}

impl_registry_common!(AsyncSeriesBailHook<A, R>);

impl<A, R> AsyncSeriesBailHook<A, R> {
    /// Registers a tap at the default stage.
    pub fn tap<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: for<'a> Fn(&'a A) -> BoxFuture<'a, Result<Option<R>>> + Send + Sync + 'static,
    {
        self.tap_with_stage(name, DEFAULT_STAGE, func);
    }

    /// Registers a tap at the given stage.
    pub fn tap_with_stage<F>(&mut self, name: impl Into<String>, stage: i32, func: F)
    where
        F: for<'a> Fn(&'a A) -> BoxFuture<'a, Result<Option<R>>> + Send + Sync + 'static,
    {
        let func: Arc<SeriesBailFn<A, R>> = Arc::new(func);
        insert_tap(
            &mut self.taps,
            Tap {
                name: name.into(),
                stage,
                func,
            },
        );
    }

    /// Awaits taps in order and returns the first `Some` answer.
    pub async fn call(&self, arg: &A) -> Result<Option<R>> {
        for tap in &self.taps {
            if let Some(answer) = (tap.func)(arg).await? {
                return Ok(Some(answer));
            }
        }

        Ok(None)
    }
}
