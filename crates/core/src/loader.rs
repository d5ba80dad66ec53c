//! User-supplied loaders and their arguments
//!
//! A [`Loader`] wraps an async function `args -> Result<R, E>`. Loaders built
//! with [`Loader::with_meta`] also receive a [`LoaderMeta`], which exposes the
//! cached record for the key being loaded and lets the loader commit
//! optimistic values before it settles.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;
use loadstate_domain::{LoadError, LoadResult};
use serde::Serialize;

use crate::optimistic::{Optimistic, OptimisticTarget};
use crate::store::{Payload, Record};

/// Bounds on loader arguments; arguments are serialized into the record key
pub trait LoadArgs: Clone + Serialize + Send + Sync + 'static {}

impl<T: Clone + Serialize + Send + Sync + 'static> LoadArgs for T {}

type LoaderFn<A, R, E> = dyn Fn(A, LoaderMeta<R, E>) -> BoxFuture<'static, Result<R, E>> + Send + Sync;

/// An async function producing a response or an error
pub struct Loader<A, R, E> {
    call: Arc<LoaderFn<A, R, E>>,
}

impl<A, R, E> Clone for Loader<A, R, E> {
    fn clone(&self) -> Self {
        Self { call: Arc::clone(&self.call) }
    }
}

impl<A, R, E> fmt::Debug for Loader<A, R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Loader(..)")
    }
}

impl<A: LoadArgs, R: Payload, E: Payload + fmt::Debug> Loader<A, R, E> {
    /// Wrap an async function of the arguments
    pub fn new<F, Fut>(loader: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        Self { call: Arc::new(move |args, _meta| loader(args).boxed()) }
    }

    /// Wrap an async function that also receives [`LoaderMeta`]
    pub fn with_meta<F, Fut>(loader: F) -> Self
    where
        F: Fn(A, LoaderMeta<R, E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        Self { call: Arc::new(move |args, meta| loader(args, meta).boxed()) }
    }

    pub(crate) fn call(&self, args: A, meta: LoaderMeta<R, E>) -> BoxFuture<'static, Result<R, E>> {
        (self.call)(args, meta)
    }
}

/// Arguments configured on a controller: a value, or a thunk evaluated on
/// every load
pub enum Variables<A> {
    /// Fixed arguments
    Fixed(A),
    /// Arguments computed at load time
    Thunk(Arc<dyn Fn() -> A + Send + Sync>),
}

impl<A: Clone> Variables<A> {
    /// Arguments computed by `thunk` on every load
    pub fn thunk<F>(thunk: F) -> Self
    where
        F: Fn() -> A + Send + Sync + 'static,
    {
        Self::Thunk(Arc::new(thunk))
    }

    /// The arguments for the next load
    pub fn resolve(&self) -> A {
        match self {
            Self::Fixed(args) => args.clone(),
            Self::Thunk(thunk) => thunk(),
        }
    }
}

impl<A: Clone> Clone for Variables<A> {
    fn clone(&self) -> Self {
        match self {
            Self::Fixed(args) => Self::Fixed(args.clone()),
            Self::Thunk(thunk) => Self::Thunk(Arc::clone(thunk)),
        }
    }
}

impl<A: fmt::Debug> fmt::Debug for Variables<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(args) => f.debug_tuple("Fixed").field(args).finish(),
            Self::Thunk(_) => f.write_str("Thunk(..)"),
        }
    }
}

impl<A> From<A> for Variables<A> {
    fn from(args: A) -> Self {
        Self::Fixed(args)
    }
}

/// Receiver of optimistic writes issued from inside a loader
pub(crate) trait OptimisticSink<R, E>: Send + Sync {
    fn commit_response(
        &self,
        target: OptimisticTarget,
        value: Optimistic<R>,
    ) -> LoadResult<Record<R, E>, E>;

    fn commit_error(&self, target: OptimisticTarget, error: E) -> LoadResult<Record<R, E>, E>;
}

/// Sink used when a loader runs without a controller
struct Detached;

impl<R, E> OptimisticSink<R, E> for Detached {
    fn commit_response(&self, _: OptimisticTarget, _: Optimistic<R>) -> LoadResult<Record<R, E>, E> {
        Err(LoadError::Inactive)
    }

    fn commit_error(&self, _: OptimisticTarget, _: E) -> LoadResult<Record<R, E>, E> {
        Err(LoadError::Inactive)
    }
}

/// Context handed to loaders built with [`Loader::with_meta`]
pub struct LoaderMeta<R, E> {
    cached_record: Option<Record<R, E>>,
    sink: Weak<dyn OptimisticSink<R, E>>,
}

impl<R: Clone, E: Clone> Clone for LoaderMeta<R, E> {
    fn clone(&self) -> Self {
        Self { cached_record: self.cached_record.clone(), sink: Weak::clone(&self.sink) }
    }
}

impl<R, E> fmt::Debug for LoaderMeta<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderMeta")
            .field("has_cached_record", &self.cached_record.is_some())
            .field("attached", &(self.sink.strong_count() > 0))
            .finish()
    }
}

impl<R: Payload, E: Payload + fmt::Debug> LoaderMeta<R, E> {
    pub(crate) fn new(
        cached_record: Option<Record<R, E>>,
        sink: Weak<dyn OptimisticSink<R, E>>,
    ) -> Self {
        Self { cached_record, sink }
    }

    /// Metadata for a loader running without a controller
    pub fn detached(cached_record: Option<Record<R, E>>) -> Self {
        let sink: Weak<dyn OptimisticSink<R, E>> = Weak::<Detached>::new();
        Self { cached_record, sink }
    }

    /// The record cached for this key when the load started
    pub fn cached_record(&self) -> Option<&Record<R, E>> {
        self.cached_record.as_ref()
    }

    /// Commit a response to the loading controller's own key
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Inactive`] once the controller is gone.
    pub fn set_response(&self, value: impl Into<Optimistic<R>>) -> LoadResult<Record<R, E>, E> {
        self.set_response_to(OptimisticTarget::Own, value)
    }

    /// Commit a response to `target`
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Inactive`] once the controller is gone.
    pub fn set_response_to(
        &self,
        target: OptimisticTarget,
        value: impl Into<Optimistic<R>>,
    ) -> LoadResult<Record<R, E>, E> {
        match self.sink.upgrade() {
            Some(sink) => sink.commit_response(target, value.into()),
            None => Err(LoadError::Inactive),
        }
    }

    /// Commit an error to the loading controller's own key
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Inactive`] once the controller is gone.
    pub fn set_error(&self, error: E) -> LoadResult<Record<R, E>, E> {
        self.set_error_to(OptimisticTarget::Own, error)
    }

    /// Commit an error to `target`
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Inactive`] once the controller is gone.
    pub fn set_error_to(&self, target: OptimisticTarget, error: E) -> LoadResult<Record<R, E>, E> {
        match self.sink.upgrade() {
            Some(sink) => sink.commit_error(target, error),
            None => Err(LoadError::Inactive),
        }
    }
}
