//! Controller builder.

use std::fmt;
use std::sync::Arc;

use loadstate_domain::{LoadOptions, LoadResult};

use super::{LoadsSnapshot, Loads, PollGuard, RejectHook, ResolveHook};
use crate::loader::{LoadArgs, Loader, Variables};
use crate::store::{Payload, RecordStore};

/// Configures a [`Loads`] controller
pub struct LoadsBuilder<A, R, E> {
    pub(super) store: RecordStore<R, E>,
    pub(super) loader: Loader<A, R, E>,
    pub(super) context: Option<String>,
    pub(super) variables: Option<Variables<A>>,
    pub(super) options: LoadOptions,
    pub(super) updaters: Vec<Loader<A, R, E>>,
    pub(super) initial_response: Option<R>,
    pub(super) on_resolve: Option<ResolveHook<R>>,
    pub(super) on_reject: Option<RejectHook<E>>,
    pub(super) poll_while: Option<PollGuard<R, E>>,
}

impl<A, R, E> fmt::Debug for LoadsBuilder<A, R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadsBuilder")
            .field("context", &self.context)
            .field("options", &self.options)
            .field("updaters", &self.updaters.len())
            .finish_non_exhaustive()
    }
}

impl<A: LoadArgs, R: Payload, E: Payload + fmt::Debug> LoadsBuilder<A, R, E> {
    pub(crate) fn new(store: RecordStore<R, E>, loader: Loader<A, R, E>) -> Self {
        Self {
            store,
            loader,
            context: None,
            variables: None,
            options: LoadOptions::default(),
            updaters: Vec::new(),
            initial_response: None,
            on_resolve: None,
            on_reject: None,
            poll_while: None,
        }
    }

    /// Namespace shared by every controller loading the same resource
    ///
    /// Without a context the controller caches under a private key that no
    /// other controller can address.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Arguments used when a load is not given any
    pub fn variables(mut self, args: A) -> Self {
        self.variables = Some(Variables::Fixed(args));
        self
    }

    /// Arguments computed by `thunk` at every load
    pub fn variables_with<F>(mut self, thunk: F) -> Self
    where
        F: Fn() -> A + Send + Sync + 'static,
    {
        self.variables = Some(Variables::thunk(thunk));
        self
    }

    pub fn options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    /// Register an alternate loader writing to the same record
    ///
    /// Update loaders are addressed by registration order in
    /// [`Loads::update`].
    pub fn update(mut self, loader: Loader<A, R, E>) -> Self {
        self.updaters.push(loader);
        self
    }

    /// Start resolved with `response` instead of idle
    pub fn initial_response(mut self, response: R) -> Self {
        self.initial_response = Some(response);
        self
    }

    /// Called with every committed response
    pub fn on_resolve<F>(mut self, hook: F) -> Self
    where
        F: Fn(&R) + Send + Sync + 'static,
    {
        self.on_resolve = Some(Arc::new(hook));
        self
    }

    /// Called with every committed error
    pub fn on_reject<F>(mut self, hook: F) -> Self
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.on_reject = Some(Arc::new(hook));
        self
    }

    /// Keep polling only while `guard` holds for the current snapshot
    pub fn poll_while<F>(mut self, guard: F) -> Self
    where
        F: Fn(&LoadsSnapshot<R, E>) -> bool + Send + Sync + 'static,
    {
        self.poll_while = Some(Arc::new(guard));
        self
    }

    /// Validate the options and create the controller
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Common`](loadstate_domain::LoadError::Common)
    /// when the options fail validation.
    pub fn build(self) -> LoadResult<Loads<A, R, E>, E> {
        Loads::from_builder(self)
    }
}

impl<R: Payload, E: Payload + fmt::Debug> LoadsBuilder<(), R, E> {
    /// Load with no arguments
    pub fn without_args(self) -> Self {
        self.variables(())
    }
}
