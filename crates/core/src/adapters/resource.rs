//! Resources and preloading
//!
//! A [`Resource`] binds a loader (and optional update loaders) to a
//! namespace and a store, so every consumer of the resource shares records.
//! [`preload`] starts a load ahead of the first reader; readers then join the
//! in-flight call or find the settled record.

use std::fmt;

use loadstate_domain::{LoadError, LoadKey, LoadOptions, LoadResult};

use crate::controller::{Loads, LoadsBuilder};
use crate::loader::{LoadArgs, Loader};
use crate::store::{Payload, Record, RecordStore};
use crate::suspense::{SuspendHandle, Suspended};

/// A loader bound to a shared namespace
pub struct Resource<A, R, E> {
    namespace: String,
    store: RecordStore<R, E>,
    loader: Loader<A, R, E>,
    updaters: Vec<Loader<A, R, E>>,
    options: LoadOptions,
}

impl<A, R, E> Clone for Resource<A, R, E> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            store: self.store.clone(),
            loader: self.loader.clone(),
            updaters: self.updaters.clone(),
            options: self.options.clone(),
        }
    }
}

impl<A, R, E> fmt::Debug for Resource<A, R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("namespace", &self.namespace)
            .field("updaters", &self.updaters.len())
            .field("options", &self.options)
            .finish()
    }
}

impl<A: LoadArgs, R: Payload, E: Payload + fmt::Debug> Resource<A, R, E> {
    pub fn new(
        namespace: impl Into<String>,
        store: RecordStore<R, E>,
        loader: Loader<A, R, E>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            store,
            loader,
            updaters: Vec::new(),
            options: LoadOptions::default(),
        }
    }

    /// Register an update loader, addressed by registration order
    pub fn with_update(mut self, loader: Loader<A, R, E>) -> Self {
        self.updaters.push(loader);
        self
    }

    /// Options applied to every controller created from this resource
    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// A controller builder bound to this resource's namespace, loaders and
    /// options
    pub fn loads(&self) -> LoadsBuilder<A, R, E> {
        let builder = Loads::builder(self.store.clone(), self.loader.clone())
            .context(self.namespace.clone())
            .options(self.options.clone());
        self.updaters.iter().cloned().fold(builder, LoadsBuilder::update)
    }

    /// Start loading `args` before anyone reads them
    ///
    /// # Errors
    ///
    /// Same as [`preload`].
    pub fn preload(&self, args: A) -> LoadResult<Option<SuspendHandle<R, E>>, E> {
        preload(self.store.clone(), &self.namespace, self.loader.clone(), args, self.options.clone())
    }

    /// Suspense read of `args`
    ///
    /// # Errors
    ///
    /// [`LoadError::Misconfigured`] outside a tokio runtime, or as
    /// [`Loads::read_with`].
    pub fn read(&self, args: A) -> LoadResult<Suspended<R, E>, E> {
        let options = LoadOptions { suspense: true, defer: true, ..self.options.clone() };
        self.loads().options(options).build()?.read_with(args)
    }

    /// The record cached for `args`, without loading
    ///
    /// # Errors
    ///
    /// [`LoadError::Key`] when `args` cannot be serialized.
    pub fn cached(&self, args: &A) -> LoadResult<Option<Record<R, E>>, E> {
        let key = LoadKey::build(&self.namespace, args).map_err(|err| LoadError::Key(err.to_string()))?;
        Ok(self.store.get(&key))
    }
}

/// Start loading `args` under `context` ahead of the first reader
///
/// Returns a handle on the in-flight call, or `None` when the load policy
/// answered from cache. The settlement is written to `store` even if the
/// handle is dropped.
///
/// # Errors
///
/// - [`LoadError::Common`] when `options` fail validation
/// - [`LoadError::Misconfigured`] outside a tokio runtime
/// - [`LoadError::Key`] when `args` cannot be serialized
pub fn preload<A, R, E>(
    store: RecordStore<R, E>,
    context: &str,
    loader: Loader<A, R, E>,
    args: A,
    options: LoadOptions,
) -> LoadResult<Option<SuspendHandle<R, E>>, E>
where
    A: LoadArgs,
    R: Payload,
    E: Payload + fmt::Debug,
{
    let loads = Loads::builder(store, loader)
        .context(context)
        .options(LoadOptions { defer: true, ..options })
        .build()?;
    Ok(loads.start_main(args)?.map(SuspendHandle::new))
}
