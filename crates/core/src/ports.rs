//! Cache provider port.
//!
//! A cache provider mirrors settled records outside the process-local
//! [`RecordStore`](crate::RecordStore): local storage, a remote KV, or a map
//! shared between stores. The store stays authoritative; the provider is a
//! write-through mirror and a read fallback on in-memory misses.
//!
//! Reads may answer immediately or hand back a future. Writes are
//! fire-and-forget: a failing provider is logged by the store and never
//! affects the loader's own success or failure.
//!
//! # Example
//!
//! ```no_run
//! use loadstate_common::CommonResult;
//! use loadstate_core::{CacheProvider, ProviderRead};
//! use loadstate_domain::{LoadKey, PersistedRecord};
//!
//! struct NullProvider;
//!
//! impl CacheProvider<String, String> for NullProvider {
//!     fn get(&self, _key: &LoadKey) -> ProviderRead<String, String> {
//!         ProviderRead::Ready(None)
//!     }
//!
//!     fn set(&self, _key: &LoadKey, _record: PersistedRecord<String, String>) -> CommonResult<()> {
//!         Ok(())
//!     }
//!
//!     fn delete(&self, _key: &LoadKey) -> CommonResult<()> {
//!         Ok(())
//!     }
//!
//!     fn clear(&self) -> CommonResult<()> {
//!         Ok(())
//!     }
//! }
//! ```

use futures::future::BoxFuture;
use loadstate_common::CommonResult;
use loadstate_domain::{LoadKey, PersistedRecord};

/// Future returned by a provider that answers asynchronously
pub type ProviderFuture<R, E> = BoxFuture<'static, CommonResult<Option<PersistedRecord<R, E>>>>;

/// Result of a provider read
pub enum ProviderRead<R, E> {
    /// The provider answered synchronously
    Ready(Option<PersistedRecord<R, E>>),
    /// The provider must be awaited
    Deferred(ProviderFuture<R, E>),
}

impl<R, E> std::fmt::Debug for ProviderRead<R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(record) => f.debug_tuple("Ready").field(&record.is_some()).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Port for persisting settled records outside the process.
///
/// Implementations must be cheap to call from the store's synchronous write
/// path; slow backends should queue writes internally.
pub trait CacheProvider<R, E>: Send + Sync {
    /// Look up the record stored under `key`.
    fn get(&self, key: &LoadKey) -> ProviderRead<R, E>;

    /// Store `record` under `key`, replacing any previous value.
    ///
    /// # Errors
    /// Returns `CommonError::Backend` when the backend rejects the write.
    fn set(&self, key: &LoadKey, record: PersistedRecord<R, E>) -> CommonResult<()>;

    /// Remove the record stored under `key`.
    ///
    /// # Errors
    /// Returns `CommonError::Backend` when the backend rejects the delete.
    fn delete(&self, key: &LoadKey) -> CommonResult<()>;

    /// Remove every record.
    ///
    /// # Errors
    /// Returns `CommonError::Backend` when the backend rejects the clear.
    fn clear(&self) -> CommonResult<()>;
}
