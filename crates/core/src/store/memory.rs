//! In-memory cache provider
//!
//! Reference [`CacheProvider`] backed by a shared map. Clones share the same
//! map, so one provider can back several independent stores. The deferred
//! mode answers reads through a future, and the failing mode makes every
//! call return a backend error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use loadstate_common::{CommonError, CommonResult};
use loadstate_domain::{LoadKey, PersistedRecord};
use parking_lot::Mutex;

use crate::ports::{CacheProvider, ProviderRead};
use crate::store::Payload;

const SERVICE: &str = "memory-provider";

/// Map-backed cache provider
pub struct MemoryCacheProvider<R, E> {
    entries: Arc<Mutex<HashMap<LoadKey, PersistedRecord<R, E>>>>,
    deferred: bool,
    failing: Arc<AtomicBool>,
}

impl<R, E> Clone for MemoryCacheProvider<R, E> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            deferred: self.deferred,
            failing: Arc::clone(&self.failing),
        }
    }
}

impl<R, E> Default for MemoryCacheProvider<R, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, E> MemoryCacheProvider<R, E> {
    /// A provider answering reads synchronously
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            deferred: false,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A provider answering reads through a future
    pub fn deferred() -> Self {
        Self { deferred: true, ..Self::new() }
    }

    /// Make every subsequent call fail with a backend error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn check(&self, operation: &str) -> CommonResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CommonError::backend(SERVICE, format!("{operation} unavailable"), true));
        }
        Ok(())
    }
}

impl<R: Payload, E: Payload> MemoryCacheProvider<R, E> {
    /// Direct read of the stored value, bypassing deferred and failing modes
    pub fn peek(&self, key: &LoadKey) -> Option<PersistedRecord<R, E>> {
        self.entries.lock().get(key).cloned()
    }
}

impl<R: Payload, E: Payload> CacheProvider<R, E> for MemoryCacheProvider<R, E> {
    fn get(&self, key: &LoadKey) -> ProviderRead<R, E> {
        if !self.deferred {
            return match self.check("get") {
                Ok(()) => ProviderRead::Ready(self.peek(key)),
                // Synchronous reads have no error channel; report a miss.
                Err(_) => ProviderRead::Ready(None),
            };
        }

        let result = self.check("get").map(|()| self.peek(key));
        ProviderRead::Deferred(
            async move {
                tokio::task::yield_now().await;
                result
            }
            .boxed(),
        )
    }

    fn set(&self, key: &LoadKey, record: PersistedRecord<R, E>) -> CommonResult<()> {
        self.check("set")?;
        self.entries.lock().insert(key.clone(), record);
        Ok(())
    }

    fn delete(&self, key: &LoadKey) -> CommonResult<()> {
        self.check("delete")?;
        self.entries.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> CommonResult<()> {
        self.check("clear")?;
        self.entries.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    /// Validates `MemoryCacheProvider` behavior for the synchronous round
    /// trip scenario.
    ///
    /// Assertions:
    /// - Confirms a stored record is read back as `Ready(Some(..))`.
    /// - Ensures delete removes it.
    #[test]
    fn test_sync_set_get_delete() {
        let provider: MemoryCacheProvider<u32, String> = MemoryCacheProvider::new();
        let key = LoadKey::from_context("user");
        provider.set(&key, PersistedRecord::resolved(1, Utc::now())).unwrap();

        match provider.get(&key) {
            ProviderRead::Ready(Some(record)) => assert_eq!(record.response, Some(1)),
            other => panic!("expected ready hit, got {other:?}"),
        }

        provider.delete(&key).unwrap();
        assert!(provider.is_empty());
    }

    /// Validates `MemoryCacheProvider::deferred` behavior for the async read
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms reads are deferred and resolve to the stored value.
    #[tokio::test]
    async fn test_deferred_read() {
        let provider: MemoryCacheProvider<u32, String> = MemoryCacheProvider::deferred();
        let key = LoadKey::from_context("feed");
        provider.set(&key, PersistedRecord::resolved(5, Utc::now())).unwrap();

        let ProviderRead::Deferred(read) = provider.get(&key) else {
            panic!("expected deferred read");
        };
        let record = read.await.unwrap().unwrap();
        assert_eq!(record.response, Some(5));
    }

    /// Validates `MemoryCacheProvider::set_failing` behavior for the backend
    /// outage scenario.
    ///
    /// Assertions:
    /// - Ensures writes fail with a retryable backend error.
    /// - Ensures deferred reads fail.
    #[tokio::test]
    async fn test_failing_mode() {
        let provider: MemoryCacheProvider<u32, String> = MemoryCacheProvider::deferred();
        provider.set_failing(true);
        let key = LoadKey::from_context("feed");

        let err = provider.set(&key, PersistedRecord::resolved(5, Utc::now())).unwrap_err();
        assert!(matches!(err, CommonError::Backend { is_retryable: true, .. }));

        let ProviderRead::Deferred(read) = provider.get(&key) else {
            panic!("expected deferred read");
        };
        assert!(read.await.is_err());
    }
}
