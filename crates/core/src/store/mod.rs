//! Shared record store.
//!
//! Maps a [`LoadKey`] to the latest known [`Record`] for that request. The
//! store is an explicitly constructed, cloneable handle: every clone shares the
//! same entries, and independent stores (one per application or per test)
//! never see each other's records.
//!
//! Responsibilities:
//! - TTL eviction: a write carrying `cache_time` arms a cancelable timer that
//!   removes the key, and reads check the expiry instant lazily against the
//!   store clock.
//! - Provider mirroring: settled records are written through to an optional
//!   [`CacheProvider`]; in-memory misses fall back to it. Provider failures
//!   are logged and treated as misses.
//! - Stale-write protection: invocations receive a ticket when they start, and
//!   a settlement is committed only if no newer invocation has started for the
//!   same key since.
//! - Change notification: listeners receive every [`StoreEvent`] after the
//!   store lock has been released.

pub mod memory;
mod record;
mod stats;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use loadstate_common::time::{schedule, Clock, SystemClock, TimerHandle};
use loadstate_domain::{LoadEvent, LoadKey, LoadState};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

pub use self::record::{InFlight, Payload, Record, RecordPatch};
pub use self::stats::StoreStats;
use self::stats::StatsCollector;
use crate::ports::{CacheProvider, ProviderRead};

/// Identifies the subscriber that caused a store write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Proof that an invocation started; required to commit its settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket(u64);

/// Change notification delivered to store listeners
#[derive(Debug, Clone)]
pub enum StoreEvent<R, E> {
    /// A record was written
    Set { key: LoadKey, record: Record<R, E>, origin: Option<SubscriberId> },
    /// A record was explicitly deleted
    Deleted { key: LoadKey },
    /// A record's TTL elapsed
    Expired { key: LoadKey },
    /// Every record was removed
    Cleared,
}

impl<R, E> StoreEvent<R, E> {
    /// The key this event concerns, if it concerns a single key
    pub fn key(&self) -> Option<&LoadKey> {
        match self {
            Self::Set { key, .. } | Self::Deleted { key } | Self::Expired { key } => Some(key),
            Self::Cleared => None,
        }
    }
}

/// Per-write options
pub struct SetOptions<R, E> {
    /// Remove the record this long after the write
    pub cache_time: Option<Duration>,
    /// Mirror this write to a provider other than the store's own
    pub provider: Option<Arc<dyn CacheProvider<R, E>>>,
    pub(crate) origin: Option<SubscriberId>,
}

impl<R, E> Default for SetOptions<R, E> {
    fn default() -> Self {
        Self { cache_time: None, provider: None, origin: None }
    }
}

impl<R, E> Clone for SetOptions<R, E> {
    fn clone(&self) -> Self {
        Self { cache_time: self.cache_time, provider: self.provider.clone(), origin: self.origin }
    }
}

impl<R, E> SetOptions<R, E> {
    /// Options with no TTL and the store's own provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove the record `cache_time` after this write
    pub fn with_cache_time(mut self, cache_time: Option<Duration>) -> Self {
        self.cache_time = cache_time;
        self
    }

    /// Mirror this write to `provider` instead of the store's provider
    pub fn with_provider(mut self, provider: Arc<dyn CacheProvider<R, E>>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub(crate) fn with_origin(mut self, origin: SubscriberId) -> Self {
        self.origin = Some(origin);
        self
    }
}

type Listener<R, E> = Arc<dyn Fn(&StoreEvent<R, E>) + Send + Sync>;

/// Guard returned by [`RecordStore::subscribe`]; unsubscribes on drop
pub struct StoreSubscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl StoreSubscription {
    /// Stop receiving events now
    pub fn unsubscribe(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for StoreSubscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for StoreSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSubscription").field("active", &self.unsubscribe.is_some()).finish()
    }
}

struct Entry<R, E> {
    record: Record<R, E>,
    ttl: Option<TimerHandle>,
    expires_at: Option<Instant>,
    generation: u64,
}

impl<R, E> Entry<R, E> {
    fn new(record: Record<R, E>) -> Self {
        Self { record, ttl: None, expires_at: None, generation: 0 }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn cancel_ttl(&mut self) {
        if let Some(ttl) = self.ttl.take() {
            ttl.cancel();
        }
        self.expires_at = None;
    }
}

/// Latest started invocation per key
#[derive(Debug, Default)]
pub(crate) struct TicketBook {
    next: u64,
    latest: HashMap<LoadKey, u64>,
}

impl TicketBook {
    fn issue(&mut self, key: &LoadKey) -> Ticket {
        self.next += 1;
        self.latest.insert(key.clone(), self.next);
        Ticket(self.next)
    }

    /// Accept `ticket` only if it is still the latest for `key`
    fn accept(&mut self, key: &LoadKey, ticket: Ticket) -> bool {
        if self.latest.get(key) == Some(&ticket.0) {
            self.latest.remove(key);
            true
        } else {
            false
        }
    }
}

struct StoreState<R, E> {
    entries: HashMap<LoadKey, Entry<R, E>>,
    tickets: TicketBook,
    next_generation: u64,
}

struct StoreInner<R, E> {
    state: Mutex<StoreState<R, E>>,
    provider: Option<Arc<dyn CacheProvider<R, E>>>,
    clock: Arc<dyn Clock>,
    listeners: Mutex<Vec<(u64, Listener<R, E>)>>,
    next_listener: AtomicU64,
    next_subscriber: AtomicU64,
    stats: StatsCollector,
}

/// Builder for [`RecordStore`]
pub struct RecordStoreBuilder<R, E> {
    provider: Option<Arc<dyn CacheProvider<R, E>>>,
    clock: Arc<dyn Clock>,
}

impl<R: Payload, E: Payload> RecordStoreBuilder<R, E> {
    /// Mirror settled records to `provider`
    pub fn with_provider(mut self, provider: Arc<dyn CacheProvider<R, E>>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Read time from `clock` instead of the system clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the store
    pub fn build(self) -> RecordStore<R, E> {
        RecordStore {
            inner: Arc::new(StoreInner {
                state: Mutex::new(StoreState {
                    entries: HashMap::new(),
                    tickets: TicketBook::default(),
                    next_generation: 0,
                }),
                provider: self.provider,
                clock: self.clock,
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                next_subscriber: AtomicU64::new(0),
                stats: StatsCollector::default(),
            }),
        }
    }
}

/// Process-wide keyed store of the latest record per logical request
pub struct RecordStore<R, E> {
    inner: Arc<StoreInner<R, E>>,
}

impl<R, E> Clone for RecordStore<R, E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<R, E> fmt::Debug for RecordStore<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
            .field("entries", &self.inner.state.lock().entries.len())
            .field("has_provider", &self.inner.provider.is_some())
            .finish()
    }
}

impl<R: Payload, E: Payload> Default for RecordStore<R, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Payload, E: Payload> RecordStore<R, E> {
    /// An empty store with no provider, reading the system clock
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a store
    pub fn builder() -> RecordStoreBuilder<R, E> {
        RecordStoreBuilder { provider: None, clock: Arc::new(SystemClock) }
    }

    /// The clock records are stamped with
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }

    /// Current activity counters
    pub fn stats(&self) -> StoreStats {
        self.inner.stats.snapshot()
    }

    /// Read the record for `key`
    ///
    /// Falls back to the provider on an in-memory miss when the provider
    /// answers synchronously. Provider values are returned as-is and not
    /// copied into memory.
    pub fn get(&self, key: &LoadKey) -> Option<Record<R, E>> {
        if let Some(record) = self.get_memory(key) {
            self.inner.stats.record_hit();
            return Some(record);
        }

        let record = match self.inner.provider.as_ref().map(|provider| provider.get(key)) {
            Some(ProviderRead::Ready(Some(persisted))) => {
                Some(Record::from_persisted(persisted, self.inner.clock.now(), self.wall_now()))
            }
            Some(ProviderRead::Deferred(_)) => {
                debug!(%key, "deferred provider read skipped by synchronous get");
                None
            }
            Some(ProviderRead::Ready(None)) | None => None,
        };
        self.count_read(record.is_some());
        record
    }

    /// Read the record for `key`, awaiting a deferred provider if needed
    ///
    /// A failing provider is logged and reported as a miss.
    pub async fn get_async(&self, key: &LoadKey) -> Option<Record<R, E>> {
        if let Some(record) = self.get_memory(key) {
            self.inner.stats.record_hit();
            return Some(record);
        }

        let read = self.inner.provider.as_ref().map(|provider| provider.get(key));
        let persisted = match read {
            Some(ProviderRead::Ready(persisted)) => persisted,
            Some(ProviderRead::Deferred(pending)) => match pending.await {
                Ok(persisted) => persisted,
                Err(err) => {
                    warn!(%key, error = %err, "cache provider read failed; treating as miss");
                    None
                }
            },
            None => None,
        };
        let record = persisted
            .map(|persisted| Record::from_persisted(persisted, self.inner.clock.now(), self.wall_now()));
        self.count_read(record.is_some());
        record
    }

    /// Whether an unexpired record for `key` is held in memory
    pub fn contains_key(&self, key: &LoadKey) -> bool {
        let now = self.inner.clock.now();
        self.inner.state.lock().entries.get(key).is_some_and(|entry| !entry.is_expired(now))
    }

    /// Number of records held in memory, including ones awaiting lazy expiry
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Whether no records are held in memory
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of the unexpired records held in memory
    pub fn keys(&self) -> Vec<LoadKey> {
        let now = self.inner.clock.now();
        let state = self.inner.state.lock();
        let mut keys: Vec<LoadKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Merge `patch` into the record for `key` and return the result
    pub fn set(
        &self,
        key: &LoadKey,
        patch: RecordPatch<R, E>,
        options: SetOptions<R, E>,
    ) -> Record<R, E> {
        self.update(key, |_| patch, options)
    }

    /// Merge the patch computed from the current record for `key`
    pub fn update<F>(&self, key: &LoadKey, updater: F, options: SetOptions<R, E>) -> Record<R, E>
    where
        F: FnOnce(Option<&Record<R, E>>) -> RecordPatch<R, E>,
    {
        let written = self.write_with(key, options, |_, current| Some(updater(current)));
        // The updater always yields a patch, so the write always happens.
        written.unwrap_or_else(|| Record::idle(self.inner.clock.now()))
    }

    /// Remove the record for `key`, returning whether one was held
    pub fn delete(&self, key: &LoadKey) -> bool {
        let removed = self.inner.state.lock().entries.remove(key);
        let existed = removed.is_some();
        if let Some(mut entry) = removed {
            entry.cancel_ttl();
        }

        if let Some(provider) = &self.inner.provider {
            if let Err(err) = provider.delete(key) {
                warn!(%key, error = %err, "cache provider delete failed");
            }
        }
        self.emit(&StoreEvent::Deleted { key: key.clone() });
        existed
    }

    /// Remove every record
    pub fn clear(&self) {
        let drained: Vec<Entry<R, E>> = {
            let mut state = self.inner.state.lock();
            state.entries.drain().map(|(_, entry)| entry).collect()
        };
        for mut entry in drained {
            entry.cancel_ttl();
        }

        if let Some(provider) = &self.inner.provider {
            if let Err(err) = provider.clear() {
                warn!(error = %err, "cache provider clear failed");
            }
        }
        self.emit(&StoreEvent::Cleared);
    }

    /// Receive every store event until the returned guard is dropped
    ///
    /// Listeners run synchronously on the writing thread, after the store
    /// lock has been released, so they may read from or write to the store.
    pub fn subscribe<F>(&self, listener: F) -> StoreSubscription
    where
        F: Fn(&StoreEvent<R, E>) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));

        let weak: Weak<StoreInner<R, E>> = Arc::downgrade(&self.inner);
        StoreSubscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.listeners.lock().retain(|(listener_id, _)| *listener_id != id);
                }
            })),
        }
    }

    /// Allocate an id for a new subscriber
    pub(crate) fn next_subscriber_id(&self) -> SubscriberId {
        SubscriberId(self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn record_dedup_hit(&self) {
        self.inner.stats.record_dedup_hit();
    }

    /// Record the start of an invocation for `key`
    ///
    /// Moves the record into its loading state with `promise` attached and
    /// returns the ticket the settlement must present.
    pub(crate) fn begin_invocation(
        &self,
        key: &LoadKey,
        promise: InFlight<R, E>,
        origin: SubscriberId,
    ) -> Ticket {
        let mut issued = None;
        self.write_with(key, SetOptions::new().with_origin(origin), |tickets, current| {
            issued = Some(tickets.issue(key));
            let from = current.map_or(LoadState::Idle, |record| record.state);
            let has_cached = current.is_some_and(Record::has_value);
            let state = from
                .transition(LoadEvent::Start { has_cached })
                .unwrap_or(if has_cached { LoadState::Reloading } else { LoadState::Pending });
            Some(RecordPatch::loading(state, promise))
        });
        issued.unwrap_or(Ticket(0))
    }

    /// Commit the settlement of the invocation holding `ticket`
    ///
    /// Returns `false` and leaves the record untouched when a newer
    /// invocation has started for `key` since.
    pub(crate) fn settle_invocation(
        &self,
        key: &LoadKey,
        ticket: Ticket,
        result: Result<R, E>,
        options: SetOptions<R, E>,
    ) -> bool {
        let written = self.write_with(key, options, |tickets, _| {
            tickets.accept(key, ticket).then(|| RecordPatch::settled(result))
        });
        if written.is_none() {
            self.inner.stats.record_stale_dropped();
            trace!(%key, ticket = ticket.0, "stale settlement dropped");
        }
        written.is_some()
    }

    fn wall_now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.inner.clock.system_time())
    }

    fn count_read(&self, hit: bool) {
        if hit {
            self.inner.stats.record_hit();
        } else {
            self.inner.stats.record_miss();
        }
    }

    fn get_memory(&self, key: &LoadKey) -> Option<Record<R, E>> {
        let now = self.inner.clock.now();
        let expired = {
            let mut state = self.inner.state.lock();
            match state.entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.record.clone()),
                Some(_) => state.entries.remove(key),
            }
        };
        if let Some(mut entry) = expired {
            entry.cancel_ttl();
            self.on_expired(key);
        }
        None
    }

    /// Apply the patch chosen by `decide` under the store lock
    ///
    /// `decide` sees the ticket book and the current unexpired record and
    /// returns `None` to abort the write.
    fn write_with<F>(
        &self,
        key: &LoadKey,
        options: SetOptions<R, E>,
        decide: F,
    ) -> Option<Record<R, E>>
    where
        F: FnOnce(&mut TicketBook, Option<&Record<R, E>>) -> Option<RecordPatch<R, E>>,
    {
        let now = self.inner.clock.now();
        let mut lapsed = false;
        let record = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            if state.entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
                if let Some(mut entry) = state.entries.remove(key) {
                    entry.cancel_ttl();
                }
                lapsed = true;
            }

            let current = state.entries.get(key).map(|entry| &entry.record);
            let patch = decide(&mut state.tickets, current);
            match patch {
                None => None,
                Some(patch) => {
                    let generation = options.cache_time.map(|_| {
                        state.next_generation += 1;
                        state.next_generation
                    });
                    let entry = state
                        .entries
                        .entry(key.clone())
                        .or_insert_with(|| Entry::new(Record::idle(now)));
                    patch.apply(&mut entry.record, now);

                    if let (Some(ttl), Some(generation)) = (options.cache_time, generation) {
                        entry.cancel_ttl();
                        entry.generation = generation;
                        entry.expires_at = Some(now + ttl);
                        entry.ttl = Some(self.arm_ttl(key.clone(), ttl, generation));
                    }
                    Some(entry.record.clone())
                }
            }
        };

        if lapsed {
            self.inner.stats.record_expiration();
        }
        let record = record?;
        self.inner.stats.record_write();
        self.persist(key, &record, options.provider.as_ref());
        self.emit(&StoreEvent::Set { key: key.clone(), record: record.clone(), origin: options.origin });
        Some(record)
    }

    fn arm_ttl(&self, key: LoadKey, ttl: Duration, generation: u64) -> TimerHandle {
        let weak = Arc::downgrade(&self.inner);
        schedule(ttl, move || {
            if let Some(inner) = weak.upgrade() {
                RecordStore { inner }.expire(&key, generation);
            }
        })
    }

    /// Timer-driven removal; ignored if the key was rewritten since
    fn expire(&self, key: &LoadKey, generation: u64) {
        let removed = {
            let mut state = self.inner.state.lock();
            match state.entries.get(key) {
                Some(entry) if entry.generation == generation => state.entries.remove(key),
                _ => None,
            }
        };
        if removed.is_some() {
            self.on_expired(key);
        }
    }

    fn on_expired(&self, key: &LoadKey) {
        self.inner.stats.record_expiration();
        debug!(%key, "record expired");
        if let Some(provider) = &self.inner.provider {
            if let Err(err) = provider.delete(key) {
                warn!(%key, error = %err, "cache provider delete failed");
            }
        }
        self.emit(&StoreEvent::Expired { key: key.clone() });
    }

    fn persist(
        &self,
        key: &LoadKey,
        record: &Record<R, E>,
        provider_override: Option<&Arc<dyn CacheProvider<R, E>>>,
    ) {
        let Some(provider) = provider_override.or(self.inner.provider.as_ref()) else {
            return;
        };
        let Some(persisted) = record.to_persisted(self.wall_now()) else {
            return;
        };
        if let Err(err) = provider.set(key, persisted) {
            warn!(%key, error = %err, "cache provider write failed");
        }
    }

    fn emit(&self, event: &StoreEvent<R, E>) {
        let listeners: Vec<Listener<R, E>> =
            self.inner.listeners.lock().iter().map(|(_, listener)| Arc::clone(listener)).collect();
        for listener in listeners {
            listener(event);
        }
    }
}
