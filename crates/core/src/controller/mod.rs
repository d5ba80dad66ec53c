//! Invocation controller
//!
//! A [`Loads`] controller owns one subscriber's view of a logical request. It
//! derives the record key from its context and arguments, consults the load
//! policy, invokes (or joins) the loader, drives the visible state through
//! the delay and slow timers, and commits the settlement to both the shared
//! [`RecordStore`] and its own [`LoadsSnapshot`].
//!
//! ## Staleness
//!
//! Every load bumps a per-controller sequence number. A settlement is
//! committed to the snapshot only if its sequence number is still the latest
//! and the controller has not been torn down; otherwise it is discarded
//! without error. Store writes are guarded separately by per-key tickets, so
//! a settlement that is stale for this controller may still be the newest
//! result for the key and reach other subscribers.
//!
//! ## Locking
//!
//! Local state is guarded by a `parking_lot::Mutex`. The store is never
//! called while that lock is held, because store listeners (including this
//! controller's own) run synchronously on the writing thread.

mod builder;
mod snapshot;

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use loadstate_common::time::{recurring, schedule, TimerHandle};
use loadstate_common::CommonError;
use loadstate_domain::{LoadError, LoadEvent, LoadKey, LoadOptions, LoadResult, LoadState};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub use self::builder::LoadsBuilder;
pub use self::snapshot::{LoadOutcome, LoadsSnapshot};
use crate::dedup::reusable_promise;
use crate::loader::{LoadArgs, Loader, LoaderMeta, OptimisticSink, Variables};
use crate::optimistic::{self, Optimistic, OptimisticTarget};
use crate::policy::{evaluate, is_cache_hit, PolicyDecision};
use crate::revalidate::RevalidateTrigger;
use crate::store::{
    InFlight, Payload, Record, RecordStore, SetOptions, StoreEvent, StoreSubscription,
    SubscriberId, Ticket,
};
use crate::suspense::{SuspendHandle, Suspended};

pub(crate) type ResolveHook<R> = Arc<dyn Fn(&R) + Send + Sync>;
pub(crate) type RejectHook<E> = Arc<dyn Fn(&E) + Send + Sync>;
pub(crate) type PollGuard<R, E> = Arc<dyn Fn(&LoadsSnapshot<R, E>) -> bool + Send + Sync>;

/// Which loader a load runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Which {
    Main,
    Update(usize),
}

/// A loader call this controller is waiting on
struct Running<R, E> {
    seq: u64,
    key: LoadKey,
    /// `None` when the call was joined rather than invoked
    ticket: Option<Ticket>,
    promise: InFlight<R, E>,
}

enum Invocation<R, E> {
    Skipped(LoadsSnapshot<R, E>),
    Running(Running<R, E>),
}

struct Local<A> {
    seq: u64,
    key: Option<LoadKey>,
    last_args: Option<A>,
    active: bool,
    in_flight: bool,
    delay_timer: Option<TimerHandle>,
    slow_timer: Option<TimerHandle>,
    retry_timer: Option<TimerHandle>,
}

impl<A> Local<A> {
    fn new() -> Self {
        Self {
            seq: 0,
            key: None,
            last_args: None,
            active: true,
            in_flight: false,
            delay_timer: None,
            slow_timer: None,
            retry_timer: None,
        }
    }

    fn cancel_timers(&mut self) {
        for timer in [self.delay_timer.take(), self.slow_timer.take()].into_iter().flatten() {
            timer.cancel();
        }
    }

    fn cancel_retry(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.cancel();
        }
    }
}

#[derive(Default)]
struct Background {
    poller: Option<TimerHandle>,
    triggers: Vec<JoinHandle<()>>,
}

impl Background {
    fn stop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.cancel();
        }
        for task in self.triggers.drain(..) {
            task.abort();
        }
    }
}

struct Hooks<R, E> {
    on_resolve: Option<ResolveHook<R>>,
    on_reject: Option<RejectHook<E>>,
    poll_while: Option<PollGuard<R, E>>,
}

pub(crate) struct LoadsInner<A, R, E> {
    id: SubscriberId,
    context: Option<String>,
    options: LoadOptions,
    variables: Option<Variables<A>>,
    loader: Loader<A, R, E>,
    updaters: Vec<Loader<A, R, E>>,
    store: RecordStore<R, E>,
    hooks: Hooks<R, E>,
    local: Mutex<Local<A>>,
    snapshot: watch::Sender<LoadsSnapshot<R, E>>,
    subscription: Mutex<Option<StoreSubscription>>,
    background: Mutex<Background>,
}

impl<A, R, E> Drop for LoadsInner<A, R, E> {
    fn drop(&mut self) {
        let local = self.local.get_mut();
        local.cancel_timers();
        local.cancel_retry();
        self.background.get_mut().stop();
    }
}

/// Invocation controller for one subscriber
///
/// Cheap to clone; clones drive the same controller.
pub struct Loads<A, R, E> {
    inner: Arc<LoadsInner<A, R, E>>,
}

impl<A, R, E> Clone for Loads<A, R, E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<A, R, E> fmt::Debug for Loads<A, R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loads")
            .field("id", &self.inner.id)
            .field("context", &self.inner.context)
            .field("state", &self.inner.snapshot.borrow().state)
            .finish_non_exhaustive()
    }
}

impl<A: LoadArgs, R: Payload, E: Payload + fmt::Debug> Loads<A, R, E> {
    /// Start configuring a controller that loads through `loader` and caches
    /// in `store`
    pub fn builder(store: RecordStore<R, E>, loader: Loader<A, R, E>) -> LoadsBuilder<A, R, E> {
        LoadsBuilder::new(store, loader)
    }

    fn from_builder(builder: LoadsBuilder<A, R, E>) -> LoadResult<Self, E> {
        builder.options.validate()?;

        let id = builder.store.next_subscriber_id();
        let initial =
            builder.initial_response.map_or_else(LoadsSnapshot::idle, LoadsSnapshot::with_response);
        let (snapshot, _) = watch::channel(initial);

        let inner = Arc::new(LoadsInner {
            id,
            context: builder.context,
            options: builder.options,
            variables: builder.variables,
            loader: builder.loader,
            updaters: builder.updaters,
            store: builder.store,
            hooks: Hooks {
                on_resolve: builder.on_resolve,
                on_reject: builder.on_reject,
                poll_while: builder.poll_while,
            },
            local: Mutex::new(Local::new()),
            snapshot,
            subscription: Mutex::new(None),
            background: Mutex::new(Background::default()),
        });

        let weak = Arc::downgrade(&inner);
        let subscription = inner.store.subscribe(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_store_event(event);
            }
        });
        *inner.subscription.lock() = Some(subscription);

        debug!(subscriber = %id, context = ?inner.context, "loads created");
        Ok(Self { inner })
    }

    /// Identity used to tag this controller's store writes
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Current visible state
    pub fn snapshot(&self) -> LoadsSnapshot<R, E> {
        self.inner.snapshot.borrow().clone()
    }

    /// Watch the visible state
    pub fn subscribe(&self) -> watch::Receiver<LoadsSnapshot<R, E>> {
        self.inner.snapshot.subscribe()
    }

    /// Key of the most recent load, if any
    pub fn key(&self) -> Option<LoadKey> {
        self.inner.local.lock().key.clone()
    }

    /// Whether the controller has not been torn down
    pub fn is_active(&self) -> bool {
        self.inner.local.lock().active
    }

    /// Options the controller was built with
    pub fn options(&self) -> &LoadOptions {
        &self.inner.options
    }

    /// Attach the controller: reflect the cache, start polling and, unless
    /// deferred, load in the background
    ///
    /// # Errors
    ///
    /// - [`LoadError::Inactive`] after teardown
    /// - [`LoadError::Misconfigured`] when an automatic load has no arguments
    ///   or no tokio runtime is running
    pub fn mount(&self) -> LoadResult<(), E> {
        let inner = &self.inner;
        if !self.is_active() {
            return Err(LoadError::Inactive);
        }

        let args = self.default_args();
        if let Some(args) = &args {
            let key = inner.derive_key(args)?;
            let cached = if inner.options.load_policy.reads_cache() {
                inner.store.get(&key).filter(|record| record.state.is_settled() && record.has_value())
            } else {
                None
            };

            let mut local = inner.local.lock();
            local.key = Some(key);
            if let Some(record) = cached.filter(|_| !local.in_flight) {
                inner.snapshot.send_modify(|snapshot| snapshot.reflect(&record));
            }
        }

        self.start_polling();

        if inner.options.defer {
            return Ok(());
        }
        let Some(args) = args else {
            return Err(LoadError::Misconfigured(
                "nothing to load with: configure variables or defer".to_string(),
            ));
        };
        self.start(Which::Main, args)?;
        Ok(())
    }

    /// Load with the configured variables, or the last arguments used
    ///
    /// # Errors
    ///
    /// - [`LoadError::Inactive`] after teardown
    /// - [`LoadError::Misconfigured`] when no arguments are available or no
    ///   tokio runtime is running
    /// - [`LoadError::Key`] when the arguments cannot be serialized
    /// - [`LoadError::Rejected`] when the loader fails and `throw_error` is
    ///   set outside suspense mode
    pub async fn load(&self) -> LoadResult<LoadOutcome<R, E>, E> {
        let args = self.default_args().ok_or_else(Self::no_args)?;
        self.run(Which::Main, args).await
    }

    /// Load with `args`
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`].
    pub async fn load_with(&self, args: A) -> LoadResult<LoadOutcome<R, E>, E> {
        self.run(Which::Main, args).await
    }

    /// Run the update loader registered at `index`
    ///
    /// Update loaders always call through; they never answer from cache or
    /// join an in-flight call.
    ///
    /// # Errors
    ///
    /// [`LoadError::UnknownUpdater`] when nothing is registered at `index`,
    /// otherwise as [`Self::load`].
    pub async fn update(&self, index: usize) -> LoadResult<LoadOutcome<R, E>, E> {
        self.inner.loader_for(Which::Update(index))?;
        let args = self.default_args().ok_or_else(Self::no_args)?;
        self.run(Which::Update(index), args).await
    }

    /// Run the update loader registered at `index` with `args`
    ///
    /// # Errors
    ///
    /// Same as [`Self::update`].
    pub async fn update_with(&self, index: usize, args: A) -> LoadResult<LoadOutcome<R, E>, E> {
        self.inner.loader_for(Which::Update(index))?;
        self.run(Which::Update(index), args).await
    }

    /// Reload with the last arguments used
    ///
    /// Subject to the same policy and dedup rules as [`Self::load`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`].
    pub async fn revalidate(&self) -> LoadResult<LoadOutcome<R, E>, E> {
        let args = self.revalidate_args()?;
        self.run(Which::Main, args).await
    }

    /// Return the visible state to idle
    ///
    /// Any load in flight is superseded. Resetting an idle controller changes
    /// nothing and notifies nobody. The store is left untouched.
    pub fn reset(&self) {
        let inner = &self.inner;
        let mut local = inner.local.lock();
        local.seq += 1;
        local.in_flight = false;
        local.cancel_timers();
        local.cancel_retry();
        inner.snapshot.send_if_modified(|snapshot| {
            if snapshot.is_idle() && !snapshot.has_value() {
                return false;
            }
            *snapshot = LoadsSnapshot::idle();
            true
        });
    }

    /// Detach the controller
    ///
    /// Results of loads still in flight are discarded from the visible state
    /// but still reach the store. Further loads fail with
    /// [`LoadError::Inactive`].
    pub fn teardown(&self) {
        let inner = &self.inner;
        let subscription = {
            let mut local = inner.local.lock();
            if !local.active {
                return;
            }
            local.active = false;
            local.seq += 1;
            local.in_flight = false;
            local.cancel_timers();
            local.cancel_retry();
            inner.subscription.lock().take()
        };
        drop(subscription);
        inner.background.lock().stop();
        debug!(subscriber = %inner.id, "loads torn down");
    }

    /// Reload with the last arguments whenever `trigger` fires
    ///
    /// # Errors
    ///
    /// [`LoadError::Misconfigured`] outside a tokio runtime.
    pub fn revalidate_on(&self, trigger: &RevalidateTrigger) -> LoadResult<(), E> {
        let runtime = Self::runtime()?;
        let mut receiver = trigger.subscribe();
        let weak = Arc::downgrade(&self.inner);

        let task = runtime.spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let loads = Loads { inner };
                if let Err(err) = loads.start_revalidate() {
                    debug!(subscriber = %loads.id(), error = %err, "triggered revalidation failed");
                }
            }
        });
        self.inner.background.lock().triggers.push(task);
        Ok(())
    }

    /// Commit `value` to this controller's key without calling the loader
    ///
    /// # Errors
    ///
    /// - [`LoadError::Inactive`] after teardown
    /// - [`LoadError::Misconfigured`] when the controller has no key yet
    pub fn set_response(&self, value: impl Into<Optimistic<R>>) -> LoadResult<Record<R, E>, E> {
        self.inner.commit_response(OptimisticTarget::Own, value.into())
    }

    /// Commit `value` to `target` without calling the loader
    ///
    /// Only a write landing on this controller's own key changes its visible
    /// state.
    ///
    /// # Errors
    ///
    /// Same as [`Self::set_response`].
    pub fn set_response_to(
        &self,
        target: OptimisticTarget,
        value: impl Into<Optimistic<R>>,
    ) -> LoadResult<Record<R, E>, E> {
        self.inner.commit_response(target, value.into())
    }

    /// Commit `error` to this controller's key without calling the loader
    ///
    /// # Errors
    ///
    /// Same as [`Self::set_response`].
    pub fn set_error(&self, error: E) -> LoadResult<Record<R, E>, E> {
        self.inner.commit_error(OptimisticTarget::Own, error)
    }

    /// Commit `error` to `target` without calling the loader
    ///
    /// # Errors
    ///
    /// Same as [`Self::set_response`].
    pub fn set_error_to(&self, target: OptimisticTarget, error: E) -> LoadResult<Record<R, E>, E> {
        self.inner.commit_error(target, error)
    }

    /// Suspense read with the configured variables
    ///
    /// # Errors
    ///
    /// Same as [`Self::read_with`].
    pub fn read(&self) -> LoadResult<Suspended<R, E>, E> {
        let args = self.default_args().ok_or_else(Self::no_args)?;
        self.read_with(args)
    }

    /// Suspense read with `args`
    ///
    /// Answers from cache when possible. Otherwise starts (or joins) a load
    /// in the background and hands back a handle to await before reading
    /// again.
    ///
    /// # Errors
    ///
    /// [`LoadError::Misconfigured`] unless the controller runs in suspense
    /// mode, has a context, and a tokio runtime is running.
    pub fn read_with(&self, args: A) -> LoadResult<Suspended<R, E>, E> {
        let inner = &self.inner;
        if !inner.options.suspense {
            return Err(LoadError::Misconfigured("read requires suspense mode".to_string()));
        }
        if inner.context.is_none() {
            return Err(LoadError::Misconfigured("suspense reads require a context".to_string()));
        }
        Self::runtime()?;

        let key = inner.derive_key(&args)?;
        let now = inner.store.clock().now();
        let cached = inner.store.get(&key);
        let hit = inner.options.load_policy.reads_cache()
            && is_cache_hit(cached.as_ref(), now, inner.options.revalidate_time);
        match cached {
            Some(record) if hit => {
                {
                    let mut local = inner.local.lock();
                    local.key = Some(key);
                    local.last_args = Some(args.clone());
                    if !local.in_flight {
                        inner.snapshot.send_modify(|snapshot| snapshot.reflect(&record));
                    }
                }
                if let Some(error) = record.error {
                    return Ok(Suspended::Rejected(error));
                }
                if let Some(response) = record.response {
                    return Ok(Suspended::Resolved(response));
                }
            }
            // Readers of a key that is already loading wait on that call,
            // however long ago it started.
            Some(Record { state, promise: Some(promise), .. }) if state.is_loading() => {
                return Ok(Suspended::Pending(SuspendHandle::new(promise)));
            }
            _ => {}
        }

        if let Some(promise) = self.start(Which::Main, args)? {
            return Ok(Suspended::Pending(SuspendHandle::new(promise)));
        }
        let snapshot = self.snapshot();
        match (snapshot.response, snapshot.error) {
            (_, Some(error)) => Ok(Suspended::Rejected(error)),
            (Some(response), None) => Ok(Suspended::Resolved(response)),
            (None, None) => Err(LoadError::Misconfigured(
                "cache-only read found no cached record".to_string(),
            )),
        }
    }

    /// Begin a load and settle it on a background task
    ///
    /// Returns the in-flight call, or `None` when the policy answered from
    /// cache.
    fn start(&self, which: Which, args: A) -> LoadResult<Option<InFlight<R, E>>, E> {
        let runtime = Self::runtime()?;
        match self.begin(which, args)? {
            Invocation::Skipped(_) => Ok(None),
            Invocation::Running(running) => {
                let promise = running.promise.clone();
                let loads = self.clone();
                runtime.spawn(async move {
                    if let Err(err) = loads.settle(running).await {
                        debug!(subscriber = %loads.id(), error = %err, "background load failed");
                    }
                });
                Ok(Some(promise))
            }
        }
    }

    pub(crate) fn start_main(&self, args: A) -> LoadResult<Option<InFlight<R, E>>, E> {
        self.start(Which::Main, args)
    }

    /// Background reload with the last arguments, settled on its own task
    fn start_revalidate(&self) -> LoadResult<Option<InFlight<R, E>>, E> {
        let args = self.revalidate_args()?;
        self.start(Which::Main, args)
    }

    /// Begin a load and wait for its settlement
    ///
    /// The settlement runs on a spawned task. Dropping the returned future
    /// stops the wait only; the loader still runs to completion and its
    /// result still reaches the store and the snapshot.
    async fn run(&self, which: Which, args: A) -> LoadResult<LoadOutcome<R, E>, E> {
        let runtime = Self::runtime()?;
        match self.begin(which, args)? {
            Invocation::Skipped(snapshot) => Ok(LoadOutcome::Skipped(snapshot)),
            Invocation::Running(running) => {
                let key = running.key.clone();
                let loads = self.clone();
                runtime.spawn(async move { loads.settle(running).await }).await.map_err(|err| {
                    LoadError::Common(CommonError::internal_with_context(
                        format!("settlement task failed: {err}"),
                        key.to_string(),
                    ))
                })?
            }
        }
    }

    /// Synchronous half of a load: key, policy, dedup, invocation and the
    /// visible loading transition
    fn begin(&self, which: Which, args: A) -> LoadResult<Invocation<R, E>, E> {
        let inner = &self.inner;
        if !self.is_active() {
            return Err(LoadError::Inactive);
        }
        let loader = inner.loader_for(which)?.clone();
        let key = inner.derive_key(&args)?;

        let now = inner.store.clock().now();
        let cached = inner.store.get(&key);
        let decision = match which {
            Which::Main => evaluate(
                is_cache_hit(cached.as_ref(), now, inner.options.revalidate_time),
                inner.options.load_policy,
            ),
            Which::Update(_) => PolicyDecision::default(),
        };
        let shown = cached.as_ref().filter(|_| decision.show_cached_while_pending);

        if decision.skip_invocation {
            let mut local = inner.local.lock();
            local.seq += 1;
            local.key = Some(key.clone());
            local.last_args = Some(args);
            local.in_flight = false;
            local.cancel_timers();
            if let Some(record) = shown {
                inner.snapshot.send_modify(|snapshot| snapshot.reflect(record));
            }
            debug!(
                subscriber = %inner.id,
                %key,
                policy = %inner.options.load_policy,
                "load answered from cache"
            );
            let snapshot = inner.snapshot.borrow().clone();
            return Ok(Invocation::Skipped(snapshot));
        }

        let joined = match which {
            Which::Main => cached
                .as_ref()
                .and_then(|record| reusable_promise(record, now, inner.options.dedup_window)),
            Which::Update(_) => None,
        };
        let (promise, ticket) = match joined {
            Some(promise) => {
                inner.store.record_dedup_hit();
                debug!(subscriber = %inner.id, %key, "joined in-flight load");
                (promise, None)
            }
            None => {
                let meta = LoaderMeta::new(cached.clone(), self.sink());
                let promise = loader.call(args.clone(), meta).shared();
                let ticket = inner.store.begin_invocation(&key, promise.clone(), inner.id);
                debug!(subscriber = %inner.id, %key, ?which, "loader invoked");
                (promise, Some(ticket))
            }
        };

        let seq = self.show_started(key.clone(), args, shown);
        Ok(Invocation::Running(Running { seq, key, ticket, promise }))
    }

    /// Record a started load locally and arm the delay and slow timers
    fn show_started(&self, key: LoadKey, args: A, shown: Option<&Record<R, E>>) -> u64 {
        let inner = &self.inner;
        let mut local = inner.local.lock();
        local.seq += 1;
        let seq = local.seq;
        local.key = Some(key);
        local.last_args = Some(args);
        local.in_flight = true;
        local.cancel_timers();
        local.cancel_retry();

        if let Some(record) = shown {
            inner.snapshot.send_modify(|snapshot| snapshot.reflect(record));
        }

        if inner.options.delay.is_zero() {
            inner.show_loading();
        } else {
            let weak = Arc::downgrade(&self.inner);
            local.delay_timer = Some(schedule(inner.options.delay, move || {
                if let Some(inner) = weak.upgrade() {
                    inner.on_delay_elapsed(seq);
                }
            }));
        }

        if let Some(timeout) = inner.options.timeout {
            let weak = Arc::downgrade(&self.inner);
            local.slow_timer = Some(schedule(timeout, move || {
                if let Some(inner) = weak.upgrade() {
                    inner.on_slow(seq);
                }
            }));
        }
        seq
    }

    /// Await a running call and commit its result
    async fn settle(&self, running: Running<R, E>) -> LoadResult<LoadOutcome<R, E>, E> {
        let Running { seq, key, ticket, promise } = running;
        let result = promise.await;

        // The store write happens even when this controller no longer cares:
        // other subscribers of the key still converge on the result.
        if let Some(ticket) = ticket {
            self.inner.store.settle_invocation(&key, ticket, result.clone(), self.inner.write_options());
        }
        self.commit(seq, &key, result)
    }

    fn commit(&self, seq: u64, key: &LoadKey, result: Result<R, E>) -> LoadResult<LoadOutcome<R, E>, E> {
        let inner = &self.inner;
        {
            let mut local = inner.local.lock();
            if !local.active || local.seq != seq {
                trace!(subscriber = %inner.id, %key, seq, latest = local.seq, "superseded result discarded");
                return Ok(LoadOutcome::Superseded);
            }
            local.in_flight = false;
            local.cancel_timers();

            inner.snapshot.send_modify(|snapshot| match &result {
                Ok(response) => {
                    snapshot.state = settle_state(snapshot.state, LoadEvent::Resolve);
                    snapshot.response = Some(response.clone());
                    snapshot.error = None;
                }
                Err(error) => {
                    snapshot.state = settle_state(snapshot.state, LoadEvent::Reject);
                    snapshot.error = Some(error.clone());
                    snapshot.response = None;
                }
            });

            if result.is_err() {
                if let Some(interval) = inner.options.reject_retry_interval {
                    local.retry_timer = Some(self.arm_retry(interval, seq));
                }
            }
        }

        match result {
            Ok(response) => {
                if let Some(hook) = &inner.hooks.on_resolve {
                    hook(&response);
                }
                Ok(LoadOutcome::Resolved(response))
            }
            Err(error) => {
                if let Some(hook) = &inner.hooks.on_reject {
                    hook(&error);
                }
                if inner.options.throw_error && !inner.options.suspense {
                    Err(LoadError::Rejected(error))
                } else {
                    Ok(LoadOutcome::Rejected(error))
                }
            }
        }
    }

    fn arm_retry(&self, interval: Duration, seq: u64) -> TimerHandle {
        let weak = Arc::downgrade(&self.inner);
        schedule(interval, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.local.lock().seq != seq {
                return;
            }
            let loads = Loads { inner };
            if let Err(err) = loads.start_revalidate() {
                debug!(subscriber = %loads.id(), error = %err, "reject retry failed");
            }
        })
    }

    fn start_polling(&self) {
        let Some(interval) = self.inner.options.polling_interval else {
            return;
        };
        let mut background = self.inner.background.lock();
        if background.poller.is_some() {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        background.poller = Some(recurring(interval, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.should_poll() {
                return;
            }
            let loads = Loads { inner };
            if let Err(err) = loads.start_revalidate() {
                debug!(subscriber = %loads.id(), error = %err, "poll failed");
            }
        }));
    }

    fn revalidate_args(&self) -> LoadResult<A, E> {
        let last = self.inner.local.lock().last_args.clone();
        last.or_else(|| self.default_args()).ok_or_else(Self::no_args)
    }

    fn default_args(&self) -> Option<A> {
        match &self.inner.variables {
            Some(variables) => Some(variables.resolve()),
            None => self.inner.local.lock().last_args.clone(),
        }
    }

    fn sink(&self) -> Weak<dyn OptimisticSink<R, E>> {
        let weak: Weak<LoadsInner<A, R, E>> = Arc::downgrade(&self.inner);
        weak
    }

    fn runtime() -> LoadResult<Handle, E> {
        Handle::try_current()
            .map_err(|_| LoadError::Misconfigured("a tokio runtime is required".to_string()))
    }

    fn no_args() -> LoadError<E> {
        LoadError::Misconfigured("no arguments: pass them or configure variables".to_string())
    }
}

/// Settled state for `event`; settlement is legal from every state
fn settle_state(state: LoadState, event: LoadEvent) -> LoadState {
    state.transition(event).unwrap_or(match event {
        LoadEvent::Reject => LoadState::Rejected,
        _ => LoadState::Resolved,
    })
}

impl<A: LoadArgs, R: Payload, E: Payload + fmt::Debug> LoadsInner<A, R, E> {
    fn loader_for(&self, which: Which) -> LoadResult<&Loader<A, R, E>, E> {
        match which {
            Which::Main => Ok(&self.loader),
            Which::Update(index) => self.updaters.get(index).ok_or(LoadError::UnknownUpdater(index)),
        }
    }

    fn derive_key(&self, args: &A) -> LoadResult<LoadKey, E> {
        let private;
        let context = match &self.context {
            Some(context) => context.as_str(),
            None => {
                private = format!("~{}", self.id);
                private.as_str()
            }
        };
        LoadKey::build(context, args).map_err(|err| LoadError::Key(err.to_string()))
    }

    fn own_key(&self) -> LoadResult<LoadKey, E> {
        if let Some(key) = self.local.lock().key.clone() {
            return Ok(key);
        }
        match &self.variables {
            Some(variables) => self.derive_key(&variables.resolve()),
            None => Err(LoadError::Misconfigured(
                "no key yet: load first or configure variables".to_string(),
            )),
        }
    }

    fn write_options(&self) -> SetOptions<R, E> {
        SetOptions::new().with_cache_time(self.options.cache_time).with_origin(self.id)
    }

    /// Enter the loading state, or drop back out of a slow one
    fn show_loading(&self) {
        self.snapshot.send_if_modified(|snapshot| {
            let next = if snapshot.state.is_pending() {
                LoadState::Pending
            } else if snapshot.state.is_reloading() {
                LoadState::Reloading
            } else {
                match snapshot.state.transition(LoadEvent::Start { has_cached: snapshot.has_value() }) {
                    Ok(next) => next,
                    Err(err) => {
                        warn!(subscriber = %self.id, error = %err, "cannot show loading");
                        return false;
                    }
                }
            };
            let changed = next != snapshot.state;
            snapshot.state = next;
            changed
        });
    }

    fn on_delay_elapsed(&self, seq: u64) {
        let mut local = self.local.lock();
        local.delay_timer = None;
        if local.active && local.in_flight && local.seq == seq {
            self.show_loading();
        }
    }

    fn on_slow(&self, seq: u64) {
        let mut local = self.local.lock();
        local.slow_timer = None;
        if !(local.active && local.in_flight && local.seq == seq) {
            return;
        }
        if !self.snapshot.borrow().state.is_loading() {
            self.show_loading();
        }
        self.snapshot.send_if_modified(|snapshot| match snapshot.state.transition(LoadEvent::Slow) {
            Ok(next) => {
                let changed = next != snapshot.state;
                snapshot.state = next;
                changed
            }
            Err(err) => {
                warn!(subscriber = %self.id, error = %err, "slow timer fired outside a load");
                false
            }
        });
        debug!(subscriber = %self.id, seq, "load is slow");
    }

    fn should_poll(&self) -> bool {
        let local = self.local.lock();
        if !local.active || local.in_flight {
            return false;
        }
        drop(local);
        match &self.hooks.poll_while {
            Some(guard) => {
                let snapshot = self.snapshot.borrow().clone();
                guard(&snapshot)
            }
            None => true,
        }
    }

    /// Mirror settled records other subscribers write to this key, and drop
    /// back to idle when the record is deleted
    fn on_store_event(&self, event: &StoreEvent<R, E>) {
        match event {
            StoreEvent::Set { key, record, origin } => {
                if *origin == Some(self.id) || !record.state.is_settled() {
                    return;
                }
                let local = self.local.lock();
                if !local.active || local.in_flight || local.key.as_ref() != Some(key) {
                    return;
                }
                self.snapshot.send_modify(|snapshot| snapshot.reflect(record));
                trace!(subscriber = %self.id, %key, "reflected peer write");
            }
            StoreEvent::Deleted { key } => self.forget(Some(key)),
            StoreEvent::Cleared => self.forget(None),
            // Expiry evicts unused records only; what is shown stays.
            StoreEvent::Expired { .. } => {}
        }
    }

    /// Reset the visible state after its record was removed; `None` means
    /// every record went
    fn forget(&self, removed: Option<&LoadKey>) {
        let local = self.local.lock();
        if !local.active || local.in_flight {
            return;
        }
        let Some(own) = local.key.as_ref() else {
            return;
        };
        if removed.is_some_and(|key| key != own) {
            return;
        }
        let changed = self.snapshot.send_if_modified(|snapshot| {
            if snapshot.is_idle() && !snapshot.has_value() {
                return false;
            }
            *snapshot = LoadsSnapshot::idle();
            true
        });
        if changed {
            trace!(subscriber = %self.id, key = %own, "record removed, reset to idle");
        }
    }

    fn reflect_own(&self, key: &LoadKey, record: &Record<R, E>) {
        let local = self.local.lock();
        if local.active && local.key.as_ref() == Some(key) {
            self.snapshot.send_modify(|snapshot| snapshot.reflect(record));
        }
    }

    fn ensure_active(&self) -> LoadResult<(), E> {
        if self.local.lock().active {
            Ok(())
        } else {
            Err(LoadError::Inactive)
        }
    }
}

impl<A: LoadArgs, R: Payload, E: Payload + fmt::Debug> OptimisticSink<R, E> for LoadsInner<A, R, E> {
    fn commit_response(
        &self,
        target: OptimisticTarget,
        value: Optimistic<R>,
    ) -> LoadResult<Record<R, E>, E> {
        self.ensure_active()?;
        let own = self.own_key()?;
        let key = target.resolve(&own);
        let record = optimistic::commit_response(&self.store, &key, value, self.write_options());
        if key == own {
            {
                let mut local = self.local.lock();
                local.key.get_or_insert_with(|| own.clone());
            }
            self.reflect_own(&key, &record);
        }
        debug!(subscriber = %self.id, %key, "optimistic response committed");
        Ok(record)
    }

    fn commit_error(&self, target: OptimisticTarget, error: E) -> LoadResult<Record<R, E>, E> {
        self.ensure_active()?;
        let own = self.own_key()?;
        let key = target.resolve(&own);
        let record = optimistic::commit_error(&self.store, &key, error, self.write_options());
        if key == own {
            {
                let mut local = self.local.lock();
                local.key.get_or_insert_with(|| own.clone());
            }
            self.reflect_own(&key, &record);
        }
        debug!(subscriber = %self.id, %key, "optimistic error committed");
        Ok(record)
    }
}
