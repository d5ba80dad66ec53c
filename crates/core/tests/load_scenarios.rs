//! Integration tests for the load lifecycle
//!
//! Drives controllers through the visible state machine on tokio's paused
//! clock: delay, slow timeout, rejection, cache policies, sharing between
//! subscribers and record expiry.

mod support;

use loadstate_common::testing::{advance_and_settle, settle};
use loadstate_core::{Loads, LoadOutcome, RecordStore, StatusView};
use loadstate_domain::{LoadKey, LoadOptions, LoadPolicy, LoadState, LoadStatus};
use support::{echo_loader, failing_loader, ms, CallCounter};

fn user_key(id: u32) -> LoadKey {
    LoadKey::build("user", &id).unwrap()
}

/// Validates the pending-to-resolved path with no delay.
///
/// This test ensures a mounted controller shows `pending` as soon as the
/// loader starts and `resolved` with the response once it settles.
///
/// # Test Steps
/// 1. Mount a controller whose loader takes 500ms
/// 2. Verify the snapshot is pending before the loader settles
/// 3. Advance past 500ms and verify the snapshot is resolved
#[tokio::test(start_paused = true)]
async fn test_pending_then_resolved() {
    support::init_logging();
    let calls = CallCounter::new();
    let loads = Loads::builder(RecordStore::new(), echo_loader("user", 500, &calls))
        .context("user")
        .variables(1)
        .build()
        .unwrap();

    loads.mount().unwrap();
    settle().await;
    assert!(loads.snapshot().is_pending());

    advance_and_settle(ms(499)).await;
    assert!(loads.snapshot().is_pending());

    advance_and_settle(ms(1)).await;
    let snapshot = loads.snapshot();
    assert!(snapshot.is_resolved());
    assert_eq!(snapshot.response.as_deref(), Some("user 1 #1"));
    assert_eq!(calls.get(), 1);
}

/// Validates the slow-timeout transition.
///
/// This test ensures a load running past its timeout is reported as
/// `pending-slow` and still resolves normally afterwards.
///
/// # Test Steps
/// 1. Mount with a 400ms timeout and a 500ms loader
/// 2. Verify the snapshot turns pending-slow at 400ms
/// 3. Verify the snapshot resolves at 500ms
#[tokio::test(start_paused = true)]
async fn test_timeout_marks_slow() {
    support::init_logging();
    let calls = CallCounter::new();
    let loads = Loads::builder(RecordStore::new(), echo_loader("user", 500, &calls))
        .context("user")
        .variables(1)
        .options(LoadOptions::default().with_timeout(ms(400)))
        .build()
        .unwrap();

    loads.mount().unwrap();
    settle().await;
    advance_and_settle(ms(399)).await;
    assert!(loads.snapshot().is_pending());

    advance_and_settle(ms(1)).await;
    assert!(loads.snapshot().is_pending_slow());
    assert_eq!(StatusView::from(loads.snapshot()).status, LoadStatus::Timeout);

    advance_and_settle(ms(100)).await;
    assert!(loads.snapshot().is_resolved());
}

/// Validates the rejection path.
///
/// This test ensures a failing loader leaves the controller `rejected` with
/// the error and no response, and the record in the store rejected too.
///
/// # Test Steps
/// 1. Mount a controller whose loader fails after 500ms
/// 2. Verify the snapshot and the record are rejected with the error
#[tokio::test(start_paused = true)]
async fn test_rejection() {
    support::init_logging();
    let calls = CallCounter::new();
    let store = RecordStore::new();
    let loads = Loads::builder(store.clone(), failing_loader("boom", 500, &calls))
        .context("user")
        .variables(1)
        .build()
        .unwrap();

    loads.mount().unwrap();
    settle().await;
    advance_and_settle(ms(500)).await;

    let snapshot = loads.snapshot();
    assert!(snapshot.is_rejected());
    assert_eq!(snapshot.error.as_deref(), Some("boom"));
    assert!(snapshot.response.is_none());

    let record = store.get(&user_key(1)).unwrap();
    assert_eq!(record.state, LoadState::Rejected);
    assert_eq!(record.error.as_deref(), Some("boom"));
}

/// Validates sharing between two subscribers of one context.
///
/// This test ensures a second subscriber observes the first subscriber's
/// result through the store and never calls its own loader.
///
/// # Test Steps
/// 1. Mount subscriber A (loading) and deferred subscriber B on context `foo`
/// 2. Advance until A resolves
/// 3. Verify B reflects A's response while its loader was never called
/// 4. Verify a cache-first load on B is answered from cache
#[tokio::test(start_paused = true)]
async fn test_subscribers_share_context() {
    support::init_logging();
    let store = RecordStore::new();
    let calls_a = CallCounter::new();
    let calls_b = CallCounter::new();

    let a = Loads::builder(store.clone(), echo_loader("foo", 500, &calls_a))
        .context("foo")
        .variables(1)
        .build()
        .unwrap();
    let b = Loads::builder(store.clone(), echo_loader("bar", 500, &calls_b))
        .context("foo")
        .variables(1)
        .options(LoadOptions::default().deferred().with_load_policy(LoadPolicy::CacheFirst))
        .build()
        .unwrap();

    a.mount().unwrap();
    b.mount().unwrap();
    settle().await;
    assert!(b.snapshot().is_idle());

    advance_and_settle(ms(500)).await;
    assert_eq!(a.snapshot().response.as_deref(), Some("foo 1 #1"));
    assert_eq!(b.snapshot().response.as_deref(), Some("foo 1 #1"));

    let outcome = b.load().await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Skipped(ref snapshot) if snapshot.is_resolved()));
    assert_eq!(calls_a.get(), 1);
    assert_eq!(calls_b.get(), 0);
}

/// Validates a subscriber mounted after its context already resolved.
///
/// This test ensures a cache-first subscriber B mounted once A's record is
/// settled shows A's response straight away and never calls its loader.
///
/// # Test Steps
/// 1. Mount subscriber A on context `foo` and let it resolve
/// 2. Mount a non-deferred cache-first subscriber B on the same context
/// 3. Verify B is resolved with A's response and B's loader was never called
#[tokio::test(start_paused = true)]
async fn test_late_cache_first_subscriber() {
    support::init_logging();
    let store = RecordStore::new();
    let calls_a = CallCounter::new();
    let calls_b = CallCounter::new();

    let a = Loads::builder(store.clone(), echo_loader("foo", 500, &calls_a))
        .context("foo")
        .variables(1)
        .build()
        .unwrap();
    a.mount().unwrap();
    settle().await;
    advance_and_settle(ms(500)).await;
    assert!(a.snapshot().is_resolved());

    let b = Loads::builder(store.clone(), echo_loader("bar", 500, &calls_b))
        .context("foo")
        .variables(1)
        .options(LoadOptions::default().with_load_policy(LoadPolicy::CacheFirst))
        .build()
        .unwrap();
    b.mount().unwrap();
    settle().await;

    let snapshot = b.snapshot();
    assert!(snapshot.is_resolved());
    assert_eq!(snapshot.response.as_deref(), Some("foo 1 #1"));

    advance_and_settle(ms(1_000)).await;
    assert_eq!(calls_a.get(), 1);
    assert_eq!(calls_b.get(), 0);
}

/// Validates the cache-and-load policy on a cached record.
///
/// This test ensures a reload shows `reloading` with the previous response
/// still visible, then swaps in the new response.
///
/// # Test Steps
/// 1. Load once and let it resolve
/// 2. Load again and verify the reloading state keeps the old response
/// 3. Verify the second settlement replaces it
#[tokio::test(start_paused = true)]
async fn test_cache_and_load_reloads() {
    support::init_logging();
    let calls = CallCounter::new();
    let loads = Loads::builder(RecordStore::new(), echo_loader("user", 200, &calls))
        .context("user")
        .variables(1)
        .build()
        .unwrap();

    loads.load().await.unwrap();

    let task = tokio::spawn({
        let loads = loads.clone();
        async move { loads.load().await }
    });
    settle().await;
    let snapshot = loads.snapshot();
    assert!(snapshot.is_reloading());
    assert_eq!(snapshot.response.as_deref(), Some("user 1 #1"));

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome.response().map(String::as_str), Some("user 1 #2"));
    assert_eq!(calls.get(), 2);
}

/// Validates the cache-first and load-only policies on a cached record.
///
/// This test ensures cache-first answers without calling the loader while
/// load-only always calls it and starts from `pending`.
///
/// # Test Steps
/// 1. Populate the store through a first controller
/// 2. Verify a cache-first controller is answered from cache
/// 3. Verify a load-only controller calls its loader without showing the
///    cached response
#[tokio::test(start_paused = true)]
async fn test_cache_first_and_load_only() {
    support::init_logging();
    let store = RecordStore::new();
    let calls = CallCounter::new();
    let seed = Loads::builder(store.clone(), echo_loader("user", 10, &calls))
        .context("user")
        .variables(1)
        .build()
        .unwrap();
    seed.load().await.unwrap();

    let cache_first = Loads::builder(store.clone(), echo_loader("user", 10, &calls))
        .context("user")
        .variables(1)
        .options(LoadOptions::default().with_load_policy(LoadPolicy::CacheFirst))
        .build()
        .unwrap();
    let outcome = cache_first.load().await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Skipped(_)));
    assert_eq!(cache_first.snapshot().response.as_deref(), Some("user 1 #1"));
    assert_eq!(calls.get(), 1);

    let load_only = Loads::builder(store, echo_loader("user", 100, &calls))
        .context("user")
        .variables(1)
        .options(LoadOptions::default().with_load_policy(LoadPolicy::LoadOnly))
        .build()
        .unwrap();
    let task = tokio::spawn({
        let loads = load_only.clone();
        async move { loads.load().await }
    });
    settle().await;
    assert!(load_only.snapshot().is_pending());
    assert!(load_only.snapshot().response.is_none());

    task.await.unwrap().unwrap();
    assert_eq!(load_only.snapshot().response.as_deref(), Some("user 1 #2"));
}

/// Validates the delay option.
///
/// This test ensures a load settling within the delay never shows a loading
/// state, while a longer load shows it once the delay elapses.
///
/// # Test Steps
/// 1. Load with a 300ms delay and a 200ms loader and watch every change
/// 2. Verify the controller went straight from idle to resolved
/// 3. Reload with a 500ms loader and verify reloading appears at 300ms
#[tokio::test(start_paused = true)]
async fn test_delay_hides_fast_loads() {
    support::init_logging();
    let store = RecordStore::new();
    let calls = CallCounter::new();
    let fast = Loads::builder(store.clone(), echo_loader("user", 200, &calls))
        .context("user")
        .variables(1)
        .options(LoadOptions::default().with_delay(ms(300)))
        .build()
        .unwrap();

    let mut watcher = fast.subscribe();
    let mut seen = Vec::new();
    let task = tokio::spawn({
        let loads = fast.clone();
        async move { loads.load().await }
    });
    settle().await;
    advance_and_settle(ms(100)).await;
    assert!(fast.snapshot().is_idle());
    advance_and_settle(ms(100)).await;
    task.await.unwrap().unwrap();
    while watcher.has_changed().unwrap() {
        seen.push(watcher.borrow_and_update().state);
    }
    assert_eq!(seen, vec![LoadState::Resolved]);

    let slow = Loads::builder(store, echo_loader("user", 500, &calls))
        .context("user")
        .variables(2)
        .options(LoadOptions::default().with_delay(ms(300)))
        .build()
        .unwrap();
    slow.mount().unwrap();
    settle().await;
    advance_and_settle(ms(299)).await;
    assert!(slow.snapshot().is_idle());
    advance_and_settle(ms(1)).await;
    assert!(slow.snapshot().is_pending());
    advance_and_settle(ms(200)).await;
    assert!(slow.snapshot().is_resolved());
}

/// Validates record expiry through `cache_time`.
///
/// This test ensures a record written with a cache time is evicted once it
/// elapses, so the next cache-first load calls the loader again.
///
/// # Test Steps
/// 1. Load with a 1s cache time
/// 2. Advance past the cache time and verify the record is gone
/// 3. Verify a cache-first load calls the loader again
#[tokio::test(start_paused = true)]
async fn test_cache_time_expires_record() {
    support::init_logging();
    let store = RecordStore::new();
    let calls = CallCounter::new();
    let loads = Loads::builder(store.clone(), echo_loader("user", 10, &calls))
        .context("user")
        .variables(1)
        .options(
            LoadOptions::default()
                .with_cache_time(ms(1_000))
                .with_load_policy(LoadPolicy::CacheFirst),
        )
        .build()
        .unwrap();

    loads.load().await.unwrap();
    assert!(store.contains_key(&user_key(1)));

    settle().await;
    advance_and_settle(ms(1_000)).await;
    assert!(!store.contains_key(&user_key(1)));
    assert_eq!(store.stats().expirations, 1);

    let outcome = loads.load().await.unwrap();
    assert_eq!(outcome.response().map(String::as_str), Some("user 1 #2"));
    assert_eq!(calls.get(), 2);
}

/// Validates that switching arguments re-keys the controller.
///
/// This test ensures a load with new arguments writes a separate record and
/// leaves the previous one untouched.
///
/// # Test Steps
/// 1. Load ids 1 and 2 through the same controller
/// 2. Verify both records exist and the controller tracks the latest key
#[tokio::test(start_paused = true)]
async fn test_load_with_rekeys() {
    support::init_logging();
    let store = RecordStore::new();
    let calls = CallCounter::new();
    let loads = Loads::builder(store.clone(), echo_loader("user", 10, &calls))
        .context("user")
        .build()
        .unwrap();

    loads.load_with(1).await.unwrap();
    loads.load_with(2).await.unwrap();

    assert_eq!(loads.key(), Some(user_key(2)));
    assert_eq!(store.keys(), vec![user_key(1), user_key(2)]);
    assert_eq!(loads.snapshot().response.as_deref(), Some("user 2 #2"));

    // Without variables, `load` reuses the last arguments.
    loads.load().await.unwrap();
    assert_eq!(loads.snapshot().response.as_deref(), Some("user 2 #3"));
}
