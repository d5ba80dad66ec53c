//! Integration tests for suspense reads, preloading and optimistic writes
//! across subscribers.

mod support;

use loadstate_common::testing::{settle, timeout_ok};
use loadstate_core::{preload, Loader, Loads, OptimisticTarget, RecordStore, Resource, Suspended};
use loadstate_domain::{LoadError, LoadKey, LoadOptions, LoadPolicy};
use support::{echo_loader, failing_loader, ms, CallCounter};

/// Validates the suspend-then-read cycle.
///
/// This test ensures a first read suspends on the in-flight call and a read
/// after it settles returns the value synchronously.
///
/// # Test Steps
/// 1. Read through a suspense controller with an empty store
/// 2. Await the returned handle
/// 3. Read again and verify the value comes from cache
#[tokio::test(start_paused = true)]
async fn test_suspend_then_read() {
    let calls = CallCounter::new();
    let loads = Loads::builder(RecordStore::new(), echo_loader("user", 100, &calls))
        .context("user")
        .variables(1)
        .options(LoadOptions::default().with_suspense())
        .build()
        .unwrap();

    let Suspended::Pending(handle) = loads.read().unwrap() else {
        panic!("first read should suspend");
    };
    assert!(loads.snapshot().is_pending());
    let settled = timeout_ok(ms(1_000), handle).await.expect("suspended load should settle");
    assert_eq!(settled.as_deref(), Ok("user 1 #1"));
    settle().await;

    match loads.read().unwrap() {
        Suspended::Resolved(response) => assert_eq!(response, "user 1 #1"),
        other => panic!("expected a cached value, got {other:?}"),
    }
    assert_eq!(calls.get(), 1);
}

/// Validates suspense reads of a rejected record.
///
/// This test ensures a settled rejection is surfaced to the reader as
/// `Rejected` instead of suspending again.
///
/// # Test Steps
/// 1. Read through a failing loader and await the handle
/// 2. Read again and verify the rejection is returned
#[tokio::test(start_paused = true)]
async fn test_read_rejected_record() {
    let calls = CallCounter::new();
    let loads = Loads::builder(RecordStore::new(), failing_loader("gone", 100, &calls))
        .context("user")
        .variables(1)
        .options(LoadOptions::default().with_suspense().with_throw_error())
        .build()
        .unwrap();

    let Suspended::Pending(handle) = loads.read().unwrap() else {
        panic!("first read should suspend");
    };
    let settled = timeout_ok(ms(1_000), handle).await.expect("suspended load should settle");
    assert_eq!(settled, Err("gone".to_string()));
    settle().await;

    let read = loads.read().unwrap();
    assert_eq!(read.settled(), Some(Err("gone".to_string())));
}

/// Validates the free `preload` function.
///
/// This test ensures a preloaded key is joined by a later suspense read
/// instead of calling the loader a second time.
///
/// # Test Steps
/// 1. Preload key `profile/5`
/// 2. Read the same key through a suspense controller while it is in flight
/// 3. Verify both settle to the same value after a single call
#[tokio::test(start_paused = true)]
async fn test_preload_then_read() {
    let store = RecordStore::new();
    let calls = CallCounter::new();
    let loader = echo_loader("profile", 200, &calls);

    let preloaded = preload(store.clone(), "profile", loader.clone(), 5, LoadOptions::default())
        .unwrap()
        .expect("preload should start a load");

    let reader = Loads::builder(store, loader)
        .context("profile")
        .options(LoadOptions::default().with_suspense())
        .build()
        .unwrap();
    let Suspended::Pending(handle) = reader.read_with(5).unwrap() else {
        panic!("read during preload should suspend");
    };

    let (read, preloaded) = tokio::join!(timeout_ok(ms(1_000), handle), preloaded);
    assert_eq!(read.expect("read should settle").as_deref(), Ok("profile 5 #1"));
    assert_eq!(preloaded.as_deref(), Ok("profile 5 #1"));
    assert_eq!(calls.get(), 1);
}

/// Validates cache-only suspense reads.
///
/// This test ensures a cache-only read of a missing record fails instead of
/// suspending forever.
///
/// # Test Steps
/// 1. Read an empty store through a cache-only resource
/// 2. Verify the read fails as misconfigured and no call was made
#[tokio::test(start_paused = true)]
async fn test_cache_only_read_miss() {
    let calls = CallCounter::new();
    let resource = Resource::new("user", RecordStore::new(), echo_loader("user", 10, &calls))
        .with_options(LoadOptions::default().with_load_policy(LoadPolicy::CacheOnly));

    assert!(matches!(resource.read(1), Err(LoadError::Misconfigured(_))));
    assert_eq!(calls.get(), 0);
}

/// Validates optimistic writes between subscribers.
///
/// This test ensures an optimistic write to another context is visible to
/// that context's subscribers while the writer's own state is untouched.
///
/// # Test Steps
/// 1. Mount a list controller and a detail controller on one store
/// 2. Write an optimistic response to the list context from the detail
///    controller
/// 3. Verify the list reflects it and the detail stays idle
#[tokio::test(start_paused = true)]
async fn test_optimistic_write_to_peer() {
    let store = RecordStore::new();
    let calls = CallCounter::new();
    let list = Loads::builder(store.clone(), echo_list_loader())
        .context("users")
        .without_args()
        .options(LoadOptions::default().deferred())
        .build()
        .unwrap();
    let detail = Loads::builder(store.clone(), echo_loader("user", 10, &calls))
        .context("user")
        .variables(1)
        .options(LoadOptions::default().deferred())
        .build()
        .unwrap();
    list.mount().unwrap();
    detail.mount().unwrap();

    detail
        .set_response_to(OptimisticTarget::Context("users".to_string()), "ada, grace".to_string())
        .unwrap();

    assert_eq!(list.snapshot().response.as_deref(), Some("ada, grace"));
    assert!(detail.snapshot().is_idle());
    assert!(store.contains_key(&LoadKey::from_context("users")));
    assert_eq!(calls.get(), 0);
}

fn echo_list_loader() -> Loader<(), String, String> {
    Loader::new(|()| async { Ok("everyone".to_string()) })
}
