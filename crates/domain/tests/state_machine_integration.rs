//! Integration tests for the domain crate
//!
//! Exercises the state machine, policies, options and keys together the way
//! a controller strings them.

use std::str::FromStr;
use std::time::Duration;

use loadstate_domain::{
    LoadEvent, LoadKey, LoadOptions, LoadPolicy, LoadState, LoadStatus, PersistedRecord,
};

/// Validates a full reload cycle through the state machine.
///
/// This test walks a first load, a slow reload and a failing reload, and
/// checks the five-state status at each step.
///
/// # Test Steps
/// 1. Start without cache, resolve
/// 2. Start with cache, turn slow, resolve
/// 3. Start with cache, reject, reset
#[test]
fn test_reload_cycle() {
    let steps = [
        (LoadEvent::Start { has_cached: false }, LoadState::Pending, LoadStatus::Loading),
        (LoadEvent::Resolve, LoadState::Resolved, LoadStatus::Success),
        (LoadEvent::Start { has_cached: true }, LoadState::Reloading, LoadStatus::Loading),
        (LoadEvent::Slow, LoadState::ReloadingSlow, LoadStatus::Timeout),
        (LoadEvent::Resolve, LoadState::Resolved, LoadStatus::Success),
        (LoadEvent::Start { has_cached: true }, LoadState::Reloading, LoadStatus::Loading),
        (LoadEvent::Reject, LoadState::Rejected, LoadStatus::Error),
        (LoadEvent::Reset, LoadState::Idle, LoadStatus::Idle),
    ];

    let mut state = LoadState::Idle;
    for (event, expected, status) in steps {
        state = state.transition(event).unwrap();
        assert_eq!(state, expected, "after {event:?}");
        assert_eq!(LoadStatus::from(state), status);
    }
}

/// Validates that slow never applies outside a load.
///
/// # Test Steps
/// 1. Apply `Slow` to every settled or idle state
/// 2. Verify each is rejected with the offending state in the error
#[test]
fn test_slow_requires_load() {
    for from in [LoadState::Idle, LoadState::Resolved, LoadState::Rejected] {
        let err = from.transition(LoadEvent::Slow).unwrap_err();
        assert_eq!(err.from, from);
        assert!(err.to_string().contains(from.as_str()));
    }
}

/// Validates state names round-trip through their string form.
///
/// # Test Steps
/// 1. Parse each kebab-case name
/// 2. Verify display prints it back
#[test]
fn test_state_names() {
    let names =
        ["idle", "pending", "pending-slow", "resolved", "rejected", "reloading", "reloading-slow"];
    for name in names {
        let state = LoadState::from_str(name).unwrap();
        assert_eq!(state.to_string(), name);
    }
    assert!(LoadState::from_str("loading").is_err());
    assert_eq!(LoadPolicy::from_str("cache-first").unwrap(), LoadPolicy::CacheFirst);
}

/// Validates options loaded from a config file.
///
/// This test ensures a TOML section with millisecond durations produces
/// options that validate and keep defaults for omitted fields.
///
/// # Test Steps
/// 1. Parse a TOML document with delay, timeout, policy and cache time
/// 2. Verify the parsed values and the untouched defaults
#[test]
fn test_options_from_toml() -> anyhow::Result<()> {
    let options = LoadOptions::from_toml_str(
        r#"
        delay = 200
        timeout = 1500
        load_policy = "cache-first"
        cache_time = 60000
        "#,
    )?;

    assert_eq!(options.delay, Duration::from_millis(200));
    assert_eq!(options.timeout, Some(Duration::from_millis(1_500)));
    assert_eq!(options.load_policy, LoadPolicy::CacheFirst);
    assert_eq!(options.cache_time, Some(Duration::from_secs(60)));
    assert_eq!(options.dedup_window, LoadOptions::default().dedup_window);
    assert!(!options.defer);
    Ok(())
}

/// Validates key derivation across argument shapes.
///
/// This test ensures structurally equal arguments map to one key and that
/// unit arguments address the bare context.
///
/// # Test Steps
/// 1. Build keys from maps with different field order
/// 2. Build a key from unit arguments
/// 3. Verify context membership
#[test]
fn test_key_derivation() -> anyhow::Result<()> {
    let a = LoadKey::build("search", &serde_json::json!({"q": "rust", "page": 2}))?;
    let b = LoadKey::build("search", &serde_json::json!({"page": 2, "q": "rust"}))?;
    assert_eq!(a, b);
    assert!(a.belongs_to("search"));
    assert!(!a.belongs_to("sear"));

    let bare = LoadKey::build("users", &())?;
    assert_eq!(bare, LoadKey::from_context("users"));
    assert_eq!(bare.as_str(), "users");
    Ok(())
}

/// Validates the persisted record shape.
///
/// # Test Steps
/// 1. Serialize a resolved record to JSON and back
/// 2. Verify state, value and timestamp survive
#[test]
fn test_persisted_record_json() -> anyhow::Result<()> {
    let updated_at = chrono::Utc::now();
    let record: PersistedRecord<String, String> =
        PersistedRecord::resolved("ok".into(), updated_at);

    let json = serde_json::to_string(&record)?;
    let back: PersistedRecord<String, String> = serde_json::from_str(&json)?;
    assert_eq!(back.state, LoadState::Resolved);
    assert_eq!(back.response.as_deref(), Some("ok"));
    assert!(back.has_value());
    assert_eq!(back.updated_at, updated_at);
    Ok(())
}
