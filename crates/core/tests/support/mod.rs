//! Shared test helpers for `loadstate-core` integration tests.
//!
//! Loaders here sleep on tokio's clock, so tests run with
//! `start_paused = true` and drive time with `advance_and_settle`.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loadstate_common::observability::init_tracing;
use loadstate_core::Loader;

/// Install the test subscriber; `RUST_LOG` overrides the default filter
pub fn init_logging() {
    init_tracing("loadstate_core=debug");
}

/// Counts loader invocations across clones
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicU32>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Loader answering `"{prefix} {id}"` after `latency_ms`
pub fn echo_loader(
    prefix: &'static str,
    latency_ms: u64,
    calls: &CallCounter,
) -> Loader<u32, String, String> {
    let calls = calls.clone();
    Loader::new(move |id: u32| {
        let call = calls.bump();
        async move {
            tokio::time::sleep(Duration::from_millis(latency_ms)).await;
            Ok(format!("{prefix} {id} #{call}"))
        }
    })
}

/// Loader failing with `"{message}"` after `latency_ms`
pub fn failing_loader(
    message: &'static str,
    latency_ms: u64,
    calls: &CallCounter,
) -> Loader<u32, String, String> {
    let calls = calls.clone();
    Loader::new(move |_: u32| {
        calls.bump();
        async move {
            tokio::time::sleep(Duration::from_millis(latency_ms)).await;
            Err(message.to_string())
        }
    })
}

/// Loader that fails on its first `failures` calls and succeeds afterwards
pub fn flaky_loader(
    failures: u32,
    latency_ms: u64,
    calls: &CallCounter,
) -> Loader<u32, String, String> {
    let calls = calls.clone();
    Loader::new(move |id: u32| {
        let call = calls.bump();
        async move {
            tokio::time::sleep(Duration::from_millis(latency_ms)).await;
            if call <= failures {
                Err(format!("attempt {call} failed"))
            } else {
                Ok(format!("user {id}"))
            }
        }
    })
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
