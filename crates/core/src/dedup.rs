//! In-flight call reuse
//!
//! A load that finds a call for the same key still in flight, and started
//! less than the dedup window ago, joins that call instead of invoking the
//! loader again.

use std::time::{Duration, Instant};

use crate::store::{InFlight, Record};

/// The in-flight call on `record` that a load at `now` may join
///
/// A zero `window` disables reuse.
pub fn reusable_promise<R, E>(
    record: &Record<R, E>,
    now: Instant,
    window: Duration,
) -> Option<InFlight<R, E>> {
    if !record.state.is_loading() {
        return None;
    }
    let promise = record.promise.as_ref()?;
    let started_at = record.started_at?;
    (now.saturating_duration_since(started_at) < window).then(|| promise.clone())
}
