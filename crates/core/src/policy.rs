//! Load policy evaluation
//!
//! [`evaluate`] is a pure decision function: given whether a usable cached
//! record exists and the configured [`LoadPolicy`], it says whether the
//! loader must be skipped and whether the cached value stays visible while a
//! load is pending.

use std::time::{Duration, Instant};

use loadstate_domain::LoadPolicy;

use crate::store::Record;

/// Outcome of evaluating a load policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PolicyDecision {
    /// Return without calling the loader
    pub skip_invocation: bool,
    /// Reflect the cached record before the loader settles
    pub show_cached_while_pending: bool,
}

/// Decide how a load proceeds
pub const fn evaluate(has_cached_record: bool, policy: LoadPolicy) -> PolicyDecision {
    match policy {
        LoadPolicy::CacheFirst => PolicyDecision {
            skip_invocation: has_cached_record,
            show_cached_while_pending: has_cached_record,
        },
        LoadPolicy::CacheAndLoad => PolicyDecision {
            skip_invocation: false,
            show_cached_while_pending: has_cached_record,
        },
        LoadPolicy::LoadOnly => {
            PolicyDecision { skip_invocation: false, show_cached_while_pending: false }
        }
        LoadPolicy::CacheOnly => PolicyDecision {
            skip_invocation: true,
            show_cached_while_pending: has_cached_record,
        },
    }
}

/// Whether `record` counts as a cache hit at `now`
///
/// A hit is a settled record holding a value. With `revalidate_time` set, a
/// record older than that no longer counts.
pub fn is_cache_hit<R, E>(
    record: Option<&Record<R, E>>,
    now: Instant,
    revalidate_time: Option<Duration>,
) -> bool {
    let Some(record) = record else {
        return false;
    };
    if !record.state.is_settled() || !record.has_value() {
        return false;
    }
    revalidate_time.map_or(true, |max_age| record.age(now) < max_age)
}
