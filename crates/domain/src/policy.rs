//! Load policies
//!
//! A policy decides how a cached record and the loader interact for one
//! load. The evaluation itself lives in `loadstate-core::policy`.

use loadstate_common::impl_state_conversions;
use serde::{Deserialize, Serialize};

/// Cache-versus-loader precedence for a load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadPolicy {
    /// Serve the cache when present and never call the loader on a hit
    CacheFirst,
    /// Serve the cache immediately, then call the loader to refresh it
    #[default]
    CacheAndLoad,
    /// Ignore the cache and always call the loader
    LoadOnly,
    /// Never call the loader; only reflect cache content
    CacheOnly,
}

impl_state_conversions!(LoadPolicy {
    CacheFirst => "cache-first",
    CacheAndLoad => "cache-and-load",
    LoadOnly => "load-only",
    CacheOnly => "cache-only",
});

impl LoadPolicy {
    /// Whether this policy ever consults the cache
    pub const fn reads_cache(self) -> bool {
        !matches!(self, Self::LoadOnly)
    }

    /// Whether this policy ever calls the loader
    pub const fn invokes_loader(self) -> bool {
        !matches!(self, Self::CacheOnly)
    }
}
