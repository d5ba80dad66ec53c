//! Tracing subscriber initialisation
//!
//! The library crates only emit `tracing` events. Binaries and test harnesses
//! call [`init_tracing`] once to install a `fmt` subscriber filtered by
//! `RUST_LOG`, falling back to the supplied default directive.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::error::{CommonError, CommonResult};

/// Output format for the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable, one line per event
    #[default]
    Compact,
    /// Newline-delimited JSON
    Json,
}

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install a global subscriber, returning an error if one is already set
///
/// # Errors
///
/// Returns `CommonError::Config` when a global subscriber has already been
/// installed.
pub fn try_init_tracing(default_filter: &str, format: LogFormat) -> CommonResult<()> {
    let registry = tracing_subscriber::registry().with(env_filter(default_filter));
    let result = match format {
        LogFormat::Compact => registry.with(fmt::layer().compact().with_target(true)).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };
    result.map_err(|e| CommonError::config_field("tracing", e.to_string()))
}

/// Install a compact global subscriber, ignoring repeated initialisation
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_tracing(default_filter: &str) {
    let _ = try_init_tracing(default_filter, LogFormat::Compact);
}
