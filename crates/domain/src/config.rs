//! Load configuration
//!
//! [`LoadOptions`] carries every per-controller knob. It deserializes from
//! TOML or JSON with durations in milliseconds, and any omitted field takes
//! its default.

use std::time::Duration;

use loadstate_common::{duration_millis, option_duration_millis, CommonError, CommonResult};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_DEDUP_WINDOW_MS, DEFAULT_DELAY_MS};
use crate::policy::LoadPolicy;

/// Per-controller load configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Delay before a pending state becomes visible (default: 0)
    #[serde(with = "duration_millis")]
    pub delay: Duration,

    /// Elapsed time after which a load in flight is reported as slow
    #[serde(with = "option_duration_millis")]
    pub timeout: Option<Duration>,

    /// Do not load automatically on mount (default: false)
    pub defer: bool,

    /// Cache-versus-loader precedence (default: cache-and-load)
    pub load_policy: LoadPolicy,

    /// TTL for records written by this controller
    #[serde(with = "option_duration_millis")]
    pub cache_time: Option<Duration>,

    /// Window in which a second load for the same key reuses the in-flight
    /// call (default: 500ms)
    #[serde(with = "duration_millis")]
    pub dedup_window: Duration,

    /// Age after which a cached record no longer counts as a cache hit
    #[serde(with = "option_duration_millis")]
    pub revalidate_time: Option<Duration>,

    /// Reload on this interval while mounted
    #[serde(with = "option_duration_millis")]
    pub polling_interval: Option<Duration>,

    /// Retry after a rejection on this interval
    #[serde(with = "option_duration_millis")]
    pub reject_retry_interval: Option<Duration>,

    /// Blocking-read mode: expose the pending call instead of flags
    pub suspense: bool,

    /// Return rejections as `Err` instead of a rejected outcome
    pub throw_error: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            timeout: None,
            defer: false,
            load_policy: LoadPolicy::default(),
            cache_time: None,
            dedup_window: Duration::from_millis(DEFAULT_DEDUP_WINDOW_MS),
            revalidate_time: None,
            polling_interval: None,
            reject_retry_interval: None,
            suspense: false,
            throw_error: false,
        }
    }
}

impl LoadOptions {
    /// Parse options from a TOML document
    ///
    /// # Errors
    /// Returns `CommonError::Serialization` for malformed TOML and
    /// `CommonError::Config` for out-of-range values.
    pub fn from_toml_str(input: &str) -> CommonResult<Self> {
        let options: Self = toml::from_str(input)?;
        options.validate()?;
        Ok(options)
    }

    /// Parse options from a JSON document
    ///
    /// # Errors
    /// Returns `CommonError::Serialization` for malformed JSON and
    /// `CommonError::Config` for out-of-range values.
    pub fn from_json_str(input: &str) -> CommonResult<Self> {
        let options: Self = serde_json::from_str(input)?;
        options.validate()?;
        Ok(options)
    }

    /// Validate the configuration
    ///
    /// A zero `timeout` would flag every load as slow immediately, and a zero
    /// polling or retry interval would spin.
    ///
    /// # Errors
    /// Returns `CommonError::Config` naming the offending field.
    pub fn validate(&self) -> CommonResult<()> {
        if self.timeout == Some(Duration::ZERO) {
            return Err(CommonError::config_field("timeout", "must be greater than 0"));
        }
        if self.polling_interval == Some(Duration::ZERO) {
            return Err(CommonError::config_field("polling_interval", "must be greater than 0"));
        }
        if self.reject_retry_interval == Some(Duration::ZERO) {
            return Err(CommonError::config_field(
                "reject_retry_interval",
                "must be greater than 0",
            ));
        }
        if self.load_policy == LoadPolicy::CacheOnly && self.polling_interval.is_some() {
            return Err(CommonError::config_field(
                "polling_interval",
                "cache-only controllers never call the loader",
            ));
        }
        Ok(())
    }

    /// Set the visible-pending delay
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the slow timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Do not load on mount
    pub fn deferred(mut self) -> Self {
        self.defer = true;
        self
    }

    /// Set the load policy
    pub fn with_load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    /// Set the record TTL
    pub fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = Some(cache_time);
        self
    }

    /// Set the dedup window
    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    /// Set the age after which cached records stop counting as hits
    pub fn with_revalidate_time(mut self, revalidate_time: Duration) -> Self {
        self.revalidate_time = Some(revalidate_time);
        self
    }

    /// Set the polling interval
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = Some(interval);
        self
    }

    /// Set the reject retry interval
    pub fn with_reject_retry_interval(mut self, interval: Duration) -> Self {
        self.reject_retry_interval = Some(interval);
        self
    }

    /// Enable blocking-read mode
    pub fn with_suspense(mut self) -> Self {
        self.suspense = true;
        self
    }

    /// Surface rejections as `Err`
    pub fn with_throw_error(mut self) -> Self {
        self.throw_error = true;
        self
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for load configuration.
    use super::*;

    /// Validates `LoadOptions::default` behavior for the default values
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms delay 0, no timeout, cache-and-load and a 500ms dedup
    ///   window.
    #[test]
    fn test_defaults() {
        let options = LoadOptions::default();
        assert_eq!(options.delay, Duration::ZERO);
        assert_eq!(options.timeout, None);
        assert_eq!(options.load_policy, LoadPolicy::CacheAndLoad);
        assert_eq!(options.dedup_window, Duration::from_millis(500));
        assert_eq!(options.cache_time, None);
        assert!(!options.defer && !options.suspense && !options.throw_error);
    }

    /// Validates `LoadOptions::from_toml_str` behavior for the partial
    /// document scenario.
    ///
    /// Assertions:
    /// - Confirms configured fields are read in milliseconds.
    /// - Confirms omitted fields keep their defaults.
    #[test]
    fn test_from_toml_partial() {
        let options = LoadOptions::from_toml_str(
            r#"
            delay = 200
            timeout = 400
            load_policy = "cache-first"
            cache_time = 60000
            "#,
        )
        .unwrap();

        assert_eq!(options.delay, Duration::from_millis(200));
        assert_eq!(options.timeout, Some(Duration::from_millis(400)));
        assert_eq!(options.load_policy, LoadPolicy::CacheFirst);
        assert_eq!(options.cache_time, Some(Duration::from_secs(60)));
        assert_eq!(options.dedup_window, Duration::from_millis(500));
    }

    /// Validates `LoadOptions::from_json_str` behavior for the unknown policy
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures an unknown policy is a serialization error.
    #[test]
    fn test_from_json_unknown_policy() {
        let err = LoadOptions::from_json_str(r#"{"load_policy":"sometimes"}"#).unwrap_err();
        assert!(matches!(err, CommonError::Serialization { .. }));
    }

    /// Validates `LoadOptions::validate` behavior for the zero interval
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures a zero timeout, polling interval or retry interval is a
    ///   config error naming the field.
    #[test]
    fn test_validate_rejects_zero_intervals() {
        let zero_timeout = LoadOptions::default().with_timeout(Duration::ZERO);
        assert_eq!(
            zero_timeout.validate(),
            Err(CommonError::config_field("timeout", "must be greater than 0"))
        );

        let zero_poll = LoadOptions::default().with_polling_interval(Duration::ZERO);
        assert!(matches!(
            zero_poll.validate(),
            Err(CommonError::Config { field: Some(ref f), .. }) if f == "polling_interval"
        ));

        let zero_retry = LoadOptions::default().with_reject_retry_interval(Duration::ZERO);
        assert!(zero_retry.validate().is_err());
    }

    /// Validates `LoadOptions::validate` behavior for the cache-only polling
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures polling is rejected for a policy that never loads.
    #[test]
    fn test_validate_rejects_polling_cache_only() {
        let options = LoadOptions::default()
            .with_load_policy(LoadPolicy::CacheOnly)
            .with_polling_interval(Duration::from_secs(1));
        assert!(options.validate().is_err());
    }

    /// Validates `LoadOptions` serialization for the json output scenario.
    ///
    /// Assertions:
    /// - Confirms durations are written as integer milliseconds.
    #[test]
    fn test_serialize_durations_as_millis() -> anyhow::Result<()> {
        let options = LoadOptions::default().with_delay(Duration::from_millis(150));
        let json = serde_json::to_value(&options)?;
        assert_eq!(json["delay"], 150);
        assert_eq!(json["dedup_window"], 500);
        assert!(json["timeout"].is_null());
        assert_eq!(json["load_policy"], "cache-and-load");
        Ok(())
    }
}
