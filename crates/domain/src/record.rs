//! Persisted record shape
//!
//! What a cache provider stores for one key: the settled state and its
//! payload. In-flight calls are process-local and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::LoadState;

/// Settled snapshot of one key, as handed to a cache provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord<R, E> {
    /// Lifecycle state at the time of the write
    pub state: LoadState,
    /// Last successful result, present only for `resolved`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<R>,
    /// Last failure, present only for `rejected`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<E>,
    /// Wall-clock time of the write
    pub updated_at: DateTime<Utc>,
}

impl<R, E> PersistedRecord<R, E> {
    /// A resolved record holding `response`
    pub fn resolved(response: R, updated_at: DateTime<Utc>) -> Self {
        Self { state: LoadState::Resolved, response: Some(response), error: None, updated_at }
    }

    /// A rejected record holding `error`
    pub fn rejected(error: E, updated_at: DateTime<Utc>) -> Self {
        Self { state: LoadState::Rejected, response: None, error: Some(error), updated_at }
    }

    /// Whether the record holds a usable result or failure
    pub fn has_value(&self) -> bool {
        self.response.is_some() || self.error.is_some()
    }

    /// Age of the record relative to `now`, zero if written in the future
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.updated_at).max(chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for persisted records.
    use chrono::TimeZone;

    use super::*;

    /// Validates `PersistedRecord` serialization for the json shape scenario.
    ///
    /// Assertions:
    /// - Confirms the state is written in kebab-case.
    /// - Ensures an absent error is omitted.
    #[test]
    fn test_json_shape() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let record: PersistedRecord<u32, String> = PersistedRecord::resolved(7, at);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["state"], "resolved");
        assert_eq!(json["response"], 7);
        assert!(json.get("error").is_none());
        assert_eq!(json["updated_at"], "2026-01-02T03:04:05Z");
    }

    /// Validates `PersistedRecord::age` behavior for the clock skew scenario.
    ///
    /// Assertions:
    /// - Confirms the age of a past record.
    /// - Confirms a record stamped in the future has zero age.
    #[test]
    fn test_age() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let record: PersistedRecord<(), String> = PersistedRecord::rejected("x".into(), at);
        assert!(record.has_value());

        let later = at + chrono::Duration::seconds(30);
        assert_eq!(record.age(later), chrono::Duration::seconds(30));

        let earlier = at - chrono::Duration::seconds(5);
        assert_eq!(record.age(earlier), chrono::Duration::zero());
    }
}
