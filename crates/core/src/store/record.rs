//! Records and record patches.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use loadstate_domain::{LoadState, PersistedRecord};

/// Bounds shared by responses and errors held in the store
pub trait Payload: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Payload for T {}

/// An in-flight loader call that any number of waiters can await
pub type InFlight<R, E> = Shared<BoxFuture<'static, Result<R, E>>>;

/// Cached snapshot of one logical request
///
/// `response` and `error` are mutually exclusive. `promise` is present only
/// while the call it represents is outstanding.
#[derive(Clone)]
pub struct Record<R, E> {
    /// Lifecycle state
    pub state: LoadState,
    /// Last successful result
    pub response: Option<R>,
    /// Last failure
    pub error: Option<E>,
    /// Outstanding loader call
    pub promise: Option<InFlight<R, E>>,
    /// When the outstanding call started
    pub started_at: Option<Instant>,
    /// Time of the last mutation, from the store clock
    pub updated_at: Instant,
}

impl<R, E> Record<R, E> {
    /// An empty idle record stamped `now`
    pub fn idle(now: Instant) -> Self {
        Self {
            state: LoadState::Idle,
            response: None,
            error: None,
            promise: None,
            started_at: None,
            updated_at: now,
        }
    }

    /// Whether the record holds a result or failure to show
    pub fn has_value(&self) -> bool {
        self.response.is_some() || self.error.is_some()
    }

    /// Time since the last mutation
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.updated_at)
    }

    /// Rebuild a record from a provider value, back-dating `updated_at` by
    /// the persisted age
    pub fn from_persisted(
        persisted: PersistedRecord<R, E>,
        now: Instant,
        wall_now: DateTime<Utc>,
    ) -> Self {
        let age = persisted.age(wall_now).to_std().unwrap_or_default();
        Self {
            state: persisted.state,
            response: persisted.response,
            error: persisted.error,
            promise: None,
            started_at: None,
            updated_at: now.checked_sub(age).unwrap_or(now),
        }
    }
}

impl<R: Clone, E: Clone> Record<R, E> {
    /// The persistable part of a settled record
    pub fn to_persisted(&self, wall_now: DateTime<Utc>) -> Option<PersistedRecord<R, E>> {
        if !self.state.is_settled() {
            return None;
        }
        Some(PersistedRecord {
            state: self.state,
            response: self.response.clone(),
            error: self.error.clone(),
            updated_at: wall_now,
        })
    }
}

impl<R: fmt::Debug, E: fmt::Debug> fmt::Debug for Record<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("state", &self.state)
            .field("response", &self.response)
            .field("error", &self.error)
            .field("in_flight", &self.promise.is_some())
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Partial update merged into a [`Record`]
///
/// Merge rules:
/// - a response clears the error, and an error clears the response
/// - a new promise stamps `started_at`
/// - a settled state drops the promise
/// - `idle` drops the response, the error and the promise
pub struct RecordPatch<R, E> {
    /// New lifecycle state
    pub state: Option<LoadState>,
    /// New response
    pub response: Option<R>,
    /// New error
    pub error: Option<E>,
    /// New outstanding call
    pub promise: Option<InFlight<R, E>>,
}

impl<R, E> Default for RecordPatch<R, E> {
    fn default() -> Self {
        Self { state: None, response: None, error: None, promise: None }
    }
}

impl<R, E> RecordPatch<R, E> {
    /// Resolve with `response`
    pub fn resolved(response: R) -> Self {
        Self { state: Some(LoadState::Resolved), response: Some(response), ..Self::default() }
    }

    /// Reject with `error`
    pub fn rejected(error: E) -> Self {
        Self { state: Some(LoadState::Rejected), error: Some(error), ..Self::default() }
    }

    /// Settle from a loader result
    pub fn settled(result: Result<R, E>) -> Self {
        match result {
            Ok(response) => Self::resolved(response),
            Err(error) => Self::rejected(error),
        }
    }

    /// Enter a loading state with an outstanding call
    pub fn loading(state: LoadState, promise: InFlight<R, E>) -> Self {
        Self { state: Some(state), promise: Some(promise), ..Self::default() }
    }

    /// Change only the state
    pub fn state(state: LoadState) -> Self {
        Self { state: Some(state), ..Self::default() }
    }

    /// Merge this patch into `record`, stamping it with `now`
    pub fn apply(self, record: &mut Record<R, E>, now: Instant) {
        if let Some(response) = self.response {
            record.response = Some(response);
            record.error = None;
        }
        if let Some(error) = self.error {
            record.error = Some(error);
            record.response = None;
        }
        if let Some(promise) = self.promise {
            record.promise = Some(promise);
            record.started_at = Some(now);
        }
        if let Some(state) = self.state {
            record.state = state;
            if state.is_settled() || state.is_idle() {
                record.promise = None;
                record.started_at = None;
            }
            if state.is_idle() {
                record.response = None;
                record.error = None;
            }
        }
        record.updated_at = now;
    }
}
