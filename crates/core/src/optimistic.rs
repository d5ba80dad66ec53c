//! Optimistic writes
//!
//! A caller that already knows a result (typically after a mutation) can
//! commit it straight into the store as a resolved record, with no pending
//! state in between. The write can target the caller's own key or a peer's;
//! a peer write reaches the peer's subscribers through the store and leaves
//! the caller's local state alone.

use std::fmt;

use loadstate_domain::LoadKey;

use crate::store::{Payload, Record, RecordPatch, RecordStore, SetOptions};

/// A response to commit, or a function of the currently cached response
pub enum Optimistic<R> {
    /// Commit this value
    Value(R),
    /// Commit the value computed from the cached response
    Update(Box<dyn FnOnce(Option<&R>) -> R + Send>),
}

impl<R> Optimistic<R> {
    /// Compute the committed value from the cached response
    pub fn update<F>(update: F) -> Self
    where
        F: FnOnce(Option<&R>) -> R + Send + 'static,
    {
        Self::Update(Box::new(update))
    }

    fn resolve(self, current: Option<&R>) -> R {
        match self {
            Self::Value(value) => value,
            Self::Update(update) => update(current),
        }
    }
}

impl<R> From<R> for Optimistic<R> {
    fn from(value: R) -> Self {
        Self::Value(value)
    }
}

impl<R: fmt::Debug> fmt::Debug for Optimistic<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Update(_) => f.write_str("Update(..)"),
        }
    }
}

/// Where an optimistic write lands
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OptimisticTarget {
    /// The writing controller's own key
    #[default]
    Own,
    /// The argument-less key of another context
    Context(String),
    /// An explicit key
    Key(LoadKey),
}

impl OptimisticTarget {
    /// The key this target names, given the writer's own key
    pub fn resolve(&self, own: &LoadKey) -> LoadKey {
        match self {
            Self::Own => own.clone(),
            Self::Context(context) => LoadKey::from_context(context),
            Self::Key(key) => key.clone(),
        }
    }
}

/// Commit `value` to `key` as a resolved record
pub(crate) fn commit_response<R: Payload, E: Payload>(
    store: &RecordStore<R, E>,
    key: &LoadKey,
    value: Optimistic<R>,
    options: SetOptions<R, E>,
) -> Record<R, E> {
    store.update(
        key,
        |current| RecordPatch::resolved(value.resolve(current.and_then(|record| record.response.as_ref()))),
        options,
    )
}

/// Commit `error` to `key` as a rejected record
pub(crate) fn commit_error<R: Payload, E: Payload>(
    store: &RecordStore<R, E>,
    key: &LoadKey,
    error: E,
    options: SetOptions<R, E>,
) -> Record<R, E> {
    store.set(key, RecordPatch::rejected(error), options)
}
