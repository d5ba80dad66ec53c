//! Reactive controller state.

use loadstate_domain::{LoadState, LoadStatus};

use crate::store::Record;

/// What a subscriber sees: the state plus the visible response or error
#[derive(Debug, Clone, PartialEq)]
pub struct LoadsSnapshot<R, E> {
    /// Lifecycle state
    pub state: LoadState,
    /// Visible response
    pub response: Option<R>,
    /// Visible error
    pub error: Option<E>,
}

impl<R, E> Default for LoadsSnapshot<R, E> {
    fn default() -> Self {
        Self::idle()
    }
}

impl<R, E> LoadsSnapshot<R, E> {
    /// Nothing loaded
    pub fn idle() -> Self {
        Self { state: LoadState::Idle, response: None, error: None }
    }

    /// Resolved with a response supplied up front
    pub fn with_response(response: R) -> Self {
        Self { state: LoadState::Resolved, response: Some(response), error: None }
    }

    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    /// Includes `pending-slow`
    pub fn is_pending(&self) -> bool {
        self.state.is_pending()
    }

    pub fn is_pending_slow(&self) -> bool {
        self.state.is_pending_slow()
    }

    pub fn is_resolved(&self) -> bool {
        self.state.is_resolved()
    }

    pub fn is_rejected(&self) -> bool {
        self.state.is_rejected()
    }

    /// Includes `reloading-slow`
    pub fn is_reloading(&self) -> bool {
        self.state.is_reloading()
    }

    pub fn is_reloading_slow(&self) -> bool {
        self.state.is_reloading_slow()
    }

    /// Whether a response or error is visible
    pub fn has_value(&self) -> bool {
        self.response.is_some() || self.error.is_some()
    }

    /// Five-state view of [`Self::state`]
    pub fn status(&self) -> LoadStatus {
        LoadStatus::from(self.state)
    }
}

impl<R: Clone, E: Clone> LoadsSnapshot<R, E> {
    /// Reflect a settled record
    pub(crate) fn reflect(&mut self, record: &Record<R, E>) {
        self.state = record.state;
        self.response = record.response.clone();
        self.error = record.error.clone();
    }
}

/// How a call to [`Loads::load`](crate::Loads::load) ended
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome<R, E> {
    /// The loader succeeded and the result was committed
    Resolved(R),
    /// The loader failed and the failure was committed
    Rejected(E),
    /// The policy answered from cache without calling the loader
    Skipped(LoadsSnapshot<R, E>),
    /// A newer load or a teardown made this result irrelevant
    Superseded,
}

impl<R, E> LoadOutcome<R, E> {
    /// The committed response, if the load resolved
    pub fn response(&self) -> Option<&R> {
        match self {
            Self::Resolved(response) => Some(response),
            Self::Skipped(snapshot) => snapshot.response.as_ref(),
            Self::Rejected(_) | Self::Superseded => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded)
    }
}
