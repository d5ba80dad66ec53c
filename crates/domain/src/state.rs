//! Load lifecycle state machine
//!
//! One asynchronous operation moves through these states:
//!
//! ```text
//!            start (no cache)            resolve / reject
//!   idle ─────────────────────▶ pending ──────────────────▶ resolved | rejected
//!                                 │ slow                          │ start (cached)
//!                                 ▼                               ▼
//!                            pending-slow                     reloading ──slow──▶ reloading-slow
//! ```
//!
//! There is no terminal state: settled states go back to loading on the next
//! start and to `idle` on reset. Slow sub-states are advisory and never cancel
//! the outstanding call.

use loadstate_common::impl_state_conversions;
use serde::{Deserialize, Serialize};

use crate::errors::TransitionError;

/// Lifecycle state of one asynchronous operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadState {
    /// Nothing has been requested yet, or the state was reset
    #[default]
    Idle,
    /// First load in flight, no cached result to show
    Pending,
    /// First load in flight and past the configured timeout
    PendingSlow,
    /// Last load succeeded
    Resolved,
    /// Last load failed
    Rejected,
    /// Load in flight while a previous result remains visible
    Reloading,
    /// Reload in flight and past the configured timeout
    ReloadingSlow,
}

impl_state_conversions!(LoadState {
    Idle => "idle",
    Pending => "pending",
    PendingSlow => "pending-slow",
    Resolved => "resolved",
    Rejected => "rejected",
    Reloading => "reloading",
    ReloadingSlow => "reloading-slow",
});

/// Input driving a [`LoadState`] transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadEvent {
    /// A load started; `has_cached` is true when a previous result is shown
    Start { has_cached: bool },
    /// The configured timeout elapsed before settlement
    Slow,
    /// The loader succeeded
    Resolve,
    /// The loader failed
    Reject,
    /// Explicit reset to idle
    Reset,
}

impl LoadState {
    /// Apply `event`, returning the next state
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when `Slow` is applied to a state with no
    /// load in flight.
    pub fn transition(self, event: LoadEvent) -> Result<Self, TransitionError> {
        match (self, event) {
            (_, LoadEvent::Start { has_cached: false }) => Ok(Self::Pending),
            (_, LoadEvent::Start { has_cached: true }) => Ok(Self::Reloading),
            (Self::Pending | Self::PendingSlow, LoadEvent::Slow) => Ok(Self::PendingSlow),
            (Self::Reloading | Self::ReloadingSlow, LoadEvent::Slow) => Ok(Self::ReloadingSlow),
            (from, LoadEvent::Slow) => Err(TransitionError { from, event }),
            (_, LoadEvent::Resolve) => Ok(Self::Resolved),
            (_, LoadEvent::Reject) => Ok(Self::Rejected),
            (_, LoadEvent::Reset) => Ok(Self::Idle),
        }
    }

    /// True for `idle`
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }

    /// True for `pending` and `pending-slow`
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Pending | Self::PendingSlow)
    }

    /// True for `pending-slow`
    pub const fn is_pending_slow(self) -> bool {
        matches!(self, Self::PendingSlow)
    }

    /// True for `resolved`
    pub const fn is_resolved(self) -> bool {
        matches!(self, Self::Resolved)
    }

    /// True for `rejected`
    pub const fn is_rejected(self) -> bool {
        matches!(self, Self::Rejected)
    }

    /// True for `reloading` and `reloading-slow`
    pub const fn is_reloading(self) -> bool {
        matches!(self, Self::Reloading | Self::ReloadingSlow)
    }

    /// True for `reloading-slow`
    pub const fn is_reloading_slow(self) -> bool {
        matches!(self, Self::ReloadingSlow)
    }

    /// True while a load is in flight
    pub const fn is_loading(self) -> bool {
        self.is_pending() || self.is_reloading()
    }

    /// True for either slow sub-state
    pub const fn is_slow(self) -> bool {
        matches!(self, Self::PendingSlow | Self::ReloadingSlow)
    }

    /// True for `resolved` and `rejected`
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Resolved | Self::Rejected)
    }
}

/// Five-state status used by render-prop style consumers
///
/// Shares the topology of [`LoadState`] with the reloading variants folded
/// into `loading` and the slow variants into `timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadStatus {
    /// Nothing requested
    #[default]
    Idle,
    /// Load in flight within the expected latency
    Loading,
    /// Load in flight past the configured timeout
    Timeout,
    /// Last load succeeded
    Success,
    /// Last load failed
    Error,
}

impl_state_conversions!(LoadStatus {
    Idle => "idle",
    Loading => "loading",
    Timeout => "timeout",
    Success => "success",
    Error => "error",
});

impl From<LoadState> for LoadStatus {
    fn from(state: LoadState) -> Self {
        match state {
            LoadState::Idle => Self::Idle,
            LoadState::Pending | LoadState::Reloading => Self::Loading,
            LoadState::PendingSlow | LoadState::ReloadingSlow => Self::Timeout,
            LoadState::Resolved => Self::Success,
            LoadState::Rejected => Self::Error,
        }
    }
}
