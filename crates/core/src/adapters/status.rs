//! Five-state status view
//!
//! Render-callback style consumers see `idle/loading/timeout/success/error`
//! instead of the full seven-state machine: reloading folds into loading and
//! the slow states into timeout.

use loadstate_domain::LoadStatus;

use crate::controller::LoadsSnapshot;

/// Snapshot projected onto [`LoadStatus`]
#[derive(Debug, Clone, PartialEq)]
pub struct StatusView<R, E> {
    pub status: LoadStatus,
    pub response: Option<R>,
    pub error: Option<E>,
}

impl<R, E> StatusView<R, E> {
    pub fn is_idle(&self) -> bool {
        self.status == LoadStatus::Idle
    }

    pub fn is_loading(&self) -> bool {
        self.status == LoadStatus::Loading
    }

    pub fn is_timeout(&self) -> bool {
        self.status == LoadStatus::Timeout
    }

    pub fn is_success(&self) -> bool {
        self.status == LoadStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == LoadStatus::Error
    }
}

impl<R, E> From<LoadsSnapshot<R, E>> for StatusView<R, E> {
    fn from(snapshot: LoadsSnapshot<R, E>) -> Self {
        Self { status: snapshot.status(), response: snapshot.response, error: snapshot.error }
    }
}
