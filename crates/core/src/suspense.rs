//! Suspense reads
//!
//! In suspense mode a read does not report loading flags. It answers with a
//! tri-state [`Suspended`]: the settled value, the settled error, or a
//! [`SuspendHandle`] the caller awaits before reading again. A framework
//! adapter decides whether that means suspending a render or polling.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::store::InFlight;

/// Result of a suspense read
pub enum Suspended<R, E> {
    /// The load is in flight; await the handle and read again
    Pending(SuspendHandle<R, E>),
    /// The load succeeded
    Resolved(R),
    /// The load failed
    Rejected(E),
}

impl<R, E> Suspended<R, E> {
    /// Whether the read must wait
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// The settled outcome, if any
    pub fn settled(self) -> Option<Result<R, E>> {
        match self {
            Self::Pending(_) => None,
            Self::Resolved(response) => Some(Ok(response)),
            Self::Rejected(error) => Some(Err(error)),
        }
    }
}

impl<R: fmt::Debug, E: fmt::Debug> fmt::Debug for Suspended<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending(_) => f.write_str("Pending(..)"),
            Self::Resolved(response) => f.debug_tuple("Resolved").field(response).finish(),
            Self::Rejected(error) => f.debug_tuple("Rejected").field(error).finish(),
        }
    }
}

/// Awaitable handle on an in-flight load
#[must_use = "a suspend handle does nothing unless awaited"]
pub struct SuspendHandle<R, E> {
    promise: InFlight<R, E>,
}

impl<R, E> SuspendHandle<R, E> {
    pub(crate) fn new(promise: InFlight<R, E>) -> Self {
        Self { promise }
    }
}

impl<R, E> Clone for SuspendHandle<R, E> {
    fn clone(&self) -> Self {
        Self { promise: self.promise.clone() }
    }
}

impl<R, E> fmt::Debug for SuspendHandle<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SuspendHandle(..)")
    }
}

impl<R: Clone, E: Clone> Future for SuspendHandle<R, E> {
    type Output = Result<R, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.promise).poll(cx)
    }
}
