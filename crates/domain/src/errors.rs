//! Error types used throughout the load layer

use std::fmt::Debug;
use std::time::Duration;

use loadstate_common::{CommonError, ErrorClassification, ErrorSeverity};
use thiserror::Error;

use crate::state::{LoadEvent, LoadState};

/// An event that the current [`LoadState`] cannot accept
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Illegal transition from '{from}' on {event:?}")]
pub struct TransitionError {
    /// State the event was applied to
    pub from: LoadState,
    /// Rejected event
    pub event: LoadEvent,
}

/// Main error type for load operations
///
/// `E` is the loader's own error type; it is carried unchanged in
/// [`LoadError::Rejected`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError<E> {
    /// The loader rejected and the controller is configured to surface it
    #[error("Loader rejected: {0:?}")]
    Rejected(E),

    /// The controller was torn down before the call
    #[error("Loads controller is no longer active")]
    Inactive,

    /// The call is not allowed in the current configuration
    #[error("Misconfigured: {0}")]
    Misconfigured(String),

    /// The logical key could not be derived from the arguments
    #[error("Key derivation failed: {0}")]
    Key(String),

    /// `update(index)` was called with no loader registered at that index
    #[error("No update loader registered at index {0}")]
    UnknownUpdater(usize),

    /// Infrastructure failure (configuration, serialization)
    #[error(transparent)]
    Common(#[from] CommonError),
}

/// Result type alias for load operations
pub type LoadResult<T, E> = std::result::Result<T, LoadError<E>>;

impl<E> LoadError<E> {
    /// The loader's error, if this is a rejection
    pub fn rejection(&self) -> Option<&E> {
        match self {
            Self::Rejected(e) => Some(e),
            _ => None,
        }
    }

    /// Consume into the loader's error, if this is a rejection
    pub fn into_rejection(self) -> Option<E> {
        match self {
            Self::Rejected(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: Debug> ErrorClassification for LoadError<E> {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Rejected(_) => true,
            Self::Common(e) => e.is_retryable(),
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Rejected(_) | Self::Inactive => ErrorSeverity::Warning,
            Self::Misconfigured(_) | Self::Key(_) | Self::UnknownUpdater(_) => ErrorSeverity::Error,
            Self::Common(e) => e.severity(),
        }
    }

    fn is_critical(&self) -> bool {
        match self {
            Self::Common(e) => e.is_critical(),
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Common(e) => e.retry_after(),
            _ => None,
        }
    }
}
