//! Testing utilities and helpers
//!
//! - **[`async_utils`]**: async assertions and paused-clock helpers
//!
//! `MockClock` lives in [`crate::time`] and is re-exported here for
//! convenience.
//!
//! ```rust
//! use loadstate_common::testing::MockClock;
//!
//! let clock = MockClock::new();
//! clock.advance(std::time::Duration::from_secs(5));
//! ```

pub mod async_utils;

// Macros exported with #[macro_export] are available at crate root
pub use async_utils::{advance_and_settle, poll_until, settle, timeout_ok};

#[cfg(feature = "foundation")]
pub use crate::time::{Clock, MockClock, SystemClock};
